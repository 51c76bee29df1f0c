//! SPI bus subsystem contract
//!
//! The driver never owns the bus. It looks controllers up by number, asks
//! the registry for devices by canonical name, hands new device descriptors
//! over for registration and registers its own probe/remove callbacks.
//! Everything the driver needs from the bus goes through the traits defined
//! here.

mod traits;
mod types;

pub use traits::*;
pub use types::*;
