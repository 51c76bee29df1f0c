//! The cc2500 driver
//!
//! - [`device`] - driver instance, bus callbacks and file operations
//! - [`store`] - the bound-device slot
//! - [`status`] - the status buffer and its three status lines
//! - [`fops`] - open/read front end
//! - [`resolver`] - claiming the chip-select slot on the bus
//! - [`module`] - load/unload sequencing with rollback

pub mod device;
pub mod fops;
pub mod module;
pub mod resolver;
pub mod status;
pub mod store;

pub use device::Cc2500;
pub use fops::{Fault, OpenFile, UserBuffer};
pub use module::Cc2500Module;
pub use resolver::{attach, AttachParams};
pub use status::{StatusBuffer, STATUS_ABSENT, STATUS_NO_MASTER};
pub use store::DeviceHandleStore;
