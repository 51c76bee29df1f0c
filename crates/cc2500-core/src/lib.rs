//! cc2500-core - Driver core for the cc2500 radio transceiver
//!
//! This crate claims one chip-select slot on an SPI bus, binds a character
//! device node to it and exposes a read-only status channel. The radio itself
//! is never spoken to; only attachment, status reporting and teardown live
//! here.
//!
//! The bus subsystem and the device-node subsystem are external collaborators
//! reached through the [`bus::SpiBus`] and [`node::CharDevRegistry`] traits.
//! An in-memory implementation of both lives in the `cc2500-sim` crate.
//!
//! # Example
//!
//! ```ignore
//! use cc2500_core::{Cc2500Module, DriverConfig, Signal};
//!
//! let module = Cc2500Module::load(DriverConfig::default(), bus, nodes)?;
//! let signal = Signal::new();
//! let mut file = module.open(&signal)?;
//! let mut out = Vec::new();
//! file.read(Some(&mut out), 64, &signal)?;
//! print!("{}", String::from_utf8_lossy(&out));
//! module.unload();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod config;
pub mod driver;
pub mod error;
pub mod node;
pub mod sync;

pub use config::DriverConfig;
pub use driver::{Cc2500, Cc2500Module, OpenFile};
pub use error::{AttachError, Error, Result};
pub use sync::Signal;
