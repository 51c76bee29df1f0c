//! cc2500-sim - In-memory bus and device-node subsystems
//!
//! This crate provides simulated implementations of the two subsystems the
//! cc2500 driver plugs into, so the driver can be loaded, read and unloaded
//! without hardware or a kernel.
//!
//! - [`SimSpiBus`] - controllers, devices and modalias-based driver binding
//! - [`SimNodes`] - device numbers, cdevs, classes and named nodes
//!
//! Both support fault injection for exercising load rollback.

#![warn(missing_docs)]

pub mod bus;
pub mod node;

pub use bus::SimSpiBus;
pub use node::{NodeStep, SimNodes};

#[cfg(test)]
mod lifecycle_tests;
