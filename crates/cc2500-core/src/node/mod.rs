//! Character device node subsystem contract
//!
//! The driver requests a device number range, adds a cdev forwarding file
//! operations into the driver, and creates one class plus one device node
//! under its name. Path and node creation mechanics belong to the
//! implementation behind [`CharDevRegistry`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::driver::OpenFile;
use crate::error::{errno, Result};
use crate::sync::Signal;

/// Device number (major, minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevT {
    /// Major number
    pub major: u32,
    /// Minor number
    pub minor: u32,
}

impl DevT {
    /// Create a device number
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DevT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Handle for a created device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Errors reported by the device-node subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// No free device numbers
    #[error("no free device numbers")]
    RegionExhausted,

    /// A class or node with the same name already exists
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The subsystem rejected the request with a status code
    #[error("device node subsystem returned {0}")]
    Rejected(i32),
}

impl NodeError {
    /// Positive errno describing the failure
    pub fn errno(&self) -> i32 {
        match self {
            Self::RegionExhausted => errno::EBUSY,
            Self::AlreadyExists(_) => errno::EBUSY,
            Self::Rejected(code) if *code < 0 => code.checked_neg().unwrap_or(errno::EIO),
            Self::Rejected(_) => errno::EIO,
        }
    }
}

/// File operations a cdev forwards into its driver
pub trait FileOperations: Send + Sync {
    /// Open the node, returning a file positioned at offset zero
    fn open(self: Arc<Self>, signal: &Signal) -> Result<OpenFile>;
}

/// The device-node subsystem
pub trait CharDevRegistry: Send + Sync {
    /// Allocate `count` device numbers under `name`
    fn alloc_chrdev_region(&self, count: u32, name: &str)
        -> std::result::Result<DevT, NodeError>;

    /// Release a device number range
    fn unregister_chrdev_region(&self, devt: DevT, count: u32);

    /// Make `devt` live, forwarding opens to `fops`
    fn cdev_add(
        &self,
        devt: DevT,
        fops: Arc<dyn FileOperations>,
    ) -> std::result::Result<(), NodeError>;

    /// Remove the cdev for `devt`
    fn cdev_del(&self, devt: DevT);

    /// Create a device class
    fn class_create(&self, name: &str) -> std::result::Result<ClassId, NodeError>;

    /// Destroy a device class
    fn class_destroy(&self, class: ClassId);

    /// Create the externally visible node `name` for `devt` in `class`
    fn device_create(
        &self,
        class: ClassId,
        devt: DevT,
        name: &str,
    ) -> std::result::Result<(), NodeError>;

    /// Destroy the node for `devt` in `class`
    fn device_destroy(&self, class: ClassId, devt: DevT);
}
