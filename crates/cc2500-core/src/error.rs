//! Error types for cc2500-core

use thiserror::Error;

use crate::bus::BusError;
use crate::node::NodeError;

/// Kernel-style errno values returned by [`Error::errno`]
pub mod errno {
    /// Interrupted wait, the call should be restarted
    pub const ERESTARTSYS: i32 = 512;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Bad address
    pub const EFAULT: i32 = 14;
    /// Device or resource busy
    pub const EBUSY: i32 = 16;
    /// No such device
    pub const ENODEV: i32 = 19;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
}

/// Failures of the bus attachment step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    /// No controller is registered for the requested bus number
    #[error("spi bus {bus_num} has no controller (is the controller driver loaded?)")]
    ControllerNotFound {
        /// Requested bus number
        bus_num: u16,
    },

    /// Another driver already owns the slot
    #[error("driver [{owner}] already registered for {device}")]
    AddressConflict {
        /// Name of the driver bound to the slot
        owner: String,
        /// Canonical device name of the slot
        device: String,
    },

    /// The bus refused the new device
    #[error("failed to add spi device {device}: {source}")]
    RegistrationFailed {
        /// Canonical device name of the slot
        device: String,
        /// Reason reported by the bus
        #[source]
        source: BusError,
    },
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Bus attachment failed
    #[error(transparent)]
    Attach(#[from] AttachError),

    /// Registering the driver with the bus failed
    #[error("spi driver registration failed: {0}")]
    DriverRegistration(#[source] BusError),

    /// A device-node setup step failed
    #[error("device node setup failed: {0}")]
    DeviceNode(#[from] NodeError),

    /// Status buffer allocation failed
    #[error("out of memory")]
    OutOfMemory,

    /// Caller supplied no destination
    #[error("invalid argument")]
    InvalidArgument,

    /// Copy to the caller's buffer failed
    #[error("bad address")]
    Fault,

    /// A front-end wait was interrupted by a signal
    #[error("interrupted, restart the call")]
    Interrupted,

    /// A bus callback could not take the device lock
    #[error("device busy")]
    Busy,

    /// The driver has been unloaded
    #[error("no such device")]
    NoDevice,
}

impl Error {
    /// Whether the caller may simply retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Busy)
    }

    /// Negative errno for callers that speak the kernel convention
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::Attach(AttachError::ControllerNotFound { .. }) => errno::ENODEV,
            Self::Attach(AttachError::AddressConflict { .. }) => errno::EBUSY,
            Self::Attach(AttachError::RegistrationFailed { source, .. }) => source.errno(),
            Self::DriverRegistration(e) => e.errno(),
            Self::DeviceNode(e) => e.errno(),
            Self::OutOfMemory => errno::ENOMEM,
            Self::InvalidArgument => errno::EINVAL,
            Self::Fault => errno::EFAULT,
            Self::Interrupted => errno::ERESTARTSYS,
            Self::Busy => errno::EBUSY,
            Self::NoDevice => errno::ENODEV,
        };
        -code
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
