//! SPI bus data types

use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use thiserror::Error;

use crate::error::errno;

bitflags! {
    /// SPI mode word
    ///
    /// Bit layout follows the Linux `spi_device.mode` field so the values
    /// can be handed to a real controller unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiMode: u16 {
        /// Clock phase
        const CPHA       = 1 << 0;
        /// Clock polarity
        const CPOL       = 1 << 1;
        /// Chip select active high
        const CS_HIGH    = 1 << 2;
        /// Least significant bit first
        const LSB_FIRST  = 1 << 3;
        /// Shared SI/SO signal
        const THREE_WIRE = 1 << 4;
        /// Loopback mode
        const LOOP       = 1 << 5;
        /// No chip select line
        const NO_CS      = 1 << 6;
        /// Slave pulls low to pause
        const READY      = 1 << 7;

        /// CPOL=0, CPHA=0
        const MODE_0 = 0;
        /// CPOL=0, CPHA=1
        const MODE_1 = Self::CPHA.bits();
        /// CPOL=1, CPHA=0
        const MODE_2 = Self::CPOL.bits();
        /// CPOL=1, CPHA=1
        const MODE_3 = Self::CPOL.bits() | Self::CPHA.bits();
    }
}

impl Default for SpiMode {
    fn default() -> Self {
        SpiMode::MODE_0
    }
}

impl SpiMode {
    /// Build a mode word from a clock mode number (0-3)
    pub fn from_clock_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::MODE_0),
            1 => Some(Self::MODE_1),
            2 => Some(Self::MODE_2),
            3 => Some(Self::MODE_3),
            _ => None,
        }
    }

    /// Clock mode number (0-3) encoded by the CPOL/CPHA bits
    pub fn clock_mode(&self) -> u8 {
        (self.bits() & (Self::CPOL.bits() | Self::CPHA.bits())) as u8
    }
}

/// Errors reported by the SPI bus subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A device with the same name is already registered
    #[error("device {0} already exists")]
    AlreadyExists(String),

    /// A driver with the same name is already registered
    #[error("driver {0} already registered")]
    DriverExists(String),

    /// The bus rejected the request with a status code
    #[error("bus returned {0}")]
    Rejected(i32),
}

impl BusError {
    /// Positive errno describing the failure
    pub fn errno(&self) -> i32 {
        match self {
            Self::AlreadyExists(_) | Self::DriverExists(_) => errno::EBUSY,
            Self::Rejected(code) if *code < 0 => code.checked_neg().unwrap_or(errno::EIO),
            Self::Rejected(_) => errno::EIO,
        }
    }
}

/// A registered SPI bus controller
///
/// Owned by the bus subsystem. The driver only ever holds a counted
/// reference for the duration of one call.
#[derive(Debug, PartialEq, Eq)]
pub struct SpiController {
    bus_num: u16,
    dev_name: String,
}

impl SpiController {
    /// Create a controller for the given bus number, named `spi<bus_num>`
    pub fn new(bus_num: u16) -> Self {
        Self {
            bus_num,
            dev_name: format!("spi{}", bus_num),
        }
    }

    /// Bus number
    pub fn bus_num(&self) -> u16 {
        self.bus_num
    }

    /// Controller device name
    pub fn dev_name(&self) -> &str {
        &self.dev_name
    }
}

/// Canonical name of the device at `controller.chip_select`, e.g. `spi1.1`
pub fn device_name(controller: &SpiController, chip_select: u8) -> String {
    format!("{}.{}", controller.dev_name(), chip_select)
}

/// Candidate device, not yet registered with the bus
///
/// Holds a reference on its controller. Dropping the descriptor releases
/// it; registering it hands both over to the bus.
#[derive(Debug)]
pub struct SpiDeviceDescriptor {
    controller: Arc<SpiController>,
    /// Chip select line on the controller
    pub chip_select: u8,
    /// Maximum clock speed in Hz
    pub max_speed_hz: u32,
    /// SPI mode word
    pub mode: SpiMode,
    /// Word size in bits
    pub bits_per_word: u8,
    /// Interrupt line, `None` when unused
    pub irq: Option<u32>,
    /// Driver selector, the bus binds the driver of this name
    pub modalias: String,
}

impl SpiDeviceDescriptor {
    /// Allocate a descriptor bound to `controller`
    pub fn new(controller: Arc<SpiController>) -> Self {
        Self {
            controller,
            chip_select: 0,
            max_speed_hz: 0,
            mode: SpiMode::MODE_0,
            bits_per_word: 8,
            irq: None,
            modalias: String::new(),
        }
    }

    /// Controller this descriptor is bound to
    pub fn controller(&self) -> &Arc<SpiController> {
        &self.controller
    }

    /// Canonical name of the slot this descriptor addresses
    pub fn name(&self) -> String {
        device_name(&self.controller, self.chip_select)
    }

    /// Turn the descriptor into a live device
    ///
    /// Called by the bus once registration succeeds. The device keeps only a
    /// weak reference on the controller.
    pub fn into_device(self) -> SpiDevice {
        SpiDevice {
            name: self.name(),
            controller: Arc::downgrade(&self.controller),
            chip_select: self.chip_select,
            max_speed_hz: self.max_speed_hz,
            mode: self.mode,
            bits_per_word: self.bits_per_word,
            irq: self.irq,
            modalias: self.modalias,
        }
    }
}

/// A peripheral registered on the bus
#[derive(Debug)]
pub struct SpiDevice {
    name: String,
    controller: Weak<SpiController>,
    chip_select: u8,
    max_speed_hz: u32,
    mode: SpiMode,
    bits_per_word: u8,
    irq: Option<u32>,
    modalias: String,
}

impl SpiDevice {
    /// Canonical device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The controller, if it is still registered
    pub fn master(&self) -> Option<Arc<SpiController>> {
        self.controller.upgrade()
    }

    /// Chip select line
    pub fn chip_select(&self) -> u8 {
        self.chip_select
    }

    /// Maximum clock speed in Hz
    pub fn max_speed_hz(&self) -> u32 {
        self.max_speed_hz
    }

    /// SPI mode word
    pub fn mode(&self) -> SpiMode {
        self.mode
    }

    /// Word size in bits
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Interrupt line
    pub fn irq(&self) -> Option<u32> {
        self.irq
    }

    /// Driver selector
    pub fn modalias(&self) -> &str {
        &self.modalias
    }
}

impl fmt::Display for SpiDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} Hz, mode {}, {} bits)",
            self.name,
            self.max_speed_hz,
            self.mode.clock_mode(),
            self.bits_per_word
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name() {
        let ctlr = SpiController::new(1);
        assert_eq!(ctlr.dev_name(), "spi1");
        assert_eq!(device_name(&ctlr, 1), "spi1.1");
    }

    #[test]
    fn test_clock_mode_round_trip() {
        for n in 0..4 {
            let mode = SpiMode::from_clock_mode(n).unwrap();
            assert_eq!(mode.clock_mode(), n);
        }
        assert!(SpiMode::from_clock_mode(4).is_none());
        assert_eq!((SpiMode::MODE_3 | SpiMode::CS_HIGH).clock_mode(), 3);
    }

    #[test]
    fn test_descriptor_releases_controller() {
        let ctlr = Arc::new(SpiController::new(0));
        let mut desc = SpiDeviceDescriptor::new(Arc::clone(&ctlr));
        desc.chip_select = 2;
        assert_eq!(Arc::strong_count(&ctlr), 2);

        let dev = desc.into_device();
        assert_eq!(Arc::strong_count(&ctlr), 1);
        assert_eq!(dev.name(), "spi0.2");
        assert_eq!(dev.master().map(|m| m.bus_num()), Some(0));

        drop(ctlr);
        assert!(dev.master().is_none());
    }

    #[test]
    fn test_bus_error_errno() {
        assert_eq!(BusError::Rejected(-22).errno(), errno::EINVAL);
        assert_eq!(BusError::Rejected(0).errno(), errno::EIO);
        assert_eq!(BusError::AlreadyExists("spi1.1".into()).errno(), errno::EBUSY);
    }

    #[test]
    fn test_bus_error_errno_min_code() {
        assert_eq!(BusError::Rejected(i32::MIN).errno(), errno::EIO);
        let err = crate::Error::DriverRegistration(BusError::Rejected(i32::MIN));
        assert_eq!(err.errno(), -errno::EIO);
    }
}
