//! Status buffer
//!
//! A fixed-capacity text buffer, allocated once on first open and kept until
//! the module is unloaded. Every read renders the current device state into
//! it.

use std::fmt::{self, Write};
use std::sync::Arc;

use crate::bus::SpiDevice;
use crate::error::{Error, Result};

/// Text rendered when no device is bound
pub const STATUS_ABSENT: &str = "device reference is absent\n";

/// Text rendered when the bound device has lost its controller
pub const STATUS_NO_MASTER: &str = "device reference has no bus master\n";

/// Fixed-capacity, NUL-terminated text buffer
#[derive(Debug)]
pub struct StatusBuffer {
    buf: Vec<u8>,
    len: usize,
}

impl StatusBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn alloc(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        buf.resize(capacity, 0);
        Ok(Self { buf, len: 0 })
    }

    /// Total capacity including the terminator
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Render the status line for `spi` and return it
    ///
    /// Output is truncated to `capacity - 1` bytes so the terminator always
    /// fits.
    pub fn render(&mut self, driver_name: &str, spi: Option<&Arc<SpiDevice>>) -> &[u8] {
        let mut w = Truncating {
            buf: &mut self.buf,
            len: 0,
        };
        // Truncating::write_str never fails
        let _ = match spi {
            None => w.write_str(STATUS_ABSENT),
            Some(spi) => match spi.master() {
                None => w.write_str(STATUS_NO_MASTER),
                Some(master) => writeln!(
                    w,
                    "{} ready on SPI{}.{}",
                    driver_name,
                    master.bus_num(),
                    spi.chip_select()
                ),
            },
        };
        let len = w.len;
        if let Some(term) = self.buf.get_mut(len) {
            *term = 0;
        }
        self.len = len;
        self.as_bytes()
    }

    /// Last rendered text, without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Writes into a byte slice, dropping whatever does not fit before the
/// final byte
struct Truncating<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len().saturating_sub(1).saturating_sub(self.len);
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}
