//! Open/read front end
//!
//! Serializes file operations on the status buffer through the front-end
//! semaphore. A read takes its device snapshot from the handle store first
//! and only then takes the front-end semaphore, so the two locks are never
//! held together.
//!
//! Once the buffer is released at unload the front end is closed: files
//! still open on the node get `NoDevice` and nothing is allocated again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::status::StatusBuffer;
use super::store::DeviceHandleStore;
use super::Cc2500;
use crate::error::{Error, Result};
use crate::sync::{Semaphore, Signal};

/// The caller's destination could not be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

/// Destination of a read, the equivalent of a user-space pointer
pub trait UserBuffer {
    /// Copy `src` to the destination
    fn copy_to_user(&mut self, src: &[u8]) -> std::result::Result<(), Fault>;
}

impl UserBuffer for [u8] {
    fn copy_to_user(&mut self, src: &[u8]) -> std::result::Result<(), Fault> {
        let dst = self.get_mut(..src.len()).ok_or(Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserBuffer for Vec<u8> {
    fn copy_to_user(&mut self, src: &[u8]) -> std::result::Result<(), Fault> {
        self.extend_from_slice(src);
        Ok(())
    }
}

/// Status buffer manager and file operation serializer
#[derive(Debug)]
pub struct FrontEnd {
    capacity: usize,
    buffer: Semaphore<Option<StatusBuffer>>,
    // Only changed with `buffer` held
    closed: AtomicBool,
    allocations: AtomicUsize,
}

impl FrontEnd {
    /// Create a front end whose buffer will hold `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Semaphore::new(None),
            closed: AtomicBool::new(false),
            allocations: AtomicUsize::new(0),
        }
    }

    /// Whether the status buffer has been allocated
    pub fn is_allocated(&self) -> bool {
        // Only used for diagnostics; a concurrent holder reads as allocated
        // when it may not be yet.
        self.buffer
            .try_down()
            .map_or(true, |slot| slot.is_some())
    }

    /// Number of status buffers allocated so far
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Acquire)
    }

    /// Whether the buffer was released and the front end shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Open: allocate the status buffer on first use
    pub fn open(&self, signal: &Signal) -> Result<()> {
        let mut slot = self
            .buffer
            .down_interruptible(signal)
            .map_err(|_| Error::Interrupted)?;
        self.ensure_buffer(&mut slot)?;
        Ok(())
    }

    /// Read the status line into `dest`
    ///
    /// Single shot: once `offp` is past zero, reads return end of data.
    pub fn read<B: UserBuffer + ?Sized>(
        &self,
        store: &DeviceHandleStore,
        driver_name: &str,
        dest: Option<&mut B>,
        count: usize,
        offp: &mut u64,
        signal: &Signal,
    ) -> Result<usize> {
        let Some(dest) = dest else {
            log::error!("{}: read with no destination buffer", driver_name);
            return Err(Error::InvalidArgument);
        };

        if self.is_closed() {
            return Err(Error::NoDevice);
        }

        if *offp > 0 {
            return Ok(0);
        }

        let spi = store.snapshot(signal)?;

        let mut slot = self
            .buffer
            .down_interruptible(signal)
            .map_err(|_| Error::Interrupted)?;
        let buf = self.ensure_buffer(&mut slot)?;

        let text = buf.render(driver_name, spi.as_ref());
        let len = count.min(text.len());

        if dest.copy_to_user(&text[..len]).is_err() {
            log::error!("{}: copy to user failed", driver_name);
            return Err(Error::Fault);
        }

        *offp += len as u64;
        Ok(len)
    }

    /// Drop the status buffer and close the front end
    ///
    /// Returns whether a buffer was allocated.
    pub fn release(&self) -> bool {
        // Waits out any in-flight open or read. A fresh signal is never
        // pending, so this cannot fail.
        match self.buffer.down_interruptible(&Signal::new()) {
            Ok(mut slot) => {
                self.closed.store(true, Ordering::Release);
                slot.take().is_some()
            }
            Err(_) => false,
        }
    }

    /// Allocate the buffer in `slot` unless it already exists
    fn ensure_buffer<'a>(
        &self,
        slot: &'a mut Option<StatusBuffer>,
    ) -> Result<&'a mut StatusBuffer> {
        if self.is_closed() {
            return Err(Error::NoDevice);
        }
        if slot.is_none() {
            match StatusBuffer::alloc(self.capacity) {
                Ok(buf) => {
                    self.allocations.fetch_add(1, Ordering::AcqRel);
                    log::debug!("cc2500: allocated {} byte status buffer", self.capacity);
                    *slot = Some(buf);
                }
                Err(e) => {
                    log::error!(
                        "cc2500: failed to allocate {} byte status buffer",
                        self.capacity
                    );
                    return Err(e);
                }
            }
        }
        slot.as_mut().ok_or(Error::OutOfMemory)
    }
}

/// An open file on the status node
pub struct OpenFile {
    device: Arc<Cc2500>,
    pos: u64,
}

impl OpenFile {
    pub(crate) fn new(device: Arc<Cc2500>) -> Self {
        Self { device, pos: 0 }
    }

    /// Current file position
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `count` bytes of status into `dest`
    pub fn read<B: UserBuffer + ?Sized>(
        &mut self,
        dest: Option<&mut B>,
        count: usize,
        signal: &Signal,
    ) -> Result<usize> {
        self.device.read(dest, count, &mut self.pos, signal)
    }
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFile")
            .field("device", &self.device.name())
            .field("pos", &self.pos)
            .finish()
    }
}
