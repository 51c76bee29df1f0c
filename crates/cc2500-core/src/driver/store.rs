//! Device handle store
//!
//! Holds the currently bound SPI device, if any. The bus callbacks are the
//! only writers; readers get a snapshot through [`DeviceHandleStore::with_handle`].

use std::sync::Arc;

use crate::bus::SpiDevice;
use crate::error::{Error, Result};
use crate::sync::{Semaphore, Signal};

/// Shared slot for the bound device, guarded by its own semaphore
#[derive(Debug, Default)]
pub struct DeviceHandleStore {
    handle: Semaphore<Option<Arc<SpiDevice>>>,
}

impl DeviceHandleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `spi`, replacing any previous handle
    pub fn on_attach(&self, spi: Arc<SpiDevice>, signal: &Signal) -> Result<()> {
        let mut slot = self.handle.down_interruptible(signal).map_err(|_| Error::Busy)?;
        if let Some(old) = slot.replace(spi) {
            log::debug!("cc2500: replacing bound device {}", old.name());
        }
        Ok(())
    }

    /// Clear the handle
    pub fn on_detach(&self, signal: &Signal) -> Result<()> {
        let mut slot = self.handle.down_interruptible(signal).map_err(|_| Error::Busy)?;
        *slot = None;
        Ok(())
    }

    /// Run `f` with the current handle while holding the store lock
    ///
    /// An interrupted wait surfaces as [`Error::Interrupted`].
    pub fn with_handle<T>(
        &self,
        signal: &Signal,
        f: impl FnOnce(Option<&Arc<SpiDevice>>) -> T,
    ) -> Result<T> {
        let slot = self
            .handle
            .down_interruptible(signal)
            .map_err(|_| Error::Interrupted)?;
        Ok(f(slot.as_ref()))
    }

    /// Clone of the current handle
    pub fn snapshot(&self, signal: &Signal) -> Result<Option<Arc<SpiDevice>>> {
        self.with_handle(signal, |spi| spi.cloned())
    }
}
