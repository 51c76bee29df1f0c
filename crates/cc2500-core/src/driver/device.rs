//! The cc2500 driver instance
//!
//! [`Cc2500`] is what the bus binds devices to and what the device node
//! forwards file operations to. It owns the handle store and the front end;
//! the two never lock each other.

use std::sync::Arc;

use super::fops::{FrontEnd, OpenFile, UserBuffer};
use super::store::DeviceHandleStore;
use crate::bus::{SpiDevice, SpiDriver};
use crate::config::DriverConfig;
use crate::error::Result;
use crate::node::FileOperations;
use crate::sync::Signal;

/// Driver instance state shared with the bus and the device node
#[derive(Debug)]
pub struct Cc2500 {
    name: String,
    store: DeviceHandleStore,
    front: FrontEnd,
}

impl Cc2500 {
    /// Create an instance with no device bound and no buffer allocated
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            name: config.name.clone(),
            store: DeviceHandleStore::new(),
            front: FrontEnd::new(config.buffer_size),
        }
    }

    /// Driver name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handle store
    pub fn store(&self) -> &DeviceHandleStore {
        &self.store
    }

    /// Whether the status buffer has been allocated
    pub fn buffer_allocated(&self) -> bool {
        self.front.is_allocated()
    }

    /// Number of status buffers allocated over the instance's lifetime
    pub fn buffer_allocations(&self) -> usize {
        self.front.allocations()
    }

    /// Read the status line at `*offp`, advancing it by the bytes copied
    pub fn read<B: UserBuffer + ?Sized>(
        &self,
        dest: Option<&mut B>,
        count: usize,
        offp: &mut u64,
        signal: &Signal,
    ) -> Result<usize> {
        self.front
            .read(&self.store, &self.name, dest, count, offp, signal)
            .inspect_err(|e| {
                if e.is_retryable() {
                    log::debug!("{}: read interrupted", self.name);
                } else {
                    log::error!("{}: read failed: {}", self.name, e);
                }
            })
    }

    /// Canonical name of the bound device
    pub fn bound_device(&self, signal: &Signal) -> Result<Option<String>> {
        self.store
            .with_handle(signal, |spi| spi.map(|spi| spi.name().to_string()))
    }

    pub(crate) fn release_buffer(&self) -> bool {
        self.front.release()
    }
}

impl SpiDriver for Cc2500 {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self, spi: Arc<SpiDevice>, signal: &Signal) -> Result<()> {
        log::debug!("{}: probe {}", self.name, spi);
        self.store.on_attach(spi, signal).inspect_err(|e| {
            log::error!("{}: probe failed: {}", self.name, e);
        })
    }

    fn remove(&self, spi: &Arc<SpiDevice>, signal: &Signal) -> Result<()> {
        log::debug!("{}: remove {}", self.name, spi.name());
        self.store.on_detach(signal).inspect_err(|e| {
            log::error!("{}: remove failed: {}", self.name, e);
        })
    }
}

impl FileOperations for Cc2500 {
    fn open(self: Arc<Self>, signal: &Signal) -> Result<OpenFile> {
        self.front.open(signal).inspect_err(|e| {
            log::error!("{}: open failed: {}", self.name, e);
        })?;
        Ok(OpenFile::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SpiController, SpiDeviceDescriptor};
    use crate::error::Error;

    fn bound(ctlr: &Arc<SpiController>, cs: u8) -> Arc<SpiDevice> {
        let mut desc = SpiDeviceDescriptor::new(Arc::clone(ctlr));
        desc.chip_select = cs;
        desc.modalias = "cc2500".into();
        Arc::new(desc.into_device())
    }

    #[test]
    fn test_probe_then_read() {
        let ctlr = Arc::new(SpiController::new(1));
        let dev = Arc::new(Cc2500::new(&DriverConfig::default()));
        let signal = Signal::new();

        let mut file = Arc::clone(&dev).open(&signal).unwrap();
        let mut out = Vec::new();
        file.read(Some(&mut out), 128, &signal).unwrap();
        assert_eq!(out, b"device reference is absent\n");

        dev.probe(bound(&ctlr, 1), &signal).unwrap();
        let mut file = Arc::clone(&dev).open(&signal).unwrap();
        let mut out = Vec::new();
        file.read(Some(&mut out), 128, &signal).unwrap();
        assert_eq!(out, b"cc2500 ready on SPI1.1\n");
        assert_eq!(file.read(Some(&mut out), 128, &signal), Ok(0));
        assert_eq!(dev.bound_device(&signal).unwrap().as_deref(), Some("spi1.1"));
    }

    #[test]
    fn test_remove_clears() {
        let ctlr = Arc::new(SpiController::new(1));
        let dev = Arc::new(Cc2500::new(&DriverConfig::default()));
        let signal = Signal::new();
        let spi = bound(&ctlr, 1);

        dev.probe(Arc::clone(&spi), &signal).unwrap();
        dev.remove(&spi, &signal).unwrap();
        assert_eq!(dev.bound_device(&signal).unwrap(), None);
    }

    #[test]
    fn test_interrupted_probe_reports_busy() {
        let ctlr = Arc::new(SpiController::new(1));
        let dev = Cc2500::new(&DriverConfig::default());
        let signal = Signal::new();
        signal.raise();
        assert_eq!(dev.probe(bound(&ctlr, 1), &signal), Err(Error::Busy));
    }

    #[test]
    fn test_read_matches_render_under_concurrency() {
        let ctlr = Arc::new(SpiController::new(1));
        let dev = Arc::new(Cc2500::new(&DriverConfig::default()));
        let spi = bound(&ctlr, 1);

        std::thread::scope(|s| {
            s.spawn(|| {
                let signal = Signal::new();
                for _ in 0..50 {
                    dev.probe(Arc::clone(&spi), &signal).unwrap();
                    dev.remove(&spi, &signal).unwrap();
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    let signal = Signal::new();
                    for _ in 0..50 {
                        let mut file = Arc::clone(&dev).open(&signal).unwrap();
                        let mut out = Vec::new();
                        file.read(Some(&mut out), 1024, &signal).unwrap();
                        assert!(
                            out == b"cc2500 ready on SPI1.1\n"
                                || out == b"device reference is absent\n"
                        );
                    }
                });
            }
        });
    }
}
