//! Load/read/unload against the simulated subsystems

use std::sync::Arc;

use cc2500_core::bus::{BusError, SpiBus};
use cc2500_core::node::{CharDevRegistry, NodeError};
use cc2500_core::{AttachError, Cc2500Module, DriverConfig, Error, Signal};

use crate::{NodeStep, SimNodes, SimSpiBus};

fn setup(controllers: &[u16]) -> (Arc<SimSpiBus>, Arc<SimNodes>) {
    (
        Arc::new(SimSpiBus::with_controllers(controllers)),
        Arc::new(SimNodes::new()),
    )
}

fn load(bus: &Arc<SimSpiBus>, nodes: &Arc<SimNodes>) -> cc2500_core::Result<Cc2500Module> {
    Cc2500Module::load(
        DriverConfig::default(),
        Arc::clone(bus) as Arc<dyn SpiBus>,
        Arc::clone(nodes) as Arc<dyn CharDevRegistry>,
    )
}

fn read_status(module: &Cc2500Module) -> String {
    let signal = Signal::new();
    let mut file = module.open(&signal).unwrap();
    let mut out = Vec::new();
    file.read(Some(&mut out), 1024, &signal).unwrap();
    String::from_utf8(out).unwrap()
}

fn assert_rolled_back(bus: &SimSpiBus, nodes: &SimNodes) {
    assert!(nodes.is_empty(), "device node state left behind");
    assert!(bus.driver_names().is_empty(), "spi driver left registered");
}

#[test]
fn test_load_read_unload() {
    let (bus, nodes) = setup(&[1]);
    let module = load(&bus, &nodes).unwrap();

    assert_eq!(nodes.node_names(), vec!["cc2500".to_string()]);
    assert_eq!(nodes.class_names(), vec!["cc2500".to_string()]);
    assert_eq!(bus.device_names(), vec!["spi1.1".to_string()]);
    assert_eq!(bus.bound_driver("spi1.1").as_deref(), Some("cc2500"));

    let dev = bus.device("spi1.1").unwrap();
    assert_eq!(dev.max_speed_hz(), 1_000_000);
    assert_eq!(dev.bits_per_word(), 8);
    assert_eq!(dev.irq(), None);
    assert_eq!(dev.modalias(), "cc2500");

    assert_eq!(read_status(&module), "cc2500 ready on SPI1.1\n");
    assert!(module.device().buffer_allocated());

    let device = Arc::clone(module.device());
    module.unload();

    assert!(nodes.is_empty());
    assert!(bus.device_names().is_empty());
    assert!(bus.driver_names().is_empty());
    assert!(!device.buffer_allocated());
    assert_eq!(device.bound_device(&Signal::new()).unwrap(), None);
}

#[test]
fn test_read_through_device_node() {
    let (bus, nodes) = setup(&[1]);
    let module = load(&bus, &nodes).unwrap();
    let signal = Signal::new();

    let fops = nodes.lookup("cc2500").unwrap();
    let mut file = fops.open(&signal).unwrap();

    let mut out = [0u8; 64];
    let cap = out.len();
    let n = file.read(Some(&mut out[..]), cap, &signal).unwrap();
    assert_eq!(&out[..n], b"cc2500 ready on SPI1.1\n");
    assert_eq!(file.position(), n as u64);
    assert_eq!(file.read(Some(&mut out[..]), cap, &signal), Ok(0));

    drop(module);
    assert!(nodes.lookup("cc2500").is_none());
}

#[test]
fn test_missing_controller_aborts_load() {
    let (bus, nodes) = setup(&[0]);
    let err = load(&bus, &nodes).unwrap_err();
    assert_eq!(
        err,
        Error::Attach(AttachError::ControllerNotFound { bus_num: 1 })
    );
    assert_rolled_back(&bus, &nodes);
    assert!(nodes.node_names().is_empty());
    assert!(bus.device_names().is_empty());
}

#[test]
fn test_foreign_owner_conflict() {
    let (bus, nodes) = setup(&[1]);
    bus.claim_slot(1, 1, "spidev").unwrap();

    let err = load(&bus, &nodes).unwrap_err();
    assert_eq!(
        err,
        Error::Attach(AttachError::AddressConflict {
            owner: "spidev".into(),
            device: "spi1.1".into(),
        })
    );
    assert_rolled_back(&bus, &nodes);
    assert_eq!(bus.device_names(), vec!["spi1.1".to_string()]);
    assert_eq!(bus.bound_driver("spi1.1").as_deref(), Some("spidev"));
    assert_eq!(bus.controller_refs(1), Some(1));
}

#[test]
fn test_slot_already_ours_is_reused() {
    let (bus, nodes) = setup(&[1]);
    bus.claim_slot(1, 1, "cc2500").unwrap();

    let module = load(&bus, &nodes).unwrap();
    assert_eq!(bus.device_names(), vec!["spi1.1".to_string()]);
    // Bound when the driver registered, before the slot check ran
    assert_eq!(read_status(&module), "cc2500 ready on SPI1.1\n");
}

#[test]
fn test_add_device_failure_rolls_back() {
    let (bus, nodes) = setup(&[1]);
    bus.fail_add_device(-16);

    let err = load(&bus, &nodes).unwrap_err();
    assert_eq!(
        err,
        Error::Attach(AttachError::RegistrationFailed {
            device: "spi1.1".into(),
            source: BusError::Rejected(-16),
        })
    );
    assert_rolled_back(&bus, &nodes);
    assert!(bus.device_names().is_empty());
    // The rejected descriptor and the lookup reference were both released
    assert_eq!(bus.controller_refs(1), Some(1));
}

#[test]
fn test_driver_registration_failure_rolls_back() {
    let (bus, nodes) = setup(&[1]);
    bus.fail_register_driver(-19);

    let err = load(&bus, &nodes).unwrap_err();
    assert_eq!(err, Error::DriverRegistration(BusError::Rejected(-19)));
    assert_rolled_back(&bus, &nodes);
    assert!(bus.device_names().is_empty());
}

#[test]
fn test_each_node_step_rolls_back() {
    for step in [
        NodeStep::AllocRegion,
        NodeStep::CdevAdd,
        NodeStep::ClassCreate,
        NodeStep::DeviceCreate,
    ] {
        let (bus, nodes) = setup(&[1]);
        nodes.fail_at(step, -12);

        let err = load(&bus, &nodes).unwrap_err();
        assert_eq!(err, Error::DeviceNode(NodeError::Rejected(-12)), "{:?}", step);
        assert_rolled_back(&bus, &nodes);
        assert!(bus.device_names().is_empty(), "{:?}", step);
    }
}

#[test]
fn test_invalid_config_rejected_before_any_step() {
    let (bus, nodes) = setup(&[1]);
    let config = DriverConfig {
        buffer_size: 8,
        ..DriverConfig::default()
    };
    let err = Cc2500Module::load(
        config,
        Arc::clone(&bus) as Arc<dyn SpiBus>,
        Arc::clone(&nodes) as Arc<dyn CharDevRegistry>,
    )
    .unwrap_err();
    assert_eq!(err, Error::InvalidArgument);
    assert_rolled_back(&bus, &nodes);
}

#[test]
fn test_unbound_device_reads_absent() {
    let (bus, nodes) = setup(&[1]);
    // Interrupt the probe so the device is added but never bound
    bus.callback_signal().raise();
    let module = load(&bus, &nodes).unwrap();
    bus.callback_signal().clear();

    assert_eq!(bus.bound_driver("spi1.1"), None);
    assert_eq!(read_status(&module), "device reference is absent\n");
}

#[test]
fn test_detach_then_read() {
    let (bus, nodes) = setup(&[1]);
    let module = load(&bus, &nodes).unwrap();

    bus.unregister_device("spi1.1");
    assert_eq!(read_status(&module), "device reference is absent\n");

    module.unload();
    assert!(nodes.is_empty());
}

#[test]
fn test_lost_controller_reads_no_master() {
    let (bus, nodes) = setup(&[1]);
    let module = load(&bus, &nodes).unwrap();

    bus.remove_controller(1);
    assert_eq!(read_status(&module), "device reference has no bus master\n");
}

#[test]
fn test_other_bus_and_chip_select() {
    let (bus, nodes) = setup(&[0, 2]);
    let config = DriverConfig {
        bus_num: 2,
        chip_select: 3,
        ..DriverConfig::default()
    };
    let module = Cc2500Module::load(
        config,
        Arc::clone(&bus) as Arc<dyn SpiBus>,
        Arc::clone(&nodes) as Arc<dyn CharDevRegistry>,
    )
    .unwrap();
    assert_eq!(read_status(&module), "cc2500 ready on SPI2.3\n");
}

#[test]
fn test_concurrent_open_and_read() {
    let (bus, nodes) = setup(&[1]);
    let module = load(&bus, &nodes).unwrap();
    assert!(!module.device().buffer_allocated());

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..20 {
                    assert_eq!(read_status(&module), "cc2500 ready on SPI1.1\n");
                }
            });
        }
    });
    assert!(module.device().buffer_allocated());
    assert_eq!(module.device().buffer_allocations(), 1);
}

#[test]
fn test_open_file_after_unload() {
    let (bus, nodes) = setup(&[1]);
    let module = load(&bus, &nodes).unwrap();
    let signal = Signal::new();

    let mut fresh = module.open(&signal).unwrap();
    let mut done = module.open(&signal).unwrap();
    let mut out = Vec::new();
    done.read(Some(&mut out), 1024, &signal).unwrap();

    let device = Arc::clone(module.device());
    module.unload();
    assert!(!device.buffer_allocated());

    let mut out = Vec::new();
    assert_eq!(fresh.read(Some(&mut out), 1024, &signal), Err(Error::NoDevice));
    assert_eq!(done.read(Some(&mut out), 1024, &signal), Err(Error::NoDevice));
    assert!(out.is_empty());
    let reopened = cc2500_core::node::FileOperations::open(Arc::clone(&device), &signal);
    assert_eq!(reopened.map(|_| ()), Err(Error::NoDevice));

    assert!(!device.buffer_allocated());
    assert_eq!(device.buffer_allocations(), 1);
}

#[test]
fn test_reload_after_unload() {
    let (bus, nodes) = setup(&[1]);
    load(&bus, &nodes).unwrap().unload();
    let module = load(&bus, &nodes).unwrap();
    assert_eq!(read_status(&module), "cc2500 ready on SPI1.1\n");
}
