//! In-memory device-node subsystem
//!
//! Hands out dynamic major numbers, records cdevs, classes and nodes, and
//! lets callers open a node by name. Any registration step can be made to
//! fail so load rollback can be observed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cc2500_core::node::{CharDevRegistry, ClassId, DevT, FileOperations, NodeError};

/// First dynamically allocated major number
const DYNAMIC_MAJOR_BASE: u32 = 240;

/// A registration step that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeStep {
    /// `alloc_chrdev_region`
    AllocRegion,
    /// `cdev_add`
    CdevAdd,
    /// `class_create`
    ClassCreate,
    /// `device_create`
    DeviceCreate,
}

#[derive(Default)]
struct NodeState {
    next_major: u32,
    next_class: u32,
    regions: BTreeMap<DevT, (u32, String)>,
    cdevs: BTreeMap<DevT, Arc<dyn FileOperations>>,
    classes: BTreeMap<ClassId, String>,
    nodes: BTreeMap<String, (ClassId, DevT)>,
    failures: BTreeMap<NodeStep, i32>,
}

impl NodeState {
    fn check(&self, step: NodeStep) -> Result<(), NodeError> {
        match self.failures.get(&step) {
            Some(&code) => Err(NodeError::Rejected(code)),
            None => Ok(()),
        }
    }
}

/// Simulated device-node subsystem
#[derive(Default)]
pub struct SimNodes {
    state: Mutex<NodeState>,
}

impl SimNodes {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `step` fail with `code`
    pub fn fail_at(&self, step: NodeStep, code: i32) {
        self.state().failures.insert(step, code);
    }

    /// File operations behind the node `name`, as an open(2) would find them
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn FileOperations>> {
        let state = self.state();
        let (_, devt) = state.nodes.get(name)?;
        state.cdevs.get(devt).cloned()
    }

    /// Names of existing nodes
    pub fn node_names(&self) -> Vec<String> {
        self.state().nodes.keys().cloned().collect()
    }

    /// Names of existing classes
    pub fn class_names(&self) -> Vec<String> {
        self.state().classes.values().cloned().collect()
    }

    /// Whether nothing at all is registered
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.regions.is_empty()
            && state.cdevs.is_empty()
            && state.classes.is_empty()
            && state.nodes.is_empty()
    }
}

impl CharDevRegistry for SimNodes {
    fn alloc_chrdev_region(&self, count: u32, name: &str) -> Result<DevT, NodeError> {
        let mut state = self.state();
        state.check(NodeStep::AllocRegion)?;
        if count == 0 {
            return Err(NodeError::Rejected(-22));
        }

        let major = DYNAMIC_MAJOR_BASE
            .checked_add(state.next_major)
            .ok_or(NodeError::RegionExhausted)?;
        state.next_major += 1;

        let devt = DevT::new(major, 0);
        state.regions.insert(devt, (count, name.to_string()));
        log::debug!("sim: allocated {} minor(s) at {} for {}", count, devt, name);
        Ok(devt)
    }

    fn unregister_chrdev_region(&self, devt: DevT, count: u32) {
        match self.state().regions.remove(&devt) {
            Some((n, _)) if n != count => {
                log::warn!("sim: region {} released with count {} (was {})", devt, count, n)
            }
            Some(_) => {}
            None => log::warn!("sim: release of unknown region {}", devt),
        }
    }

    fn cdev_add(&self, devt: DevT, fops: Arc<dyn FileOperations>) -> Result<(), NodeError> {
        let mut state = self.state();
        state.check(NodeStep::CdevAdd)?;
        if !state.regions.contains_key(&devt) {
            return Err(NodeError::Rejected(-22));
        }
        if state.cdevs.contains_key(&devt) {
            return Err(NodeError::AlreadyExists(devt.to_string()));
        }
        state.cdevs.insert(devt, fops);
        Ok(())
    }

    fn cdev_del(&self, devt: DevT) {
        if self.state().cdevs.remove(&devt).is_none() {
            log::warn!("sim: cdev_del of unknown cdev {}", devt);
        }
    }

    fn class_create(&self, name: &str) -> Result<ClassId, NodeError> {
        let mut state = self.state();
        state.check(NodeStep::ClassCreate)?;
        if state.classes.values().any(|c| c == name) {
            return Err(NodeError::AlreadyExists(name.to_string()));
        }
        let class = ClassId(state.next_class);
        state.next_class += 1;
        state.classes.insert(class, name.to_string());
        Ok(class)
    }

    fn class_destroy(&self, class: ClassId) {
        let mut state = self.state();
        if state.classes.remove(&class).is_none() {
            log::warn!("sim: class_destroy of unknown class {:?}", class);
        }
        state.nodes.retain(|_, (c, _)| *c != class);
    }

    fn device_create(&self, class: ClassId, devt: DevT, name: &str) -> Result<(), NodeError> {
        let mut state = self.state();
        state.check(NodeStep::DeviceCreate)?;
        if !state.classes.contains_key(&class) {
            return Err(NodeError::Rejected(-22));
        }
        if state.nodes.contains_key(name) {
            return Err(NodeError::AlreadyExists(name.to_string()));
        }
        state.nodes.insert(name.to_string(), (class, devt));
        log::debug!("sim: created /dev/{} ({})", name, devt);
        Ok(())
    }

    fn device_destroy(&self, class: ClassId, devt: DevT) {
        self.state()
            .nodes
            .retain(|_, (c, d)| !(*c == class && *d == devt));
    }
}
