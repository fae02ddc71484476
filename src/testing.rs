//! In-memory collaborators and snapshot builders for unit tests.

use std::cell::{Cell, RefCell};

use crate::collaborators::{
    AddressDiscovery, Collaborators, Installer, PortControl, ServiceControl, Spec, Status,
    StatusSink, TopologyMap,
};
use crate::error::RmError;
use crate::relation::{Record, RelationSnapshot};

pub struct FakeDiscovery {
    address: Option<String>,
}

impl FakeDiscovery {
    pub fn new(address: &str) -> Self {
        Self {
            address: Some(address.into()),
        }
    }

    pub fn failing() -> Self {
        Self { address: None }
    }
}

impl AddressDiscovery for FakeDiscovery {
    fn discover_self_address(&self) -> Result<String, RmError> {
        self.address.clone().ok_or_else(|| RmError::Resolution {
            message: "facter exited 1".into(),
        })
    }
}

#[derive(Default)]
pub struct FakeInstaller {
    pub calls: RefCell<Vec<(String, TopologyMap)>>,
    pub fail: Cell<bool>,
}

impl Installer for FakeInstaller {
    fn install(&self, role: &str, topology: &TopologyMap) -> Result<(), RmError> {
        self.calls.borrow_mut().push((role.to_string(), topology.clone()));
        if self.fail.get() {
            return Err(RmError::Install {
                role: role.into(),
                message: "puppet apply exited 4".into(),
            });
        }
        Ok(())
    }

    fn spec(&self) -> Spec {
        test_spec()
    }
}

#[derive(Default)]
pub struct FakeServices {
    pub restarted: RefCell<Vec<String>>,
    pub running: RefCell<Vec<String>>,
    pub fail: Cell<bool>,
}

impl ServiceControl for FakeServices {
    fn restart(&self, service: &str) -> Result<(), RmError> {
        if self.fail.get() {
            return Err(RmError::Service {
                service: service.into(),
                message: "unit entered failed state".into(),
            });
        }
        self.restarted.borrow_mut().push(service.into());
        Ok(())
    }

    fn ensure_running(&self, service: &str) -> Result<(), RmError> {
        self.running.borrow_mut().push(service.into());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePorts {
    pub opened: RefCell<Vec<u16>>,
}

impl PortControl for FakePorts {
    fn open_port(&self, port: u16) -> Result<(), RmError> {
        self.opened.borrow_mut().push(port);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    pub history: RefCell<Vec<Status>>,
}

impl RecordingStatus {
    pub fn messages(&self) -> Vec<String> {
        self.history.borrow().iter().map(|s| s.message.clone()).collect()
    }

    pub fn last(&self) -> Option<Status> {
        self.history.borrow().last().cloned()
    }
}

impl StatusSink for RecordingStatus {
    fn set_status(&self, status: &Status) {
        self.history.borrow_mut().push(status.clone());
    }
}

/// One of each fake, resolving this node to `rm1.example`.
pub struct Fixture {
    pub installer: FakeInstaller,
    pub discovery: FakeDiscovery,
    pub services: FakeServices,
    pub ports: FakePorts,
    pub status: RecordingStatus,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            installer: FakeInstaller::default(),
            discovery: FakeDiscovery::new("rm1.example"),
            services: FakeServices::default(),
            ports: FakePorts::default(),
            status: RecordingStatus::default(),
        }
    }

    pub fn collab(&self) -> Collaborators<'_> {
        Collaborators {
            installer: &self.installer,
            discovery: &self.discovery,
            services: &self.services,
            ports: &self.ports,
            status: &self.status,
        }
    }
}

pub fn test_spec() -> Spec {
    [
        ("vendor".to_string(), "apache".to_string()),
        ("hadoop".to_string(), "2.7.3".to_string()),
    ]
    .into()
}

/// A namenode unit that published its address. When `ready`, it also
/// signals readiness and our previously published spec matches its own.
pub fn namenode(address: &str, ready: bool) -> RelationSnapshot {
    let mut snapshot = RelationSnapshot {
        units: vec!["namenode/0".into()],
        ..Default::default()
    };
    if ready {
        snapshot.local.spec = Some(test_spec());
    }
    snapshot.data.insert(
        "namenode/0".into(),
        Record {
            addresses: Some(vec![address.into()]),
            spec: Some(test_spec()),
            ready: Some(ready),
            ..Default::default()
        },
    );
    snapshot
}

pub fn worker_record(n: usize) -> Record {
    Record {
        hostname: Some(format!("nm{n}.example")),
        address: Some(format!("10.0.0.{n}")),
        ..Default::default()
    }
}

/// Nodemanager relation with units `nodemanager/<n>` for each of `present`
/// (with data) and `departing`.
pub fn workers(present: &[usize], departing: &[usize]) -> RelationSnapshot {
    let mut snapshot = RelationSnapshot::default();
    for &n in present {
        snapshot.units.push(format!("nodemanager/{n}"));
        snapshot.data.insert(format!("nodemanager/{n}"), worker_record(n));
    }
    for &n in departing {
        snapshot.departing.push(format!("nodemanager/{n}"));
        snapshot.data.insert(format!("nodemanager/{n}"), worker_record(n));
    }
    snapshot
}

pub fn units(names: &[&str]) -> RelationSnapshot {
    RelationSnapshot {
        units: names.iter().map(|n| n.to_string()).collect(),
        ..Default::default()
    }
}
