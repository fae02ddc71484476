//! Seams to the world outside the reconciliation core.
//!
//! Handlers only talk to these traits. The binary wires them to external
//! commands (see `system`); tests use in-memory fakes.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::RmError;

/// role name → address
pub type TopologyMap = BTreeMap<String, String>;

/// Install specification shared with counterparties for compatibility checks.
pub type Spec = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Blocked,
    Maintenance,
    Waiting,
    Active,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Blocked => "blocked",
            Severity::Maintenance => "maintenance",
            Severity::Waiting => "waiting",
            Severity::Active => "active",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-visible status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub severity: Severity,
    pub message: String,
}

impl Status {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.severity, self.message)
    }
}

/// Installs a role given the host topology. Must be idempotent.
pub trait Installer {
    fn install(&self, role: &str, topology: &TopologyMap) -> Result<(), RmError>;

    /// Specification of what this installer lays down.
    fn spec(&self) -> Spec;
}

/// Looks up this node's fully-qualified network identity.
pub trait AddressDiscovery {
    fn discover_self_address(&self) -> Result<String, RmError>;
}

pub trait ServiceControl {
    fn restart(&self, service: &str) -> Result<(), RmError>;
    fn ensure_running(&self, service: &str) -> Result<(), RmError>;
}

pub trait PortControl {
    fn open_port(&self, port: u16) -> Result<(), RmError>;
}

pub trait StatusSink {
    fn set_status(&self, status: &Status);
}

/// Everything a pass may call out to, borrowed for its duration.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub installer: &'a dyn Installer,
    pub discovery: &'a dyn AddressDiscovery,
    pub services: &'a dyn ServiceControl,
    pub ports: &'a dyn PortControl,
    pub status: &'a dyn StatusSink,
}
