//! Per-counterparty views over relation membership and published data.
//!
//! A `RelationView` is rebuilt from the transport on every pass. Departing
//! units stay queryable until a handler dismisses them; data staged with
//! `publish` is handed back to the transport once the pass finishes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use facet::Facet;

use crate::error::RmError;

pub type UnitId = String;

/// Counterparty roles this node collaborates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// The namenode providing HDFS.
    Upstream,
    /// Nodemanager workers.
    Workers,
    /// Consumers of the resource manager (plugins, edge nodes).
    Clients,
    /// Benchmark registration endpoint.
    Benchmark,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Upstream, Role::Workers, Role::Clients, Role::Benchmark];

    pub fn name(self) -> &'static str {
        match self {
            Role::Upstream => "namenode",
            Role::Workers => "nodemanager",
            Role::Clients => "clients",
            Role::Benchmark => "benchmark",
        }
    }

    /// Whether `record` carries everything this role must publish before
    /// handlers may act on it.
    pub fn is_complete(self, record: &Record) -> bool {
        match self {
            Role::Upstream => record.addresses.as_ref().is_some_and(|a| !a.is_empty()),
            Role::Workers => record.hostname.is_some() && record.address.is_some(),
            Role::Clients | Role::Benchmark => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Wire records ──────────────────────────────────────────

/// Service, history-http and history-ipc ports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
#[facet(default)]
pub struct Ports {
    pub service: u16,
    pub history_http: Option<u16>,
    pub history_ipc: Option<u16>,
}

/// Fields a unit may publish on a relation. Absent fields have not been
/// published (yet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
#[facet(default)]
pub struct Record {
    /// Namenode first, then resource manager, when sent by this node.
    pub addresses: Option<Vec<String>>,
    pub ports: Option<Ports>,
    pub spec: Option<BTreeMap<String, String>>,
    pub hosts_map: Option<BTreeMap<String, String>>,
    pub ready: Option<bool>,
    pub ssh_key: Option<String>,
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub benchmarks: Option<Vec<String>>,
}

impl Record {
    /// Overlay every field present in `other`; last write wins.
    pub fn overlay(&mut self, other: Record) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(addresses, ports, spec, hosts_map, ready, ssh_key, hostname, address, benchmarks);
    }
}

// ── Transport snapshots ───────────────────────────────────

/// One relation as delivered by the transport for a single event batch.
#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct RelationSnapshot {
    pub units: Vec<UnitId>,
    pub departing: Vec<UnitId>,
    pub data: BTreeMap<UnitId, Record>,
    /// What this node published on the relation previously.
    pub local: Record,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct RelationsSnapshot {
    pub namenode: RelationSnapshot,
    pub nodemanager: RelationSnapshot,
    pub clients: RelationSnapshot,
    pub benchmark: RelationSnapshot,
}

impl RelationsSnapshot {
    pub fn parse(json: &str) -> Result<Self, RmError> {
        facet_json::from_str(json).map_err(|e| RmError::RelationsParse {
            message: e.to_string(),
        })
    }
}

// ── RelationView ──────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RelationView {
    role: Role,
    /// Every tracked unit, departing ones included.
    remote: BTreeSet<UnitId>,
    departing: BTreeSet<UnitId>,
    data: BTreeMap<UnitId, Record>,
    local: Record,
    previously_published: Record,
    dismissed: Vec<UnitId>,
}

impl RelationView {
    pub fn new(role: Role) -> Self {
        Self::from_snapshot(role, RelationSnapshot::default())
    }

    pub fn from_snapshot(role: Role, snapshot: RelationSnapshot) -> Self {
        let departing: BTreeSet<UnitId> = snapshot.departing.into_iter().collect();
        let remote = snapshot
            .units
            .into_iter()
            .chain(departing.iter().cloned())
            .collect();
        Self {
            role,
            remote,
            departing,
            data: snapshot.data,
            previously_published: snapshot.local.clone(),
            local: snapshot.local,
            dismissed: Vec::new(),
        }
    }

    /// At least one unit is tracked, departing or not.
    pub fn is_joined(&self) -> bool {
        !self.remote.is_empty()
    }

    /// Joined units that are not leaving.
    pub fn units(&self) -> impl Iterator<Item = &UnitId> + '_ {
        self.remote.iter().filter(|u| !self.departing.contains(*u))
    }

    pub fn departing(&self) -> impl Iterator<Item = &UnitId> + '_ {
        self.departing.iter()
    }

    pub fn has_departing(&self) -> bool {
        !self.departing.is_empty()
    }

    /// Data a tracked unit has published. `None` means "not yet", including
    /// for units whose record lacks the fields this role requires.
    pub fn data_of(&self, unit: &str) -> Option<&Record> {
        if !self.remote.contains(unit) {
            return None;
        }
        self.data.get(unit).filter(|r| self.role.is_complete(r))
    }

    /// Non-departing units that published their required data.
    pub fn available(&self) -> impl Iterator<Item = (&UnitId, &Record)> + '_ {
        self.units().filter_map(|u| self.data_of(u).map(|r| (u, r)))
    }

    pub fn is_available(&self) -> bool {
        self.available().next().is_some()
    }

    /// Some unit signalled readiness with a spec compatible with ours.
    pub fn is_ready(&self) -> bool {
        self.available().any(|(_, r)| {
            r.ready == Some(true)
                && r.spec
                    .as_ref()
                    .is_none_or(|remote| self.local.spec.as_ref() == Some(remote))
        })
    }

    /// First address published by the first available unit.
    pub fn primary_address(&self) -> Option<&str> {
        self.available()
            .find_map(|(_, r)| r.addresses.as_ref().and_then(|a| a.first()))
            .map(String::as_str)
    }

    /// Stage outbound fields. Retained even while no unit is joined.
    pub fn publish(&mut self, fields: Record) {
        self.local.overlay(fields);
    }

    pub fn local(&self) -> &Record {
        &self.local
    }

    /// Acknowledge a departing unit, dropping it from every tracked set.
    pub fn dismiss(&mut self, unit: &str) {
        let was_departing = self.departing.remove(unit);
        self.remote.remove(unit);
        self.data.remove(unit);
        if was_departing {
            self.dismissed.push(unit.to_string());
        }
    }

    pub fn dismissed(&self) -> &[UnitId] {
        &self.dismissed
    }

    /// Whether this pass changed what we advertise on the relation.
    pub fn outbound_changed(&self) -> bool {
        self.local != self.previously_published
    }
}

/// The four relation views owned by one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Relations {
    pub upstream: RelationView,
    pub workers: RelationView,
    pub clients: RelationView,
    pub benchmark: RelationView,
}

impl Relations {
    pub fn from_snapshot(snapshot: RelationsSnapshot) -> Self {
        Self {
            upstream: RelationView::from_snapshot(Role::Upstream, snapshot.namenode),
            workers: RelationView::from_snapshot(Role::Workers, snapshot.nodemanager),
            clients: RelationView::from_snapshot(Role::Clients, snapshot.clients),
            benchmark: RelationView::from_snapshot(Role::Benchmark, snapshot.benchmark),
        }
    }

    pub fn get(&self, role: Role) -> &RelationView {
        match role {
            Role::Upstream => &self.upstream,
            Role::Workers => &self.workers,
            Role::Clients => &self.clients,
            Role::Benchmark => &self.benchmark,
        }
    }
}

impl Default for Relations {
    fn default() -> Self {
        Self::from_snapshot(RelationsSnapshot::default())
    }
}
