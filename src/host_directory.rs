//! Hostname → address map of advertised nodemanagers.
//!
//! Each entry remembers the unit that advertised it, so a unit that
//! republishes under a new hostname replaces its old entry, and a departing
//! unit can be removed without its data. Durability comes from
//! `state::StateFile`, which writes the directory in the same atomic
//! document as the flags.

use std::collections::BTreeMap;

use crate::relation::UnitId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostDirectory {
    hosts: BTreeMap<String, String>,
    /// unit → hostname it advertised
    owners: BTreeMap<UnitId, String>,
}

impl HostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted maps. Owners pointing at missing hosts are dropped.
    pub fn from_parts(hosts: BTreeMap<String, String>, owners: BTreeMap<UnitId, String>) -> Self {
        let owners = owners
            .into_iter()
            .filter(|(_, hostname)| hosts.contains_key(hostname))
            .collect();
        Self { hosts, owners }
    }

    /// Record `unit` as `hostname` → `address`, dropping the unit's previous
    /// hostname if it changed.
    pub fn put(&mut self, unit: &str, hostname: &str, address: &str) {
        if let Some(previous) = self.owners.insert(unit.to_string(), hostname.to_string()) {
            if previous != hostname && !self.owners.values().any(|h| *h == previous) {
                self.hosts.remove(&previous);
                tracing::debug!(unit, %previous, hostname, "nodemanager renamed");
            }
        }
        let previous = self.hosts.insert(hostname.to_string(), address.to_string());
        if previous.as_deref() != Some(address) {
            tracing::debug!(unit, hostname, address, "host directory entry recorded");
        }
    }

    /// Remove whatever `unit` advertised. Returns false if it advertised
    /// nothing.
    pub fn remove_unit(&mut self, unit: &str) -> bool {
        let Some(hostname) = self.owners.remove(unit) else {
            return false;
        };
        if !self.owners.values().any(|h| *h == hostname) {
            self.hosts.remove(&hostname);
            tracing::debug!(unit, %hostname, "host directory entry removed");
        }
        true
    }

    /// Unknown hostnames are ignored.
    pub fn remove<'a, I>(&mut self, hostnames: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for hostname in hostnames {
            if self.hosts.remove(hostname).is_some() {
                self.owners.retain(|_, h| *h != hostname);
                tracing::debug!(hostname, "host directory entry removed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.hosts.clone()
    }

    pub fn owners(&self) -> BTreeMap<UnitId, String> {
        self.owners.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overwrites_address() {
        let mut dir = HostDirectory::new();
        dir.put("nm/0", "nm0", "10.0.0.1");
        dir.put("nm/0", "nm0", "10.0.0.9");
        assert_eq!(dir.snapshot()["nm0"], "10.0.0.9");
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut dir = HostDirectory::new();
        dir.put("nm/0", "nm0", "10.0.0.1");
        dir.remove(["nm7"]);
        dir.remove(["nm0", "nm0"]);
        assert!(dir.is_empty());
        assert!(dir.owners().is_empty());
        assert!(!dir.remove_unit("nm/0"));
    }

    #[test]
    fn renamed_unit_replaces_its_entry() {
        let mut dir = HostDirectory::new();
        dir.put("nm/0", "nm0", "10.0.0.1");
        dir.put("nm/1", "nm1", "10.0.0.2");
        dir.put("nm/0", "nm0-new", "10.0.0.1");

        let hosts: Vec<String> = dir.snapshot().into_keys().collect();
        assert_eq!(hosts, vec!["nm0-new", "nm1"]);

        assert!(dir.remove_unit("nm/0"));
        assert_eq!(dir.snapshot().into_keys().collect::<Vec<_>>(), vec!["nm1"]);
    }

    #[test]
    fn from_parts_drops_dangling_owners() {
        let hosts = BTreeMap::from([("nm0".to_string(), "10.0.0.1".to_string())]);
        let owners = BTreeMap::from([
            ("nm/0".to_string(), "nm0".to_string()),
            ("nm/9".to_string(), "gone".to_string()),
        ]);
        let dir = HostDirectory::from_parts(hosts, owners);
        assert_eq!(dir.owners().len(), 1);
    }
}
