//! Durable node state: flags and host directory in one JSON document.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::RmError;
use crate::flags::FlagStore;
use crate::host_directory::HostDirectory;

/// Process-wide state carried across reconciliation passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    pub flags: FlagStore,
    pub hosts: HostDirectory,
}

#[derive(Debug, Default, Facet)]
#[facet(default)]
struct PersistedState {
    flags: Vec<String>,
    hosts: BTreeMap<String, String>,
    /// unit → hostname; absent in files written before owners were tracked
    host_owners: BTreeMap<String, String>,
}

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a node that has never reconciled.
    pub fn load(&self) -> Result<NodeState, RmError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(NodeState::default()),
            Err(e) => {
                return Err(RmError::Io {
                    context: format!("reading {}", self.path.display()),
                    source: e,
                });
            }
        };

        let persisted: PersistedState =
            facet_json::from_str(&contents).map_err(|e| RmError::StateParse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(NodeState {
            flags: FlagStore::from_names(&persisted.flags),
            hosts: HostDirectory::from_parts(persisted.hosts, persisted.host_owners),
        })
    }

    /// Replace the file atomically so flags and hosts never diverge on disk.
    pub fn save(&self, state: &NodeState) -> Result<(), RmError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| RmError::Io {
            context: format!("creating state directory {}", dir.display()),
            source: e,
        })?;

        let persisted = PersistedState {
            flags: state.flags.names(),
            hosts: state.hosts.snapshot(),
            host_owners: state.hosts.owners(),
        };
        let json = facet_json::to_string(&persisted).map_err(|e| RmError::StateParse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RmError::Io {
            context: format!("creating temp file in {}", dir.display()),
            source: e,
        })?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| RmError::Io {
                context: "writing node state".into(),
                source: e,
            })?;
        tmp.persist(&self.path).map_err(|e| RmError::Io {
            context: format!("replacing {}", self.path.display()),
            source: e.error,
        })?;

        tracing::debug!(path = %self.path.display(), "node state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Flag;

    #[test]
    fn missing_file_is_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        assert_eq!(file.load().unwrap(), NodeState::default());
    }

    #[test]
    fn save_then_load_preserves_flags_and_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("nested").join("state.json"));

        let mut state = NodeState::default();
        state.flags.set(Flag::Installed);
        state.flags.set(Flag::Started);
        state.hosts.put("nodemanager/0", "nm0.example", "10.0.0.1");
        file.save(&state).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = StateFile::new(&path).load().unwrap_err();
        assert!(matches!(err, RmError::StateParse { .. }));
    }

    #[test]
    fn file_without_host_owners_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"flags":["resourcemanager.installed"],"hosts":{"nm0.example":"10.0.0.1"}}"#,
        )
        .unwrap();
        let state = StateFile::new(&path).load().unwrap();
        assert!(state.flags.is_set(Flag::Installed));
        assert_eq!(state.hosts.len(), 1);
        assert!(state.hosts.owners().is_empty());
    }
}
