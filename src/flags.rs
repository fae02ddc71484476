//! Progress markers for the resource manager.
//!
//! Flags only ever move forward, with one exception: `Ready` follows worker
//! presence and is cleared when the last nodemanager leaves.

use std::collections::BTreeSet;
use std::fmt;

/// Named progress marker. Each flag is owned by exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// Set by `install` once the installer succeeded.
    Installed,
    /// Set by `start` once the managed services run and ports are open.
    Started,
    /// Set by `advertise-to-workers` while at least one nodemanager is
    /// advertised; cleared by `handle-no-workers` (and by the full advertiser
    /// when its count drops to zero).
    Ready,
}

impl Flag {
    pub const ALL: [Flag; 3] = [Flag::Installed, Flag::Started, Flag::Ready];

    pub fn name(self) -> &'static str {
        match self {
            Flag::Installed => "resourcemanager.installed",
            Flag::Started => "resourcemanager.started",
            Flag::Ready => "resourcemanager.ready",
        }
    }

    pub fn from_name(name: &str) -> Option<Flag> {
        Flag::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagStore {
    set: BTreeSet<Flag>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, flag: Flag) {
        if self.set.insert(flag) {
            tracing::debug!(%flag, "flag set");
        }
    }

    pub fn clear(&mut self, flag: Flag) {
        if self.set.remove(&flag) {
            tracing::debug!(%flag, "flag cleared");
        }
    }

    pub fn is_set(&self, flag: Flag) -> bool {
        self.set.contains(&flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        self.set.iter().copied()
    }

    /// Flag names in stable order, for persistence.
    pub fn names(&self) -> Vec<String> {
        self.set.iter().map(|f| f.name().to_string()).collect()
    }

    /// Rebuild from persisted names; unknown names are skipped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = Self::new();
        for name in names {
            match Flag::from_name(name.as_ref()) {
                Some(flag) => {
                    store.set.insert(flag);
                }
                None => tracing::warn!(name = name.as_ref(), "ignoring unknown flag"),
            }
        }
        store
    }
}
