use std::path::{Path, PathBuf};

/// Default state directory: `~/.local/share/rmflow/`
pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rmflow")
}

/// Flags + host directory document.
pub fn state_file(state_dir: &Path) -> PathBuf {
    state_dir.join("state.json")
}

/// Tracing output and collaborator command logs.
pub fn logs_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("logs")
}

/// Main tracing log file.
pub fn main_log(state_dir: &Path) -> PathBuf {
    logs_dir(state_dir).join("rmflow.log")
}
