use miette::Diagnostic;
use thiserror::Error;

use crate::collaborators::Severity;

#[derive(Debug, Error, Diagnostic)]
pub enum RmError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse node state from {path}: {message}")]
    StateParse { path: String, message: String },

    #[error("failed to parse relation snapshot: {message}")]
    #[diagnostic(help("a snapshot is one JSON object with namenode/nodemanager/clients/benchmark sections"))]
    RelationsParse { message: String },

    #[error("cannot determine this node's address: {message}")]
    Resolution { message: String },

    #[error("installing {role} failed: {message}")]
    Install { role: String, message: String },

    #[error("service {service} failed: {message}")]
    Service { service: String, message: String },

    #[error("opening port {port} failed: {message}")]
    Port { port: u16, message: String },

    #[error("failed to run {command}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl RmError {
    /// Operator-facing status for a handler that failed with this error.
    pub fn status(&self) -> (Severity, &'static str) {
        match self {
            RmError::Resolution { .. } => (Severity::Waiting, "waiting for resourcemanager fqdn"),
            RmError::Install { .. } => (Severity::Maintenance, "resourcemanager install failed, will retry"),
            RmError::Service { .. } => (Severity::Maintenance, "resourcemanager services not running, will retry"),
            RmError::Port { .. } => (Severity::Maintenance, "opening resourcemanager ports failed, will retry"),
            RmError::Command { .. } => (Severity::Maintenance, "collaborator command unavailable, will retry"),
            _ => (Severity::Blocked, "internal error, see logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_never_leaks_error_text() {
        let err = RmError::Install {
            role: "resourcemanager".into(),
            message: "puppet exited with 4: secret detail".into(),
        };
        let (severity, message) = err.status();
        assert_eq!(severity, Severity::Maintenance);
        assert!(!message.contains("secret"));
    }

    #[test]
    fn resolution_failure_reports_waiting() {
        let err = RmError::Resolution { message: "empty".into() };
        assert_eq!(err.status().0, Severity::Waiting);
    }
}
