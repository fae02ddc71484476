//! Collaborators backed by external commands from `[commands]`.
//!
//! Every invocation is captured in a `CommandLog` under the logs directory,
//! so a failed install can be inspected with `rmflow log --failed`.

use std::path::PathBuf;
use std::process::Command;

use crate::collaborators::{
    AddressDiscovery, Collaborators, Installer, PortControl, ServiceControl, Spec, Status,
    StatusSink, TopologyMap,
};
use crate::config::SystemConfig;
use crate::error::RmError;
use crate::logging::{self, CommandLog};

/// Result of a finished command.
#[derive(Debug)]
pub struct CommandOutcome {
    pub success: bool,
    pub stdout: String,
    /// Exit status and where the output went, for error messages.
    pub summary: String,
}

pub struct CommandRunner {
    logs_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Run `argv` followed by `args`, logging output under `name`.
    pub fn run(&self, name: &str, argv: &[String], args: &[String]) -> Result<CommandOutcome, RmError> {
        let Some((program, base_args)) = argv.split_first() else {
            return Err(RmError::Validation {
                message: format!("no command configured for {name}"),
            });
        };
        tracing::debug!(%name, %program, ?args, "running collaborator command");

        let output = Command::new(program)
            .args(base_args)
            .args(args)
            .output()
            .map_err(|source| RmError::Command {
                command: program.clone(),
                source,
            })?;

        let success = output.status.success();
        let log_path = match CommandLog::create(&self.logs_dir, name) {
            Ok(mut log) => {
                log.write_line(&format!("$ {} {}", argv.join(" "), args.join(" ")));
                log.write_output(&output.stdout, &output.stderr);
                log.write_line(&format!("exit: {}", output.status));
                let path = log.finish(success);
                logging::rotate_logs(&self.logs_dir, name, logging::KEEP_COMMAND_LOGS);
                Some(path)
            }
            Err(e) => {
                tracing::warn!(%name, error = %e, "cannot write command log");
                None
            }
        };

        let summary = match &log_path {
            Some(path) => format!("{}, see {}", output.status, path.display()),
            None => output.status.to_string(),
        };
        if !success {
            tracing::warn!(%name, %summary, "collaborator command failed");
        }
        Ok(CommandOutcome {
            success,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            summary,
        })
    }
}

/// All collaborator traits, implemented with the configured commands.
pub struct SystemCollaborators<'a> {
    config: &'a SystemConfig,
    runner: CommandRunner,
}

impl<'a> SystemCollaborators<'a> {
    pub fn new(config: &'a SystemConfig) -> Self {
        Self {
            config,
            runner: CommandRunner::new(config.logs_dir()),
        }
    }

    pub fn collab(&self) -> Collaborators<'_> {
        Collaborators {
            installer: self,
            discovery: self,
            services: self,
            ports: self,
            status: self,
        }
    }
}

impl AddressDiscovery for SystemCollaborators<'_> {
    fn discover_self_address(&self) -> Result<String, RmError> {
        let outcome = self
            .runner
            .run("discover", &self.config.config.commands.discover, &[])?;
        if !outcome.success {
            return Err(RmError::Resolution {
                message: outcome.summary,
            });
        }
        Ok(outcome.stdout.trim().to_string())
    }
}

impl Installer for SystemCollaborators<'_> {
    fn install(&self, role: &str, topology: &TopologyMap) -> Result<(), RmError> {
        let mut args = vec![role.to_string()];
        args.extend(topology.iter().map(|(role, addr)| format!("{role}={addr}")));
        let outcome = self
            .runner
            .run("install", &self.config.config.commands.install, &args)?;
        if !outcome.success {
            return Err(RmError::Install {
                role: role.to_string(),
                message: outcome.summary,
            });
        }
        Ok(())
    }

    fn spec(&self) -> Spec {
        self.config.spec()
    }
}

impl SystemCollaborators<'_> {
    fn service_command(&self, name: &str, argv: &[String], service: &str) -> Result<(), RmError> {
        let outcome = self.runner.run(name, argv, &[service.to_string()])?;
        if !outcome.success {
            return Err(RmError::Service {
                service: service.to_string(),
                message: outcome.summary,
            });
        }
        Ok(())
    }
}

impl ServiceControl for SystemCollaborators<'_> {
    fn restart(&self, service: &str) -> Result<(), RmError> {
        self.service_command("restart", &self.config.config.commands.restart, service)
    }

    fn ensure_running(&self, service: &str) -> Result<(), RmError> {
        self.service_command(
            "ensure-running",
            &self.config.config.commands.ensure_running,
            service,
        )
    }
}

impl PortControl for SystemCollaborators<'_> {
    fn open_port(&self, port: u16) -> Result<(), RmError> {
        let argv = &self.config.config.commands.open_port;
        if argv.is_empty() {
            tracing::debug!(port, "no open_port command configured, skipping");
            return Ok(());
        }
        let outcome = self.runner.run("open-port", argv, &[format!("{port}/tcp")])?;
        if !outcome.success {
            return Err(RmError::Port {
                port,
                message: outcome.summary,
            });
        }
        Ok(())
    }
}

impl StatusSink for SystemCollaborators<'_> {
    fn set_status(&self, status: &Status) {
        tracing::info!(severity = %status.severity, message = %status.message, "status");
        let argv = &self.config.config.commands.status;
        if argv.is_empty() {
            return;
        }
        let args = [status.severity.as_str().to_string(), status.message.clone()];
        match self.runner.run("status", argv, &args) {
            Ok(outcome) if !outcome.success => {
                tracing::warn!(summary = %outcome.summary, "status command failed");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "status command could not run"),
        }
    }
}
