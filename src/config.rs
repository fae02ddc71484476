use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use facet::Facet;

use crate::collaborators::Spec;
use crate::error::RmError;
use crate::paths;

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    /// Where flags, host directory and logs live. Empty means the
    /// per-user default (see `paths::default_state_dir`).
    pub state_dir: String,
    pub spec: BTreeMap<String, String>,
    pub ports: PortsConfig,
    pub services: ServicesConfig,
    pub features: FeaturesConfig,
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct PortsConfig {
    #[facet(default = 8032)]
    pub resourcemanager: u16,
    #[facet(default = 10020)]
    pub jobhistory: u16,
    #[facet(default = 19888)]
    pub jh_webapp_http: u16,
    /// Ports opened to the outside once started.
    pub exposed: Vec<u16>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            resourcemanager: 8032,
            jobhistory: 10020,
            jh_webapp_http: 19888,
            exposed: vec![8088, 19888],
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ServicesConfig {
    #[facet(default = "hadoop-yarn-resourcemanager")]
    pub resourcemanager: String,
    #[facet(default = "hadoop-mapreduce-historyserver")]
    pub historyserver: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            resourcemanager: "hadoop-yarn-resourcemanager".into(),
            historyserver: "hadoop-mapreduce-historyserver".into(),
        }
    }
}

/// Toggles covering the differences between deployments of this role.
#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct FeaturesConfig {
    /// Manage the mapreduce history server and advertise its ports.
    #[facet(default = true)]
    pub history_server: bool,
    /// Track nodemanagers in the host directory and advertise it.
    #[facet(default = true)]
    pub host_directory: bool,
    /// Tell clients whether YARN has capacity (at least one nodemanager).
    #[facet(default = true)]
    pub client_readiness: bool,
    pub benchmarks: Vec<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            history_server: true,
            host_directory: true,
            client_readiness: true,
            benchmarks: ["mrbench", "nnbench", "terasort", "testdfsio"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// External collaborator commands, as argv vectors.
#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct CommandsConfig {
    pub discover: Vec<String>,
    pub install: Vec<String>,
    pub restart: Vec<String>,
    pub ensure_running: Vec<String>,
    pub open_port: Vec<String>,
    pub status: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            discover: argv(&["facter", "fqdn"]),
            install: argv(&["bigtop-install"]),
            restart: argv(&["systemctl", "restart"]),
            ensure_running: argv(&["systemctl", "start"]),
            open_port: argv(&["open-port"]),
            status: Vec::new(),
        }
    }
}

/// Written by `rmflow init`.
pub const DEFAULT_CONFIG: &str = r#"# rmflow configuration
# state_dir = "/var/lib/rmflow"

[spec]
vendor = "apache"
hadoop = "2.7.3"

[ports]
resourcemanager = 8032
jobhistory = 10020
jh_webapp_http = 19888
exposed = [8088, 19888]

[services]
resourcemanager = "hadoop-yarn-resourcemanager"
historyserver = "hadoop-mapreduce-historyserver"

[features]
history_server = true
host_directory = true
client_readiness = true
benchmarks = ["mrbench", "nnbench", "terasort", "testdfsio"]

[commands]
discover = ["facter", "fqdn"]
install = ["bigtop-install"]
restart = ["systemctl", "restart"]
ensure_running = ["systemctl", "start"]
open_port = ["open-port"]
status = []
"#;

// ── SystemConfig ──────────────────────────────────────────

/// Parsed config plus where it came from.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub config_path: PathBuf,
    pub config: Config,
}

impl SystemConfig {
    pub fn state_dir(&self) -> PathBuf {
        if self.config.state_dir.is_empty() {
            paths::default_state_dir()
        } else {
            let dir = PathBuf::from(&self.config.state_dir);
            if dir.is_absolute() {
                dir
            } else {
                self.config_path
                    .parent()
                    .unwrap_or(Path::new("."))
                    .join(dir)
            }
        }
    }

    pub fn state_file(&self) -> PathBuf {
        paths::state_file(&self.state_dir())
    }

    pub fn logs_dir(&self) -> PathBuf {
        paths::logs_dir(&self.state_dir())
    }

    pub fn spec(&self) -> Spec {
        self.config.spec.clone()
    }

    /// Services restarted by `start`, in order.
    pub fn managed_services(&self) -> Vec<&str> {
        let mut services = vec![self.config.services.resourcemanager.as_str()];
        if self.config.features.history_server {
            services.push(self.config.services.historyserver.as_str());
        }
        services
    }
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), RmError> {
    let ports = &config.ports;
    for (name, port) in [
        ("resourcemanager", ports.resourcemanager),
        ("jobhistory", ports.jobhistory),
        ("jh_webapp_http", ports.jh_webapp_http),
    ] {
        if port == 0 {
            return Err(RmError::Validation {
                message: format!("ports.{name} must be non-zero"),
            });
        }
    }
    if ports.exposed.contains(&0) {
        return Err(RmError::Validation {
            message: "ports.exposed must not contain 0".into(),
        });
    }

    if config.services.resourcemanager.is_empty() {
        return Err(RmError::Validation {
            message: "services.resourcemanager must not be empty".into(),
        });
    }
    if config.features.history_server && config.services.historyserver.is_empty() {
        return Err(RmError::Validation {
            message: "services.historyserver must not be empty when history_server is enabled"
                .into(),
        });
    }

    let commands = &config.commands;
    for (name, argv) in [
        ("discover", &commands.discover),
        ("install", &commands.install),
        ("restart", &commands.restart),
        ("ensure_running", &commands.ensure_running),
    ] {
        if argv.first().is_none_or(|c| c.is_empty()) {
            return Err(RmError::Validation {
                message: format!("commands.{name} must name a program"),
            });
        }
    }

    let mut seen = HashSet::new();
    for name in &config.features.benchmarks {
        if name.is_empty() {
            return Err(RmError::Validation {
                message: "benchmark names must not be empty".into(),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(RmError::Validation {
                message: format!("duplicate benchmark '{name}'"),
            });
        }
    }

    Ok(())
}

// ── public API ────────────────────────────────────────────

pub fn parse_config(contents: &str, path: &Path) -> Result<Config, RmError> {
    let config: Config = facet_toml::from_str(contents).map_err(|e| RmError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<SystemConfig, RmError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RmError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config = parse_config(&contents, path)?;

    let canonical = path.canonicalize().map_err(|source| RmError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    Ok(SystemConfig {
        config_path: canonical,
        config,
    })
}

/// Write `DEFAULT_CONFIG` to `path`. Refuses to overwrite unless `force`.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), RmError> {
    if path.exists() && !force {
        return Err(RmError::Validation {
            message: format!("{} already exists (use --force to overwrite)", path.display()),
        });
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(|source| RmError::Io {
        context: format!("writing {}", path.display()),
        source,
    })?;
    tracing::info!(path = %path.display(), "wrote default config");
    Ok(())
}
