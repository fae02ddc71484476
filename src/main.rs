use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use clap::Parser;
use facet::Facet;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rmflow::cli::{Cli, Command, OutputFormat};
use rmflow::config::{self, SystemConfig};
use rmflow::engine::event_loop::{self, LoopContext};
use rmflow::error::RmError;
use rmflow::handlers;
use rmflow::logging;
use rmflow::observer;
use rmflow::relation::RelationsSnapshot;
use rmflow::state::StateFile;
use rmflow::system::SystemCollaborators;

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let terminal_filter = if cli.verbose {
        EnvFilter::new("rmflow=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rmflow=info"))
    };
    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    // File layer: always rmflow=debug, discarded until the state dir is known.
    let file_writer = logging::DeferredFileWriter::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer.clone())
        .with_filter(EnvFilter::new("rmflow=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    // Init runs before config loading; it creates the config.
    if let Command::Init { force } = cli.command {
        config::write_default_config(&cli.config, force)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    let sys_config = config::load_config(&cli.config)?;

    if matches!(cli.command, Command::Pass { .. } | Command::Serve) {
        let log_path = rmflow::paths::main_log(&sys_config.state_dir());
        if let Err(e) = file_writer.activate(&log_path) {
            tracing::warn!(path = %log_path.display(), error = %e, "file logging disabled");
        }
    }

    match cli.command {
        Command::Init { .. } => unreachable!(),
        Command::Pass { relations } => {
            let ok = run_pass(&sys_config, &relations, cli.output)?;
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Serve => {
            run_serve(&sys_config, cli.output).await?;
            // The stdin reader may still be parked in a blocking read.
            std::process::exit(0);
        }
        Command::Status => print_status(&sys_config, cli.output)?,
        Command::Log { failed } => print_log(&sys_config.logs_dir(), failed)?,
    }

    Ok(())
}

fn read_relations(path: &Path) -> Result<RelationsSnapshot, RmError> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| RmError::Io {
                context: "reading relation snapshot from stdin".into(),
                source,
            })?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|source| RmError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?
    };
    RelationsSnapshot::parse(&contents)
}

/// One pass over a snapshot. Returns whether the pass completed.
fn run_pass(sys_config: &SystemConfig, relations: &Path, format: OutputFormat) -> Result<bool, RmError> {
    let snapshot = read_relations(relations)?;
    let state_file = StateFile::new(sys_config.state_file());
    let mut state = state_file.load()?;

    let system = SystemCollaborators::new(sys_config);
    let ctx = LoopContext {
        sys_config,
        state_file: &state_file,
        collab: system.collab(),
    };
    let engine = handlers::engine(sys_config);
    let report = event_loop::run_batch(&engine, &mut state, snapshot, &ctx)?;

    observer::for_format(format).on_pass(&report);
    Ok(report.is_ok())
}

async fn run_serve(sys_config: &SystemConfig, format: OutputFormat) -> Result<(), RmError> {
    let state_file = StateFile::new(sys_config.state_file());
    let system = SystemCollaborators::new(sys_config);
    let ctx = LoopContext {
        sys_config,
        state_file: &state_file,
        collab: system.collab(),
    };
    let engine = handlers::engine(sys_config);

    let (tx, rx) = mpsc::channel(16);
    let _reader = event_loop::spawn_reader(BufReader::new(tokio::io::stdin()), tx);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    tracing::info!(state = %state_file.path().display(), "serving relation events from stdin");
    let mut observer = observer::for_format(format);
    let (state, passes) =
        event_loop::run_event_loop(&engine, &ctx, rx, observer.as_mut(), shutdown).await?;
    tracing::info!(passes, flags = ?state.flags.names(), "stopped");
    Ok(())
}

#[derive(Facet)]
struct StatusJson {
    state_file: String,
    flags: Vec<String>,
    hosts: BTreeMap<String, String>,
}

fn print_status(sys_config: &SystemConfig, format: OutputFormat) -> Result<(), RmError> {
    let state_file = StateFile::new(sys_config.state_file());
    let state = state_file.load()?;

    if format == OutputFormat::Json {
        let json = facet_json::to_string(&StatusJson {
            state_file: state_file.path().display().to_string(),
            flags: state.flags.names(),
            hosts: state.hosts.snapshot(),
        })
        .map_err(|e| RmError::StateParse {
            path: state_file.path().display().to_string(),
            message: e.to_string(),
        })?;
        println!("{json}");
        return Ok(());
    }

    println!("state: {}", state_file.path().display());
    let flags = state.flags.names();
    if flags.is_empty() {
        println!("flags: (none)");
    } else {
        println!("flags: {}", flags.join(", "));
    }
    if state.hosts.is_empty() {
        println!("hosts: (none)");
    } else {
        println!("hosts:");
        for (hostname, address) in state.hosts.snapshot() {
            println!("  {hostname} {address}");
        }
    }
    Ok(())
}

fn print_log(logs_dir: &Path, failed: bool) -> Result<(), RmError> {
    let Some(entry) = logging::latest_command_log(logs_dir, failed) else {
        if failed {
            println!("No failed command logs found.");
        } else {
            println!("No command logs found.");
        }
        return Ok(());
    };
    let contents = std::fs::read_to_string(&entry.path).map_err(|source| RmError::Io {
        context: format!("reading {}", entry.path.display()),
        source,
    })?;
    println!("==> {} ({}, {})", entry.name, entry.status, entry.timestamp);
    print!("{contents}");
    Ok(())
}
