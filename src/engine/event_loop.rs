//! Long-running driver: one reconciliation pass per relation event batch.
//!
//! A reader task turns lines of input into `RelationsSnapshot` batches and
//! sends them over an mpsc channel. The loop runs a pass for each batch,
//! persists node state and hands the report to the observer. It stops when
//! the input closes or the shutdown future resolves.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collaborators::Collaborators;
use crate::config::SystemConfig;
use crate::error::RmError;
use crate::observer::Observer;
use crate::relation::{Relations, RelationsSnapshot};
use crate::state::{NodeState, StateFile};

use super::{Engine, PassReport};

// ── Input ──────────────────────────────────────────────────────────

/// Forward each non-empty line of `input` as a snapshot batch. Lines that
/// fail to parse are logged and skipped.
pub fn spawn_reader<R>(input: R, tx: mpsc::Sender<RelationsSnapshot>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = input.lines();
        let mut line_no = 0usize;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "reading relation events failed");
                    break;
                }
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match RelationsSnapshot::parse(&line) {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(line = line_no, error = %e, "skipping malformed event batch"),
            }
        }
        tracing::debug!("relation event input closed");
    })
}

// ── Passes ─────────────────────────────────────────────────────────

/// Everything a pass needs besides the engine and the batch itself.
pub struct LoopContext<'a> {
    pub sys_config: &'a SystemConfig,
    pub state_file: &'a StateFile,
    pub collab: Collaborators<'a>,
}

/// Run one pass against persisted state and save the result. State is
/// saved even when a handler failed: earlier handlers' effects stand.
pub fn run_batch(
    engine: &Engine,
    state: &mut NodeState,
    snapshot: RelationsSnapshot,
    ctx: &LoopContext<'_>,
) -> Result<PassReport, RmError> {
    let mut relations = Relations::from_snapshot(snapshot);
    let report = engine.run_pass(state, &mut relations, ctx.sys_config, ctx.collab);
    ctx.state_file.save(state)?;
    Ok(report)
}

/// Drive passes until the batch channel closes or `shutdown` resolves.
/// Returns the state after the last pass and the number of passes run.
pub async fn run_event_loop<S>(
    engine: &Engine,
    ctx: &LoopContext<'_>,
    mut batch_rx: mpsc::Receiver<RelationsSnapshot>,
    observer: &mut dyn Observer,
    shutdown: S,
) -> Result<(NodeState, usize), RmError>
where
    S: Future<Output = ()>,
{
    let mut state = ctx.state_file.load()?;
    let mut passes = 0usize;
    tokio::pin!(shutdown);

    loop {
        let snapshot = tokio::select! {
            batch = batch_rx.recv() => match batch {
                Some(snapshot) => snapshot,
                None => break,
            },
            () = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        };

        passes += 1;
        let report = run_batch(engine, &mut state, snapshot, ctx)?;
        tracing::debug!(pass = passes, fired = ?report.fired, "pass complete");
        observer.on_pass(&report);
    }

    tracing::info!(passes, "event loop finished");
    Ok((state, passes))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_system_config;
    use crate::flags::Flag;
    use crate::handlers;
    use crate::observer::CollectingObserver;
    use crate::testing::Fixture;

    const NAMENODE_LINE: &str = r#"{"namenode":{"units":["namenode/0"],"data":{"namenode/0":{"addresses":["nn1.example"]}}}}"#;

    async fn drive(input: String, state_file: &StateFile) -> (NodeState, usize, CollectingObserver) {
        let config = test_system_config();
        let fixture = Fixture::new();
        let engine = handlers::engine(&config);
        let ctx = LoopContext {
            sys_config: &config,
            state_file,
            collab: fixture.collab(),
        };

        let (tx, rx) = mpsc::channel(8);
        let reader = spawn_reader(std::io::Cursor::new(input.into_bytes()), tx);
        let mut observer = CollectingObserver::default();
        let (state, passes) =
            run_event_loop(&engine, &ctx, rx, &mut observer, std::future::pending())
                .await
                .unwrap();
        reader.await.unwrap();
        (state, passes, observer)
    }

    #[tokio::test]
    async fn one_pass_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path().join("state.json"));
        let input = format!("{{}}\n\n{NAMENODE_LINE}\n");

        let (state, passes, observer) = drive(input, &state_file).await;
        assert_eq!(passes, 2);
        assert_eq!(observer.fired[0], vec!["blocked"]);
        assert!(observer.fired[1].contains(&"install"));
        assert!(state.flags.is_set(Flag::Installed));
        assert!(state_file.load().unwrap().flags.is_set(Flag::Installed));
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path().join("state.json"));
        let input = format!("not json\n{NAMENODE_LINE}\n");

        let (_, passes, observer) = drive(input, &state_file).await;
        assert_eq!(passes, 1);
        assert!(observer.failures.is_empty());
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path().join("state.json"));
        drive(format!("{NAMENODE_LINE}\n"), &state_file).await;

        let (_, _, observer) = drive(format!("{NAMENODE_LINE}\n"), &state_file).await;
        assert!(!observer.fired[0].contains(&"install"));
    }

    #[tokio::test]
    async fn shutdown_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path().join("state.json"));
        let config = test_system_config();
        let fixture = Fixture::new();
        let engine = handlers::engine(&config);
        let ctx = LoopContext {
            sys_config: &config,
            state_file: &state_file,
            collab: fixture.collab(),
        };

        // Sender kept alive: only shutdown can end the loop.
        let (_tx, rx) = mpsc::channel(8);
        let mut observer = CollectingObserver::default();
        let (_, passes) = run_event_loop(&engine, &ctx, rx, &mut observer, async {})
            .await
            .unwrap();
        assert_eq!(passes, 0);
    }

    #[test]
    fn run_batch_saves_state_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path().join("state.json"));
        let config = test_system_config();
        let fixture = Fixture::new();
        fixture.services.fail.set(true);
        let engine = handlers::engine(&config);
        let ctx = LoopContext {
            sys_config: &config,
            state_file: &state_file,
            collab: fixture.collab(),
        };

        let mut snapshot = RelationsSnapshot::parse(NAMENODE_LINE).unwrap();
        let namenode = snapshot.namenode.data.get_mut("namenode/0").unwrap();
        namenode.ready = Some(true);
        let mut state = NodeState::default();
        let report = run_batch(&engine, &mut state, snapshot, &ctx).unwrap();

        assert_eq!(report.failure.unwrap().handler, "start");
        let saved = state_file.load().unwrap();
        assert!(saved.flags.is_set(Flag::Installed));
        assert!(!saved.flags.is_set(Flag::Started));
    }
}
