use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing_subscriber::fmt::MakeWriter;

/// Completed command logs kept per command name.
pub const KEEP_COMMAND_LOGS: usize = 10;

// ── Deferred file layer ──────────────────────────────────

/// `MakeWriter` for the file tracing layer. Discards everything until
/// `activate` is called; the subscriber is installed before the config
/// (and so the state directory) is known.
#[derive(Clone, Default)]
pub struct DeferredFileWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl DeferredFileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start appending to `path`, creating parent directories.
    pub fn activate(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *lock(&self.file) = Some(file);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        lock(&self.file).is_some()
    }
}

fn lock(file: &Mutex<Option<File>>) -> MutexGuard<'_, Option<File>> {
    // A panic mid-write leaves at worst a torn log line.
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DeferredWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for DeferredWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match lock(&self.file).as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match lock(&self.file).as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DeferredFileWriter {
    type Writer = DeferredWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredWriter {
            file: self.file.clone(),
        }
    }
}

// ── Command logs ─────────────────────────────────────────

/// Output of one collaborator command.
///
/// Written to `<timestamp>_<name>_running.log`, renamed to `_ok.log` or
/// `_failed.log` by `finish`.
pub struct CommandLog {
    file: File,
    path: PathBuf,
}

impl CommandLog {
    pub fn create(logs_dir: &Path, name: &str) -> std::io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(format!("{}_{name}_running.log", utc_timestamp()));
        let file = File::create(&path)?;
        Ok(Self { file, path })
    }

    pub fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.file, "{line}") {
            tracing::debug!(path = %self.path.display(), error = %e, "command log write failed");
        }
    }

    /// Append captured output, stdout first.
    pub fn write_output(&mut self, stdout: &[u8], stderr: &[u8]) {
        for line in String::from_utf8_lossy(stdout).lines() {
            self.write_line(line);
        }
        for line in String::from_utf8_lossy(stderr).lines() {
            self.write_line(&format!("stderr: {line}"));
        }
    }

    pub fn finish(self, success: bool) -> PathBuf {
        let status = if success { "ok" } else { "failed" };
        let Some(name) = self.path.file_name().and_then(|f| f.to_str()) else {
            return self.path;
        };
        let done = self
            .path
            .with_file_name(name.replace("_running.log", &format!("_{status}.log")));
        match fs::rename(&self.path, &done) {
            Ok(()) => done,
            Err(_) => self.path,
        }
    }
}

/// Drop the oldest completed logs for `name`, keeping `keep`.
pub fn rotate_logs(logs_dir: &Path, name: &str, keep: usize) {
    let mut finished: Vec<PathBuf> = list_command_logs(logs_dir)
        .into_iter()
        .filter(|e| e.name == name)
        .map(|e| e.path)
        .collect();
    finished.sort();
    let excess = finished.len().saturating_sub(keep);
    for old in &finished[..excess] {
        if let Err(e) = fs::remove_file(old) {
            tracing::debug!(path = %old.display(), error = %e, "log rotation failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLogEntry {
    pub path: PathBuf,
    pub timestamp: String,
    pub name: String,
    pub status: String,
}

impl CommandLogEntry {
    /// `<timestamp>_<name>_<status>.log`; running logs are skipped.
    fn parse(path: PathBuf) -> Option<Self> {
        let stem = path.file_name()?.to_str()?.strip_suffix(".log")?;
        let (timestamp, rest) = stem.split_once('_')?;
        let (name, status) = rest.rsplit_once('_')?;
        if status == "running" || name.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: timestamp.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            path,
        })
    }

    pub fn failed(&self) -> bool {
        self.status == "failed"
    }
}

/// Completed command logs, oldest first.
pub fn list_command_logs(logs_dir: &Path) -> Vec<CommandLogEntry> {
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return Vec::new();
    };
    let mut logs: Vec<CommandLogEntry> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| CommandLogEntry::parse(e.path()))
        .collect();
    logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    logs
}

pub fn latest_command_log(logs_dir: &Path, failed_only: bool) -> Option<CommandLogEntry> {
    list_command_logs(logs_dir)
        .into_iter()
        .rev()
        .find(|e| !failed_only || e.failed())
}

// ── Timestamps ───────────────────────────────────────────

/// Current UTC time as `YYYY-MM-DDTHH-MM-SS`, safe in file names.
pub fn utc_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_timestamp(secs)
}

fn format_timestamp(secs: u64) -> String {
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    let tod = secs % 86_400;
    format!(
        "{y:04}-{m:02}-{d:02}T{:02}-{:02}-{:02}",
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    )
}

/// Howard Hinnant's days-to-civil conversion.
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + i64::from(m <= 2);
    (y, m, d)
}
