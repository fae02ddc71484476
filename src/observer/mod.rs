//! Rendering of pass outcomes.
//!
//! The event loop and the one-shot `pass` command hand every `PassReport`
//! to an observer; what reaches stdout depends on `--output`.

pub mod json;
pub mod plain;

use std::io;

use crate::cli::OutputFormat;
use crate::engine::PassReport;

pub trait Observer {
    /// Called once per completed pass, failed or not.
    fn on_pass(&mut self, report: &PassReport);
}

/// Observer writing to stdout in the requested format.
pub fn for_format(format: OutputFormat) -> Box<dyn Observer> {
    match format {
        OutputFormat::Plain => Box::new(plain::PlainObserver::new(io::stdout())),
        OutputFormat::Json => Box::new(json::JsonObserver::new(io::stdout())),
    }
}

/// Keeps every report it sees. Used by loop tests.
#[cfg(test)]
#[derive(Default)]
pub struct CollectingObserver {
    pub fired: Vec<Vec<&'static str>>,
    pub failures: Vec<&'static str>,
}

#[cfg(test)]
impl Observer for CollectingObserver {
    fn on_pass(&mut self, report: &PassReport) {
        self.fired.push(report.fired.clone());
        if let Some(failure) = &report.failure {
            self.failures.push(failure.handler);
        }
    }
}
