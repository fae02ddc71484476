//! JSON-lines observer: one object per pass, for machine consumption.

use std::collections::BTreeMap;
use std::io::Write;

use facet::Facet;

use super::Observer;
use crate::engine::PassReport;
use crate::relation::Record;

#[derive(Facet)]
struct StatusJson {
    severity: String,
    message: String,
}

#[derive(Facet)]
struct FailureJson {
    handler: String,
    error: String,
}

#[derive(Facet)]
struct PassJson {
    fired: Vec<String>,
    status: Option<StatusJson>,
    outbound: BTreeMap<String, Record>,
    dismissed: BTreeMap<String, Vec<String>>,
    failure: Option<FailureJson>,
}

impl From<&PassReport> for PassJson {
    fn from(report: &PassReport) -> Self {
        Self {
            fired: report.fired.iter().map(|s| s.to_string()).collect(),
            status: report.status.as_ref().map(|s| StatusJson {
                severity: s.severity.as_str().to_string(),
                message: s.message.clone(),
            }),
            outbound: report
                .outbound
                .iter()
                .map(|(role, record)| (role.name().to_string(), record.clone()))
                .collect(),
            dismissed: report
                .dismissed
                .iter()
                .map(|(role, units)| (role.name().to_string(), units.clone()))
                .collect(),
            failure: report.failure.as_ref().map(|f| FailureJson {
                handler: f.handler.to_string(),
                error: f.error.to_string(),
            }),
        }
    }
}

pub struct JsonObserver<W: Write> {
    out: W,
}

impl<W: Write> JsonObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Observer for JsonObserver<W> {
    fn on_pass(&mut self, report: &PassReport) {
        let line = match facet_json::to_string(&PassJson::from(report)) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialize pass report");
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "writing pass report failed");
        }
    }
}
