//! Plain text observer, one line per fact, no ANSI.

use std::io::Write;

use super::Observer;
use crate::engine::PassReport;

pub struct PlainObserver<W: Write> {
    out: W,
}

impl<W: Write> PlainObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, report: &PassReport) -> std::io::Result<()> {
        if report.fired.is_empty() {
            writeln!(self.out, "fired: (none)")?;
        } else {
            writeln!(self.out, "fired: {}", report.fired.join(", "))?;
        }
        if let Some(status) = &report.status {
            writeln!(self.out, "status: {status}")?;
        }
        for (role, record) in &report.outbound {
            match facet_json::to_string(record) {
                Ok(json) => writeln!(self.out, "publish {role}: {json}")?,
                Err(e) => tracing::warn!(%role, error = %e, "cannot render outbound record"),
            }
        }
        for (role, units) in &report.dismissed {
            writeln!(self.out, "dismissed {role}: {}", units.join(", "))?;
        }
        if let Some(failure) = &report.failure {
            writeln!(self.out, "failed: {}: {}", failure.handler, failure.error)?;
        }
        self.out.flush()
    }
}

impl<W: Write> Observer for PlainObserver<W> {
    fn on_pass(&mut self, report: &PassReport) {
        if let Err(e) = self.render(report) {
            tracing::warn!(error = %e, "writing pass report failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::collaborators::{Severity, Status};
    use crate::engine::PassFailure;
    use crate::error::RmError;
    use crate::relation::{Record, Role};

    fn render(report: &PassReport) -> String {
        let mut observer = PlainObserver::new(Vec::new());
        observer.on_pass(report);
        String::from_utf8(observer.into_inner()).unwrap()
    }

    #[test]
    fn renders_fired_status_and_dismissals() {
        let report = PassReport {
            fired: vec!["handle-worker-departure", "handle-no-workers"],
            status: Some(Status::new(Severity::Active, "degraded, no nodemanager")),
            dismissed: BTreeMap::from([(Role::Workers, vec!["nodemanager/0".to_string()])]),
            ..Default::default()
        };
        let out = render(&report);
        assert!(out.contains("fired: handle-worker-departure, handle-no-workers\n"));
        assert!(out.contains("status: active (degraded, no nodemanager)\n"));
        assert!(out.contains("dismissed nodemanager: nodemanager/0\n"));
    }

    #[test]
    fn renders_outbound_as_json() {
        let report = PassReport {
            outbound: BTreeMap::from([(
                Role::Clients,
                Record {
                    ready: Some(true),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let out = render(&report);
        assert!(out.contains("fired: (none)"));
        assert!(out.contains("publish clients: {"));
        assert!(out.contains("\"ready\""));
    }

    #[test]
    fn renders_failure() {
        let report = PassReport {
            failure: Some(PassFailure {
                handler: "install",
                status: Status::new(Severity::Maintenance, "resourcemanager install failed, will retry"),
                error: RmError::Install {
                    role: "resourcemanager".into(),
                    message: "exit status 4".into(),
                },
            }),
            ..Default::default()
        };
        assert!(render(&report).contains("failed: install: "));
    }
}
