//! Flag-gated reconciliation engine.
//!
//! A pass walks an ordered table of `Rule`s. Each rule's guard is a
//! conjunction of flag and relation conditions, evaluated against the state
//! as left by the rules that ran before it in the same pass. A rule fires at
//! most once per pass; after a sweep the engine sweeps again for rules whose
//! guards were switched on by later rules, until nothing new fires.
//!
//! A failing rule is rolled back to the checkpoint taken before it ran, its
//! error is turned into an operator status, and the pass stops. The next
//! event batch retries from the same flags.

pub mod event_loop;

use std::collections::BTreeMap;
use std::fmt;

use crate::collaborators::{Collaborators, Severity, Status};
use crate::config::SystemConfig;
use crate::error::RmError;
use crate::flags::Flag;
use crate::relation::{Record, Relations, Role, UnitId};
use crate::state::NodeState;

// ── Guards ──────────────────────────────────────────────────────────

/// Primitive guard condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    FlagSet(Flag),
    FlagUnset(Flag),
    /// At least one unit of the role is tracked.
    Joined(Role),
    NotJoined(Role),
    /// Some unit of the role is leaving and not yet dismissed.
    Departing(Role),
    /// Some non-departing unit published the data the role requires.
    Available(Role),
    /// No non-departing unit has published the required data, joined or not.
    Unavailable(Role),
    /// The counterparty signalled readiness with a compatible spec.
    Ready(Role),
    NotReady(Role),
}

impl Condition {
    pub fn holds(&self, state: &NodeState, relations: &Relations) -> bool {
        match *self {
            Condition::FlagSet(flag) => state.flags.is_set(flag),
            Condition::FlagUnset(flag) => !state.flags.is_set(flag),
            Condition::Joined(role) => relations.get(role).is_joined(),
            Condition::NotJoined(role) => !relations.get(role).is_joined(),
            Condition::Departing(role) => relations.get(role).has_departing(),
            Condition::Available(role) => relations.get(role).is_available(),
            Condition::Unavailable(role) => !relations.get(role).is_available(),
            Condition::Ready(role) => relations.get(role).is_ready(),
            Condition::NotReady(role) => !relations.get(role).is_ready(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::FlagSet(flag) => write!(f, "{flag}"),
            Condition::FlagUnset(flag) => write!(f, "!{flag}"),
            Condition::Joined(role) => write!(f, "{role}.joined"),
            Condition::NotJoined(role) => write!(f, "!{role}.joined"),
            Condition::Departing(role) => write!(f, "{role}.departing"),
            Condition::Available(role) => write!(f, "{role}.available"),
            Condition::Unavailable(role) => write!(f, "!{role}.available"),
            Condition::Ready(role) => write!(f, "{role}.ready"),
            Condition::NotReady(role) => write!(f, "!{role}.ready"),
        }
    }
}

/// Conjunction of conditions. An empty guard always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    conditions: Vec<Condition>,
}

impl Guard {
    pub fn all(conditions: impl Into<Vec<Condition>>) -> Self {
        Self {
            conditions: conditions.into(),
        }
    }

    pub fn holds(&self, state: &NodeState, relations: &Relations) -> bool {
        self.conditions.iter().all(|c| c.holds(state, relations))
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join(" & "))
    }
}

// ── Rules ───────────────────────────────────────────────────────────

pub type Action = fn(&mut PassContext<'_>) -> Result<(), RmError>;

pub struct Rule {
    pub name: &'static str,
    pub guard: Guard,
    pub action: Action,
}

impl Rule {
    pub fn new(name: &'static str, guard: Guard, action: Action) -> Self {
        Self {
            name,
            guard,
            action,
        }
    }
}

/// What a handler sees while it runs.
pub struct PassContext<'a> {
    pub state: &'a mut NodeState,
    pub relations: &'a mut Relations,
    pub config: &'a SystemConfig,
    pub collab: Collaborators<'a>,
    status: Option<Status>,
}

impl PassContext<'_> {
    pub fn set_status(&mut self, severity: Severity, message: impl Into<String>) {
        let status = Status::new(severity, message);
        self.collab.status.set_status(&status);
        self.status = Some(status);
    }
}

// ── Reports ─────────────────────────────────────────────────────────

/// The handler that stopped a pass and what the operator was told.
#[derive(Debug)]
pub struct PassFailure {
    pub handler: &'static str,
    pub status: Status,
    pub error: RmError,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct PassReport {
    pub fired: Vec<&'static str>,
    pub status: Option<Status>,
    /// Records to hand to the transport, for relations whose advertised
    /// data changed.
    pub outbound: BTreeMap<Role, Record>,
    pub dismissed: BTreeMap<Role, Vec<UnitId>>,
    pub failure: Option<PassFailure>,
}

impl PassReport {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn fired(&self, name: &str) -> bool {
        self.fired.iter().any(|f| *f == name)
    }
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct Engine {
    rules: Vec<Rule>,
}

impl Engine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Run one reconciliation pass over `state` and `relations`.
    ///
    /// `state` is left as the last successful handler wrote it, whether or
    /// not the pass failed; callers persist it either way.
    pub fn run_pass(
        &self,
        state: &mut NodeState,
        relations: &mut Relations,
        config: &SystemConfig,
        collab: Collaborators<'_>,
    ) -> PassReport {
        let mut ctx = PassContext {
            state,
            relations,
            config,
            collab,
            status: None,
        };
        let mut fired = Vec::new();
        let mut done = vec![false; self.rules.len()];
        let mut failure = None;

        'sweeps: loop {
            let mut progressed = false;
            for (idx, rule) in self.rules.iter().enumerate() {
                if done[idx] {
                    continue;
                }
                if !rule.guard.holds(ctx.state, ctx.relations) {
                    tracing::debug!(handler = rule.name, guard = %rule.guard, "guard not satisfied");
                    continue;
                }

                done[idx] = true;
                progressed = true;
                tracing::info!(handler = rule.name, "handler firing");

                let checkpoint = (ctx.state.clone(), ctx.relations.clone());
                if let Err(error) = (rule.action)(&mut ctx) {
                    *ctx.state = checkpoint.0;
                    *ctx.relations = checkpoint.1;
                    let (severity, message) = error.status();
                    ctx.set_status(severity, message);
                    tracing::error!(handler = rule.name, %error, "handler failed, pass aborted");
                    failure = Some(PassFailure {
                        handler: rule.name,
                        status: Status::new(severity, message),
                        error,
                    });
                    break 'sweeps;
                }
                fired.push(rule.name);
            }
            if !progressed {
                break;
            }
        }

        let mut outbound = BTreeMap::new();
        let mut dismissed = BTreeMap::new();
        for role in Role::ALL {
            let view = ctx.relations.get(role);
            if view.outbound_changed() {
                outbound.insert(role, view.local().clone());
            }
            if !view.dismissed().is_empty() {
                dismissed.insert(role, view.dismissed().to_vec());
            }
        }

        PassReport {
            fired,
            status: ctx.status,
            outbound,
            dismissed,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_system_config;
    use crate::relation::{RelationSnapshot, RelationsSnapshot};
    use crate::testing::Fixture;

    fn set_installed(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
        ctx.state.flags.set(Flag::Installed);
        Ok(())
    }

    fn set_started(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
        ctx.state.flags.set(Flag::Started);
        ctx.set_status(Severity::Active, "ready");
        Ok(())
    }

    fn fail_after_mutating(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
        ctx.state.flags.set(Flag::Ready);
        ctx.relations.clients.publish(Record {
            ready: Some(true),
            ..Default::default()
        });
        Err(RmError::Install {
            role: "resourcemanager".into(),
            message: "boom".into(),
        })
    }

    fn run(engine: &Engine, state: &mut NodeState, relations: &mut Relations) -> PassReport {
        let fixture = Fixture::new();
        let config = test_system_config();
        engine.run_pass(state, relations, &config, fixture.collab())
    }

    #[test]
    fn later_rules_observe_earlier_effects() {
        let engine = Engine::new(vec![
            Rule::new("install", Guard::all([Condition::FlagUnset(Flag::Installed)]), set_installed),
            Rule::new(
                "start",
                Guard::all([Condition::FlagSet(Flag::Installed), Condition::FlagUnset(Flag::Started)]),
                set_started,
            ),
        ]);
        let mut state = NodeState::default();
        let report = run(&engine, &mut state, &mut Relations::default());
        assert_eq!(report.fired, vec!["install", "start"]);
        assert!(state.flags.is_set(Flag::Started));
        assert_eq!(report.status.unwrap().message, "ready");
    }

    #[test]
    fn earlier_rule_rearms_in_next_sweep() {
        let engine = Engine::new(vec![
            Rule::new(
                "start",
                Guard::all([Condition::FlagSet(Flag::Installed), Condition::FlagUnset(Flag::Started)]),
                set_started,
            ),
            Rule::new("install", Guard::all([Condition::FlagUnset(Flag::Installed)]), set_installed),
        ]);
        let mut state = NodeState::default();
        let report = run(&engine, &mut state, &mut Relations::default());
        assert_eq!(report.fired, vec!["install", "start"]);
    }

    #[test]
    fn each_rule_fires_at_most_once_per_pass() {
        let engine = Engine::new(vec![Rule::new("always", Guard::default(), set_installed)]);
        let mut state = NodeState::default();
        let report = run(&engine, &mut state, &mut Relations::default());
        assert_eq!(report.fired, vec!["always"]);
    }

    #[test]
    fn failed_rule_is_rolled_back_and_stops_pass() {
        let engine = Engine::new(vec![
            Rule::new("install", Guard::all([Condition::FlagUnset(Flag::Installed)]), set_installed),
            Rule::new("explode", Guard::default(), fail_after_mutating),
            Rule::new("start", Guard::all([Condition::FlagSet(Flag::Installed)]), set_started),
        ]);
        let mut state = NodeState::default();
        let report = run(&engine, &mut state, &mut Relations::default());

        assert_eq!(report.fired, vec!["install"]);
        assert!(state.flags.is_set(Flag::Installed));
        assert!(!state.flags.is_set(Flag::Ready));
        assert!(!state.flags.is_set(Flag::Started));
        assert!(report.outbound.is_empty());

        let failure = report.failure.unwrap();
        assert_eq!(failure.handler, "explode");
        assert_eq!(failure.status.severity, Severity::Maintenance);
        assert!(!failure.status.message.contains("boom"));
    }

    #[test]
    fn relation_conditions() {
        let snapshot = RelationsSnapshot {
            nodemanager: RelationSnapshot {
                units: vec!["nodemanager/0".into()],
                departing: vec!["nodemanager/1".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let relations = Relations::from_snapshot(snapshot);
        let state = NodeState::default();

        assert!(Condition::Joined(Role::Workers).holds(&state, &relations));
        assert!(Condition::Departing(Role::Workers).holds(&state, &relations));
        assert!(!Condition::Available(Role::Workers).holds(&state, &relations));
        assert!(Condition::Unavailable(Role::Workers).holds(&state, &relations));
        assert!(Condition::Unavailable(Role::Clients).holds(&state, &relations));
        assert!(Condition::NotJoined(Role::Upstream).holds(&state, &relations));
        assert!(Condition::NotReady(Role::Upstream).holds(&state, &relations));
    }

    #[test]
    fn guard_display_lists_conditions() {
        let guard = Guard::all([
            Condition::FlagSet(Flag::Installed),
            Condition::NotReady(Role::Upstream),
        ]);
        assert_eq!(guard.to_string(), "resourcemanager.installed & !namenode.ready");
    }
}
