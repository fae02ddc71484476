//! Handlers driving this node from blocked to started.

use crate::collaborators::Severity;
use crate::engine::{Condition, Guard, PassContext, Rule};
use crate::error::RmError;
use crate::flags::Flag;
use crate::relation::{Record, Role};
use crate::topology::{SELF_ROLE, TopologyResolver};

pub fn blocked() -> Rule {
    Rule::new(
        "blocked",
        Guard::all([Condition::NotJoined(Role::Upstream)]),
        |ctx| {
            ctx.set_status(Severity::Blocked, "missing required namenode relation");
            Ok(())
        },
    )
}

pub fn wait_for_upstream_address() -> Rule {
    Rule::new(
        "wait-for-upstream-address",
        Guard::all([
            Condition::Joined(Role::Upstream),
            Condition::FlagUnset(Flag::Installed),
        ]),
        |ctx| {
            if !ctx.relations.upstream.is_available() {
                ctx.set_status(Severity::Waiting, "waiting for namenode fqdn");
            }
            Ok(())
        },
    )
}

pub fn install() -> Rule {
    Rule::new(
        "install",
        Guard::all([
            Condition::Joined(Role::Upstream),
            Condition::Available(Role::Upstream),
            Condition::FlagUnset(Flag::Installed),
        ]),
        install_resourcemanager,
    )
}

fn install_resourcemanager(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
    let Some(namenode) = ctx.relations.upstream.primary_address().map(str::to_owned) else {
        ctx.set_status(Severity::Waiting, "waiting for namenode fqdn");
        return Ok(());
    };

    ctx.set_status(Severity::Maintenance, "installing resourcemanager");
    let topology = TopologyResolver::new(ctx.collab.discovery).build_topology(&namenode)?;
    tracing::info!(?topology, "installing {SELF_ROLE}");
    ctx.collab.installer.install(SELF_ROLE, &topology)?;

    ctx.state.flags.set(Flag::Installed);
    ctx.set_status(Severity::Maintenance, "resourcemanager installed");
    Ok(())
}

/// The namenode only turns ready once it has seen a spec matching its own.
pub fn advertise_spec() -> Rule {
    Rule::new(
        "advertise-spec",
        Guard::all([
            Condition::FlagSet(Flag::Installed),
            Condition::Joined(Role::Upstream),
            Condition::NotReady(Role::Upstream),
        ]),
        |ctx| {
            let spec = ctx.collab.installer.spec();
            ctx.relations.upstream.publish(Record {
                spec: Some(spec),
                ..Default::default()
            });
            ctx.set_status(Severity::Waiting, "waiting for namenode to become ready");
            Ok(())
        },
    )
}

pub fn start() -> Rule {
    Rule::new(
        "start",
        Guard::all([
            Condition::FlagSet(Flag::Installed),
            Condition::Ready(Role::Upstream),
            Condition::FlagUnset(Flag::Started),
        ]),
        start_resourcemanager,
    )
}

fn start_resourcemanager(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
    ctx.set_status(Severity::Maintenance, "starting resourcemanager");

    // Restart rather than start: config may have changed since install.
    for service in ctx.config.managed_services() {
        ctx.collab.services.restart(service)?;
        ctx.collab.services.ensure_running(service)?;
    }
    for &port in &ctx.config.config.ports.exposed {
        ctx.collab.ports.open_port(port)?;
    }

    ctx.state.flags.set(Flag::Started);
    ctx.set_status(Severity::Active, "ready");
    Ok(())
}
