//! Nodemanager handlers.

use crate::collaborators::Severity;
use crate::engine::{Condition, Guard, PassContext, Rule};
use crate::error::RmError;
use crate::flags::Flag;
use crate::relation::{Role, UnitId};

use super::{early_install_info, full_install_info};

/// Workers can install before we do; they only need both addresses and
/// our ports. Keeps flowing until a nodemanager has been fully advertised.
pub fn advertise_early() -> Rule {
    Rule::new(
        "advertise-to-workers-early",
        Guard::all([
            Condition::Joined(Role::Upstream),
            Condition::Available(Role::Upstream),
            Condition::Joined(Role::Workers),
            Condition::FlagUnset(Flag::Ready),
        ]),
        |ctx| {
            if let Some(record) = early_install_info(ctx)? {
                ctx.relations.workers.publish(record);
            }
            Ok(())
        },
    )
}

pub fn advertise_full() -> Rule {
    Rule::new(
        "advertise-to-workers",
        Guard::all([
            Condition::FlagSet(Flag::Started),
            Condition::Ready(Role::Upstream),
            Condition::Joined(Role::Workers),
            Condition::Available(Role::Workers),
        ]),
        advertise_to_workers,
    )
}

fn advertise_to_workers(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
    let Some(mut record) = full_install_info(ctx)? else {
        return Ok(());
    };

    let advertised: Vec<(UnitId, String, String)> = ctx
        .relations
        .workers
        .available()
        .filter_map(|(unit, r)| Some((unit.clone(), r.hostname.clone()?, r.address.clone()?)))
        .collect();

    // Workers gate their own readiness on seeing themselves in hosts_map,
    // so record them before taking the snapshot.
    if ctx.config.config.features.host_directory {
        for (unit, hostname, address) in &advertised {
            ctx.state.hosts.put(unit, hostname, address);
        }
        record.hosts_map = Some(ctx.state.hosts.snapshot());
    }
    // Not used by the install, but the interface expects a key.
    record.ssh_key = Some("invalid".into());
    ctx.relations.workers.publish(record);

    let count = advertised.len();
    if count >= 1 {
        ctx.state.flags.set(Flag::Ready);
        let plural = if count > 1 { "s" } else { "" };
        ctx.set_status(Severity::Active, format!("ready ({count} nodemanager{plural})"));
    } else {
        ctx.state.flags.clear(Flag::Ready);
        ctx.set_status(Severity::Active, "degraded, no nodemanager");
    }
    Ok(())
}

/// Never fatal: a departing unit that never published a hostname has
/// nothing in the directory to clean up.
pub fn handle_departure() -> Rule {
    Rule::new(
        "handle-worker-departure",
        Guard::all([Condition::Departing(Role::Workers)]),
        |ctx| {
            let leaving: Vec<UnitId> = ctx.relations.workers.departing().cloned().collect();
            tracing::info!(?leaving, "nodemanagers leaving");

            for unit in &leaving {
                if ctx.state.hosts.remove_unit(unit) {
                    continue;
                }
                // Entries recorded before owners were tracked.
                match ctx.relations.workers.data_of(unit).and_then(|r| r.hostname.clone()) {
                    Some(hostname) => ctx.state.hosts.remove([hostname.as_str()]),
                    None => tracing::warn!(unit = %unit, "departing nodemanager never published a hostname"),
                }
            }

            for unit in &leaving {
                ctx.relations.workers.dismiss(unit);
            }
            Ok(())
        },
    )
}

/// No nodemanager left to advertise: none joined, or those joined have not
/// published their data yet.
pub fn handle_no_workers() -> Rule {
    Rule::new(
        "handle-no-workers",
        Guard::all([
            Condition::FlagSet(Flag::Started),
            Condition::Ready(Role::Upstream),
            Condition::Unavailable(Role::Workers),
        ]),
        |ctx| {
            ctx.state.flags.clear(Flag::Ready);
            // Still active: the web UI is useful without nodemanagers.
            ctx.set_status(Severity::Active, "degraded, no nodemanager");
            Ok(())
        },
    )
}
