//! Client handlers. Clients never wait on nodemanagers directly; they get
//! our `ready` flag as an explicit signal instead.

use crate::engine::{Condition, Guard, PassContext, Rule};
use crate::error::RmError;
use crate::flags::Flag;
use crate::relation::Role;

use super::{early_install_info, full_install_info};

pub fn advertise_early() -> Rule {
    Rule::new(
        "advertise-to-clients-early",
        Guard::all([
            Condition::Joined(Role::Upstream),
            Condition::Available(Role::Upstream),
            Condition::Joined(Role::Clients),
            Condition::FlagUnset(Flag::Installed),
        ]),
        |ctx| {
            if let Some(record) = early_install_info(ctx)? {
                ctx.relations.clients.publish(record);
            }
            Ok(())
        },
    )
}

pub fn advertise_full() -> Rule {
    Rule::new(
        "advertise-to-clients",
        Guard::all([
            Condition::FlagSet(Flag::Started),
            Condition::Ready(Role::Upstream),
            Condition::Joined(Role::Clients),
        ]),
        advertise_to_clients,
    )
}

fn advertise_to_clients(ctx: &mut PassContext<'_>) -> Result<(), RmError> {
    let Some(mut record) = full_install_info(ctx)? else {
        return Ok(());
    };
    let features = &ctx.config.config.features;
    if features.client_readiness {
        record.ready = Some(ctx.state.flags.is_set(Flag::Ready));
    }
    if features.host_directory {
        record.hosts_map = Some(ctx.state.hosts.snapshot());
    }
    ctx.relations.clients.publish(record);
    Ok(())
}
