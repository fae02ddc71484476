//! Lifecycle handlers for the resource manager and their registration order.
//!
//! Order matters: later handlers observe what earlier ones did in the same
//! pass. Early advertisement runs ahead of install so counterparties can
//! start their own install even if ours fails. Departures are handled
//! before the worker advertiser counts nodemanagers, and full client
//! advertisement comes after the worker handlers settled `ready`.

pub mod benchmark;
pub mod clients;
pub mod core;
pub mod workers;

use crate::config::SystemConfig;
use crate::engine::{Engine, PassContext, Rule};
use crate::error::RmError;
use crate::relation::{Ports, Record};
use crate::topology::TopologyResolver;

pub fn registry(config: &SystemConfig) -> Vec<Rule> {
    let mut rules = vec![
        core::blocked(),
        core::wait_for_upstream_address(),
        workers::advertise_early(),
        clients::advertise_early(),
        core::install(),
        core::advertise_spec(),
        core::start(),
        workers::handle_departure(),
        workers::advertise_full(),
        workers::handle_no_workers(),
        clients::advertise_full(),
    ];
    if !config.config.features.benchmarks.is_empty() {
        rules.push(benchmark::register());
    }
    rules
}

pub fn engine(config: &SystemConfig) -> Engine {
    Engine::new(registry(config))
}

fn ports(config: &SystemConfig) -> Ports {
    let ports = &config.config.ports;
    let history = config.config.features.history_server;
    Ports {
        service: ports.resourcemanager,
        history_http: history.then_some(ports.jh_webapp_http),
        history_ipc: history.then_some(ports.jobhistory),
    }
}

/// Namenode address followed by ours. `None` until the namenode published
/// an address.
fn addresses(ctx: &PassContext<'_>) -> Result<Option<Vec<String>>, RmError> {
    let Some(namenode) = ctx.relations.upstream.primary_address().map(str::to_owned) else {
        return Ok(None);
    };
    let own = TopologyResolver::new(ctx.collab.discovery).self_address()?;
    Ok(Some(vec![namenode, own]))
}

/// Enough for a counterparty to start installing.
fn early_install_info(ctx: &PassContext<'_>) -> Result<Option<Record>, RmError> {
    Ok(addresses(ctx)?.map(|addresses| Record {
        addresses: Some(addresses),
        ports: Some(ports(ctx.config)),
        ..Default::default()
    }))
}

/// Early info plus the installed spec.
fn full_install_info(ctx: &PassContext<'_>) -> Result<Option<Record>, RmError> {
    Ok(early_install_info(ctx)?.map(|mut record| {
        record.spec = Some(ctx.collab.installer.spec());
        record
    }))
}
