use crate::engine::{Condition, Guard, Rule};
use crate::relation::{Record, Role};

pub fn register() -> Rule {
    Rule::new(
        "register-benchmark",
        Guard::all([Condition::Joined(Role::Benchmark)]),
        |ctx| {
            let names = ctx.config.config.features.benchmarks.clone();
            tracing::debug!(?names, "registering benchmarks");
            ctx.relations.benchmark.publish(Record {
                benchmarks: Some(names),
                ..Default::default()
            });
            Ok(())
        },
    )
}
