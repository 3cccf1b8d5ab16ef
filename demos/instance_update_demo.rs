//! Long-running instance updates and paginated listing against in-memory fakes.
//!
//! Run with `cargo run --example instance_update_demo`.

use anyhow::Result;
use ironlro::metrics::MetricsCollector;
use ironlro::prelude::*;
use ironlro::rpc::{FakeListService, FakeMutationService};
use ironlro::testing::{fast_config, sample_findings};
use std::io;

fn main() -> Result<()> {
    let metrics = MetricsCollector::new();
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::try_new(fast_config())?
        .with_clock(clock.clone().into_shared())
        .with_metrics(metrics.clone());
    let mut out = io::stdout();

    // One instance update whose poll call hiccups once.
    let compute = FakeMutationService::new()
        .then_start("operations/update-instance-1")
        .then_poll_pending(2)
        .then_poll_error(RpcError::new(ErrorKind::Network, "connection reset"))
        .then_poll_success("RUNNING".to_string());
    let outcome = orchestrator.mutate(&compute, &"zones/us-east1-b/instances/web-1".to_string(), None)?;
    orchestrator.report(&mut out, &outcome)?;
    println!("virtual time spent: {:?}", clock.elapsed());

    // Several independent updates share the orchestrator.
    let instances: Vec<String> = (1..=4).map(|i| format!("zones/us-east1-b/instances/batch-{i}")).collect();
    let results = orchestrator.run_all(instances, |orch, name| {
        let service = FakeMutationService::new()
            .then_start(format!("operations/{name}"))
            .then_poll_success(format!("{name}: RUNNING"));
        orch.mutate(&service, &name, None)
    });
    for result in results {
        orchestrator.report(&mut out, &result?)?;
    }

    // Findings, three per page.
    let findings = FakeListService::from_items(sample_findings(8), 3);
    let mut active = 0;
    for finding in orchestrator.list_service(&findings) {
        let finding = finding.map_err(OrchestrationError::from)?;
        if finding.state == "ACTIVE" {
            active += 1;
        }
    }
    println!("{active} active findings over {} pages", findings.fetch_calls());

    metrics.print();
    Ok(())
}
