//! Secret version lifecycle against in-memory fakes.
//!
//! Adds a version with a checksum, reads it back with verification, shows how a
//! corrupted read is reported, and walks the version through disable/enable.
//!
//! Run with `cargo run --example secret_version_demo`.

use anyhow::{Result, bail};
use ironlro::prelude::*;
use ironlro::rpc::{FakeMutationService, FakePayloadService};
use std::io;

const SECRET: &str = "projects/demo/secrets/db-password";

fn main() -> Result<()> {
    let orchestrator = Orchestrator::try_new(OrchestratorConfig::default())?;
    let mut out = io::stdout();

    // Add a version: the store checks the CRC-32C we attach.
    let store = FakeMutationService::new()
        .reject_bad_checksums()
        .then_complete(format!("{SECRET}/versions/1"));
    let payload = Payload::new(b"my super secret data".to_vec());
    let added = orchestrator.mutate(&store, &SECRET.to_string(), Some(payload))?;
    orchestrator.report(&mut out, &added)?;

    let sent = store.received_payloads();
    if let Some(Some(sent)) = sent.first() {
        println!("sent {} bytes with crc32c {}", sent.len(), sent.checksum().map_or_else(String::new, |c| c.to_string()));
    }

    // Read it back and verify locally.
    let reads = FakePayloadService::new().with_payload(
        added.value.clone(),
        Payload::with_checksum(b"my super secret data".to_vec(), compute_checksum(b"my super secret data")),
    );
    let fetched = orchestrator.fetch_payload(&reads, &added.value)?;
    println!("read back: {}", String::from_utf8_lossy(fetched.data()));

    // A payload whose bytes changed in transit is rejected.
    reads.insert(
        "corrupted",
        Payload::with_checksum(b"my super secret dat4".to_vec(), compute_checksum(b"my super secret data")),
    );
    match orchestrator.fetch_payload(&reads, "corrupted") {
        Err(e) if e.is_integrity() => println!("corrupted read rejected: {e}"),
        Err(e) => bail!("unexpected failure: {e}"),
        Ok(_) => bail!("corrupted payload was accepted"),
    }

    // State transitions are plain mutations without a payload.
    let states = FakeMutationService::new()
        .then_complete("DISABLED".to_string())
        .then_complete("ENABLED".to_string());
    for _ in 0..2 {
        let outcome = orchestrator.mutate(&states, &added.value, None)?;
        orchestrator.report(&mut out, &outcome)?;
    }

    Ok(())
}
