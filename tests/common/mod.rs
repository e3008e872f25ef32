//! Common test utilities for rig_fluidics integration tests
//!
//! Builds registries of fast mock pumps that all record into one shared journal, so
//! tests can assert on the exact order and timing of the commands a routine issued.

#![allow(dead_code)] // Not every test binary uses every helper

use rig_fluidics::hardware::mock::{JournalEntry, PumpCommand};
use rig_fluidics::{
    CommandJournal, DispenseScheduler, IdleWait, MockPump, PumpRegistry, SyringePump,
    ValvePort,
};
use std::sync::Arc;
use std::time::Duration;

/// Idle wait used by every test: tight polling and a timeout well above any mock move.
pub fn fast_wait() -> IdleWait {
    IdleWait {
        poll_interval: Duration::from_millis(1),
        timeout: Some(Duration::from_secs(5)),
    }
}

/// A rig under test: its scheduler, the journal all pumps write to, and the mocks
/// themselves for fault injection.
pub struct TestRig {
    pub scheduler: DispenseScheduler,
    pub journal: CommandJournal,
    pub pumps: Vec<Arc<MockPump>>,
}

impl TestRig {
    /// Mock pump by name.
    pub fn pump(&self, name: &str) -> Arc<MockPump> {
        self.pumps
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .unwrap_or_else(|| panic!("no mock pump named {}", name))
    }
}

/// Build a rig from pre-configured mocks, all recording into one fresh journal.
pub fn rig_from(pumps: Vec<MockPump>) -> TestRig {
    let journal = CommandJournal::new();
    let pumps: Vec<Arc<MockPump>> = pumps
        .into_iter()
        .map(|p| Arc::new(p.with_journal(journal.clone())))
        .collect();

    let mut registry = PumpRegistry::new();
    for pump in &pumps {
        registry = registry.with_pump(pump.name().to_string(), pump.clone());
    }

    let scheduler = DispenseScheduler::new(Arc::new(registry))
        .without_settle()
        .with_idle_wait(fast_wait());

    TestRig {
        scheduler,
        journal,
        pumps,
    }
}

/// Rig of default-timing mocks.
pub fn rig(pumps: &[(&str, f64)]) -> TestRig {
    rig_from(
        pumps
            .iter()
            .map(|(name, capacity)| MockPump::new(*name, *capacity))
            .collect(),
    )
}

/// Rig of mocks whose moves take a random 2 to 12ms, so a batch never finishes in
/// issue order.
pub fn jittered_rig(pumps: &[(&str, f64)]) -> TestRig {
    rig_from(
        pumps
            .iter()
            .map(|(name, capacity)| {
                MockPump::new(*name, *capacity)
                    .with_timing(Duration::from_millis(2), Duration::ZERO)
                    .with_jitter(Duration::from_millis(10))
            })
            .collect(),
    )
}

/// The pumps the protocol routines expect, all with the rig's syringe sizes.
pub fn protocol_rig() -> TestRig {
    rig(&[
        ("sample", 12.5),
        ("cleaning", 12.5),
        ("regia", 5.0),
        ("reductant", 5.0),
        ("silver", 5.0),
        ("gold", 5.0),
    ])
}

/// `(pump, is_aspirate, volume, valve)` for every move in the journal.
pub fn moves(entries: &[JournalEntry]) -> Vec<(String, bool, f64, ValvePort)> {
    entries
        .iter()
        .filter_map(|e| match e.command {
            PumpCommand::Aspirate { volume, valve } => Some((e.pump.clone(), true, volume, valve)),
            PumpCommand::Deliver { volume, valve } => Some((e.pump.clone(), false, volume, valve)),
            PumpCommand::SetVelocity(_) => None,
        })
        .collect()
}

/// Sum of delivered volume per pump.
pub fn delivered(entries: &[JournalEntry], pump: &str) -> f64 {
    entries
        .iter()
        .filter(|e| e.pump == pump && e.is_deliver())
        .map(|e| e.volume())
        .sum()
}

/// Compare ml volumes with a small tolerance.
pub fn assert_volume(actual: f64, expected: f64, context: &str) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "{}: expected {}ml, got {}ml",
        context,
        expected,
        actual
    );
}
