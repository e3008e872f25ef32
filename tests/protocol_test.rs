//! Integration tests for the fixed cleaning and sampling routines.
//!
//! Each routine is run against a full set of mock pumps and checked against the
//! command sequence it is expected to produce.

mod common;

use async_trait::async_trait;
use common::{assert_volume, fast_wait, moves, protocol_rig, TestRig};
use rig_fluidics::config::ProtocolConfig;
use rig_fluidics::hardware::mock::PumpCommand;
use rig_fluidics::protocol::{MeasureOptions, SpectrumAcquisition, SpectrumKind};
use rig_fluidics::{
    AppResult, DispenseRequest, DispenseScheduler, FluidicsError, MockPump, ProtocolLibrary,
    PumpRegistry, SyringePump, ValvePort,
};
use std::sync::Arc;
use tokio::sync::Mutex;

fn library(rig: &TestRig) -> ProtocolLibrary {
    ProtocolLibrary::new(rig.scheduler.clone())
}

fn mv(pump: &str, aspirate: bool, volume: f64, valve: ValvePort) -> (String, bool, f64, ValvePort) {
    (pump.to_string(), aspirate, volume, valve)
}

/// Spectrometer stand-in that records what it was asked for and how much liquid the
/// sample syringe held at that moment.
struct FakeSpectrometer {
    sample: Arc<MockPump>,
    fail: bool,
    acquisitions: Mutex<Vec<(SpectrumKind, f64)>>,
}

impl FakeSpectrometer {
    fn new(sample: Arc<MockPump>) -> Self {
        Self {
            sample,
            fail: false,
            acquisitions: Mutex::new(Vec::new()),
        }
    }

    fn failing(sample: Arc<MockPump>) -> Self {
        Self {
            fail: true,
            ..Self::new(sample)
        }
    }
}

#[async_trait]
impl SpectrumAcquisition for FakeSpectrometer {
    async fn acquire(&self, kind: SpectrumKind) -> AppResult<()> {
        let held = self.sample.current_volume().await?;
        self.acquisitions.lock().await.push((kind, held));
        if self.fail {
            return Err(FluidicsError::Spectrometer("integration time out".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Cleaning routines
// =============================================================================

#[tokio::test]
async fn test_regia_purge_sequence() {
    let rig = protocol_rig();
    library(&rig).regia_purge().await.unwrap();

    assert_eq!(
        moves(&rig.journal.entries().await),
        vec![
            mv("regia", true, 5.0, ValvePort::Extra),
            mv("regia", false, 5.0, ValvePort::Inlet),
            mv("regia", true, 1.0, ValvePort::Outlet),
            mv("regia", false, 1.0, ValvePort::Extra),
            mv("sample", true, 5.0, ValvePort::SAMPLE_INLET),
            mv("sample", false, 5.0, ValvePort::UV_IR),
            mv("cleaning", true, 6.0, ValvePort::Outlet),
            mv("cleaning", false, 6.0, ValvePort::Inlet),
            mv("cleaning", true, 2.0, ValvePort::Extra),
            mv("cleaning", false, 2.0, ValvePort::Inlet),
        ]
    );
}

#[tokio::test]
async fn test_uv_ir_cleaning_runs_configured_cycles() {
    let rig = protocol_rig();
    library(&rig).clean_uv_ir_lines().await.unwrap();

    let entries = rig.journal.entries().await;
    assert_eq!(moves(&entries).len(), 16);
    let small_waste_draws = moves(&entries)
        .into_iter()
        .filter(|(_, aspirate, _, valve)| *aspirate && *valve == ValvePort::SAMPLE_SMALL_WASTE)
        .count();
    assert_eq!(small_waste_draws, 2);

    let config = ProtocolConfig {
        uv_ir_cleaning_cycles: 3,
        ..ProtocolConfig::default()
    };
    rig.journal.clear().await;
    ProtocolLibrary::with_config(rig.scheduler.clone(), config)
        .clean_uv_ir_lines()
        .await
        .unwrap();
    assert_eq!(moves(&rig.journal.entries().await).len(), 24);
}

#[tokio::test]
async fn test_single_uv_ir_clear_sequence() {
    let rig = protocol_rig();
    library(&rig).single_uv_ir_clear().await.unwrap();

    assert_eq!(
        moves(&rig.journal.entries().await),
        vec![
            mv("cleaning", true, 12.5, ValvePort::Extra),
            mv("cleaning", false, 12.5, ValvePort::Outlet),
            mv("sample", true, 12.0, ValvePort::SAMPLE_INLET),
            mv("sample", false, 12.0, ValvePort::UV_IR),
            mv("cleaning", true, 12.0, ValvePort::Outlet),
            mv("cleaning", false, 12.0, ValvePort::Inlet),
            mv("sample", true, 2.0, ValvePort::SAMPLE_SMALL_WASTE),
            mv("sample", false, 2.0, ValvePort::SAMPLE_WASTE),
        ]
    );
}

#[tokio::test]
async fn test_clean_routine_is_purge_then_line_clean() {
    let rig = protocol_rig();
    library(&rig).clean_routine().await.unwrap();

    let all = moves(&rig.journal.entries().await);
    assert_eq!(all.len(), 26);
    assert_eq!(all[0], mv("regia", true, 5.0, ValvePort::Extra));
    assert_eq!(all[10], mv("cleaning", true, 12.5, ValvePort::Extra));
}

#[tokio::test]
async fn test_finishing_clean_two_passes_per_pump() {
    let rig = protocol_rig();
    library(&rig)
        .finishing_clean(&["silver", "gold"])
        .await
        .unwrap();

    let pass = |pump: &str| {
        vec![
            mv(pump, true, 0.5, ValvePort::Outlet),
            mv(pump, false, 0.5, ValvePort::Extra),
            mv(pump, true, 0.5, ValvePort::Outlet),
            mv(pump, false, 0.5, ValvePort::Inlet),
        ]
    };
    let mut expected = Vec::new();
    for pump in ["silver", "gold"] {
        expected.extend(pass(pump));
        expected.extend(pass(pump));
    }
    assert_eq!(moves(&rig.journal.entries().await), expected);
}

#[tokio::test]
async fn test_finishing_clean_stops_at_unknown_pump() {
    let rig = protocol_rig();
    let result = library(&rig).finishing_clean(&["silver", "copper"]).await;

    assert!(matches!(result, Err(FluidicsError::UnknownPump(name)) if name == "copper"));
    assert_eq!(rig.journal.entries_for("silver").await.len(), 8);
}

#[tokio::test]
async fn test_dilute_sample_sequence() {
    let rig = protocol_rig();
    library(&rig).dilute_sample().await.unwrap();

    assert_eq!(
        moves(&rig.journal.entries().await),
        vec![
            mv("cleaning", true, 5.0, ValvePort::Outlet),
            mv("cleaning", false, 5.0, ValvePort::Inlet),
            mv("cleaning", true, 5.0, ValvePort::Extra),
            mv("cleaning", false, 5.0, ValvePort::Outlet),
        ]
    );
}

#[tokio::test]
async fn test_prime_reductant_and_preflush() {
    let rig = protocol_rig();
    let library = library(&rig);

    library.prime_reductant(1.5).await.unwrap();
    library
        .preflush(&[
            DispenseRequest::reagent("silver", 0.5).unwrap(),
            DispenseRequest::reagent("gold", 0.5).unwrap(),
        ])
        .await
        .unwrap();

    let pumps: Vec<String> = moves(&rig.journal.entries().await)
        .into_iter()
        .map(|(pump, ..)| pump)
        .collect();
    assert_eq!(
        pumps,
        vec!["reductant", "reductant", "silver", "silver", "gold", "gold"]
    );
}

#[tokio::test]
async fn test_standard_preflush_primes_every_reagent_then_cycles_water() {
    let rig = common::rig(&[
        ("sample", 12.5),
        ("cleaning", 12.5),
        ("silver", 5.0),
        ("surfactant", 5.0),
        ("gold", 5.0),
        ("reductant", 5.0),
        ("seeds", 5.0),
    ]);
    let library = library(&rig);

    let requests = library.standard_preflush().unwrap();
    assert_eq!(requests.len(), 6);
    assert_eq!(requests[5].pump(), "cleaning");
    assert_eq!(requests[5].source(), ValvePort::Extra);
    assert_eq!(requests[5].destination(), ValvePort::Extra);

    library.preflush_standard().await.unwrap();

    let mut expected = Vec::new();
    for pump in ["silver", "surfactant", "gold", "reductant", "seeds"] {
        expected.push(mv(pump, true, 1.5, ValvePort::Extra));
        expected.push(mv(pump, false, 1.5, ValvePort::Inlet));
    }
    expected.push(mv("cleaning", true, 10.0, ValvePort::Extra));
    expected.push(mv("cleaning", false, 10.0, ValvePort::Extra));
    assert_eq!(moves(&rig.journal.entries().await), expected);
}

#[tokio::test]
async fn test_standard_preflush_follows_config() {
    let rig = protocol_rig();
    let config = ProtocolConfig {
        preflush_pumps: vec!["gold".to_string()],
        preflush_ml: 0.75,
        preflush_cleaning_ml: 0.0,
        ..ProtocolConfig::default()
    };
    ProtocolLibrary::with_config(rig.scheduler.clone(), config)
        .preflush_standard()
        .await
        .unwrap();

    // a zero-volume water cycle sends nothing
    assert_eq!(
        moves(&rig.journal.entries().await),
        vec![
            mv("gold", true, 0.75, ValvePort::Extra),
            mv("gold", false, 0.75, ValvePort::Inlet),
        ]
    );
}

#[tokio::test]
async fn test_standard_preflush_needs_every_pump() {
    let rig = protocol_rig();
    let result = library(&rig).preflush_standard().await;

    assert!(matches!(result, Err(FluidicsError::UnknownPump(_))));
}

#[tokio::test]
async fn test_custom_acid_pump_name() {
    let rig = common::rig(&[("sample", 12.5), ("cleaning", 12.5), ("acid", 5.0)]);
    let config = ProtocolConfig {
        acid_pump: "acid".to_string(),
        ..ProtocolConfig::default()
    };
    ProtocolLibrary::with_config(rig.scheduler.clone(), config)
        .dispense_regia(3.0)
        .await
        .unwrap();

    assert_eq!(rig.journal.entries_for("acid").await.len(), 4);
}

#[tokio::test]
async fn test_routine_aborts_on_device_error() {
    let rig = protocol_rig();
    rig.pump("regia").set_link_down(true);

    let result = library(&rig).regia_purge().await;

    assert!(matches!(
        result,
        Err(FluidicsError::DeviceCommunication { .. })
    ));
    assert!(rig.journal.is_empty().await);
}

// =============================================================================
// Spectrometer routines
// =============================================================================

#[tokio::test]
async fn test_measure_sample_draws_slowly_and_clears_line() {
    let rig = protocol_rig();
    let sample = rig.pump("sample");
    let spectrometer = FakeSpectrometer::new(sample.clone());

    library(&rig)
        .measure_sample(&spectrometer, MeasureOptions::default())
        .await
        .unwrap();

    let acquisitions = spectrometer.acquisitions.lock().await.clone();
    assert_eq!(acquisitions.len(), 1);
    assert_eq!(acquisitions[0].0, SpectrumKind::Sample);
    assert_volume(acquisitions[0].1, 2.0, "carried over at acquisition");

    let velocities: Vec<u32> = rig
        .journal
        .entries_for("sample")
        .await
        .into_iter()
        .filter_map(|e| match e.command {
            PumpCommand::SetVelocity(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(velocities, vec![5000, 8000]);

    assert_eq!(sample.velocity().await.unwrap(), 8000);
    assert_volume(sample.current_volume().await.unwrap(), 0.0, "sample after");
}

#[tokio::test]
async fn test_measure_reference_fills_vial_first() {
    let rig = protocol_rig();
    let spectrometer = FakeSpectrometer::new(rig.pump("sample"));

    library(&rig)
        .measure_sample(
            &spectrometer,
            MeasureOptions {
                reference: true,
                dilute: false,
            },
        )
        .await
        .unwrap();

    let first = moves(&rig.journal.entries().await)[0].clone();
    assert_eq!(first, mv("cleaning", true, 10.0, ValvePort::Extra));
    assert_eq!(
        spectrometer.acquisitions.lock().await[0].0,
        SpectrumKind::Reference
    );
}

#[tokio::test]
async fn test_measure_sample_propagates_acquisition_failure() {
    let rig = protocol_rig();
    let sample = rig.pump("sample");
    let spectrometer = FakeSpectrometer::failing(sample.clone());

    let result = library(&rig)
        .measure_sample(&spectrometer, MeasureOptions::default())
        .await;

    assert!(matches!(result, Err(FluidicsError::Spectrometer(_))));
    assert!(rig.journal.entries_for("cleaning").await.is_empty());
    assert_volume(sample.current_volume().await.unwrap(), 2.0, "left in syringe");
    assert_eq!(sample.velocity().await.unwrap(), 8000);
}

#[tokio::test]
async fn test_measure_seeds_returns_sample_pump_empty() {
    let rig = protocol_rig();
    let sample = rig.pump("sample");
    let spectrometer = FakeSpectrometer::new(sample.clone());

    library(&rig).measure_seeds(&spectrometer).await.unwrap();

    let acquisitions = spectrometer.acquisitions.lock().await.clone();
    assert_eq!(acquisitions.len(), 1);
    assert_eq!(acquisitions[0].0, SpectrumKind::Seeds);
    assert_volume(acquisitions[0].1, 3.0, "seeds held at acquisition");

    let seed_draws = moves(&rig.journal.entries().await)
        .into_iter()
        .filter(|(_, aspirate, _, valve)| *aspirate && *valve == ValvePort::SEEDS)
        .count();
    assert_eq!(seed_draws, 1);
    assert_volume(sample.current_volume().await.unwrap(), 0.0, "sample after");
    assert_volume(
        rig.pump("regia").current_volume().await.unwrap(),
        0.0,
        "regia after",
    );
}

/// Sample pump that can be slowed down but refuses to go back to normal speed.
struct StuckSlow(MockPump);

#[async_trait]
impl SyringePump for StuckSlow {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn capacity(&self) -> f64 {
        self.0.capacity()
    }

    async fn current_volume(&self) -> AppResult<f64> {
        self.0.current_volume().await
    }

    async fn aspirate(&self, volume: f64, valve: ValvePort) -> AppResult<()> {
        self.0.aspirate(volume, valve).await
    }

    async fn deliver(&self, volume: f64, valve: ValvePort) -> AppResult<()> {
        self.0.deliver(volume, valve).await
    }

    async fn is_idle(&self) -> AppResult<bool> {
        self.0.is_idle().await
    }

    async fn set_velocity(&self, velocity: u32) -> AppResult<()> {
        if velocity > self.0.velocity().await? {
            return Err(FluidicsError::device(self.0.name(), "velocity command timed out"));
        }
        self.0.set_velocity(velocity).await
    }

    async fn velocity(&self) -> AppResult<u32> {
        self.0.velocity().await
    }
}

#[tokio::test]
async fn test_draw_failure_wins_over_failed_velocity_restore() {
    // 5 ml already in a 12.5 ml syringe: the 10 ml draw is refused
    let sample = Arc::new(StuckSlow(MockPump::new("sample", 12.5).with_volume(5.0)));
    let registry = PumpRegistry::new()
        .with_pump("sample", sample.clone())
        .with_pump("cleaning", Arc::new(MockPump::new("cleaning", 12.5)));
    let scheduler = DispenseScheduler::new(Arc::new(registry))
        .without_settle()
        .with_idle_wait(fast_wait());
    let spectrometer = FakeSpectrometer::new(Arc::new(MockPump::new("sample", 12.5)));

    let result = ProtocolLibrary::new(scheduler)
        .measure_sample(&spectrometer, MeasureOptions::default())
        .await;

    assert!(matches!(result, Err(FluidicsError::InvalidVolumeRequest(_))));
    assert_eq!(sample.velocity().await.unwrap(), 5000);
    assert!(spectrometer.acquisitions.lock().await.is_empty());
}
