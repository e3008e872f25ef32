//! Fixed fluidic routines built from scheduler primitives.
//!
//! Every routine here is a straight-line script of transfers, sample moves and
//! settle pauses. Branching happens only on caller-supplied flags, never on sensor
//! feedback. A failing step aborts the routine and the error is returned unchanged;
//! deciding whether to halt the run or re-prime is up to the caller.

pub mod spectra;

use tracing::info;

use crate::config::ProtocolConfig;
use crate::dispense::request::DispenseRequest;
use crate::dispense::scheduler::DispenseScheduler;
use crate::error::AppResult;
use crate::hardware::valve::ValvePort;

pub use spectra::{MeasureOptions, SpectrumAcquisition, SpectrumKind};

/// Volume moved by a transfer when a routine does not name one: a full stroke of
/// the 12.5 ml syringes fitted to the rig.
pub const DEFAULT_TRANSFER_ML: f64 = 12.5;

/// Cleaning and sampling routines for one rig.
#[derive(Debug, Clone)]
pub struct ProtocolLibrary {
    scheduler: DispenseScheduler,
    config: ProtocolConfig,
}

impl ProtocolLibrary {
    /// Library using the default pump names and cycle counts.
    pub fn new(scheduler: DispenseScheduler) -> Self {
        Self::with_config(scheduler, ProtocolConfig::default())
    }

    /// Library configured from the `[protocols]` section.
    pub fn with_config(scheduler: DispenseScheduler, config: ProtocolConfig) -> Self {
        Self { scheduler, config }
    }

    /// Scheduler the routines run on.
    pub fn scheduler(&self) -> &DispenseScheduler {
        &self.scheduler
    }

    /// Routine settings.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Dispense aqua regia into the vial, then push 1 ml back out of the valve so no
    /// acid sits in it.
    pub async fn dispense_regia(&self, volume: f64) -> AppResult<()> {
        let acid = self.config.acid_pump.as_str();
        self.scheduler
            .transfer(acid, volume, ValvePort::Extra, ValvePort::Inlet)
            .await?;
        self.scheduler
            .transfer(acid, 1.0, ValvePort::Outlet, ValvePort::Extra)
            .await
    }

    /// Full vial and line clean: regia purge followed by UV/IR line cleaning.
    pub async fn clean_routine(&self) -> AppResult<()> {
        self.regia_purge().await?;
        self.clean_uv_ir_lines().await
    }

    /// Purge the vial and UV/IR line with aqua regia and send it to waste.
    pub async fn regia_purge(&self) -> AppResult<()> {
        info!("Purging system with Aqua Regia");
        let cleaning = self.config.cleaning_pump.as_str();

        self.dispense_regia(5.0).await?;

        self.scheduler
            .take_sample(5.0, 5.0, ValvePort::SAMPLE_INLET, ValvePort::UV_IR)
            .await?;

        self.scheduler
            .transfer(cleaning, 6.0, ValvePort::Outlet, ValvePort::Inlet)
            .await?;

        // residue left in the waste valve
        self.scheduler
            .transfer(cleaning, 2.0, ValvePort::Extra, ValvePort::Inlet)
            .await
    }

    /// Rinse the UV/IR lines `uv_ir_cleaning_cycles` times.
    pub async fn clean_uv_ir_lines(&self) -> AppResult<()> {
        let cycles = self.config.uv_ir_cleaning_cycles;
        for i in 0..cycles {
            info!("Cleaning cycle (UV/IR): {}/{}", i + 1, cycles);
            self.single_uv_ir_clear().await?;
        }
        Ok(())
    }

    /// One rinse of the UV/IR lines, including the small waste line.
    pub async fn single_uv_ir_clear(&self) -> AppResult<()> {
        self.rinse_uv_line().await?;

        self.scheduler
            .take_sample(
                2.0,
                2.0,
                ValvePort::SAMPLE_SMALL_WASTE,
                ValvePort::SAMPLE_WASTE,
            )
            .await?;
        Ok(())
    }

    /// Fill the vial with water, pull it through the UV/IR line and send it to waste.
    pub(crate) async fn rinse_uv_line(&self) -> AppResult<()> {
        let cleaning = self.config.cleaning_pump.as_str();

        self.scheduler
            .transfer(
                cleaning,
                DEFAULT_TRANSFER_ML,
                ValvePort::Extra,
                ValvePort::Outlet,
            )
            .await?;

        self.scheduler
            .take_sample(12.0, 12.0, ValvePort::SAMPLE_INLET, ValvePort::UV_IR)
            .await?;

        self.scheduler
            .transfer(cleaning, 12.0, ValvePort::Outlet, ValvePort::Inlet)
            .await
    }

    /// Clear reagent left in each pump's valve at the end of a run, two half-ml
    /// passes per pump by default.
    pub async fn finishing_clean(&self, pumps: &[&str]) -> AppResult<()> {
        for pump in pumps {
            info!(pump, "Finishing clean");
            for _ in 0..self.config.finishing_passes {
                self.scheduler
                    .transfer(pump, 0.5, ValvePort::Outlet, ValvePort::Extra)
                    .await?;
                self.scheduler
                    .transfer(pump, 0.5, ValvePort::Outlet, ValvePort::Inlet)
                    .await?;
            }
        }
        Ok(())
    }

    /// Halve the sample: 5 ml to waste, 5 ml of water back in.
    pub async fn dilute_sample(&self) -> AppResult<()> {
        info!("Diluting sample");
        let cleaning = self.config.cleaning_pump.as_str();

        self.scheduler
            .transfer(cleaning, 5.0, ValvePort::Outlet, ValvePort::Inlet)
            .await?;
        self.scheduler
            .transfer(cleaning, 5.0, ValvePort::Extra, ValvePort::Outlet)
            .await
    }

    /// Prime reagent lines so no dead volume remains in the tubing.
    pub async fn preflush(&self, requests: &[DispenseRequest]) -> AppResult<()> {
        let names: Vec<&str> = requests.iter().map(|r| r.pump()).collect();
        info!("Preflushing pumps: {}", names.join(", "));
        self.scheduler.sequential_dispense(requests).await
    }

    /// The rig's standard preflush set: every reagent pump in `preflush_pumps` primed
    /// with `preflush_ml` over its stock route, then `preflush_cleaning_ml` of water
    /// cycled through the cleaning pump's extra port.
    pub fn standard_preflush(&self) -> AppResult<Vec<DispenseRequest>> {
        let mut requests = self
            .config
            .preflush_pumps
            .iter()
            .map(|pump| DispenseRequest::reagent(pump.as_str(), self.config.preflush_ml))
            .collect::<AppResult<Vec<_>>>()?;
        requests.push(DispenseRequest::new(
            self.config.cleaning_pump.as_str(),
            self.config.preflush_cleaning_ml,
            ValvePort::Extra,
            ValvePort::Extra,
        )?);
        Ok(requests)
    }

    /// Run [`standard_preflush`](Self::standard_preflush) through [`preflush`](Self::preflush).
    pub async fn preflush_standard(&self) -> AppResult<()> {
        let requests = self.standard_preflush()?;
        self.preflush(&requests).await
    }

    /// Re-flush the reductant line.
    pub async fn prime_reductant(&self, volume: f64) -> AppResult<()> {
        info!("Re-flushing reductant: {}ml", volume);
        self.scheduler
            .transfer(
                &self.config.reductant_pump,
                volume,
                ValvePort::Extra,
                ValvePort::Inlet,
            )
            .await
    }
}
