//! Routines that route liquid through the spectrometer flow cell.
//!
//! The spectrometer itself is a collaborator: these routines only need to tell it
//! when the cell is filled, through [`SpectrumAcquisition`].

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::hardware::valve::ValvePort;
use crate::protocol::{ProtocolLibrary, DEFAULT_TRANSFER_ML};

/// Which spectrum the flow cell currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumKind {
    /// Water reference.
    Reference,
    /// Reaction sample.
    Sample,
    /// Seed stock.
    Seeds,
}

/// Narrow interface to the spectrometer.
#[async_trait]
pub trait SpectrumAcquisition: Send + Sync {
    /// Acquire a spectrum of whatever is in the flow cell.
    async fn acquire(&self, kind: SpectrumKind) -> AppResult<()>;
}

/// Flags for [`ProtocolLibrary::measure_sample`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasureOptions {
    /// Fill the vial with water and take a reference instead of a sample spectrum.
    pub reference: bool,
    /// Halve the sample before measuring.
    pub dilute: bool,
}

impl ProtocolLibrary {
    /// Draw the vial contents into the flow cell, acquire, then rinse vial and lines.
    pub async fn measure_sample(
        &self,
        acquisition: &dyn SpectrumAcquisition,
        options: MeasureOptions,
    ) -> AppResult<()> {
        let scheduler = self.scheduler();
        let cleaning = self.config().cleaning_pump.as_str();

        if options.reference {
            info!("Reference collection");
            scheduler
                .transfer(cleaning, 10.0, ValvePort::Extra, ValvePort::Outlet)
                .await?;
        }

        if options.dilute {
            self.dilute_sample().await?;
        }

        let carried = self
            .slow_draw(10.0, 8.0, ValvePort::SAMPLE_INLET)
            .await?;

        let kind = if options.reference {
            SpectrumKind::Reference
        } else {
            SpectrumKind::Sample
        };
        info!(?kind, "Obtaining UV spectrum");
        acquisition.acquire(kind).await?;

        // clear the line with what is still in the syringe
        scheduler
            .take_sample(0.0, carried, ValvePort::SAMPLE_INLET, ValvePort::UV_IR)
            .await?;

        scheduler
            .transfer(
                cleaning,
                DEFAULT_TRANSFER_ML,
                ValvePort::Outlet,
                ValvePort::Inlet,
            )
            .await?;
        scheduler
            .transfer(cleaning, 8.0, ValvePort::Extra, ValvePort::Outlet)
            .await?;
        scheduler
            .take_sample(10.0, 10.0, ValvePort::SAMPLE_INLET, ValvePort::UV_IR)
            .await?;
        scheduler
            .transfer(
                cleaning,
                DEFAULT_TRANSFER_ML,
                ValvePort::Outlet,
                ValvePort::Inlet,
            )
            .await
    }

    /// Seed reference spectrum, then purge the flow cell with regia and water.
    pub async fn measure_seeds(&self, acquisition: &dyn SpectrumAcquisition) -> AppResult<()> {
        let scheduler = self.scheduler();
        let cleaning = self.config().cleaning_pump.as_str();

        let carried = self.slow_draw(7.0, 4.0, ValvePort::SEEDS).await?;

        info!("Taking seed reference");
        acquisition.acquire(SpectrumKind::Seeds).await?;

        scheduler
            .take_sample(0.0, carried, ValvePort::SAMPLE_INLET, ValvePort::UV_IR)
            .await?;

        // seeds back to the stock bottle
        scheduler
            .transfer(
                cleaning,
                DEFAULT_TRANSFER_ML,
                ValvePort::Outlet,
                ValvePort::Inlet,
            )
            .await?;

        self.dispense_regia(5.0).await?;
        scheduler
            .take_sample(7.0, 7.0, ValvePort::SAMPLE_INLET, ValvePort::UV_IR)
            .await?;
        scheduler
            .transfer(
                cleaning,
                DEFAULT_TRANSFER_ML,
                ValvePort::Outlet,
                ValvePort::Inlet,
            )
            .await?;

        for _ in 0..self.config().uv_ir_cleaning_cycles {
            self.rinse_uv_line().await?;
        }
        Ok(())
    }

    /// Sample draw at reduced velocity so no air is pulled into the line. The normal
    /// velocity is restored even if the draw fails; a draw failure takes precedence
    /// over a failed restore.
    async fn slow_draw(&self, vol_in: f64, vol_out: f64, source: ValvePort) -> AppResult<f64> {
        let scheduler = self.scheduler();
        let sample = scheduler.sample_pump().to_string();

        scheduler
            .set_pump_speed(&sample, self.config().slow_sample_velocity)
            .await?;
        let drawn = scheduler
            .take_sample(vol_in, vol_out, source, ValvePort::UV_IR)
            .await;
        let restored = scheduler
            .set_pump_speed(&sample, self.config().sample_velocity)
            .await;

        match (drawn, restored) {
            (Ok(carried), Ok(())) => Ok(carried),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_error)) => {
                warn!(pump = %sample, error = %restore_error, "Could not restore sample velocity");
                Err(e)
            }
        }
    }
}
