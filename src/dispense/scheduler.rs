//! Dispense scheduler.
//!
//! Turns "dispense V ml of reagent R" into aspirate/deliver commands on bounded
//! syringes. Everything runs on the caller's task: commands are fire-and-poll, and the
//! only suspension points are the idle barriers and explicit settle pauses.
//!
//! - [`DispenseScheduler::transfer`]: one pump, blocking, split into strokes.
//! - [`DispenseScheduler::sequential_dispense`]: strict total order across requests.
//! - [`DispenseScheduler::parallel_dispense`]: concurrent aspirate, barrier, deliver
//!   (optionally one pump at a time), barrier, repeated per stroke-sized chunk.
//! - [`DispenseScheduler::take_sample`]: sample pump draw/push with carry-over tracking.
//!
//! Callers are responsible for serialising calls that touch the same pump; the
//! scheduler holds no lock around pump access.

use futures::future::try_join_all;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::dispense::request::DispenseRequest;
use crate::dispense::splitter::{chunk_volumes, split_batch, SplitPolicy};
use crate::error::{AppResult, FluidicsError};
use crate::hardware::valve::ValvePort;
use crate::pump::handle::{check_volume, IdleWait, PumpHandle, VOLUME_EPSILON};
use crate::pump::registry::PumpRegistry;

/// Orchestrates dispensing across the pumps of one registry.
#[derive(Debug, Clone)]
pub struct DispenseScheduler {
    registry: Arc<PumpRegistry>,
    wait: IdleWait,
    split_policy: SplitPolicy,
    sample_pump: String,
    settle: HashMap<String, Duration>,
}

impl DispenseScheduler {
    /// Scheduler with default settings: 50ms polls, no timeout, full-capacity splits,
    /// `sample` as the sample pump and a 25s pause after `reductant` deliveries.
    pub fn new(registry: Arc<PumpRegistry>) -> Self {
        Self::from_config(registry, &SchedulerConfig::default())
    }

    /// Scheduler configured from the `[scheduler]` section.
    pub fn from_config(registry: Arc<PumpRegistry>, config: &SchedulerConfig) -> Self {
        Self {
            registry,
            wait: config.idle_wait(),
            split_policy: config.split_policy,
            sample_pump: config.sample_pump.clone(),
            settle: config.settle_durations(),
        }
    }

    /// Override idle polling.
    pub fn with_idle_wait(mut self, wait: IdleWait) -> Self {
        self.wait = wait;
        self
    }

    /// Override the split policy.
    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.split_policy = policy;
        self
    }

    /// Override the pump used by `take_sample`.
    pub fn with_sample_pump(mut self, pump: impl Into<String>) -> Self {
        self.sample_pump = pump.into();
        self
    }

    /// Pause for `pause` after every delivery from `pump`.
    pub fn with_settle(mut self, pump: impl Into<String>, pause: Duration) -> Self {
        self.settle.insert(pump.into(), pause);
        self
    }

    /// Drop all settle pauses.
    pub fn without_settle(mut self) -> Self {
        self.settle.clear();
        self
    }

    /// Registry this scheduler drives.
    pub fn registry(&self) -> &PumpRegistry {
        &self.registry
    }

    /// Idle-wait parameters in use.
    pub fn idle_wait(&self) -> IdleWait {
        self.wait
    }

    /// Name of the sample pump.
    pub fn sample_pump(&self) -> &str {
        &self.sample_pump
    }

    /// Aspirate then deliver `volume` on one pump, returning once the liquid has
    /// physically moved. Volumes above one stroke are moved in stroke-sized chunks
    /// through the same valves. No other pump is touched.
    pub async fn transfer(
        &self,
        pump: &str,
        volume: f64,
        source: ValvePort,
        destination: ValvePort,
    ) -> AppResult<()> {
        let handle = self.registry.resolve(pump)?;
        check_volume(pump, volume)?;
        if volume <= VOLUME_EPSILON {
            debug!(pump, "Skipping zero-volume transfer");
            return Ok(());
        }

        let stroke = self.stroke_capacity(&handle).await?;
        let chunks = chunk_volumes(volume, stroke)?;
        info!(
            pump,
            volume_ml = volume,
            source = %source,
            destination = %destination,
            strokes = chunks.len(),
            "Transferring {}ml on {}",
            volume,
            pump
        );

        for chunk in chunks {
            handle
                .transfer_blocking(chunk, source, destination, &self.wait)
                .await?;
        }
        Ok(())
    }

    /// Run each request as a full transfer, in listed order. Request *i+1* is not
    /// started until request *i* has been delivered.
    pub async fn sequential_dispense(&self, requests: &[DispenseRequest]) -> AppResult<()> {
        for request in requests {
            if request.is_noop() {
                debug!(pump = request.pump(), "Skipping zero-volume request");
                continue;
            }
            info!(
                pump = request.pump(),
                volume_ml = request.volume(),
                "Dispensing {}: {}ml",
                request.pump(),
                request.volume()
            );
            self.transfer(
                request.pump(),
                request.volume(),
                request.source(),
                request.destination(),
            )
            .await?;
        }
        Ok(())
    }

    /// Aspirate on all pumps concurrently, wait for every one, then deliver.
    ///
    /// With `ordered` the deliveries run one pump at a time in listed order;
    /// otherwise all deliver commands are issued before the barrier. Requests larger
    /// than a stroke are finished by further aspirate/deliver cycles over the
    /// residuals, processed from a work queue. Returns once every requested ml has
    /// been delivered.
    ///
    /// Each pump may appear at most once per call; an unknown pump or a repeated pump
    /// fails before any command is sent.
    pub async fn parallel_dispense(
        &self,
        requests: &[DispenseRequest],
        ordered: bool,
    ) -> AppResult<()> {
        let active = self.resolve_active_set(requests)?;
        let mut queue: VecDeque<Vec<DispenseRequest>> = VecDeque::new();
        queue.push_back(requests.iter().filter(|r| !r.is_noop()).cloned().collect());

        let mut cycle = 0usize;
        while let Some(pending) = queue.pop_front() {
            if pending.is_empty() {
                continue;
            }

            let capacities = self.capacities(&active).await?;
            let batch = split_batch(&pending, &capacities)?;
            cycle += 1;
            debug!(
                cycle,
                executing = batch.execute.len(),
                deferred = batch.residual.len(),
                "Parallel dispense cycle"
            );

            self.run_cycle(&active, &batch.execute, ordered).await?;

            if !batch.residual.is_empty() {
                queue.push_back(batch.residual);
            }
        }

        Ok(())
    }

    /// Draw `vol_in` into the sample pump from `source`, push `vol_out` to
    /// `destination`, and return the change in held volume.
    ///
    /// With `vol_in >= vol_out` the return is `vol_in - vol_out`, the liquid left in
    /// the syringe for a later call. With `vol_out > vol_in` nothing is drawn: the
    /// syringe must already hold `vol_out`, which is pushed out, and `-vol_out` is
    /// returned. If it does not, the call fails with `InvalidVolumeRequest` before any
    /// command is sent.
    pub async fn take_sample(
        &self,
        vol_in: f64,
        vol_out: f64,
        source: ValvePort,
        destination: ValvePort,
    ) -> AppResult<f64> {
        let handle = self.registry.resolve(&self.sample_pump)?;
        check_volume(handle.name(), vol_in)?;
        check_volume(handle.name(), vol_out)?;

        if vol_out > vol_in + VOLUME_EPSILON {
            let held = handle.current_volume().await?;
            if vol_out > held + VOLUME_EPSILON {
                warn!(vol_in, vol_out, held, "Cannot pump volume");
                return Err(FluidicsError::InvalidVolumeRequest(format!(
                    "cannot pump volume. In: {} Out: {} (held: {})",
                    vol_in, vol_out, held
                )));
            }

            info!(
                "Pushing held sample: {}ml (OUT: {})",
                vol_out,
                destination.describe()
            );
            if handle.start_deliver(vol_out, destination).await? {
                handle.wait_until_idle(&self.wait).await?;
            }
            return Ok(-vol_out);
        }

        info!(
            "Taking sample: {}ml (IN: {}, OUT: {})",
            vol_in,
            source.describe(),
            destination.describe()
        );
        if handle.start_aspirate(vol_in, source).await? {
            handle.wait_until_idle(&self.wait).await?;
        }
        if handle.start_deliver(vol_out, destination).await? {
            handle.wait_until_idle(&self.wait).await?;
        }

        Ok(vol_in - vol_out)
    }

    /// Set a pump's top velocity.
    pub async fn set_pump_speed(&self, pump: &str, velocity: u32) -> AppResult<()> {
        let handle = self.registry.resolve(pump)?;
        debug!(pump, velocity, "Setting pump velocity");
        handle.set_velocity(velocity).await
    }

    /// Block until every named pump reports idle.
    pub async fn wait_until_idle(&self, pumps: &[&str]) -> AppResult<()> {
        let handles = pumps
            .iter()
            .map(|name| self.registry.resolve(name))
            .collect::<AppResult<Vec<_>>>()?;
        self.barrier(&handles).await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn resolve_active_set(&self, requests: &[DispenseRequest]) -> AppResult<Vec<PumpHandle>> {
        let mut seen = HashSet::new();
        let mut active = Vec::with_capacity(requests.len());
        for request in requests {
            let handle = self.registry.resolve(request.pump())?;
            if !seen.insert(request.pump().to_string()) {
                return Err(FluidicsError::InvalidVolumeRequest(format!(
                    "pump '{}' appears more than once in a parallel dispense",
                    request.pump()
                )));
            }
            active.push(handle);
        }
        Ok(active)
    }

    async fn stroke_capacity(&self, handle: &PumpHandle) -> AppResult<f64> {
        match self.split_policy {
            SplitPolicy::FullCapacity => Ok(handle.capacity()),
            SplitPolicy::RemainingCapacity => handle.free_capacity().await,
        }
    }

    async fn capacities(&self, active: &[PumpHandle]) -> AppResult<HashMap<String, f64>> {
        let mut capacities = HashMap::with_capacity(active.len());
        for handle in active {
            capacities.insert(handle.name().to_string(), self.stroke_capacity(handle).await?);
        }
        Ok(capacities)
    }

    fn handle_for<'a>(active: &'a [PumpHandle], pump: &str) -> AppResult<&'a PumpHandle> {
        active
            .iter()
            .find(|h| h.name() == pump)
            .ok_or_else(|| FluidicsError::UnknownPump(pump.to_string()))
    }

    async fn run_cycle(
        &self,
        active: &[PumpHandle],
        execute: &[DispenseRequest],
        ordered: bool,
    ) -> AppResult<()> {
        let mut moving: Vec<PumpHandle> = Vec::with_capacity(execute.len());
        for request in execute {
            let handle = Self::handle_for(active, request.pump())?;
            debug!(pump = request.pump(), volume_ml = request.volume(), "Aspirating");
            match handle
                .start_aspirate(request.volume(), request.source())
                .await
            {
                Ok(true) => moving.push(handle.clone()),
                Ok(false) => {}
                Err(e) => return Err(self.drain(&moving, e).await),
            }
        }

        self.barrier(active).await?;

        moving.clear();
        for request in execute {
            let handle = Self::handle_for(active, request.pump())?;
            info!(
                pump = request.pump(),
                volume_ml = request.volume(),
                "Dispensing {}: {}ml",
                request.pump(),
                request.volume()
            );
            match handle
                .start_deliver(request.volume(), request.destination())
                .await
            {
                Ok(true) => moving.push(handle.clone()),
                Ok(false) => {}
                Err(e) => return Err(self.drain(&moving, e).await),
            }

            self.settle_after(request.pump()).await;

            if ordered {
                handle.wait_until_idle(&self.wait).await?;
            }
        }

        self.barrier(active).await?;

        let delivered: Vec<String> = execute
            .iter()
            .map(|r| format!("{}={}ml", r.pump(), r.volume()))
            .collect();
        info!("Delivered {}", delivered.join(", "));
        Ok(())
    }

    /// A command failed mid-phase: let the pumps already moving finish before the
    /// error reaches the caller, so no follow-up command lands on a busy pump. The
    /// original error is returned unchanged.
    async fn drain(&self, moving: &[PumpHandle], error: FluidicsError) -> FluidicsError {
        warn!(%error, in_flight = moving.len(), "Command failed, waiting for moving pumps");
        if let Err(wait_error) = self.barrier(moving).await {
            warn!(error = %wait_error, "Moving pumps did not settle after failure");
        }
        error
    }

    async fn barrier(&self, active: &[PumpHandle]) -> AppResult<()> {
        debug!(pumps = active.len(), "Waiting for pumps to go idle");
        try_join_all(active.iter().map(|h| h.wait_until_idle(&self.wait))).await?;
        Ok(())
    }

    async fn settle_after(&self, pump: &str) {
        if let Some(pause) = self.settle.get(pump).copied() {
            if !pause.is_zero() {
                info!(pump, ?pause, "Settling after {}", pump);
                tokio::time::sleep(pause).await;
            }
        }
    }
}
