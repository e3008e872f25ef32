//! Typed handle over one registered pump.
//!
//! The handle is where the plunger invariant is enforced: every command is checked
//! against the pump's capacity and held volume before it is sent, so an over-ask is
//! refused here instead of being clamped by the device. Zero volumes never reach the
//! driver.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppResult, FluidicsError};
use crate::hardware::capabilities::SyringePump;
use crate::hardware::valve::ValvePort;

/// Slack for floating point comparisons on ml volumes.
pub const VOLUME_EPSILON: f64 = 1e-9;

/// How the scheduler waits for a pump to go idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleWait {
    /// Time between `is_idle` polls.
    pub poll_interval: Duration,
    /// Give up with `IdleTimeout` after this long; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for IdleWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            timeout: None,
        }
    }
}

/// Reject volumes that are negative, NaN or infinite.
pub fn check_volume(pump: &str, volume: f64) -> AppResult<()> {
    if !volume.is_finite() || volume < 0.0 {
        return Err(FluidicsError::InvalidVolumeRequest(format!(
            "pump '{}': volume must be a finite, non-negative ml value (got {})",
            pump, volume
        )));
    }
    Ok(())
}

/// Cheap, clonable reference to a registered pump.
#[derive(Clone)]
pub struct PumpHandle {
    name: Arc<str>,
    device: Arc<dyn SyringePump>,
}

impl fmt::Debug for PumpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PumpHandle")
            .field("name", &self.name)
            .field("capacity", &self.device.capacity())
            .finish()
    }
}

impl PumpHandle {
    /// Wrap a driver under a logical name.
    pub fn new(name: impl Into<Arc<str>>, device: Arc<dyn SyringePump>) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }

    /// Logical pump name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Syringe capacity in ml.
    pub fn capacity(&self) -> f64 {
        self.device.capacity()
    }

    /// Volume currently held, in ml.
    pub async fn current_volume(&self) -> AppResult<f64> {
        self.device.current_volume().await
    }

    /// Capacity not yet taken up by held liquid.
    pub async fn free_capacity(&self) -> AppResult<f64> {
        let held = self.current_volume().await?;
        Ok((self.capacity() - held).max(0.0))
    }

    /// Issue a non-blocking aspirate. Returns `false` if the volume was zero and
    /// nothing was sent.
    pub async fn start_aspirate(&self, volume: f64, valve: ValvePort) -> AppResult<bool> {
        check_volume(&self.name, volume)?;
        if volume <= VOLUME_EPSILON {
            return Ok(false);
        }

        let held = self.current_volume().await?;
        if held + volume > self.capacity() + VOLUME_EPSILON {
            warn!(pump = %self.name, held, volume, "Refusing aspirate past capacity");
            return Err(FluidicsError::InvalidVolumeRequest(format!(
                "pump '{}' holds {:.3}ml; aspirating {:.3}ml exceeds its {:.3}ml capacity",
                self.name,
                held,
                volume,
                self.capacity()
            )));
        }

        debug!(pump = %self.name, volume, valve = %valve, "aspirate");
        self.device.aspirate(volume, valve).await?;
        Ok(true)
    }

    /// Issue a non-blocking deliver. Returns `false` if the volume was zero and
    /// nothing was sent.
    pub async fn start_deliver(&self, volume: f64, valve: ValvePort) -> AppResult<bool> {
        check_volume(&self.name, volume)?;
        if volume <= VOLUME_EPSILON {
            return Ok(false);
        }

        let held = self.current_volume().await?;
        if volume > held + VOLUME_EPSILON {
            warn!(pump = %self.name, held, volume, "Refusing deliver beyond held volume");
            return Err(FluidicsError::InvalidVolumeRequest(format!(
                "pump '{}' holds {:.3}ml; cannot deliver {:.3}ml",
                self.name, held, volume
            )));
        }

        debug!(pump = %self.name, volume, valve = %valve, "deliver");
        self.device.deliver(volume, valve).await?;
        Ok(true)
    }

    /// Poll once.
    pub async fn is_idle(&self) -> AppResult<bool> {
        self.device.is_idle().await
    }

    /// Block until the pump reports idle, polling at `wait.poll_interval`.
    pub async fn wait_until_idle(&self, wait: &IdleWait) -> AppResult<()> {
        let poll = async {
            loop {
                if self.device.is_idle().await? {
                    return Ok(());
                }
                tokio::time::sleep(wait.poll_interval).await;
            }
        };

        match wait.timeout {
            None => poll.await,
            Some(timeout) => match tokio::time::timeout(timeout, poll).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(pump = %self.name, ?timeout, "Pump did not go idle in time");
                    Err(FluidicsError::IdleTimeout {
                        pump: self.name.to_string(),
                        timeout,
                    })
                }
            },
        }
    }

    /// Aspirate then deliver, waiting for each move to finish.
    pub async fn transfer_blocking(
        &self,
        volume: f64,
        source: ValvePort,
        destination: ValvePort,
        wait: &IdleWait,
    ) -> AppResult<()> {
        if self.start_aspirate(volume, source).await? {
            self.wait_until_idle(wait).await?;
        }
        if self.start_deliver(volume, destination).await? {
            self.wait_until_idle(wait).await?;
        }
        Ok(())
    }

    /// Set the pump's top velocity.
    pub async fn set_velocity(&self, velocity: u32) -> AppResult<()> {
        self.device.set_velocity(velocity).await
    }

    /// Current top velocity.
    pub async fn velocity(&self) -> AppResult<u32> {
        self.device.velocity().await
    }

    /// True if both handles point at the same device.
    pub fn same_device(&self, other: &PumpHandle) -> bool {
        Arc::ptr_eq(&self.device, &other.device)
    }
}
