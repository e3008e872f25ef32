//! Capability traits for fluidics hardware.
//!
//! A driver only has to honour this contract; the pump handle layer in
//! [`crate::pump`] adds the volume checks and idle waiting on top of it.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::hardware::valve::ValvePort;

/// Fire-and-poll interface to one syringe pump.
///
/// `aspirate` and `deliver` return as soon as the device has accepted the command;
/// completion is observed only by polling [`SyringePump::is_idle`]. Errors are
/// `FluidicsError::DeviceCommunication` when the link is down.
#[async_trait]
pub trait SyringePump: Send + Sync {
    /// Logical name the pump was registered under.
    fn name(&self) -> &str;

    /// Maximum syringe volume in ml.
    fn capacity(&self) -> f64;

    /// Volume currently held in the syringe, in ml.
    async fn current_volume(&self) -> AppResult<f64>;

    /// Start drawing `volume` ml through `valve`.
    async fn aspirate(&self, volume: f64, valve: ValvePort) -> AppResult<()>;

    /// Start expelling `volume` ml through `valve`.
    async fn deliver(&self, volume: f64, valve: ValvePort) -> AppResult<()>;

    /// Poll whether the last command has finished.
    async fn is_idle(&self) -> AppResult<bool>;

    /// Set the plunger top velocity (device steps per second).
    async fn set_velocity(&self, velocity: u32) -> AppResult<()>;

    /// Current top velocity.
    async fn velocity(&self) -> AppResult<u32>;
}
