//! Custom error types for the crate.
//!
//! This module defines the primary error type, `FluidicsError`. Using the `thiserror`
//! crate, it gives the registry, the scheduler and the protocol library one consistent
//! way to report failures up the call chain.
//!
//! ## Error Hierarchy
//!
//! - **`UnknownPump`**: A logical pump name was not found in the registry. Fatal to the
//!   call that asked for it; nothing is retried.
//! - **`InvalidVolumeRequest`**: A volume that cannot be honoured without breaking the
//!   plunger invariant (negative or NaN volumes, asking to deliver more than is held,
//!   aspirating past capacity). Volumes are never silently clamped.
//! - **`DeviceCommunication`**: The link to a pump failed. Propagated unchanged, since
//!   re-issuing a partially executed move could double-dispense.
//! - **`IdleTimeout`**: A barrier poll exceeded the configured idle timeout. Only
//!   raised when a timeout has been configured.
//! - **`Config`** / **`Configuration`**: Loading errors from `figment` and semantic
//!   validation errors respectively.
//!
//! By using `#[from]`, `FluidicsError` can be created from `figment::Error` with `?`.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, FluidicsError>;

/// Errors raised by the pump layer, the scheduler and the protocol library.
#[derive(Error, Debug)]
pub enum FluidicsError {
    /// Pump name absent from the registry.
    #[error("Unknown pump: '{0}'")]
    UnknownPump(String),

    /// Volume request that would violate the plunger invariant.
    #[error("Invalid volume request: {0}")]
    InvalidVolumeRequest(String),

    /// Hardware link failure reported by a pump driver.
    #[error("Device communication error on pump '{pump}': {message}")]
    DeviceCommunication {
        /// Pump whose link failed.
        pump: String,
        /// Driver-supplied description.
        message: String,
    },

    /// Pump did not report idle within the configured timeout.
    #[error("Pump '{pump}' did not become idle within {timeout:?}")]
    IdleTimeout {
        /// Pump that stalled the barrier.
        pump: String,
        /// Configured timeout that elapsed.
        timeout: Duration,
    },

    /// Configuration names a driver kind with no registered factory.
    #[error("No pump driver registered for kind '{0}'")]
    UnknownPumpKind(String),

    /// Failure reported by the spectrum acquisition collaborator.
    #[error("Spectrometer error: {0}")]
    Spectrometer(String),

    /// Configuration file or environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl FluidicsError {
    /// Build a `DeviceCommunication` error for the named pump.
    pub fn device(pump: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceCommunication {
            pump: pump.into(),
            message: message.into(),
        }
    }
}
