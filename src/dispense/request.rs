//! Dispense request value object.

use std::fmt;
use std::str::FromStr;

use crate::error::AppResult;
use crate::hardware::valve::ValvePort;
use crate::pump::handle::{check_volume, VOLUME_EPSILON};

/// "Move `volume` ml of reagent through `pump`, from `source` to `destination`."
///
/// Requests are never edited in place; splitting produces new values via
/// [`DispenseRequest::with_volume`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseRequest {
    pump: String,
    volume: f64,
    source: ValvePort,
    destination: ValvePort,
}

impl DispenseRequest {
    /// Request with explicit valves. Fails on negative or non-finite volumes.
    pub fn new(
        pump: impl Into<String>,
        volume: f64,
        source: ValvePort,
        destination: ValvePort,
    ) -> AppResult<Self> {
        let pump = pump.into();
        check_volume(&pump, volume)?;
        Ok(Self {
            pump,
            volume,
            source,
            destination,
        })
    }

    /// Reagent request using the default stock route: draw from extra, push to inlet.
    pub fn reagent(pump: impl Into<String>, volume: f64) -> AppResult<Self> {
        Self::new(pump, volume, ValvePort::Extra, ValvePort::Inlet)
    }

    /// Same pump and valves, different volume.
    pub fn with_volume(&self, volume: f64) -> Self {
        Self {
            pump: self.pump.clone(),
            volume,
            source: self.source,
            destination: self.destination,
        }
    }

    /// Target pump name.
    pub fn pump(&self) -> &str {
        &self.pump
    }

    /// Requested volume in ml.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Valve to aspirate through.
    pub fn source(&self) -> ValvePort {
        self.source
    }

    /// Valve to deliver through.
    pub fn destination(&self) -> ValvePort {
        self.destination
    }

    /// A zero-volume request must never reach the hardware.
    pub fn is_noop(&self) -> bool {
        self.volume <= VOLUME_EPSILON
    }
}

impl fmt::Display for DispenseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}ml ({} -> {})",
            self.pump, self.volume, self.source, self.destination
        )
    }
}

/// Parses `pump=ml` or `pump=ml:source:destination`, e.g. `acid=4.5` or `acid=4.5:I:O`.
impl FromStr for DispenseRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pump, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected PUMP=ML[:SOURCE:DEST], got '{}'", s))?;
        let mut parts = rest.split(':');
        let volume: f64 = parts
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|e| format!("bad volume in '{}': {}", s, e))?;

        let (source, destination) = match (parts.next(), parts.next(), parts.next()) {
            (None, None, None) => (ValvePort::Extra, ValvePort::Inlet),
            (Some(src), Some(dst), None) => (src.parse()?, dst.parse()?),
            _ => return Err(format!("expected PUMP=ML[:SOURCE:DEST], got '{}'", s)),
        };

        DispenseRequest::new(pump.trim(), volume, source, destination).map_err(|e| e.to_string())
    }
}
