//! Symbolic valve positions.
//!
//! Reagent pumps sit on a 4-way valve (inlet, outlet, extra); the sample pump sits on a
//! 6-way valve whose numbered positions are wired to the sample line, seeds, the UV/IR
//! flow cell and two waste lines. The scheduler never interprets a port, it only hands
//! it to the driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a pump's distribution valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValvePort {
    /// 4-way inlet ("I").
    Inlet,
    /// 4-way outlet ("O").
    Outlet,
    /// 4-way extra port ("E").
    Extra,
    /// 6-way position 1.
    Port1,
    /// 6-way position 2.
    Port2,
    /// 6-way position 3.
    Port3,
    /// 6-way position 4.
    Port4,
    /// 6-way position 5.
    Port5,
    /// 6-way position 6.
    Port6,
}

impl ValvePort {
    /// Sample pump: waste line.
    pub const SAMPLE_WASTE: ValvePort = ValvePort::Port2;
    /// Sample pump: draw from the vial.
    pub const SAMPLE_INLET: ValvePort = ValvePort::Port3;
    /// Sample pump: seed stock.
    pub const SEEDS: ValvePort = ValvePort::Port4;
    /// Sample pump: UV/IR flow cell.
    pub const UV_IR: ValvePort = ValvePort::Port5;
    /// Sample pump: small-bore waste line.
    pub const SAMPLE_SMALL_WASTE: ValvePort = ValvePort::Port6;

    /// Code the driver expects for this position.
    pub fn code(&self) -> &'static str {
        match self {
            ValvePort::Inlet => "I",
            ValvePort::Outlet => "O",
            ValvePort::Extra => "E",
            ValvePort::Port1 => "1",
            ValvePort::Port2 => "2",
            ValvePort::Port3 => "3",
            ValvePort::Port4 => "4",
            ValvePort::Port5 => "5",
            ValvePort::Port6 => "6",
        }
    }

    /// Human readable wiring of the port, for log lines.
    pub fn describe(&self) -> &'static str {
        match self {
            ValvePort::Inlet => "Inlet",
            ValvePort::Outlet => "Outlet",
            ValvePort::Extra => "Extra",
            ValvePort::Port1 => "Port 1",
            ValvePort::Port2 => "Sample Waste",
            ValvePort::Port3 => "Sample Inlet",
            ValvePort::Port4 => "Seeds",
            ValvePort::Port5 => "UV/IR",
            ValvePort::Port6 => "Sample Waste (Small)",
        }
    }
}

impl fmt::Display for ValvePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ValvePort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "I" | "INLET" => Ok(ValvePort::Inlet),
            "O" | "OUTLET" => Ok(ValvePort::Outlet),
            "E" | "EXTRA" => Ok(ValvePort::Extra),
            "1" => Ok(ValvePort::Port1),
            "2" => Ok(ValvePort::Port2),
            "3" => Ok(ValvePort::Port3),
            "4" => Ok(ValvePort::Port4),
            "5" => Ok(ValvePort::Port5),
            "6" => Ok(ValvePort::Port6),
            other => Err(format!("unknown valve port '{}'", other)),
        }
    }
}
