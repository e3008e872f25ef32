//! Rig configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/rig.toml` (or an explicit path)
//! 2. Environment variables prefixed with `RIGFLUIDICS_`, nested keys separated by `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! RIGFLUIDICS_APPLICATION__LOG_LEVEL=debug
//! RIGFLUIDICS_SCHEDULER__IDLE_TIMEOUT_MS=30000
//! RIGFLUIDICS_PROTOCOLS__UV_IR_CLEANING_CYCLES=3
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rig_fluidics::config::RigConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RigConfig::load_from("config/rig.toml")?;
//!     println!("Pumps: {}", config.pumps.len());
//!     Ok(())
//! }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::dispense::splitter::SplitPolicy;
use crate::error::{AppResult, FluidicsError};
use crate::pump::handle::IdleWait;

/// Top-level rig configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Dispense scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Protocol library settings
    #[serde(default)]
    pub protocols: ProtocolConfig,
    /// Pump definitions, in registry order
    #[serde(default)]
    pub pumps: Vec<PumpDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Dispense scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between idle polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Barrier timeout in milliseconds (0 = wait forever)
    #[serde(default)]
    pub idle_timeout_ms: u64,
    /// Capacity the splitter cuts requests against
    #[serde(default)]
    pub split_policy: SplitPolicy,
    /// Pump used by `take_sample`
    #[serde(default = "default_sample_pump")]
    pub sample_pump: String,
    /// Pauses applied after delivering from specific pumps
    #[serde(default = "default_settle_rules")]
    pub settle: Vec<SettleRule>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            idle_timeout_ms: 0,
            split_policy: SplitPolicy::default(),
            sample_pump: default_sample_pump(),
            settle: default_settle_rules(),
        }
    }
}

impl SchedulerConfig {
    /// Idle-wait parameters derived from this configuration.
    pub fn idle_wait(&self) -> IdleWait {
        IdleWait {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms)),
        }
    }

    /// Settle pauses keyed by pump name.
    pub fn settle_durations(&self) -> HashMap<String, Duration> {
        self.settle
            .iter()
            .filter(|rule| rule.seconds.is_finite() && rule.seconds >= 0.0)
            .map(|rule| (rule.pump.clone(), Duration::from_secs_f64(rule.seconds)))
            .collect()
    }
}

/// Pause inserted after a pump delivers, letting a reaction proceed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleRule {
    /// Pump whose delivery triggers the pause
    pub pump: String,
    /// Pause length in seconds
    pub seconds: f64,
}

/// Protocol library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Water/solvent passes through the UV/IR lines per cleaning
    #[serde(default = "default_cleaning_cycles")]
    pub uv_ir_cleaning_cycles: u32,
    /// Purge passes per pump in the finishing clean
    #[serde(default = "default_finishing_passes")]
    pub finishing_passes: u32,
    /// Pump carrying water / moving vial contents to waste
    #[serde(default = "default_cleaning_pump")]
    pub cleaning_pump: String,
    /// Pump carrying aqua regia
    #[serde(default = "default_acid_pump")]
    pub acid_pump: String,
    /// Pump carrying the reductant
    #[serde(default = "default_reductant_pump")]
    pub reductant_pump: String,
    /// Sample pump velocity while drawing into the spectrometer line
    #[serde(default = "default_slow_sample_velocity")]
    pub slow_sample_velocity: u32,
    /// Sample pump velocity restored after a slow draw
    #[serde(default = "default_velocity")]
    pub sample_velocity: u32,
    /// Reagent pumps primed by the standard preflush, in order
    #[serde(default = "default_preflush_pumps")]
    pub preflush_pumps: Vec<String>,
    /// Volume each reagent line is primed with, in ml
    #[serde(default = "default_preflush_ml")]
    pub preflush_ml: f64,
    /// Water cycled through the cleaning pump's extra port after the reagents, in ml
    #[serde(default = "default_preflush_cleaning_ml")]
    pub preflush_cleaning_ml: f64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            uv_ir_cleaning_cycles: default_cleaning_cycles(),
            finishing_passes: default_finishing_passes(),
            cleaning_pump: default_cleaning_pump(),
            acid_pump: default_acid_pump(),
            reductant_pump: default_reductant_pump(),
            slow_sample_velocity: default_slow_sample_velocity(),
            sample_velocity: default_velocity(),
            preflush_pumps: default_preflush_pumps(),
            preflush_ml: default_preflush_ml(),
            preflush_cleaning_ml: default_preflush_cleaning_ml(),
        }
    }
}

/// Pump definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpDefinition {
    /// Logical pump name
    pub name: String,
    /// Driver kind, resolved through the registry's factories
    #[serde(default = "default_pump_kind")]
    pub kind: String,
    /// Device address on the bus
    #[serde(default = "default_address")]
    pub address: String,
    /// Syringe capacity in ml
    pub capacity_ml: f64,
    /// Top velocity applied at start-up
    #[serde(default = "default_velocity")]
    pub default_velocity: u32,
    /// Simulated move time for mock pumps, in milliseconds
    #[serde(default = "default_mock_move")]
    pub mock_move_ms: u64,
}

impl PumpDefinition {
    /// Mock pump definition with default timing.
    pub fn mock(name: impl Into<String>, capacity_ml: f64) -> Self {
        Self {
            name: name.into(),
            kind: default_pump_kind(),
            address: default_address(),
            capacity_ml,
            default_velocity: default_velocity(),
            mock_move_ms: default_mock_move(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "fluidics rig".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    50
}

fn default_sample_pump() -> String {
    "sample".to_string()
}

fn default_settle_rules() -> Vec<SettleRule> {
    vec![SettleRule {
        pump: "reductant".to_string(),
        seconds: 25.0,
    }]
}

fn default_cleaning_cycles() -> u32 {
    2
}

fn default_finishing_passes() -> u32 {
    2
}

fn default_cleaning_pump() -> String {
    "cleaning".to_string()
}

fn default_acid_pump() -> String {
    "regia".to_string()
}

fn default_reductant_pump() -> String {
    "reductant".to_string()
}

fn default_slow_sample_velocity() -> u32 {
    5000
}

fn default_preflush_pumps() -> Vec<String> {
    ["silver", "surfactant", "gold", "reductant", "seeds"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_preflush_ml() -> f64 {
    1.5
}

fn default_preflush_cleaning_ml() -> f64 {
    10.0
}

fn default_pump_kind() -> String {
    "mock".to_string()
}

fn default_address() -> String {
    "0".to_string()
}

fn default_velocity() -> u32 {
    8000
}

fn default_mock_move() -> u64 {
    20
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl RigConfig {
    /// Load configuration from `config/rig.toml` and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/rig.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence (highest first): `RIGFLUIDICS_` environment variables, the TOML
    /// file, built-in defaults. The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RIGFLUIDICS_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(toml_str: &str) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::string(toml_str))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration back to TOML.
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| FluidicsError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Pump names are non-empty and unique
    /// - Capacities are finite and positive
    /// - Settle pauses are finite and non-negative
    /// - The sample pump is declared (when any pumps are declared)
    /// - Cycle counts are at least 1
    /// - Preflush volumes are finite and non-negative
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(FluidicsError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for pump in &self.pumps {
            if pump.name.trim().is_empty() {
                return Err(FluidicsError::Configuration(
                    "Pump name must not be empty".to_string(),
                ));
            }
            if !names.insert(pump.name.as_str()) {
                return Err(FluidicsError::Configuration(format!(
                    "Duplicate pump name: '{}'",
                    pump.name
                )));
            }
            if !pump.capacity_ml.is_finite() || pump.capacity_ml <= 0.0 {
                return Err(FluidicsError::Configuration(format!(
                    "Pump '{}' has invalid capacity {}ml",
                    pump.name, pump.capacity_ml
                )));
            }
        }

        for rule in &self.scheduler.settle {
            if !rule.seconds.is_finite() || rule.seconds < 0.0 {
                return Err(FluidicsError::Configuration(format!(
                    "Settle pause for '{}' must be a non-negative number of seconds",
                    rule.pump
                )));
            }
        }

        if !self.pumps.is_empty() && !names.contains(self.scheduler.sample_pump.as_str()) {
            return Err(FluidicsError::Configuration(format!(
                "Sample pump '{}' is not declared in [[pumps]]",
                self.scheduler.sample_pump
            )));
        }

        if self.protocols.uv_ir_cleaning_cycles == 0 || self.protocols.finishing_passes == 0 {
            return Err(FluidicsError::Configuration(
                "Cleaning cycle counts must be at least 1".to_string(),
            ));
        }

        for (key, volume) in [
            ("preflush_ml", self.protocols.preflush_ml),
            ("preflush_cleaning_ml", self.protocols.preflush_cleaning_ml),
        ] {
            if !volume.is_finite() || volume < 0.0 {
                return Err(FluidicsError::Configuration(format!(
                    "protocols.{} must be a non-negative volume, got {}",
                    key, volume
                )));
            }
        }

        Ok(())
    }

    /// Look up a pump definition by name.
    pub fn pump(&self, name: &str) -> Option<&PumpDefinition> {
        self.pumps.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[pumps]]
        name = "sample"
        capacity_ml = 12.5

        [[pumps]]
        name = "acid"
        capacity_ml = 5.0
        kind = "mock"
    "#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = RigConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.scheduler.poll_interval_ms, 50);
        assert_eq!(config.scheduler.split_policy, SplitPolicy::FullCapacity);
        assert_eq!(config.protocols.uv_ir_cleaning_cycles, 2);
        assert_eq!(config.pumps.len(), 2);
        assert_eq!(config.pump("acid").unwrap().default_velocity, 8000);
    }

    #[test]
    fn test_default_settle_is_reductant() {
        let config = RigConfig::from_toml_str(MINIMAL).unwrap();
        let settle = config.scheduler.settle_durations();
        assert_eq!(settle.get("reductant"), Some(&Duration::from_secs(25)));
    }

    #[test]
    fn test_idle_wait_zero_timeout_means_forever() {
        let config = RigConfig::default();
        assert!(config.scheduler.idle_wait().timeout.is_none());

        let mut config = RigConfig::default();
        config.scheduler.idle_timeout_ms = 1500;
        assert_eq!(
            config.scheduler.idle_wait().timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_rejects_duplicate_pump() {
        let toml = r#"
            [[pumps]]
            name = "sample"
            capacity_ml = 12.5
            [[pumps]]
            name = "sample"
            capacity_ml = 5.0
        "#;
        let err = RigConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate pump name"));
    }

    #[test]
    fn test_rejects_non_positive_capacity() {
        let toml = r#"
            [[pumps]]
            name = "sample"
            capacity_ml = 0.0
        "#;
        assert!(matches!(
            RigConfig::from_toml_str(toml),
            Err(FluidicsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_missing_sample_pump() {
        let toml = r#"
            [scheduler]
            sample_pump = "sipper"
            [[pumps]]
            name = "sample"
            capacity_ml = 12.5
        "#;
        let err = RigConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("sipper"));
    }

    #[test]
    fn test_standard_preflush_defaults() {
        let config = RigConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(
            config.protocols.preflush_pumps,
            ["silver", "surfactant", "gold", "reductant", "seeds"]
        );
        assert_eq!(config.protocols.preflush_ml, 1.5);
        assert_eq!(config.protocols.preflush_cleaning_ml, 10.0);
    }

    #[test]
    fn test_rejects_negative_preflush_volume() {
        let toml = r#"
            [protocols]
            preflush_ml = -0.5
        "#;
        let err = RigConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("preflush_ml"));
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let toml = r#"
            [application]
            log_level = "verbose"
        "#;
        assert!(RigConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_split_policy_parses() {
        let toml = r#"
            [scheduler]
            split_policy = "remaining_capacity"
        "#;
        let config = RigConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.scheduler.split_policy, SplitPolicy::RemainingCapacity);
    }

    #[test]
    fn test_round_trips_to_toml() {
        let config = RigConfig::from_toml_str(MINIMAL).unwrap();
        let rendered = config.to_toml_string().unwrap();
        let reparsed = RigConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed.pumps.len(), 2);
    }
}
