//! Name → pump lookup table.
//!
//! Built once at start-up, either by hand with [`PumpRegistry::with_pump`] or from a
//! [`RigConfig`] through driver factories keyed by `kind`. After construction the set
//! of pumps is read-only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{PumpDefinition, RigConfig};
use crate::error::{AppResult, FluidicsError};
use crate::hardware::capabilities::SyringePump;
use crate::hardware::mock::{CommandJournal, MockPump};
use crate::pump::handle::PumpHandle;

type PumpFactory =
    Box<dyn Fn(&PumpDefinition) -> AppResult<Arc<dyn SyringePump>> + Send + Sync>;

/// Driver factories keyed by the `kind` field of a pump definition.
pub struct PumpFactories {
    factories: HashMap<String, PumpFactory>,
}

impl Default for PumpFactories {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpFactories {
    /// Factories with the simulated `mock` kind registered.
    pub fn new() -> Self {
        Self::with_journal(CommandJournal::new())
    }

    /// Like [`PumpFactories::new`], with every mock recording into `journal`.
    pub fn with_journal(journal: CommandJournal) -> Self {
        let mut factories: HashMap<String, PumpFactory> = HashMap::new();

        factories.insert(
            "mock".to_string(),
            Box::new(move |def| {
                let pump = MockPump::new(def.name.clone(), def.capacity_ml)
                    .with_timing(Duration::from_millis(def.mock_move_ms), Duration::ZERO)
                    .with_velocity(def.default_velocity)
                    .with_journal(journal.clone());
                Ok(Arc::new(pump) as Arc<dyn SyringePump>)
            }),
        );

        Self { factories }
    }

    /// Register a driver kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&PumpDefinition) -> AppResult<Arc<dyn SyringePump>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Instantiate the driver for one definition.
    pub fn create(&self, def: &PumpDefinition) -> AppResult<Arc<dyn SyringePump>> {
        self.factories
            .get(&def.kind)
            .ok_or_else(|| FluidicsError::UnknownPumpKind(def.kind.clone()))
            .and_then(|factory| factory(def))
    }
}

/// Registry of named pumps.
#[derive(Debug, Default, Clone)]
pub struct PumpRegistry {
    pumps: HashMap<String, PumpHandle>,
    order: Vec<String>,
}

impl PumpRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pump while building the registry. A repeated name replaces the earlier
    /// entry but keeps its position.
    pub fn with_pump(mut self, name: impl Into<String>, device: Arc<dyn SyringePump>) -> Self {
        let name = name.into();
        if !self.pumps.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.pumps
            .insert(name.clone(), PumpHandle::new(name.as_str(), device));
        self
    }

    /// Build every configured pump and apply its default velocity.
    pub async fn from_config(config: &RigConfig, factories: &PumpFactories) -> AppResult<Self> {
        let mut registry = Self::new();
        for def in &config.pumps {
            let device = factories.create(def)?;
            device.set_velocity(def.default_velocity).await?;
            info!(
                pump = %def.name,
                kind = %def.kind,
                address = %def.address,
                capacity_ml = def.capacity_ml,
                "Registered pump"
            );
            registry = registry.with_pump(def.name.clone(), device);
        }
        Ok(registry)
    }

    /// Resolve a pump by name.
    pub fn resolve(&self, name: &str) -> AppResult<PumpHandle> {
        self.pumps
            .get(name)
            .cloned()
            .ok_or_else(|| FluidicsError::UnknownPump(name.to_string()))
    }

    /// Capacity of a named pump.
    pub fn capacity(&self, name: &str) -> AppResult<f64> {
        Ok(self.resolve(name)?.capacity())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of registered pumps.
    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    /// True if no pumps are registered.
    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_pump() {
        let registry = PumpRegistry::new().with_pump("acid", Arc::new(MockPump::new("acid", 5.0)));
        assert!(registry.resolve("acid").is_ok());
        let err = registry.resolve("base").unwrap_err();
        assert!(matches!(err, FluidicsError::UnknownPump(ref name) if name == "base"));
    }

    #[test]
    fn test_names_keep_registration_order() {
        let registry = PumpRegistry::new()
            .with_pump("silver", Arc::new(MockPump::new("silver", 5.0)))
            .with_pump("gold", Arc::new(MockPump::new("gold", 5.0)))
            .with_pump("silver", Arc::new(MockPump::new("silver", 2.5)));
        assert_eq!(registry.names(), ["silver".to_string(), "gold".to_string()]);
        assert_eq!(registry.capacity("silver").unwrap(), 2.5);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_from_config_builds_mocks() {
        let config = RigConfig {
            pumps: vec![
                PumpDefinition::mock("sample", 12.5),
                PumpDefinition::mock("acid", 5.0),
            ],
            ..Default::default()
        };
        let registry = PumpRegistry::from_config(&config, &PumpFactories::new())
            .await
            .unwrap();
        let sample = registry.resolve("sample").unwrap();
        assert_eq!(sample.capacity(), 12.5);
        assert_eq!(sample.velocity().await.unwrap(), 8000);
    }

    #[tokio::test]
    async fn test_from_config_unknown_kind() {
        let mut def = PumpDefinition::mock("sample", 12.5);
        def.kind = "c3000".to_string();
        let config = RigConfig {
            pumps: vec![def],
            ..Default::default()
        };
        let result = PumpRegistry::from_config(&config, &PumpFactories::new()).await;
        assert!(matches!(result, Err(FluidicsError::UnknownPumpKind(_))));
    }

    #[tokio::test]
    async fn test_custom_factory() {
        let mut factories = PumpFactories::new();
        factories.register("half", |def| {
            Ok(Arc::new(MockPump::new(def.name.clone(), def.capacity_ml / 2.0))
                as Arc<dyn SyringePump>)
        });
        let mut def = PumpDefinition::mock("acid", 10.0);
        def.kind = "half".to_string();
        let config = RigConfig {
            pumps: vec![def],
            ..Default::default()
        };
        let registry = PumpRegistry::from_config(&config, &factories).await.unwrap();
        assert_eq!(registry.capacity("acid").unwrap(), 5.0);
    }
}
