//! Core library for the fluidics rig.
//!
//! This library contains the pump dispensing scheduler and everything it stands on:
//! the hardware capability contract and simulated pumps, the pump registry, capacity
//! splitting, and the fixed cleaning and sampling routines built on top. It is used by
//! the `rig_fluidics` command line tool and by higher-level experiment orchestration.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rig_fluidics::{DispenseRequest, DispenseScheduler, MockPump, PumpRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = PumpRegistry::new()
//!         .with_pump("silver", Arc::new(MockPump::new("silver", 5.0)))
//!         .with_pump("gold", Arc::new(MockPump::new("gold", 5.0)));
//!     let scheduler = DispenseScheduler::new(Arc::new(registry));
//!
//!     scheduler
//!         .parallel_dispense(
//!             &[
//!                 DispenseRequest::reagent("silver", 2.0)?,
//!                 DispenseRequest::reagent("gold", 7.5)?,
//!             ],
//!             false,
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispense;
pub mod error;
pub mod hardware;
pub mod protocol;
pub mod pump;
pub mod tracing_init;

pub use config::RigConfig;
pub use dispense::{DispenseRequest, DispenseScheduler, SplitBatch, SplitPolicy};
pub use error::{AppResult, FluidicsError};
pub use hardware::{CommandJournal, MockPump, SyringePump, ValvePort};
pub use protocol::ProtocolLibrary;
pub use pump::{IdleWait, PumpFactories, PumpHandle, PumpRegistry};
