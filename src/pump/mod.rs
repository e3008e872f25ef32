//! Pump handles and the registry that owns them.

pub mod handle;
pub mod registry;

pub use handle::{IdleWait, PumpHandle};
pub use registry::{PumpFactories, PumpRegistry};
