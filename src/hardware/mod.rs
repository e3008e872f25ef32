//! Hardware abstraction layer for the fluidics rig.
//!
//! - `capabilities` - the driver contract every pump implements
//! - `valve` - symbolic valve positions passed through to drivers
//! - `mock` - simulated pumps for tests and dry runs

pub mod capabilities;
pub mod mock;
pub mod valve;

pub use capabilities::SyringePump;
pub use mock::{CommandJournal, JournalEntry, MockPump, PumpCommand};
pub use valve::ValvePort;
