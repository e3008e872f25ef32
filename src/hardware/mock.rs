//! Mock Hardware Implementations
//!
//! Provides simulated syringe pumps for testing and dry runs without physical hardware.
//! All timing uses `tokio::time`, so the pumps behave like real fire-and-poll devices:
//! a command returns immediately and the pump reports busy until its move has elapsed.
//!
//! # Available Mocks
//!
//! - `MockPump` - Simulated syringe pump with configurable move timing
//! - `CommandJournal` - Shared, ordered record of every command sent to a set of mocks
//!
//! # Performance Characteristics
//!
//! - Default move time: 5ms fixed, no per-ml component
//! - Optional random jitter per move, so a batch finishes in a non-deterministic order

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::error::{AppResult, FluidicsError};
use crate::hardware::capabilities::SyringePump;
use crate::hardware::valve::ValvePort;
use crate::pump::handle::VOLUME_EPSILON;

// =============================================================================
// CommandJournal - ordered command log shared between mocks
// =============================================================================

/// What a mock pump was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpCommand {
    /// Aspirate command accepted.
    Aspirate {
        /// Volume in ml.
        volume: f64,
        /// Source port.
        valve: ValvePort,
    },
    /// Deliver command accepted.
    Deliver {
        /// Volume in ml.
        volume: f64,
        /// Destination port.
        valve: ValvePort,
    },
    /// Velocity changed.
    SetVelocity(u32),
}

/// One journal line.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// Pump the command was sent to.
    pub pump: String,
    /// The command itself.
    pub command: PumpCommand,
    /// When the command was accepted.
    pub issued_at: Instant,
    /// When the resulting move finishes (equal to `issued_at` for non-moves).
    pub completes_at: Instant,
}

impl JournalEntry {
    /// True for aspirate commands.
    pub fn is_aspirate(&self) -> bool {
        matches!(self.command, PumpCommand::Aspirate { .. })
    }

    /// True for deliver commands.
    pub fn is_deliver(&self) -> bool {
        matches!(self.command, PumpCommand::Deliver { .. })
    }

    /// Volume moved by this command, zero for non-moves.
    pub fn volume(&self) -> f64 {
        match self.command {
            PumpCommand::Aspirate { volume, .. } | PumpCommand::Deliver { volume, .. } => volume,
            PumpCommand::SetVelocity(_) => 0.0,
        }
    }
}

/// Ordered record of commands accepted by any pump sharing this journal.
#[derive(Clone, Default)]
pub struct CommandJournal {
    entries: Arc<RwLock<Vec<JournalEntry>>>,
}

impl CommandJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, entry: JournalEntry) {
        self.entries.write().await.push(entry);
    }

    /// Snapshot of all entries in acceptance order.
    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.entries.read().await.clone()
    }

    /// Entries for a single pump.
    pub async fn entries_for(&self, pump: &str) -> Vec<JournalEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.pump == pump)
            .cloned()
            .collect()
    }

    /// Number of recorded commands.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Forget everything recorded so far.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

// =============================================================================
// MockPump - Simulated Syringe Pump
// =============================================================================

/// Mock syringe pump with realistic fire-and-poll timing
///
/// Simulates a syringe pump with:
/// - Fixed plus per-ml move duration
/// - Optional random jitter per move
/// - Plunger volume tracking with hard bounds
/// - Link failure and stall injection
///
/// # Example
///
/// ```rust,ignore
/// let pump = MockPump::new("acid", 5.0);
/// pump.aspirate(2.0, ValvePort::Extra).await?; // returns immediately
/// while !pump.is_idle().await? {}
/// assert_eq!(pump.current_volume().await?, 2.0);
/// ```
pub struct MockPump {
    name: String,
    capacity: f64,
    volume: RwLock<f64>,
    velocity: RwLock<u32>,
    busy_until: RwLock<Option<Instant>>,
    base_duration: Duration,
    per_ml: Duration,
    jitter: Duration,
    link_down: AtomicBool,
    stalled: AtomicBool,
    journal: CommandJournal,
}

impl MockPump {
    /// Create an empty mock pump with default timing and its own journal.
    pub fn new(name: impl Into<String>, capacity: f64) -> Self {
        Self {
            name: name.into(),
            capacity,
            volume: RwLock::new(0.0),
            velocity: RwLock::new(8000),
            busy_until: RwLock::new(None),
            base_duration: Duration::from_millis(5),
            per_ml: Duration::ZERO,
            jitter: Duration::ZERO,
            link_down: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            journal: CommandJournal::new(),
        }
    }

    /// Record commands into a shared journal.
    pub fn with_journal(mut self, journal: CommandJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Custom move timing: `base + per_ml * volume`.
    pub fn with_timing(mut self, base: Duration, per_ml: Duration) -> Self {
        self.base_duration = base;
        self.per_ml = per_ml;
        self
    }

    /// Add up to `jitter` of random extra time to each move.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Start with liquid already in the syringe.
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = RwLock::new(volume);
        self
    }

    /// Start at a given top velocity.
    pub fn with_velocity(mut self, velocity: u32) -> Self {
        self.velocity = RwLock::new(velocity);
        self
    }

    /// Simulate the serial link going down (or coming back).
    pub fn set_link_down(&self, down: bool) {
        self.link_down.store(down, Ordering::SeqCst);
    }

    /// Simulate a pump that never reports idle again.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Journal this pump records into.
    pub fn journal(&self) -> CommandJournal {
        self.journal.clone()
    }

    fn check_link(&self) -> AppResult<()> {
        if self.link_down.load(Ordering::SeqCst) {
            return Err(FluidicsError::device(&self.name, "no response from pump"));
        }
        Ok(())
    }

    fn move_duration(&self, volume: f64) -> Duration {
        let mut duration = self.base_duration + self.per_ml.mul_f64(volume.max(0.0));
        if !self.jitter.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_micros() as u64);
            duration += Duration::from_micros(extra);
        }
        duration
    }

    async fn start_move(&self, command: PumpCommand, volume: f64) -> AppResult<()> {
        let mut busy_until = self.busy_until.write().await;
        let now = Instant::now();
        if self.stalled.load(Ordering::SeqCst) || busy_until.map_or(false, |t| now < t) {
            return Err(FluidicsError::device(
                &self.name,
                "command rejected: pump busy",
            ));
        }

        let completes_at = now + self.move_duration(volume);
        *busy_until = Some(completes_at);
        debug!(pump = %self.name, ?command, "MockPump: command accepted");

        self.journal
            .record(JournalEntry {
                pump: self.name.clone(),
                command,
                issued_at: now,
                completes_at,
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl SyringePump for MockPump {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> f64 {
        self.capacity
    }

    async fn current_volume(&self) -> AppResult<f64> {
        self.check_link()?;
        Ok(*self.volume.read().await)
    }

    async fn aspirate(&self, volume: f64, valve: ValvePort) -> AppResult<()> {
        self.check_link()?;
        let held = *self.volume.read().await;
        if held + volume > self.capacity + VOLUME_EPSILON {
            return Err(FluidicsError::device(
                &self.name,
                format!(
                    "plunger overrun: {:.3}ml held + {:.3}ml > {:.3}ml",
                    held, volume, self.capacity
                ),
            ));
        }

        self.start_move(PumpCommand::Aspirate { volume, valve }, volume)
            .await?;
        *self.volume.write().await = (held + volume).min(self.capacity);
        Ok(())
    }

    async fn deliver(&self, volume: f64, valve: ValvePort) -> AppResult<()> {
        self.check_link()?;
        let held = *self.volume.read().await;
        if volume > held + VOLUME_EPSILON {
            return Err(FluidicsError::device(
                &self.name,
                format!("plunger underrun: {:.3}ml held < {:.3}ml", held, volume),
            ));
        }

        self.start_move(PumpCommand::Deliver { volume, valve }, volume)
            .await?;
        *self.volume.write().await = (held - volume).max(0.0);
        Ok(())
    }

    async fn is_idle(&self) -> AppResult<bool> {
        self.check_link()?;
        if self.stalled.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let busy_until = *self.busy_until.read().await;
        Ok(busy_until.map_or(true, |t| Instant::now() >= t))
    }

    async fn set_velocity(&self, velocity: u32) -> AppResult<()> {
        self.check_link()?;
        *self.velocity.write().await = velocity;
        let now = Instant::now();
        self.journal
            .record(JournalEntry {
                pump: self.name.clone(),
                command: PumpCommand::SetVelocity(velocity),
                issued_at: now,
                completes_at: now,
            })
            .await;
        Ok(())
    }

    async fn velocity(&self) -> AppResult<u32> {
        self.check_link()?;
        Ok(*self.velocity.read().await)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
