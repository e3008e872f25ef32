//! Capacity splitter.
//!
//! Pure function over a batch of requests: everything that fits in one syringe stroke
//! goes into `execute`, the overflow of each request goes into `residual` with the same
//! pump and valves. Running the splitter again on `residual` until it comes back empty
//! yields one stroke-sized chunk per pass.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::dispense::request::DispenseRequest;
use crate::error::{AppResult, FluidicsError};
use crate::pump::handle::VOLUME_EPSILON;

/// Which capacity a request is cut against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Full syringe capacity; assumes every batch starts from an empty syringe.
    #[default]
    FullCapacity,
    /// Capacity minus the volume already held.
    RemainingCapacity,
}

/// Output of one splitter pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitBatch {
    /// Requests to run now, in input order.
    pub execute: Vec<DispenseRequest>,
    /// Overflow to schedule on a later pass, in input order.
    pub residual: Vec<DispenseRequest>,
}

impl SplitBatch {
    /// True when nothing is left for a later pass.
    pub fn is_final(&self) -> bool {
        self.residual.is_empty()
    }
}

/// Split `requests` against per-pump stroke capacities.
///
/// Zero-volume requests are dropped. A pump missing from `capacities` is an
/// `UnknownPump`; a pump with no usable capacity, or a request needing more than
/// [`MAX_STROKES`] strokes, cannot make progress and is an `InvalidVolumeRequest`.
pub fn split_batch(
    requests: &[DispenseRequest],
    capacities: &HashMap<String, f64>,
) -> AppResult<SplitBatch> {
    let mut batch = SplitBatch::default();

    for request in requests {
        if request.is_noop() {
            continue;
        }

        let capacity = *capacities
            .get(request.pump())
            .ok_or_else(|| FluidicsError::UnknownPump(request.pump().to_string()))?;

        if capacity <= VOLUME_EPSILON {
            return Err(FluidicsError::InvalidVolumeRequest(format!(
                "pump '{}' has no free capacity for {}ml",
                request.pump(),
                request.volume()
            )));
        }
        stroke_count(request.volume(), capacity)?;

        let overflow = request.volume() - capacity;
        if overflow > VOLUME_EPSILON {
            batch.execute.push(request.with_volume(capacity));
            batch.residual.push(request.with_volume(overflow));
        } else {
            batch.execute.push(request.clone());
        }
    }

    Ok(batch)
}

/// Upper bound on syringe strokes for a single request. A request that needs more is
/// rejected before any command is sent; at this bound every residual is still exact
/// enough for the chunks to add back up to the requested volume.
pub const MAX_STROKES: u64 = 10_000;

/// Number of strokes of at most `capacity` needed to move `volume`.
pub fn stroke_count(volume: f64, capacity: f64) -> AppResult<u64> {
    if !volume.is_finite() || volume < 0.0 {
        return Err(FluidicsError::InvalidVolumeRequest(format!(
            "cannot split volume {}",
            volume
        )));
    }
    if !capacity.is_finite() || capacity <= VOLUME_EPSILON {
        return Err(FluidicsError::InvalidVolumeRequest(format!(
            "cannot split {}ml against capacity {}ml",
            volume, capacity
        )));
    }
    if volume <= VOLUME_EPSILON {
        return Ok(0);
    }

    let ratio = (volume / capacity).ceil();
    if ratio > MAX_STROKES as f64 {
        return Err(FluidicsError::InvalidVolumeRequest(format!(
            "{}ml needs more than {} strokes of {}ml",
            volume, MAX_STROKES, capacity
        )));
    }

    // the division can land one stroke off either side of an exact multiple
    let mut count = (ratio as u64).max(1);
    let last = |n: u64| volume - (n - 1) as f64 * capacity;
    if count > 1 && last(count) <= VOLUME_EPSILON {
        count -= 1;
    } else if last(count) > capacity + VOLUME_EPSILON {
        count += 1;
    }
    Ok(count)
}

/// Chunk sizes one pump moves for a single request: full strokes, then the remainder.
///
/// Produced lazily, so the stroke plan costs nothing up front.
#[derive(Debug, Clone)]
pub struct Strokes {
    volume: f64,
    capacity: f64,
    count: u64,
    next: u64,
}

impl Iterator for Strokes {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.count {
            return None;
        }
        self.next += 1;
        if self.next == self.count {
            Some(self.volume - (self.count - 1) as f64 * self.capacity)
        } else {
            Some(self.capacity)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Strokes {}

/// Chunk sizes one pump would move for `volume` with the given stroke capacity.
pub fn chunk_volumes(volume: f64, capacity: f64) -> AppResult<Strokes> {
    let count = stroke_count(volume, capacity)?;
    Ok(Strokes {
        volume,
        capacity,
        count,
        next: 0,
    })
}
