//! The shared bounded counter.

use std::sync::atomic::{AtomicU32, Ordering};

/// Largest value the counter reaches before wrapping to zero.
pub const COUNTER_MAX: u32 = 100_000;

/// Successor of `value` under the wrap law: `COUNTER_MAX` (or anything
/// above it) goes to 0, everything else to `value + 1`.
pub const fn next_value(value: u32) -> u32 {
    if value >= COUNTER_MAX { 0 } else { value + 1 }
}

/// Process-wide counter in `[0, COUNTER_MAX]`.
///
/// Only the counter clock calls [`advance`](Self::advance); everyone else
/// reads.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU32,
}

impl Counter {
    /// A counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter starting at `value`, clamped into range.
    pub fn starting_at(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value.min(COUNTER_MAX)),
        }
    }

    /// Current value.
    pub fn current(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Step the counter once and return the new value.
    pub fn advance(&self) -> u32 {
        // The closure never returns `None`, so both arms carry the old value.
        match self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(next_value(v)))
        {
            Ok(prev) | Err(prev) => next_value(prev),
        }
    }
}
