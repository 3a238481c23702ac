//! Domain time and step window derivation
//!
//! `StepClock` is the logical time shared by a coordinator and its shards.
//! The coordinator moves it forward when it plans a step; shards read it
//! to derive prepared windows and to detect expired transactions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stepshard_core::{Step, StepWindow, WindowError};

/// Shared, monotonically non-decreasing step counter
#[derive(Debug, Clone, Default)]
pub struct StepClock {
    now: Arc<AtomicU64>,
}

impl StepClock {
    /// Clock starting at `start`
    pub fn new(start: Step) -> Self {
        StepClock {
            now: Arc::new(AtomicU64::new(start.get())),
        }
    }

    /// Current step
    pub fn now(&self) -> Step {
        Step(self.now.load(Ordering::Acquire))
    }

    /// Move forward by `steps`, saturating at `u64::MAX`; returns the new
    /// time
    pub fn advance(&self, steps: u64) -> Step {
        let prev = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(steps))
            })
            .unwrap_or_else(|n| n);
        Step(prev.saturating_add(steps))
    }

    /// Move forward to at least `step`; never moves backwards
    pub fn advance_to(&self, step: Step) -> Step {
        let prev = self.now.fetch_max(step.get(), Ordering::AcqRel);
        Step(prev.max(step.get()))
    }
}

/// Derives the window a prepared transaction may be planned in
///
/// `min_step > 0` and `max_step > min_step` are enforced by `StepWindow`
/// itself; a policy that cannot produce a valid window returns the error.
pub trait StepWindowPolicy: Send + Sync {
    /// Window for a transaction prepared at time `now`
    fn window_at(&self, now: Step) -> Result<StepWindow, WindowError>;
}

/// Fixed-width lease starting at the next step
///
/// `min_step = now + 1`, `max_step = min_step + width`.
#[derive(Debug, Clone, Copy)]
pub struct LeaseWindowPolicy {
    width: u64,
}

impl LeaseWindowPolicy {
    /// Policy with the given width; a width of 0 is raised to 1
    pub fn new(width: u64) -> Self {
        LeaseWindowPolicy {
            width: width.max(1),
        }
    }

    /// Width in steps
    pub fn width(&self) -> u64 {
        self.width
    }
}

impl StepWindowPolicy for LeaseWindowPolicy {
    fn window_at(&self, now: Step) -> Result<StepWindow, WindowError> {
        // Saturate below u64::MAX so max_step > min_step still holds.
        let min = now.get().saturating_add(1).min(u64::MAX - 1);
        let max = min.saturating_add(self.width);
        StepWindow::new(Step(min), Step(max))
    }
}
