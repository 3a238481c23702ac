//! Identifier and timestamp types shared by every layer
//!
//! All identifiers are thin `u64`/`u32` newtypes so they cannot be mixed up
//! at call sites (a `TxId` is never accepted where a `ShardId` is expected).
//! - TxId: client-chosen transaction identifier, also used as the order id
//! - ShardId: tablet identity of the shard processing a request (the Origin)
//! - CoordinatorId: identity of a coordinator in the shard's domain
//! - Step: logical timestamp assigned by a coordinator
//! - StepWindow: `[min_step, max_step]` bound for placing a prepared transaction
//! - TableId / ColumnId: schema identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw value
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Raw value
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }
    };
}

id_newtype!(
    /// Transaction identifier chosen by the client
    TxId(u64)
);
id_newtype!(
    /// Tablet id of a shard
    ShardId(u64)
);
id_newtype!(
    /// Coordinator tablet id
    CoordinatorId(u64)
);
id_newtype!(
    /// Table identifier, unique within a domain
    TableId(u64)
);
id_newtype!(
    /// Column identifier, unique within a table
    ColumnId(u32)
);

/// Logical timestamp assigned by a coordinator
///
/// Immediate writes report `Step::ZERO`; distributed commits report the
/// step the coordinator planned them at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Step(pub u64);

impl Step {
    /// Step reported by immediate (non-distributed) writes
    pub const ZERO: Step = Step(0);

    /// Wrap a raw step value
    pub const fn new(raw: u64) -> Self {
        Step(raw)
    }

    /// Raw step value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Step `delta` steps later, saturating at `u64::MAX`
    pub const fn saturating_add(self, delta: u64) -> Self {
        Step(self.0.saturating_add(delta))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invalid step window bounds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// `min_step` must be strictly positive
    #[error("min step must be greater than zero")]
    ZeroMinStep,

    /// `max_step` must be strictly greater than `min_step`
    #[error("max step {max} must be greater than min step {min}")]
    Inverted {
        /// Requested min step
        min: u64,
        /// Requested max step
        max: u64,
    },
}

/// Inclusive bound within which a coordinator must place a transaction
///
/// Invariant: `min_step > 0` and `max_step > min_step`. The constructor is
/// the only way to build one, so every `StepWindow` in the system holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStepWindow")]
pub struct StepWindow {
    min_step: Step,
    max_step: Step,
}

#[derive(Deserialize)]
struct RawStepWindow {
    min_step: Step,
    max_step: Step,
}

impl TryFrom<RawStepWindow> for StepWindow {
    type Error = WindowError;

    fn try_from(raw: RawStepWindow) -> Result<Self, Self::Error> {
        StepWindow::new(raw.min_step, raw.max_step)
    }
}

impl StepWindow {
    /// Build a window, enforcing `0 < min_step < max_step`
    pub fn new(min_step: Step, max_step: Step) -> Result<Self, WindowError> {
        if min_step.0 == 0 {
            return Err(WindowError::ZeroMinStep);
        }
        if max_step <= min_step {
            return Err(WindowError::Inverted {
                min: min_step.0,
                max: max_step.0,
            });
        }
        Ok(StepWindow { min_step, max_step })
    }

    /// Earliest step the transaction may be planned at
    pub fn min_step(&self) -> Step {
        self.min_step
    }

    /// Latest step the transaction may be planned at
    pub fn max_step(&self) -> Step {
        self.max_step
    }

    /// True if `step` lies in `[min_step, max_step]`
    pub fn contains(&self, step: Step) -> bool {
        self.min_step <= step && step <= self.max_step
    }

    /// True once time `now` has passed the end of the window
    pub fn is_expired_at(&self, now: Step) -> bool {
        now > self.max_step
    }

    /// Intersection of two windows
    ///
    /// Returns `None` when the overlap is empty or collapses to a single
    /// step (which would not satisfy the window invariant).
    pub fn intersect(&self, other: &StepWindow) -> Option<StepWindow> {
        let min = self.min_step.max(other.min_step);
        let max = self.max_step.min(other.max_step);
        StepWindow::new(min, max).ok()
    }
}

impl fmt::Display for StepWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min_step, self.max_step)
    }
}

/// Physical tablet serving a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabletInfo {
    /// Tablet id of the shard
    pub tablet_id: ShardId,
}
