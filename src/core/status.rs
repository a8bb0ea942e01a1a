//! Scheduler lifecycle status shared by callers and both loop threads.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle of a scheduler. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStatus {
    /// Accepting and dispatching mail.
    Running,
    /// Shutdown requested; loops are draining out.
    Closing,
    /// Both loops have exited.
    Closed,
}

impl SchedulerStatus {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Atomically updated status cell.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    /// A cell in [`SchedulerStatus::Running`].
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(SchedulerStatus::Running.to_u8()))
    }

    /// Current status.
    pub fn get(&self) -> SchedulerStatus {
        SchedulerStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Whether the scheduler is still running.
    pub fn is_running(&self) -> bool {
        self.get() == SchedulerStatus::Running
    }

    /// Move `Running → Closing`. Returns `false` if shutdown already began.
    pub fn begin_closing(&self) -> bool {
        self.0
            .compare_exchange(
                SchedulerStatus::Running.to_u8(),
                SchedulerStatus::Closing.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed`.
    pub fn mark_closed(&self) {
        self.0.store(SchedulerStatus::Closed.to_u8(), Ordering::Release);
    }
}
