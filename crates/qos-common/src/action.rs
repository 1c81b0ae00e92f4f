//! Per-packet policing outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of policing and queue profile checks
///
/// Variants are declared in severity order so the derived `Ord` can be used
/// to pick the worse of two decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Action {
    /// Forward normally
    #[default]
    Pass = 0,
    /// Forward and emit a congestion notification
    Notify = 1,
    /// Drop silently
    Drop = 2,
    /// Drop and emit a notification
    #[serde(alias = "DROPNOTIFY")]
    DropNotify = 3,
}

impl Action {
    /// Merge two independent decisions; the more severe one wins.
    ///
    /// A drop paired with a notification escalates to `DropNotify`.
    #[inline]
    pub fn merge(self, other: Action) -> Action {
        match (self, other) {
            (Action::Drop, Action::Notify) | (Action::Notify, Action::Drop) => Action::DropNotify,
            (a, b) => a.max(b),
        }
    }

    /// Whether the packet should be enqueued
    #[inline]
    pub fn forwards(self) -> bool {
        matches!(self, Action::Pass | Action::Notify)
    }

    /// Whether a notification should be emitted
    #[inline]
    pub fn notifies(self) -> bool {
        matches!(self, Action::Notify | Action::DropNotify)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Pass => "PASS",
            Action::Notify => "NOTIFY",
            Action::Drop => "DROP",
            Action::DropNotify => "DROPNOTIFY",
        };
        f.write_str(s)
    }
}

/// Why a packet was dropped or flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Violation {
    /// Ingress policer ran out of tokens
    BandwidthExceeded,
    /// Queue profile tripped on fill level
    QueueCongested,
    /// Queue reached its maximum length
    QueueFull,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Violation::BandwidthExceeded => "bandwidth exceeded",
            Violation::QueueCongested => "queue congested",
            Violation::QueueFull => "queue full",
        };
        f.write_str(s)
    }
}
