//! Shared deterministic types for the bisection core.
//!
//! These types define stable contracts between the guard hook, the state
//! machine, and the persistent store. They must remain deterministic and free
//! of I/O.

use serde::{Deserialize, Serialize};

/// Phase of the per-subsystem state machine.
///
/// Each `(backend, subsystem)` pair under investigation moves through these
/// phases in order. The value is persisted between probes, so the workload
/// process and the controlling process always agree on what a guarded call
/// should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Suppress every guarded call; decides whether the subsystem is implicated.
    TestDisable,
    /// Suppress nothing; the guard hook counts calls and records the range.
    FindMaxBounds,
    /// Binary search over the call-index range.
    Bisect,
}

/// Verdict of one probe of the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The workload behaved correctly under the active suppression policy.
    Good,
    /// The issue reproduced.
    Bad,
}

/// Inclusive call-index range the bisection is narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectRange {
    pub low: u64,
    pub high: u64,
}

impl BisectRange {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// Floor midpoint; calls with ordinals above it are suppressed during bisect.
    pub fn midpoint(&self) -> u64 {
        self.low + (self.high - self.low) / 2
    }

    /// A settled range pins the culprit to a single call index.
    pub fn is_settled(&self) -> bool {
        self.low == self.high
    }

    /// True once the range is small enough that diagnostics are worth caching.
    pub fn is_narrow(&self) -> bool {
        self.high - self.low <= 2
    }

    pub fn contains(&self, ordinal: u64) -> bool {
        self.low <= ordinal && ordinal <= self.high
    }
}

/// Position of the search: which backend, and optionally which subsystem
/// within it, is currently under test.
///
/// `subsystem: None` means the whole backend is being probed at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub backend: String,
    pub subsystem: Option<String>,
}

impl Cursor {
    pub fn backend(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            subsystem: None,
        }
    }

    pub fn subsystem(backend: impl Into<String>, subsystem: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            subsystem: Some(subsystem.into()),
        }
    }

    /// True when a guarded call site belongs to the position under test.
    pub fn matches(&self, backend: &str, subsystem: &str) -> bool {
        self.backend == backend && self.subsystem.as_deref() == Some(subsystem)
    }
}
