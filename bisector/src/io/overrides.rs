//! Environment overrides for manual control of the guard hook.
//!
//! Operators can pin the hook to one backend/subsystem, or suppress every
//! call past a fixed ordinal, without going through the search at all. Useful
//! for re-checking a finished bisection by hand.

use anyhow::{Context, Result};

pub const BACKEND_VAR: &str = "BISECTOR_BACKEND";
pub const SUBSYSTEM_VAR: &str = "BISECTOR_SUBSYSTEM";
pub const MAX_VAR: &str = "BISECTOR_MAX";

/// Overrides read from the environment at session construction.
///
/// `backend` and `subsystem` overlay the persisted cursor field by field;
/// `max_calls` bypasses the state machine entirely (suppress every call with
/// an ordinal above it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub backend: Option<String>,
    pub subsystem: Option<String>,
    pub max_calls: Option<u64>,
}

impl Overrides {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an injected lookup; tests pass a map instead of the real
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend = non_empty(lookup(BACKEND_VAR));
        let subsystem = non_empty(lookup(SUBSYSTEM_VAR));
        let max_calls = match non_empty(lookup(MAX_VAR)) {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("parse {MAX_VAR} '{raw}' as a call count"))?,
            ),
            None => None,
        };
        Ok(Self {
            backend,
            subsystem,
            max_calls,
        })
    }

    pub fn is_set(&self) -> bool {
        self.backend.is_some() || self.subsystem.is_some() || self.max_calls.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
