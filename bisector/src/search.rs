//! Search lifecycle: bootstrap, the in-process probe loop, and outcomes.
//!
//! External mode (the CLI) drives [`crate::step::advance_search`] one verdict
//! per process; everything here serves the in-process mode, where a single
//! process owns the whole search and the workload is a closure.

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::types::{Cursor, Verdict};
use crate::session::BisectSession;
use crate::step::{StepOutcome, advance_search};

/// Where the search localized the issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Every backend probed clean; the issue never reproduced.
    NotFound,
    /// The issue is in `backend`, but no subsystem within it claimed it
    /// (or it has none).
    Backend { backend: String },
    /// The issue is pinned to one guarded call of one subsystem.
    Call {
        backend: String,
        subsystem: String,
        culprit: u64,
        diagnostic: Option<String>,
    },
}

impl SearchOutcome {
    /// Names identifying the located component, outermost first. Empty when
    /// the issue was not found.
    pub fn path(&self) -> Vec<&str> {
        match self {
            Self::NotFound => Vec::new(),
            Self::Backend { backend } => vec![backend.as_str()],
            Self::Call {
                backend, subsystem, ..
            } => vec![backend.as_str(), subsystem.as_str()],
        }
    }

    /// Settled call ordinal, when the search got that far.
    pub fn culprit_index(&self) -> Option<u64> {
        match self {
            Self::Call { culprit, .. } => Some(*culprit),
            Self::NotFound | Self::Backend { .. } => None,
        }
    }
}

/// Reset any previous search and point the cursor at the first backend.
///
/// Returns the selected backend name.
pub fn start_search(session: &BisectSession) -> Result<String> {
    session.clear_state()?;
    let first = session
        .config()
        .first_backend()
        .ok_or_else(|| anyhow!("config lists no backends"))?
        .name
        .clone();
    session.set_cursor(&Cursor::backend(&first))?;
    info!(backend = %first, "bisection started");
    Ok(first)
}

/// Run the whole search in this process.
///
/// `probe` runs the workload once and reports whether it behaved correctly;
/// during the call the workload consults [`BisectSession::should_suppress`]
/// and [`BisectSession::cursor`] on the same session. All persisted state is
/// removed when this returns or unwinds, so an aborted search does not leak a
/// half-finished state directory into later runs.
pub fn run_search(
    session: &BisectSession,
    mut probe: impl FnMut() -> bool,
) -> Result<SearchOutcome> {
    let _cleanup = SessionCleanup { session };
    start_search(session)?;

    loop {
        session.begin_probe();
        let verdict = if probe() { Verdict::Good } else { Verdict::Bad };
        match advance_search(session, verdict)? {
            StepOutcome::Continue(next) => {
                debug!(
                    backend = %next.backend,
                    subsystem = ?next.subsystem,
                    run_state = ?next.run_state,
                    "probing again"
                );
            }
            StepOutcome::Concluded(outcome) => return Ok(outcome),
        }
    }
}

/// Removes persisted search state when the in-process search ends, however
/// it ends.
struct SessionCleanup<'a> {
    session: &'a BisectSession,
}

impl Drop for SessionCleanup<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.session.clear_state() {
            warn!(error = %err, "failed to clear bisection state");
        }
    }
}
