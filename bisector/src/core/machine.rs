//! Per-subsystem state transitions for the bisection search.
//!
//! `advance_subsystem` is a pure function from (current phase, probe verdict,
//! persisted range) to the next move. Persisting the result is the caller's
//! job, which keeps every transition testable without touching disk.

use anyhow::{Result, anyhow};

use crate::core::types::{BisectRange, RunState, Verdict};

/// Outcome of applying one probe verdict to the subsystem under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemStep {
    /// Suppressing the whole subsystem did not fix the issue; it is cleared.
    NotCulprit,
    /// Suppression fixed the issue; the next probe measures the call range.
    MeasureBounds,
    /// Bounds measured; halving of the recorded range begins.
    StartBisect { range: BisectRange },
    /// Range halved but not settled; another probe is needed.
    Narrowed { range: BisectRange },
    /// Range settled on a single call index.
    Converged { range: BisectRange },
}

/// Advance the per-subsystem state machine by one probe verdict.
///
/// `range` is the persisted bisect range for the subsystem, required from the
/// end of the `FindMaxBounds` phase onward.
pub fn advance_subsystem(
    state: RunState,
    verdict: Verdict,
    range: Option<BisectRange>,
) -> Result<SubsystemStep> {
    match state {
        RunState::TestDisable => Ok(match verdict {
            Verdict::Good => SubsystemStep::MeasureBounds,
            Verdict::Bad => SubsystemStep::NotCulprit,
        }),
        RunState::FindMaxBounds => match verdict {
            Verdict::Good => Err(anyhow!(
                "issue did not reproduce with nothing suppressed; \
                 the probe is not deterministic for this subsystem"
            )),
            Verdict::Bad => {
                let range = range.ok_or_else(|| {
                    anyhow!("bisect range missing: no guarded call was observed")
                })?;
                Ok(SubsystemStep::StartBisect { range })
            }
        },
        RunState::Bisect => {
            let range = range
                .ok_or_else(|| anyhow!("bisect range missing while bisecting"))?;
            // A settled range already names the culprit; further verdicts
            // re-report it instead of narrowing past a single index.
            if range.is_settled() {
                return Ok(SubsystemStep::Converged { range });
            }
            let mid = range.midpoint();
            let next = match verdict {
                // Suppressing (mid, high] fixed the issue, so the culprit is up there.
                Verdict::Good => BisectRange::new(mid + 1, range.high),
                Verdict::Bad => BisectRange::new(range.low, mid),
            };
            if next.is_settled() {
                Ok(SubsystemStep::Converged { range: next })
            } else {
                Ok(SubsystemStep::Narrowed { range: next })
            }
        }
    }
}
