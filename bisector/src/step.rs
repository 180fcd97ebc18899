//! Orchestration for a single search transition.
//!
//! One call to [`advance_search`] consumes exactly one probe verdict and
//! persists every resulting state change before returning. That discipline is
//! what makes the external mode work: each `bisector good`/`bisector bad`
//! invocation is one call here, and a crash between invocations loses
//! nothing.

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::core::machine::{SubsystemStep, advance_subsystem};
use crate::core::types::{BisectRange, Cursor, RunState, Verdict};
use crate::io::config::SearchConfig;
use crate::search::SearchOutcome;
use crate::session::BisectSession;

/// Result of consuming one probe verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Another probe is required at the reported position.
    Continue(NextProbe),
    /// The search finished.
    Concluded(SearchOutcome),
}

/// Position the next probe will run at, for operator display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextProbe {
    pub backend: String,
    pub subsystem: Option<String>,
    pub run_state: Option<RunState>,
    pub range: Option<BisectRange>,
}

/// Apply one probe verdict to the persisted search.
///
/// `Verdict::Good` means the probe behaved correctly under the active
/// suppression policy; `Verdict::Bad` means the issue reproduced.
pub fn advance_search(session: &BisectSession, verdict: Verdict) -> Result<StepOutcome> {
    let cursor = session
        .cursor()
        .ok_or_else(|| anyhow!("no active search (run `bisector start` first)"))?;
    ensure_known(session.config(), &cursor.backend, cursor.subsystem.as_deref())?;

    match cursor.subsystem {
        None => advance_backend_level(session, &cursor.backend, verdict),
        Some(subsystem) => advance_within_subsystem(session, &cursor.backend, &subsystem, verdict),
    }
}

fn advance_backend_level(
    session: &BisectSession,
    backend: &str,
    verdict: Verdict,
) -> Result<StepOutcome> {
    match verdict {
        Verdict::Good => match session.config().next_backend(backend) {
            Some(next) => {
                info!(backend, next = %next.name, "backend clean, moving on");
                session.set_cursor(&Cursor::backend(&next.name))?;
                next_probe(session)
            }
            None => {
                info!("all backends checked, issue not found");
                Ok(StepOutcome::Concluded(SearchOutcome::NotFound))
            }
        },
        Verdict::Bad => match session.config().first_subsystem(backend) {
            Some(subsystem) => {
                info!(backend, subsystem, "issue is in this backend, descending");
                session.activate_subsystem(backend, subsystem)?;
                next_probe(session)
            }
            None => {
                info!(backend, "issue is in this backend (no subsystems to search)");
                Ok(StepOutcome::Concluded(SearchOutcome::Backend {
                    backend: backend.to_string(),
                }))
            }
        },
    }
}

fn advance_within_subsystem(
    session: &BisectSession,
    backend: &str,
    subsystem: &str,
    verdict: Verdict,
) -> Result<StepOutcome> {
    let state = session.run_state(backend, subsystem)?.ok_or_else(|| {
        anyhow!("no run state for {backend}/{subsystem} (state directory is incomplete)")
    })?;
    let range = session.range(backend, subsystem)?;
    let step = advance_subsystem(state, verdict, range)
        .with_context(|| format!("advancing {backend}/{subsystem}"))?;

    match step {
        SubsystemStep::NotCulprit => {
            info!(backend, subsystem, "suppressing this subsystem did not fix the issue");
            match session.config().next_subsystem(backend, subsystem) {
                Some(next) => {
                    session.activate_subsystem(backend, next)?;
                    next_probe(session)
                }
                None => {
                    info!(backend, "subsystems exhausted, issue is in the backend itself");
                    Ok(StepOutcome::Concluded(SearchOutcome::Backend {
                        backend: backend.to_string(),
                    }))
                }
            }
        }
        SubsystemStep::MeasureBounds => {
            info!(backend, subsystem, "suppression fixed the issue, measuring call range");
            session.set_run_state(backend, subsystem, RunState::FindMaxBounds)?;
            next_probe(session)
        }
        SubsystemStep::StartBisect { range } => {
            // The range itself was persisted by the guard hook during the probe.
            info!(backend, subsystem, high = range.high, "call range measured, bisecting");
            session.set_run_state(backend, subsystem, RunState::Bisect)?;
            next_probe(session)
        }
        SubsystemStep::Narrowed { range } => {
            info!(backend, subsystem, low = range.low, high = range.high, "range narrowed");
            session.set_range(backend, subsystem, range)?;
            next_probe(session)
        }
        SubsystemStep::Converged { range } => {
            session.set_range(backend, subsystem, range)?;
            let culprit = range.low;
            let diagnostic = session.cached_diagnostic(culprit);
            info!(backend, subsystem, culprit, "bisection converged");
            Ok(StepOutcome::Concluded(SearchOutcome::Call {
                backend: backend.to_string(),
                subsystem: subsystem.to_string(),
                culprit,
                diagnostic,
            }))
        }
    }
}

/// Read back the post-transition position for the `Continue` payload.
fn next_probe(session: &BisectSession) -> Result<StepOutcome> {
    let cursor = session
        .cursor()
        .ok_or_else(|| anyhow!("cursor missing after a transition"))?;
    let (run_state, range) = match &cursor.subsystem {
        Some(subsystem) => (
            session.run_state(&cursor.backend, subsystem)?,
            session.range(&cursor.backend, subsystem)?,
        ),
        None => (None, None),
    };
    Ok(StepOutcome::Continue(NextProbe {
        backend: cursor.backend,
        subsystem: cursor.subsystem,
        run_state,
        range,
    }))
}

/// The persisted cursor must refer to the configured enumeration; a config
/// edited mid-search would otherwise derail the traversal silently.
fn ensure_known(config: &SearchConfig, backend: &str, subsystem: Option<&str>) -> Result<()> {
    let spec = config.backend(backend).ok_or_else(|| {
        anyhow!("cursor backend '{backend}' is not in the configured enumeration")
    })?;
    if let Some(subsystem) = subsystem
        && !spec.subsystems.iter().any(|s| s == subsystem)
    {
        return Err(anyhow!(
            "cursor subsystem '{backend}/{subsystem}' is not in the configured enumeration"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_session;

    #[test]
    fn verdicts_before_start_are_a_usage_error() {
        let (_temp, session) = temp_session();
        let err = advance_search(&session, Verdict::Good).expect_err("expected error");
        assert!(err.to_string().contains("bisector start"));
    }

    #[test]
    fn good_at_backend_level_advances_to_the_next_backend() {
        let (_temp, session) = temp_session();
        session.set_cursor(&Cursor::backend("baseline")).expect("cursor");

        let outcome = advance_search(&session, Verdict::Good).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Continue(NextProbe {
                backend: "optimizer".to_string(),
                subsystem: None,
                run_state: None,
                range: None,
            })
        );
        assert_eq!(session.cursor(), Some(Cursor::backend("optimizer")));
    }

    #[test]
    fn good_on_the_last_backend_concludes_not_found() {
        let (_temp, session) = temp_session();
        session.set_cursor(&Cursor::backend("optimizer")).expect("cursor");

        let outcome = advance_search(&session, Verdict::Good).expect("step");
        assert_eq!(outcome, StepOutcome::Concluded(SearchOutcome::NotFound));
    }

    #[test]
    fn bad_on_a_backend_with_subsystems_activates_the_first() {
        let (_temp, session) = temp_session();
        session.set_cursor(&Cursor::backend("optimizer")).expect("cursor");

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Continue(NextProbe {
                backend: "optimizer".to_string(),
                subsystem: Some("rewrite_passes".to_string()),
                run_state: Some(RunState::TestDisable),
                range: None,
            })
        );
        assert_eq!(
            session.run_state("optimizer", "rewrite_passes").expect("state"),
            Some(RunState::TestDisable)
        );
    }

    #[test]
    fn bad_on_a_subsystemless_backend_concludes_immediately() {
        let (_temp, session) = temp_session();
        session.set_cursor(&Cursor::backend("baseline")).expect("cursor");

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Concluded(SearchOutcome::Backend {
                backend: "baseline".to_string(),
            })
        );
    }

    #[test]
    fn bad_during_test_disable_moves_to_the_next_subsystem() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "rewrite_passes")
            .expect("activate");

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Continue(NextProbe {
                backend: "optimizer".to_string(),
                subsystem: Some("lowerings".to_string()),
                run_state: Some(RunState::TestDisable),
                range: None,
            })
        );
    }

    #[test]
    fn exhausted_subsystems_conclude_with_the_backend() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Concluded(SearchOutcome::Backend {
                backend: "optimizer".to_string(),
            })
        );
    }

    #[test]
    fn good_during_test_disable_starts_bounds_measurement() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");

        let outcome = advance_search(&session, Verdict::Good).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Continue(NextProbe {
                backend: "optimizer".to_string(),
                subsystem: Some("lowerings".to_string()),
                run_state: Some(RunState::FindMaxBounds),
                range: None,
            })
        );
    }

    /// The full subsystem flow: measure bounds through the hook, then enter
    /// bisect with the hook-persisted range.
    #[test]
    fn bad_after_bounds_measurement_enters_bisect() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");
        session
            .set_run_state("optimizer", "lowerings", RunState::FindMaxBounds)
            .expect("state");

        session.begin_probe();
        for _ in 0..5 {
            session
                .should_suppress("optimizer", "lowerings", None)
                .expect("hook");
        }

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Continue(NextProbe {
                backend: "optimizer".to_string(),
                subsystem: Some("lowerings".to_string()),
                run_state: Some(RunState::Bisect),
                range: Some(BisectRange::new(0, 5)),
            })
        );
    }

    #[test]
    fn bounds_measurement_without_any_guarded_call_is_fatal() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");
        session
            .set_run_state("optimizer", "lowerings", RunState::FindMaxBounds)
            .expect("state");

        let err = advance_search(&session, Verdict::Bad).expect_err("expected error");
        assert!(err.to_string().contains("lowerings"));
    }

    #[test]
    fn bisect_verdicts_narrow_the_persisted_range() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");
        session
            .set_run_state("optimizer", "lowerings", RunState::Bisect)
            .expect("state");
        session
            .set_range("optimizer", "lowerings", BisectRange::new(0, 7))
            .expect("range");

        let outcome = advance_search(&session, Verdict::Good).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Continue(NextProbe {
                backend: "optimizer".to_string(),
                subsystem: Some("lowerings".to_string()),
                run_state: Some(RunState::Bisect),
                range: Some(BisectRange::new(4, 7)),
            })
        );
        assert_eq!(
            session.range("optimizer", "lowerings").expect("range"),
            Some(BisectRange::new(4, 7))
        );
    }

    #[test]
    fn bisect_concludes_once_the_range_settles() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");
        session
            .set_run_state("optimizer", "lowerings", RunState::Bisect)
            .expect("state");
        session
            .set_range("optimizer", "lowerings", BisectRange::new(3, 4))
            .expect("range");

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Concluded(SearchOutcome::Call {
                backend: "optimizer".to_string(),
                subsystem: "lowerings".to_string(),
                culprit: 3,
                diagnostic: None,
            })
        );
        // The settled range stays on disk until the operator ends the search.
        assert_eq!(
            session.range("optimizer", "lowerings").expect("range"),
            Some(BisectRange::new(3, 3))
        );
    }

    /// A diagnostic captured by the hook during the final probe travels into
    /// the concluded outcome.
    #[test]
    fn conclusion_carries_the_cached_diagnostic() {
        let (_temp, session) = temp_session();
        session
            .activate_subsystem("optimizer", "lowerings")
            .expect("activate");
        session
            .set_run_state("optimizer", "lowerings", RunState::Bisect)
            .expect("state");
        session
            .set_range("optimizer", "lowerings", BisectRange::new(3, 4))
            .expect("range");

        session.begin_probe();
        for ordinal in 0..5u64 {
            session
                .should_suppress(
                    "optimizer",
                    "lowerings",
                    Some(&|| format!("node_{ordinal}")),
                )
                .expect("hook");
        }

        let outcome = advance_search(&session, Verdict::Bad).expect("step");
        assert_eq!(
            outcome,
            StepOutcome::Concluded(SearchOutcome::Call {
                backend: "optimizer".to_string(),
                subsystem: "lowerings".to_string(),
                culprit: 3,
                diagnostic: Some("node_3".to_string()),
            })
        );
    }

    #[test]
    fn a_cursor_outside_the_enumeration_is_an_error() {
        let (_temp, session) = temp_session();
        session.set_cursor(&Cursor::backend("retired")).expect("cursor");

        let err = advance_search(&session, Verdict::Good).expect_err("expected error");
        assert!(err.to_string().contains("not in the configured enumeration"));

        session
            .set_cursor(&Cursor::subsystem("optimizer", "retired"))
            .expect("cursor");
        let err = advance_search(&session, Verdict::Good).expect_err("expected error");
        assert!(err.to_string().contains("not in the configured enumeration"));
    }
}
