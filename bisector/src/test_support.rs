//! Test-only helpers: canned configs, temp-backed sessions, and a simulated
//! workload with a deterministic divergence.

use crate::io::config::{BackendSpec, SearchConfig};
use crate::io::overrides::Overrides;
use crate::io::store::StateStore;
use crate::session::BisectSession;

/// Two-backend enumeration used across the test suite: a subsystemless
/// `baseline` and an `optimizer` with two subsystems.
pub fn demo_config() -> SearchConfig {
    SearchConfig::new(vec![
        BackendSpec::new("baseline", &[]),
        BackendSpec::new("optimizer", &["rewrite_passes", "lowerings"]),
    ])
}

/// Fresh session over a temp state directory, no environment overrides.
pub fn temp_session() -> (tempfile::TempDir, BisectSession) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = StateStore::new(temp.path().join(".bisector"));
    let session =
        BisectSession::with_overrides(store, demo_config(), Overrides::default()).expect("session");
    (temp, session)
}

/// Simulated workload whose divergence is caused by exactly one guarded call.
///
/// Probing any backend other than `faulty_backend` is clean. Probing the
/// faulty backend fires the guard hook for every subsystem the config lists
/// for it (`calls` times for `faulty_subsystem`, twice for its siblings) and
/// reproduces the issue unless the hook suppressed call `culprit` of the
/// faulty subsystem. A faulty backend with no configured subsystems always
/// reproduces, like a real backend whose divergence cannot be narrowed.
pub struct BrokenPipeline {
    faulty_backend: String,
    faulty_subsystem: String,
    calls: u64,
    culprit: u64,
}

impl BrokenPipeline {
    pub fn new(faulty_backend: &str, faulty_subsystem: &str, calls: u64, culprit: u64) -> Self {
        Self {
            faulty_backend: faulty_backend.to_string(),
            faulty_subsystem: faulty_subsystem.to_string(),
            calls,
            culprit,
        }
    }

    /// Run the workload once; true means it behaved correctly.
    ///
    /// Resets the session's call accounting first, the way a fresh workload
    /// process starts from zero.
    pub fn probe(&self, session: &BisectSession) -> bool {
        session.begin_probe();
        let Some(cursor) = session.cursor() else {
            return false;
        };
        if cursor.backend != self.faulty_backend {
            return true;
        }

        let subsystems: Vec<String> = session
            .config()
            .backend(&cursor.backend)
            .map(|spec| spec.subsystems.clone())
            .unwrap_or_default();

        let mut culprit_suppressed = false;
        for subsystem in &subsystems {
            let count = if *subsystem == self.faulty_subsystem {
                self.calls
            } else {
                2
            };
            for ordinal in 0..count {
                let suppressed = session
                    .should_suppress(
                        &cursor.backend,
                        subsystem,
                        Some(&|| format!("{subsystem} call {ordinal}")),
                    )
                    .expect("guard hook");
                if *subsystem == self.faulty_subsystem && ordinal == self.culprit && suppressed {
                    culprit_suppressed = true;
                }
            }
        }
        culprit_suppressed
    }
}
