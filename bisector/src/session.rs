//! Search session: durable search state plus the guard hook the workload
//! calls.
//!
//! One `BisectSession` is shared between the controller (which advances the
//! search) and the instrumented workload (which asks, call by call, whether a
//! subsystem should be suppressed). The hook takes `&self` so the workload
//! can hold the session wherever it needs it; interior mutability covers the
//! in-memory counters. The session is intentionally not `Sync` — one search,
//! one thread.

use std::cell::{Cell, RefCell};

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::core::counters::CallCounters;
use crate::core::types::{BisectRange, Cursor, RunState};
use crate::io::config::SearchConfig;
use crate::io::overrides::Overrides;
use crate::io::store::StateStore;

pub struct BisectSession {
    store: StateStore,
    config: SearchConfig,
    overrides: Overrides,
    /// Whether the hook is live. True while a search is attached; flips with
    /// cursor writes and resets.
    enabled: Cell<bool>,
    counters: RefCell<CallCounters>,
    /// Effective cursor: persisted cursor overlaid with environment
    /// overrides. Cached so a mismatched hook call never touches the store.
    active: RefCell<Option<Cursor>>,
}

impl BisectSession {
    /// Open a session, reading overrides from the environment.
    ///
    /// A session constructed while a persisted cursor exists (or an override
    /// is set) is live immediately, so a workload process joins an in-flight
    /// search without any extra wiring.
    pub fn new(store: StateStore, config: SearchConfig) -> Result<Self> {
        let overrides = Overrides::from_env()?;
        Self::with_overrides(store, config, overrides)
    }

    pub fn with_overrides(
        store: StateStore,
        config: SearchConfig,
        overrides: Overrides,
    ) -> Result<Self> {
        config.validate()?;
        let persisted = store.load_cursor()?;
        let enabled = overrides.is_set() || persisted.is_some();
        let active = effective_cursor(persisted.as_ref(), &overrides);
        Ok(Self {
            store,
            config,
            overrides,
            enabled: Cell::new(enabled),
            counters: RefCell::new(CallCounters::new()),
            active: RefCell::new(active),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Effective search position, if a search is attached.
    pub fn cursor(&self) -> Option<Cursor> {
        self.active.borrow().clone()
    }

    /// Reset in-memory call accounting. Must run before every in-process
    /// probe; external-mode probes start in a fresh process and need nothing.
    pub fn begin_probe(&self) {
        self.counters.borrow_mut().reset();
    }

    pub fn call_count(&self, subsystem: &str) -> u64 {
        self.counters.borrow().call_count(subsystem)
    }

    /// Diagnostic captured near the bisection boundary for `ordinal`, if the
    /// workload supplied one during the probe that just ran.
    pub fn cached_diagnostic(&self, ordinal: u64) -> Option<String> {
        self.counters.borrow().diagnostic(ordinal).map(str::to_string)
    }

    /// Decide whether a guarded call should be suppressed.
    ///
    /// The workload calls this for every guarded call site, passing the
    /// backend and subsystem the site belongs to. `diagnostic` is invoked
    /// only when the bisection has narrowed far enough for the answer to be
    /// worth caching.
    pub fn should_suppress(
        &self,
        backend: &str,
        subsystem: &str,
        diagnostic: Option<&dyn Fn() -> String>,
    ) -> Result<bool> {
        if !self.enabled.get() {
            return Ok(false);
        }
        let matches = self
            .active
            .borrow()
            .as_ref()
            .is_some_and(|cursor| cursor.matches(backend, subsystem));
        if !matches {
            return Ok(false);
        }

        // Manual mode: a fixed ordinal ceiling, no state machine involved.
        if let Some(max) = self.overrides.max_calls {
            let ordinal = self.counters.borrow_mut().record_call(subsystem);
            return Ok(ordinal > max);
        }

        let state = self.store.load_run_state(backend, subsystem)?.ok_or_else(|| {
            anyhow!("no run state for {backend}/{subsystem} (cursor points at an inactive subsystem)")
        })?;

        match state {
            RunState::TestDisable => Ok(true),
            RunState::FindMaxBounds => {
                let ordinal = self.counters.borrow_mut().record_call(subsystem);
                // Persist after every call: only the workload process knows
                // the count, and it may not outlive the probe.
                self.store
                    .write_range(backend, subsystem, BisectRange::new(0, ordinal + 1))?;
                Ok(false)
            }
            RunState::Bisect => {
                let range = self.store.load_range(backend, subsystem)?.ok_or_else(|| {
                    anyhow!(
                        "bisect range missing for {backend}/{subsystem} \
                         (find_max_bounds never observed a call)"
                    )
                })?;
                let ordinal = self.counters.borrow_mut().record_call(subsystem);
                if range.is_narrow()
                    && range.contains(ordinal)
                    && let Some(producer) = diagnostic
                {
                    let text = producer();
                    self.counters.borrow_mut().record_diagnostic(ordinal, text);
                }
                Ok(ordinal > range.midpoint())
            }
        }
    }

    /// Move the search position. Enables the hook: a cursor on disk means a
    /// search is in flight.
    pub fn set_cursor(&self, cursor: &Cursor) -> Result<()> {
        self.store.write_cursor(cursor)?;
        *self.active.borrow_mut() = effective_cursor(Some(cursor), &self.overrides);
        self.enabled.set(true);
        Ok(())
    }

    /// Point the search at a subsystem and reset its phase to the beginning.
    pub fn activate_subsystem(&self, backend: &str, subsystem: &str) -> Result<()> {
        debug!(backend, subsystem, "activating subsystem");
        self.store
            .write_run_state(backend, subsystem, RunState::TestDisable)?;
        self.set_cursor(&Cursor::subsystem(backend, subsystem))
    }

    pub fn run_state(&self, backend: &str, subsystem: &str) -> Result<Option<RunState>> {
        self.store.load_run_state(backend, subsystem)
    }

    pub fn set_run_state(&self, backend: &str, subsystem: &str, state: RunState) -> Result<()> {
        self.store.write_run_state(backend, subsystem, state)
    }

    pub fn range(&self, backend: &str, subsystem: &str) -> Result<Option<BisectRange>> {
        self.store.load_range(backend, subsystem)
    }

    pub fn set_range(&self, backend: &str, subsystem: &str, range: BisectRange) -> Result<()> {
        self.store.write_range(backend, subsystem, range)
    }

    /// Delete every persisted record and detach the session. Overrides keep
    /// the hook live in manual mode.
    pub fn clear_state(&self) -> Result<()> {
        self.store.clear()?;
        *self.active.borrow_mut() = None;
        self.enabled.set(self.overrides.is_set());
        Ok(())
    }
}

fn effective_cursor(persisted: Option<&Cursor>, overrides: &Overrides) -> Option<Cursor> {
    let backend = overrides
        .backend
        .clone()
        .or_else(|| persisted.map(|cursor| cursor.backend.clone()))?;
    let subsystem = overrides
        .subsystem
        .clone()
        .or_else(|| persisted.and_then(|cursor| cursor.subsystem.clone()));
    Some(Cursor { backend, subsystem })
}
