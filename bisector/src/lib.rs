//! Crash-resilient divergence bisection for multi-stage pipelines.
//!
//! Given a workload whose output diverges under some pipeline configuration,
//! this crate localizes the divergence in two levels: first the responsible
//! backend, then the subsystem within it, then the exact guarded call index,
//! by binary search. All search state is persisted between probes because the
//! workload may crash the process hosting it. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, call accounting, the
//!   bisection state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (persistent state store, TOML
//!   backend enumeration, environment overrides).
//!
//! Orchestration modules ([`session`], [`step`], [`search`]) coordinate core
//! logic with I/O to implement the guard hook, the one-verdict-per-invocation
//! CLI mode, and the in-process search loop.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod search;
pub mod session;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
