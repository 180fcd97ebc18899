//! Side-effecting boundaries: persistent state, configuration, environment.

pub mod config;
pub mod overrides;
pub mod store;
