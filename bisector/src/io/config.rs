//! Backend enumeration the search walks, stored as TOML.
//!
//! The engine has no built-in knowledge of the pipeline under test; the
//! operator describes it:
//!
//! ```toml
//! [[backend]]
//! name = "baseline"
//! subsystems = []
//!
//! [[backend]]
//! name = "optimizer"
//! subsystems = ["rewrite_passes", "lowerings"]
//! ```
//!
//! Table order is search order. Names become path components under the state
//! directory, so they share the store's charset rules.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::store::validate_name;

/// Ordered backend enumeration (TOML, human-edited).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    #[serde(rename = "backend", default)]
    pub backends: Vec<BackendSpec>,
}

/// One pipeline backend and its subsystems, in search order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendSpec {
    pub name: String,
    #[serde(default)]
    pub subsystems: Vec<String>,
}

impl BackendSpec {
    pub fn new(name: &str, subsystems: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            subsystems: subsystems.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl SearchConfig {
    pub fn new(backends: Vec<BackendSpec>) -> Self {
        Self { backends }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(anyhow!("config must list at least one backend"));
        }
        for (i, backend) in self.backends.iter().enumerate() {
            validate_name(&backend.name)
                .with_context(|| format!("backend [{i}] has an invalid name"))?;
            if self.backends[..i].iter().any(|b| b.name == backend.name) {
                return Err(anyhow!("duplicate backend '{}'", backend.name));
            }
            for (j, subsystem) in backend.subsystems.iter().enumerate() {
                validate_name(subsystem).with_context(|| {
                    format!("backend '{}' subsystem [{j}] has an invalid name", backend.name)
                })?;
                if backend.subsystems[..j].contains(subsystem) {
                    return Err(anyhow!(
                        "duplicate subsystem '{}' in backend '{}'",
                        subsystem,
                        backend.name
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn first_backend(&self) -> Option<&BackendSpec> {
        self.backends.first()
    }

    pub fn backend(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Backend after `name` in search order, if any.
    pub fn next_backend(&self, name: &str) -> Option<&BackendSpec> {
        let index = self.backends.iter().position(|b| b.name == name)?;
        self.backends.get(index + 1)
    }

    pub fn first_subsystem(&self, backend: &str) -> Option<&str> {
        self.backend(backend)?.subsystems.first().map(String::as_str)
    }

    /// Subsystem after `subsystem` within `backend`, if any.
    pub fn next_subsystem(&self, backend: &str, subsystem: &str) -> Option<&str> {
        let subsystems = &self.backend(backend)?.subsystems;
        let index = subsystems.iter().position(|s| s == subsystem)?;
        subsystems.get(index + 1).map(String::as_str)
    }
}

/// Load the backend enumeration from a TOML file.
///
/// The file is required: without it the engine has nothing to search.
pub fn load_config(path: &Path) -> Result<SearchConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config {} not found (provide the backend enumeration to search)",
            path.display()
        ));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SearchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
