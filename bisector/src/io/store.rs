//! Durable search state under the bisection state directory.
//!
//! Layout:
//!
//! ```text
//! <root>/cursor.json                                search position
//! <root>/<backend>/<subsystem>/run_state.json       per-subsystem phase
//! <root>/<backend>/<subsystem>/range.json           per-subsystem bisect range
//! ```
//!
//! Every record is pretty-printed JSON written atomically (temp file +
//! rename), so a crash mid-write never leaves a half-record behind. Loads
//! return `None` for records that were never written; corrupt records are
//! errors, not defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{BisectRange, Cursor, RunState};

const CURSOR_FILE: &str = "cursor.json";
const RUN_STATE_FILE: &str = "run_state.json";
const RANGE_FILE: &str = "range.json";

/// Handle to the state directory owned by one search.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_cursor(&self) -> Result<Option<Cursor>> {
        let path = self.root.join(CURSOR_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read cursor {}", path.display()))?;
        let cursor: Cursor = serde_json::from_str(&contents)
            .with_context(|| format!("parse cursor {}", path.display()))?;
        validate_name(&cursor.backend)?;
        if let Some(subsystem) = &cursor.subsystem {
            validate_name(subsystem)?;
        }
        Ok(Some(cursor))
    }

    pub fn write_cursor(&self, cursor: &Cursor) -> Result<()> {
        validate_name(&cursor.backend)?;
        if let Some(subsystem) = &cursor.subsystem {
            validate_name(subsystem)?;
        }
        debug!(backend = %cursor.backend, subsystem = ?cursor.subsystem, "writing cursor");
        let mut buf = serde_json::to_string_pretty(cursor)?;
        buf.push('\n');
        write_atomic(&self.root.join(CURSOR_FILE), &buf)
    }

    pub fn load_run_state(&self, backend: &str, subsystem: &str) -> Result<Option<RunState>> {
        let path = self.subsystem_dir(backend, subsystem)?.join(RUN_STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read run state {}", path.display()))?;
        let record: RunStateRecord = serde_json::from_str(&contents)
            .with_context(|| format!("parse run state {}", path.display()))?;
        Ok(Some(record.state))
    }

    pub fn write_run_state(&self, backend: &str, subsystem: &str, state: RunState) -> Result<()> {
        let path = self.subsystem_dir(backend, subsystem)?.join(RUN_STATE_FILE);
        debug!(backend, subsystem, state = ?state, "writing run state");
        let mut buf = serde_json::to_string_pretty(&RunStateRecord { state })?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    pub fn load_range(&self, backend: &str, subsystem: &str) -> Result<Option<BisectRange>> {
        let path = self.subsystem_dir(backend, subsystem)?.join(RANGE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read range {}", path.display()))?;
        let range: BisectRange = serde_json::from_str(&contents)
            .with_context(|| format!("parse range {}", path.display()))?;
        if range.low > range.high {
            return Err(anyhow!(
                "corrupt range in {}: low {} > high {}",
                path.display(),
                range.low,
                range.high
            ));
        }
        Ok(Some(range))
    }

    pub fn write_range(&self, backend: &str, subsystem: &str, range: BisectRange) -> Result<()> {
        let path = self.subsystem_dir(backend, subsystem)?.join(RANGE_FILE);
        debug!(backend, subsystem, low = range.low, high = range.high, "writing range");
        let mut buf = serde_json::to_string_pretty(&range)?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    /// Delete every persisted record; resets the search completely.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            debug!(root = %self.root.display(), "clearing state directory");
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("remove state dir {}", self.root.display()))?;
        }
        Ok(())
    }

    fn subsystem_dir(&self, backend: &str, subsystem: &str) -> Result<PathBuf> {
        validate_name(backend)?;
        validate_name(subsystem)?;
        Ok(self.root.join(backend).join(subsystem))
    }
}

/// Persisted phase record; a struct so the on-disk format has a named field.
#[derive(Debug, Serialize, Deserialize)]
struct RunStateRecord {
    state: RunState,
}

/// Validate that a name is safe for use as a path component under the
/// state directory.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("name must not be empty"));
    }
    if name
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("name must be [A-Za-z0-9._-] only (got '{name}')"));
    }
    if name == "." || name == ".." {
        return Err(anyhow!("name must not be '.' or '..'"));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
