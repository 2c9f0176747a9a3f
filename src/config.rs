//! # Project Configuration
//!
//! A project's repository normally lives inside the project root itself, but
//! some teams keep draft storage on a separate disk. That choice is made once
//! per project and recorded in a small TOML pointer file at the project root;
//! the engine reads it back whenever the project is opened.
//!
//! When the draft root equals the project root no pointer file exists at all
//! and the hidden repository directory is its own marker.

use crate::error::{DraftError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project pointer file, written next to the project's files.
pub const CONFIG_FILE: &str = ".draftvault.toml";

/// Per-project settings persisted at `<projectRoot>/.draftvault.toml`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProjectConfig {
    /// Directory under which the repository lives. May be outside the
    /// project tree.
    pub draft_root: PathBuf,
}

impl ProjectConfig {
    pub fn new(draft_root: PathBuf) -> Self {
        Self { draft_root }
    }
}

/// Loads the pointer file for a project, if one exists.
pub fn load(project_root: &Path) -> Result<Option<ProjectConfig>> {
    let path = project_root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| DraftError::io_at(&path, e))?;
    let config: ProjectConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;

    validate(&config)?;
    Ok(Some(config))
}

/// Writes the pointer file recording an out-of-tree draft root.
pub fn save(project_root: &Path, config: &ProjectConfig) -> Result<()> {
    validate(config)?;
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("failed to serialize project config: {e}"))?;
    let path = project_root.join(CONFIG_FILE);
    fs::write(&path, toml_str).map_err(|e| DraftError::io_at(&path, e))?;
    Ok(())
}

fn validate(config: &ProjectConfig) -> Result<()> {
    if config.draft_root.as_os_str().is_empty() {
        return Err(DraftError::InvalidPath {
            path: String::new(),
            reason: "draft_root must not be empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProjectConfig::new(dir.path().join("elsewhere"));
        save(dir.path(), &cfg).unwrap();

        let loaded = load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.draft_root, cfg.draft_root);
    }

    #[test]
    fn absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn empty_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProjectConfig::new(PathBuf::new());
        assert!(save(dir.path(), &cfg).is_err());
    }
}
