//! On-disk checkpoint of a deployment ledger.
//!
//! Checkpoints live in the user's state directory by default:
//! - Unix: `$XDG_STATE_HOME/fabdeploy/checkpoints` or `~/.local/state/fabdeploy/checkpoints`
//! - Windows: `%LOCALAPPDATA%\fabdeploy\checkpoints`
//!
//! One file per deployment run: `<deployment_id>.checkpoint.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::CreatedItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub deployment_id: String,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<CreatedItem>,
}

impl Checkpoint {
    pub fn default_dir() -> anyhow::Result<PathBuf> {
        let base = if cfg!(unix) {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
        } else {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
        };
        Ok(base.join("fabdeploy").join("checkpoints"))
    }

    pub fn path_for(dir: &Path, deployment_id: &str) -> PathBuf {
        dir.join(format!("{deployment_id}.checkpoint.json"))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse checkpoint: {}", path.display()))
    }

    /// Write atomically (tmp + rename) so a crash never leaves a torn file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create checkpoint directory: {}", parent.display())
            })?;
        }

        let bytes = serde_json::to_vec_pretty(self).context("Failed to serialize checkpoint")?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint.json".to_string());
        let tmp_path = path.with_file_name(format!("{file_name}.{}.tmp", std::process::id()));

        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp checkpoint: {}", tmp_path.display()))?;

        // Windows rename does not replace an existing target.
        if cfg!(windows) && path.exists() {
            fs::remove_file(path).with_context(|| {
                format!("Failed to remove existing checkpoint: {}", path.display())
            })?;
        }
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename tmp checkpoint: {}", tmp_path.display()))?;
        Ok(())
    }

    /// Remove a checkpoint file; a missing file is not an error.
    pub fn remove(path: &Path) -> anyhow::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove checkpoint: {}", path.display())),
        }
    }
}
