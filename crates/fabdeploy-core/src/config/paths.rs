//! Config and checkpoint path resolution helpers.

use std::path::{Path, PathBuf};

use super::schema::CheckpointSection;
use crate::state::Checkpoint;

pub const CONFIG_FILE_NAME: &str = "fabdeploy.toml";

/// `./fabdeploy.toml` relative to `dir`.
pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Directory checkpoints are written to: the configured override, or the
/// per-user state directory.
pub fn checkpoint_dir(section: &CheckpointSection) -> anyhow::Result<PathBuf> {
    match &section.dir {
        Some(dir) => Ok(dir.clone()),
        None => Checkpoint::default_dir(),
    }
}
