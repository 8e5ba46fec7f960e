use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Move,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Source and destination are the same file.
    Unchanged,
}

impl Action {
    pub fn execute(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<Outcome> {
        if same_path(source, destination) {
            return Ok(Outcome::Unchanged);
        }
        if destination.exists() {
            anyhow::bail!("Refusing to overwrite existing file {destination}");
        }

        // Ensure parent directory exists
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent}"))?;
        }

        match self {
            Action::Move => {
                move_file(source, destination)?;
                info!("{source} → {destination}");
            }
            Action::Copy => {
                fs::copy(source, destination)
                    .with_context(|| format!("Failed to copy {source} to {destination}"))?;
                info!("{source} ⇒ {destination}");
            }
        }

        Ok(Outcome::Done)
    }
}

/// Case-insensitive, so re-running on an already sorted tree is a no-op on
/// case-insensitive filesystems too.
fn same_path(a: &Utf8Path, b: &Utf8Path) -> bool {
    a.as_str().to_lowercase() == b.as_str().to_lowercase()
}

fn move_file(source: &Utf8Path, destination: &Utf8Path) -> Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    fs::copy(source, destination)
        .with_context(|| format!("Failed to move {source} to {destination}"))?;
    fs::remove_file(source).with_context(|| format!("Failed to remove {source} after copy"))
}

/// Removes `directory` if it is empty. Returns whether it was removed.
pub fn remove_empty_dir(directory: &Utf8Path) -> bool {
    let removed = fs::remove_dir(directory).is_ok();
    if removed {
        debug!("Directory '{directory}' was removed");
    }
    removed
}
