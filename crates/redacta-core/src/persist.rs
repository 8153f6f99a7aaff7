//! Atomic replacement of a persisted model directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::NerEngine;
use crate::error::{RedactaError, Result};

/// Save `engine` to `dir` without ever leaving a half-written model there.
///
/// The engine is written to a sibling staging directory first. Only after
/// that succeeds is the previous model moved aside, the staging directory
/// renamed into place and the previous model deleted. If saving fails, `dir`
/// still holds the last good model.
pub fn save_atomically<E: NerEngine + ?Sized>(engine: &E, dir: &Path) -> Result<()> {
    let staging = sibling(dir, "staging")?;
    let previous = sibling(dir, "previous")?;

    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    remove_if_present(&staging)?;

    if let Err(err) = engine.save(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    remove_if_present(&previous)?;
    let had_previous = dir.exists();
    if had_previous {
        fs::rename(dir, &previous)?;
    }

    if let Err(err) = fs::rename(&staging, dir) {
        if had_previous {
            // Put the last good model back before reporting.
            if let Err(restore) = fs::rename(&previous, dir) {
                tracing::warn!(
                    path = %previous.display(),
                    error = %restore,
                    "could not restore previous model"
                );
            }
        }
        return Err(err.into());
    }

    if had_previous {
        if let Err(err) = fs::remove_dir_all(&previous) {
            tracing::warn!(path = %previous.display(), error = %err, "could not remove previous model");
        }
    }

    tracing::info!(path = %dir.display(), "model saved");
    Ok(())
}

fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        RedactaError::InvalidInput(format!("model path {} has no final component", dir.display()))
    })?;
    let mut sibling_name = std::ffi::OsString::from(".");
    sibling_name.push(name);
    sibling_name.push(".");
    sibling_name.push(suffix);
    Ok(dir.with_file_name(sibling_name))
}

fn remove_if_present(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}
