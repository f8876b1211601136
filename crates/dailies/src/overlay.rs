//! Per-run configuration overlay files.
//!
//! Each run gets its own copy of the base configuration with the output
//! width, height and fit flag substituted, written to a uniquely named
//! temporary file. The base configuration is never modified.

use crate::config::{Config, ConfigError};
use crate::dimensions::Dimensions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while materializing an overlay.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The overlay document could not be serialized.
    #[error("Failed to serialize overlay config: {0}")]
    Serialize(#[from] ConfigError),

    /// The temporary file could not be created or written.
    #[error("Failed to write overlay config: {0}")]
    Write(#[from] std::io::Error),
}

/// A written overlay configuration, deleted when removed or dropped.
#[derive(Debug)]
pub struct OverlayFile {
    path: TempPath,
}

impl OverlayFile {
    /// Path the encoder should load its configuration from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the overlay file.
    ///
    /// Failure is logged and otherwise ignored; a leftover file in the temp
    /// directory does not affect the run that owned it.
    pub fn remove(self) {
        let path: PathBuf = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => debug!(path = %path.display(), "removed overlay config"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove overlay config"),
        }
    }
}

/// Write an overlay of `base` with the given output size and fit flag.
///
/// The file is placed in the system temp directory, named with `prefix`
/// and a random suffix.
pub fn write_overlay(
    base: &Config,
    output: Dimensions,
    fit: bool,
    prefix: &str,
) -> Result<OverlayFile, OverlayError> {
    write_overlay_in(&std::env::temp_dir(), base, output, fit, prefix)
}

/// Like [`write_overlay`] but inside `dir`.
pub fn write_overlay_in(
    dir: &Path,
    base: &Config,
    output: Dimensions,
    fit: bool,
    prefix: &str,
) -> Result<OverlayFile, OverlayError> {
    let overlay = base.with_output_overrides(output.width, output.height, fit);
    let content = overlay.to_toml_string()?;

    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".toml")
        .tempfile_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    let path = file.into_temp_path();
    debug!(path = %path.display(), %output, fit, "wrote overlay config");
    Ok(OverlayFile { path })
}
