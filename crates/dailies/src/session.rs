//! Operator session
//!
//! The coordinating side of daily generation: holds the read-only base
//! configuration, the operator's choices, and at most one active run.

use crate::config::Config;
use crate::dimensions::{DimensionSync, Dimensions};
use crate::encode::{
    build_daily_command, spawn_run, EncoderProgram, RunEvent, RunHandle, RunRequest,
};
use crate::overlay::{write_overlay_in, OverlayError};
use crate::preview::{decode_preview, encode_file_payload, Preview};
use crate::probe::image_dimensions;
use crate::scan::find_first_frame;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Output size used when the configuration does not set one
pub const DEFAULT_OUTPUT: Dimensions = Dimensions {
    width: 1920,
    height: 1080,
};

/// Prefix of overlay config file names
const OVERLAY_PREFIX: &str = "dailies-";

/// Error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sequence folder is missing or not a directory
    #[error("Please select a valid sequence folder: {}", .0.display())]
    SequenceFolderInvalid(PathBuf),

    /// Sequence folder holds no accepted frames
    #[error("No image sequence found in folder: {}", .0.display())]
    NoSequenceFound(PathBuf),

    /// Preset is not listed under `output_codecs`
    #[error("Unknown encoding preset: {0}")]
    UnknownCodec(String),

    /// A run is still active
    #[error("A daily is already being generated")]
    RunInProgress,

    /// Overlay config could not be written
    #[error("Overlay config error: {0}")]
    Overlay(#[from] OverlayError),
}

/// What the scanner and probe found for a sequence folder
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceInfo {
    pub folder: PathBuf,
    pub first_frame: PathBuf,
    /// `None` when the first frame's resolution could not be read
    pub input: Option<Dimensions>,
}

/// Operator session state
#[derive(Debug)]
pub struct Session {
    config: Arc<Config>,
    encoder: EncoderProgram,
    dimensions: DimensionSync,
    codec: String,
    output_folder: Option<PathBuf>,
    sequence: Option<SequenceInfo>,
    active: Option<RunHandle>,
    overlay_dir: PathBuf,
}

impl Session {
    /// Create a session from the base configuration
    ///
    /// The preset defaults to `globals.output_codec` when it is listed, else
    /// the first listed preset. The output folder defaults to
    /// `globals.movie_location`.
    pub fn new(config: Arc<Config>, encoder: EncoderProgram) -> Self {
        let globals = &config.globals;
        let output = match (globals.width, globals.height) {
            (Some(width), Some(height)) => {
                Dimensions::new(width, height).unwrap_or(DEFAULT_OUTPUT)
            }
            _ => DEFAULT_OUTPUT,
        };

        let codec = if config.has_codec(&globals.output_codec) {
            globals.output_codec.clone()
        } else {
            config
                .codec_names()
                .first()
                .map(|name| name.to_string())
                .unwrap_or_else(|| globals.output_codec.clone())
        };

        let output_folder = non_empty_path(&globals.movie_location);

        let mut dimensions = DimensionSync::new(output);
        dimensions.set_fit_to_height(globals.fit);

        Self {
            config,
            encoder,
            dimensions,
            codec,
            output_folder,
            sequence: None,
            active: None,
            overlay_dir: std::env::temp_dir(),
        }
    }

    /// Write overlay configs into `dir` instead of the system temp directory
    pub fn with_overlay_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overlay_dir = dir.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dimensions(&self) -> &DimensionSync {
        &self.dimensions
    }

    pub fn dimensions_mut(&mut self) -> &mut DimensionSync {
        &mut self.dimensions
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    /// Select an encoding preset
    ///
    /// Changing the preset resets the output size to the input size.
    pub fn set_codec(&mut self, codec: &str) -> Result<(), SessionError> {
        if !self.config.codec_names().is_empty() && !self.config.has_codec(codec) {
            return Err(SessionError::UnknownCodec(codec.to_string()));
        }
        if self.codec != codec {
            self.codec = codec.to_string();
            self.dimensions.reset_to_input();
        }
        Ok(())
    }

    pub fn output_folder(&self) -> Option<&Path> {
        self.output_folder.as_deref()
    }

    pub fn set_output_folder(&mut self, folder: Option<PathBuf>) {
        self.output_folder = folder.filter(|path| !path.as_os_str().is_empty());
    }

    pub fn sequence(&self) -> Option<&SequenceInfo> {
        self.sequence.as_ref()
    }

    /// Scan `folder` and probe its first frame
    ///
    /// Known input dimensions reset the output size. Returns `None` when the
    /// folder holds no accepted frame; the input is cleared in that case.
    pub fn load_sequence(&mut self, folder: &Path) -> Option<&SequenceInfo> {
        let formats = &self.config.globals.input_image_formats;
        let Some(first_frame) = find_first_frame(folder, formats) else {
            info!(folder = %folder.display(), "no image sequence found");
            self.sequence = None;
            self.dimensions.set_input(None);
            return None;
        };

        let input = image_dimensions(&first_frame);
        match input {
            Some(dims) => info!(frame = %first_frame.display(), input = %dims, "sequence loaded"),
            None => warn!(frame = %first_frame.display(), "input dimensions not available"),
        }
        self.dimensions.set_input(input);

        self.sequence = Some(SequenceInfo {
            folder: folder.to_path_buf(),
            first_frame,
            input,
        });
        self.sequence.as_ref()
    }

    /// Thumbnail of the loaded sequence's first frame
    pub fn first_frame_preview(&self) -> Preview {
        match &self.sequence {
            Some(sequence) => decode_preview(&encode_file_payload(&sequence.first_frame)),
            None => Preview::Unavailable,
        }
    }

    /// Whether a run is active; no new run can start until it finishes
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the active run
    pub fn active_run(&self) -> Option<Uuid> {
        self.active.as_ref().map(RunHandle::id)
    }

    /// Describe a run of `sequence_folder` with the current choices
    pub fn run_request(&self, sequence_folder: &Path) -> RunRequest {
        RunRequest {
            sequence_folder: sequence_folder.to_path_buf(),
            output_folder: self.output_folder.clone(),
            codec: self.codec.clone(),
            output: self.dimensions.output(),
            fit: self.dimensions.fit_to_height(),
        }
    }

    /// Start generating a daily for `sequence_folder`
    ///
    /// Validates the folder, writes the overlay config and launches the
    /// encoder on a worker task. Progress and the result are then read with
    /// [`Session::next_event`].
    ///
    /// # Errors
    /// Fails without launching anything if a run is active, the folder is not
    /// a directory or holds no frames, or the overlay cannot be written.
    pub fn start(&mut self, sequence_folder: &Path) -> Result<Uuid, SessionError> {
        if self.active.is_some() {
            return Err(SessionError::RunInProgress);
        }
        if !sequence_folder.is_dir() {
            return Err(SessionError::SequenceFolderInvalid(
                sequence_folder.to_path_buf(),
            ));
        }
        let formats = &self.config.globals.input_image_formats;
        let first_frame = find_first_frame(sequence_folder, formats)
            .ok_or_else(|| SessionError::NoSequenceFound(sequence_folder.to_path_buf()))?;

        let request = self.run_request(sequence_folder);
        let overlay = write_overlay_in(
            &self.overlay_dir,
            &self.config,
            request.output,
            request.fit,
            OVERLAY_PREFIX,
        )?;

        let cmd = build_daily_command(&self.encoder, &request, &first_frame, overlay.path());
        let handle = spawn_run(cmd, overlay);
        let id = handle.id();
        info!(
            run_id = %id,
            frame = %first_frame.display(),
            codec = %request.codec,
            output = %request.output,
            fit = request.fit,
            "daily run started"
        );

        self.active = Some(handle);
        Ok(id)
    }

    /// Wait for the next event of the active run
    ///
    /// Returns `None` when no run is active. After the finished event is
    /// returned the session is idle again.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        let handle = self.active.as_mut()?;
        let event = handle.next_event().await;
        if event.is_none() || handle.is_finished() {
            self.active = None;
        }
        event
    }
}

fn non_empty_path(path: &str) -> Option<PathBuf> {
    let path = path.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}
