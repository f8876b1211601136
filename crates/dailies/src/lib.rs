//! Dailies
//!
//! Encode orchestration for image-sequence dailies: finds a sequence's first
//! frame, derives the output size, writes a per-run configuration overlay,
//! and supervises the external daily encoder while forwarding its progress.

pub mod dimensions;
pub mod encode;
pub mod overlay;
pub mod preview;
pub mod probe;
pub mod protocol;
pub mod scan;
pub mod session;

pub use dailies_config as config;
pub use dailies_config::Config;
pub use dimensions::{sync_dimensions, DimensionSync, Dimensions, Edit, MAX_DIMENSION};
pub use encode::{
    build_daily_command, run_daily, spawn_run, EncoderProgram, RunError, RunEvent, RunHandle,
    RunRequest, RunResult, RunState, DEFAULT_ENCODER,
};
pub use overlay::{write_overlay, write_overlay_in, OverlayError, OverlayFile};
pub use preview::{decode_preview, encode_file_payload, Preview};
pub use probe::image_dimensions;
pub use protocol::{parse_progress_line, ProgressEvent};
pub use scan::{find_first_frame, has_accepted_extension, list_sequence_frames};
pub use session::{SequenceInfo, Session, SessionError};
