//! Frame metadata probe
//!
//! Reads the resolution of a sequence's first frame from its header.

use crate::dimensions::Dimensions;
use std::path::Path;
use tracing::debug;

/// Read the pixel dimensions of the image at `path`.
///
/// Returns `None` when the file cannot be opened, its format is not
/// supported, or it reports a zero-sized image.
pub fn image_dimensions(path: &Path) -> Option<Dimensions> {
    match image::image_dimensions(path) {
        Ok((width, height)) => Dimensions::new(width, height),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "could not probe frame dimensions");
            None
        }
    }
}
