//! Output dimension synchronization
//!
//! Output width and height are derived from the input resolution, the
//! aspect-lock flag, the fit-to-height flag and the field the operator edited
//! last. [`sync_dimensions`] is a pure function of those inputs; editing one
//! field never re-triggers the rule for the other, so there is no feedback
//! loop to suppress.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest width or height an operator can request
pub const MAX_DIMENSION: u32 = 16384;

/// A width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions, rejecting zero-sized ones
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// Width divided by height, or 1 when either side is zero
    pub fn aspect(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    /// Height matching `width` at this aspect ratio, rounded down
    fn height_for_width(&self, width: u32) -> u32 {
        if self.width == 0 || self.height == 0 {
            return clamp_dimension(width as u64);
        }
        clamp_dimension(width as u64 * self.height as u64 / self.width as u64)
    }

    /// Width matching `height` at this aspect ratio, rounded down
    fn width_for_height(&self, height: u32) -> u32 {
        if self.width == 0 || self.height == 0 {
            return clamp_dimension(height as u64);
        }
        clamp_dimension(height as u64 * self.width as u64 / self.height as u64)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.width, self.height)
    }
}

/// Clamp a computed size to the editable range `1..=MAX_DIMENSION`
pub fn clamp_dimension(value: u64) -> u32 {
    value.clamp(1, MAX_DIMENSION as u64) as u32
}

/// Which control changed last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Width,
    Height,
    /// The aspect-lock or fit-to-height flag was toggled
    Constraint,
}

/// Compute output dimensions after an edit.
///
/// Rules, in priority order:
/// - without input dimensions nothing is synchronized and `current` is kept;
/// - with aspect lock, a width edit derives the height and a height edit
///   derives the width (both rounded down);
/// - with fit-to-height, the height is forced to the input height and the
///   width derived from it, overriding anything above.
///
/// Every result is clamped to `1..=MAX_DIMENSION`, so for inputs taller than
/// [`MAX_DIMENSION`] fit-to-height yields `MAX_DIMENSION` rather than the
/// input height.
pub fn sync_dimensions(
    input: Option<Dimensions>,
    current: Dimensions,
    keep_aspect: bool,
    fit_to_height: bool,
    edit: Edit,
) -> Dimensions {
    let Some(input) = input else {
        return current;
    };

    let mut output = current;
    if keep_aspect {
        match edit {
            Edit::Width => output.height = input.height_for_width(output.width),
            Edit::Height => output.width = input.width_for_height(output.height),
            Edit::Constraint => {}
        }
    }

    if fit_to_height {
        output.height = clamp_dimension(input.height as u64);
        output.width = input.width_for_height(output.height);
    }

    output
}

/// Output dimension state for one operator session
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSync {
    input: Option<Dimensions>,
    output: Dimensions,
    keep_aspect: bool,
    fit_to_height: bool,
}

impl DimensionSync {
    /// Start with `output` as the operator-set size, aspect lock on and
    /// fit-to-height off
    pub fn new(output: Dimensions) -> Self {
        Self {
            input: None,
            output,
            keep_aspect: true,
            fit_to_height: false,
        }
    }

    pub fn input(&self) -> Option<Dimensions> {
        self.input
    }

    pub fn output(&self) -> Dimensions {
        self.output
    }

    pub fn keep_aspect(&self) -> bool {
        self.keep_aspect
    }

    pub fn fit_to_height(&self) -> bool {
        self.fit_to_height
    }

    /// Record the resolution of a newly scanned sequence.
    ///
    /// Known dimensions reset the output to exactly the input size. `None`
    /// clears the input, which turns synchronization off and leaves the
    /// output as it was.
    pub fn set_input(&mut self, input: Option<Dimensions>) {
        self.input = input;
        if input.is_some() {
            self.reset_to_input();
        }
    }

    /// Reset the output to the input size, e.g. after a preset change
    pub fn reset_to_input(&mut self) {
        if let Some(input) = self.input {
            self.output = input;
            self.apply(Edit::Constraint);
        }
    }

    pub fn set_width(&mut self, width: u32) {
        self.output.width = clamp_dimension(width as u64);
        self.apply(Edit::Width);
    }

    pub fn set_height(&mut self, height: u32) {
        self.output.height = clamp_dimension(height as u64);
        self.apply(Edit::Height);
    }

    pub fn set_keep_aspect(&mut self, keep_aspect: bool) {
        self.keep_aspect = keep_aspect;
        self.apply(Edit::Constraint);
    }

    pub fn set_fit_to_height(&mut self, fit_to_height: bool) {
        self.fit_to_height = fit_to_height;
        self.apply(Edit::Constraint);
    }

    fn apply(&mut self, edit: Edit) {
        self.output = sync_dimensions(
            self.input,
            self.output,
            self.keep_aspect,
            self.fit_to_height,
            edit,
        );
    }
}
