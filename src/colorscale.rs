//! # Colorscales
//!
//! A colorscale is a piecewise-linear ramp: control colors pinned at
//! ascending offsets in `[0, 1]`, plus a value range `[min, max]` used to
//! normalize raw samples before lookup.
//!
//! ## Lookup Algorithm
//!
//! 1. **Rescale** (optional): `v = (value - min) / (max - min)`
//! 2. **Clamp**: `v <= offsets[0]` gives the first color, `v >= offsets[last]`
//!    the last
//! 3. **Bracket**: scan segments `[offsets[i], offsets[i+1])` in order, first
//!    match wins, so a value sitting exactly on an interior offset belongs to
//!    the segment starting there
//! 4. **Interpolate**: `t = (v - offsets[i]) / (offsets[i+1] - offsets[i])`,
//!    each RGBA channel is `floor(c1 + t * (c2 - c1))`
//! 5. **Fallback**: nothing bracketed (NaN input) gives the last color
//!
//! ## JSON Form
//!
//! ```json
//! { "colors": [[0, 0, 0, 255], [255, 255, 255, 255]], "offsets": [0.0, 1.0], "min": 0.0, "max": 1.0 }
//! ```
//!
//! Every field is optional: missing lists are empty, `min` defaults to 0.0
//! and `max` to 1.0.

use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// RGBA color, one byte per channel.
pub type Rgba = [u8; 4];

/// Errors raised while configuring or applying a colorscale.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No control colors to look up
    #[error("colorscale has no colors")]
    Empty,

    /// Colors and offsets must pair up 1:1
    #[error("colorscale has {colors} colors but {offsets} offsets")]
    LengthMismatch { colors: usize, offsets: usize },

    /// Offsets must be ascending for the segment scan to work
    #[error("colorscale offsets are not ascending at index {0}")]
    UnsortedOffsets(usize),

    /// Rescaling would divide by zero
    #[error("colorscale range is degenerate (min == max == {0})")]
    DegenerateRange(f64),

    /// Range requested from a raster whose samples are all missing
    #[error("raster has no valid samples")]
    NoData,

    /// Encoding the rendered image failed
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// Writing rendered output failed
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_min() -> f64 {
    0.0
}

fn default_max() -> f64 {
    1.0
}

/// Names accepted by [`Colorscale::preset`].
pub const PRESET_NAMES: [&str; 6] = [
    "black-white",
    "red-green",
    "blue-yellow",
    "blue-red",
    "blue-green",
    "waves",
];

/// Piecewise-linear color ramp with a value range.
///
/// # Example
/// ```
/// use earthos::colorscale::Colorscale;
///
/// let scale = Colorscale::preset("black-white").unwrap();
/// assert_eq!(scale.get_color(0.5, true).unwrap(), [127, 127, 127, 255]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Colorscale {
    #[serde(default)]
    pub colors: Vec<Rgba>,
    #[serde(default)]
    pub offsets: Vec<f64>,
    #[serde(default = "default_min")]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
}

impl Default for Colorscale {
    fn default() -> Self {
        Self {
            colors: Vec::new(),
            offsets: Vec::new(),
            min: default_min(),
            max: default_max(),
        }
    }
}

impl Colorscale {
    pub fn new(colors: Vec<Rgba>, offsets: Vec<f64>, min: f64, max: f64) -> Self {
        Self {
            colors,
            offsets,
            min,
            max,
        }
    }

    /// Built-in ramp by name, range `[0, 1]`.
    pub fn preset(name: &str) -> Option<Self> {
        let two = |a: Rgba, b: Rgba| Self::new(vec![a, b], vec![0.0, 1.0], 0.0, 1.0);
        let scale = match name {
            "black-white" => two([0, 0, 0, 255], [255, 255, 255, 255]),
            "red-green" => two([255, 0, 0, 255], [0, 255, 0, 255]),
            "blue-yellow" => two([0, 0, 255, 255], [255, 255, 0, 255]),
            "blue-red" => two([0, 0, 255, 255], [255, 0, 0, 255]),
            "blue-green" => two([0, 0, 255, 255], [0, 255, 0, 255]),
            "waves" => Self::new(
                vec![
                    [0, 0, 255, 255],
                    [0, 255, 255, 255],
                    [255, 255, 255, 255],
                    [255, 0, 255, 255],
                    [0, 0, 255, 255],
                ],
                vec![0.0, 0.25, 0.5, 0.75, 1.0],
                0.0,
                1.0,
            ),
            _ => return None,
        };
        Some(scale)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "colors": self.colors,
            "offsets": self.offsets,
            "min": self.min,
            "max": self.max,
        })
    }

    /// Append a control color at `offset`.
    pub fn add_color(&mut self, color: Rgba, offset: f64) {
        self.colors.push(color);
        self.offsets.push(offset);
    }

    /// Take `min`/`max` from the raster's NaN-free extremes.
    pub fn set_minmax(&mut self, raster: &Raster) -> Result<(), RenderError> {
        match (raster.min(), raster.max()) {
            (Some(min), Some(max)) => {
                self.min = f64::from(min);
                self.max = f64::from(max);
                Ok(())
            }
            _ => Err(RenderError::NoData),
        }
    }

    /// Builder form of [`Colorscale::set_minmax`].
    pub fn with_range_of(mut self, raster: &Raster) -> Result<Self, RenderError> {
        self.set_minmax(raster)?;
        Ok(self)
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Check the color/offset invariants.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.colors.is_empty() {
            return Err(RenderError::Empty);
        }
        if self.colors.len() != self.offsets.len() {
            return Err(RenderError::LengthMismatch {
                colors: self.colors.len(),
                offsets: self.offsets.len(),
            });
        }
        if let Some(i) = self.offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(RenderError::UnsortedOffsets(i + 1));
        }
        Ok(())
    }

    /// Validate the scale and, when rescaling, the value range.
    pub(crate) fn validate_for(&self, rescale: bool) -> Result<(), RenderError> {
        self.validate()?;
        if rescale && self.max == self.min {
            return Err(RenderError::DegenerateRange(self.min));
        }
        Ok(())
    }

    /// Color for `value`, optionally rescaled through `[min, max]` first.
    pub fn get_color(&self, value: f64, rescale: bool) -> Result<Rgba, RenderError> {
        self.validate_for(rescale)?;
        Ok(self.lookup(value, rescale))
    }

    /// Lookup without validation; callers run [`Colorscale::validate_for`] once.
    pub(crate) fn lookup(&self, value: f64, rescale: bool) -> Rgba {
        let value = if rescale {
            (value - self.min) / (self.max - self.min)
        } else {
            value
        };

        let last = self.colors.len() - 1;
        if value <= self.offsets[0] {
            return self.colors[0];
        }
        if value >= self.offsets[last] {
            return self.colors[last];
        }

        for (i, pair) in self.offsets.windows(2).enumerate() {
            let (lo, hi) = (pair[0], pair[1]);
            if lo <= value && value < hi {
                let t = (value - lo) / (hi - lo);
                return interpolate(self.colors[i], self.colors[i + 1], t);
            }
        }

        self.colors[last]
    }
}

fn interpolate(from: Rgba, to: Rgba, t: f64) -> Rgba {
    let mut out = [0u8; 4];
    for (channel, (a, b)) in out.iter_mut().zip(from.iter().zip(to.iter())) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        *channel = (a + t * (b - a)).floor() as u8;
    }
    out
}
