//! # EarthOS Client Library
//!
//! Rust bindings for the EarthOS engine, a remote service that evaluates
//! weather and earth-observation formulas at points, over slippy map tiles
//! and over arbitrary bounding boxes.
//!
//! ## Data Flow
//!
//! 1. **Build**: compose a [`formula::Formula`] from variable references,
//!    literals and time/space offsets
//! 2. **Request**: [`client::EarthOs`] sends the formula text plus a normalized
//!    timestamp to the engine
//! 3. **Decode**: tile and region responses arrive as pfpng and become a
//!    [`raster::Raster`] of `f32` samples
//! 4. **Render**: a [`colorscale::Colorscale`] maps samples to RGBA, and
//!    [`renderer`] writes PNGs or terminal previews
//!
//! ## Example
//! ```no_run
//! use earthos::{client::EarthOs, colorscale::Colorscale, config::Config, formula::Var};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let eo = EarthOs::new(Config::load().engine)?;
//!
//! let now = Var::new("gfs", "air_temperature");
//! let yesterday = now.clone().offset([("time", -86400.0)])?;
//!
//! let tile = eo.tile(0, 0, 0, "2024-06-24T16:30:00Z", now - yesterday).await?;
//! let scale = Colorscale::preset("blue-red").unwrap().with_range_of(&tile)?;
//! earthos::renderer::save_png(&tile, &scale, "diff.png")?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod client;
pub mod colorscale;
pub mod config;
pub mod formula;
pub mod raster;
pub mod renderer;
pub mod tile;
pub mod timestamp;

pub use client::{ApiError, ClientError, EarthOs};
pub use colorscale::{Colorscale, RenderError, Rgba};
pub use formula::{Formula, FormulaError, Offset, Var};
pub use raster::{ByteOrder, DecodeError, Raster};
pub use timestamp::Timestamp;

/// Geographic bounding box in degrees.
///
/// `north`/`south` are latitudes, `east`/`west` longitudes. The engine does
/// not require `west < east`; regions crossing the antimeridian are sent as-is.
///
/// # Example
/// ```
/// use earthos::Region;
///
/// let iceland = Region::new(66.6, 63.3, -13.5, -24.5);
/// assert_eq!(iceland.north, 66.6);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Region {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Full latitude/longitude extent.
    pub fn whole_world() -> Self {
        Self::new(90.0, -90.0, 180.0, -180.0)
    }

    /// Query parameters in the order the engine documents them.
    pub(crate) fn query_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("north", self.north.to_string()),
            ("south", self.south.to_string()),
            ("east", self.east.to_string()),
            ("west", self.west.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests;
