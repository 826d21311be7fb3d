//! # pfpng Raster Decoding
//!
//! The engine ships map tiles and regions as "pfpng": an ordinary RGBA PNG
//! whose four channel bytes per pixel are really the bit pattern of one
//! 32-bit IEEE-754 float. Decoding is therefore a reinterpretation, not a
//! color conversion:
//!
//! ```text
//! pixel i = [r, g, b, a]  →  f32::from_le_bytes([r, g, b, a])  →  data[i]
//! ```
//!
//! Pixels are read in PNG scan order (row-major, top-left origin), so
//! `data[y * width + x]` is the sample at column `x`, row `y`. Missing data is
//! encoded by the engine as NaN and survives decoding untouched.
//!
//! ## Byte Order
//!
//! The producing encoder is external. Little-endian is the default and is
//! what the engine emits today; [`ByteOrder::Big`] exists for producers that
//! write network order.
//!
//! ## Failure Modes
//!
//! Decoding is all-or-nothing. Bytes that are not a PNG, or a PNG whose
//! pixels are not exactly four 8-bit channels, fail with [`DecodeError`] and
//! no partial raster is returned.

use crate::Region;
use image::{ColorType, ImageFormat};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while decoding a raster payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not a readable PNG (truncated, wrong magic, bad CRC...)
    #[error("invalid image payload: {0}")]
    Image(#[from] image::ImageError),

    /// PNG decoded, but pixels do not carry exactly 4 bytes
    #[error("unsupported pixel layout {0:?}: pfpng needs 4 bytes per pixel (RGBA8)")]
    PixelLayout(ColorType),
}

/// Byte order of the packed floats inside each pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    fn read(self, bytes: [u8; 4]) -> f32 {
        match self {
            ByteOrder::Little => f32::from_le_bytes(bytes),
            ByteOrder::Big => f32::from_be_bytes(bytes),
        }
    }
}

/// Payload format a raster was decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFormat {
    Pfpng,
}

impl RasterFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            RasterFormat::Pfpng => "pfpng",
        }
    }
}

impl fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded grid of float samples covering a geographic region.
///
/// Memory layout:
/// - `data`: `width × height` samples, row-major, 4 bytes each
/// - a 256×256 tile is 256 KiB of samples
///
/// # Example
/// ```no_run
/// use earthos::{raster::Raster, Region};
///
/// let bytes = std::fs::read("tile.pfpng").unwrap();
/// let raster = Raster::from_pfpng(&bytes, Region::whole_world()).unwrap();
///
/// println!("{}x{} min={:?}", raster.width(), raster.height(), raster.min());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    data: Vec<f32>,
    width: u32,
    height: u32,
    region: Region,
    format: RasterFormat,
}

impl Raster {
    /// Decode a little-endian pfpng payload.
    pub fn from_pfpng(bytes: &[u8], region: Region) -> Result<Self, DecodeError> {
        Self::from_pfpng_with(bytes, region, ByteOrder::Little)
    }

    /// Decode a pfpng payload with an explicit float byte order.
    pub fn from_pfpng_with(
        bytes: &[u8],
        region: Region,
        order: ByteOrder,
    ) -> Result<Self, DecodeError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;

        let color = image.color();
        if color != ColorType::Rgba8 {
            return Err(DecodeError::PixelLayout(color));
        }

        let (width, height) = (image.width(), image.height());
        let pixels = image.into_rgba8().into_raw();

        let data: Vec<f32> = pixels
            .chunks_exact(4)
            .map(|px| order.read([px[0], px[1], px[2], px[3]]))
            .collect();

        tracing::debug!(width, height, samples = data.len(), "decoded pfpng raster");

        Ok(Self {
            data,
            width,
            height,
            region,
            format: RasterFormat::Pfpng,
        })
    }

    /// Assemble a raster from already-decoded samples.
    #[cfg(test)]
    pub(crate) fn from_samples(data: Vec<f32>, width: u32, height: u32) -> Self {
        assert_eq!(data.len(), width as usize * height as usize);
        Self {
            data,
            width,
            height,
            region: Region::whole_world(),
            format: RasterFormat::Pfpng,
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` in pixels.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Samples that are not NaN.
    pub fn valid(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied().filter(|v| !v.is_nan())
    }

    /// Smallest non-NaN sample, `None` if every sample is missing.
    pub fn min(&self) -> Option<f32> {
        self.valid().fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.min(v))))
    }

    /// Largest non-NaN sample, `None` if every sample is missing.
    pub fn max(&self) -> Option<f32> {
        self.valid().fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.max(v))))
    }

    /// Mean of the non-NaN samples, `None` if every sample is missing.
    pub fn mean(&self) -> Option<f32> {
        let (sum, count) = self
            .valid()
            .fold((0.0f64, 0usize), |(sum, count), v| (sum + f64::from(v), count + 1));
        if count == 0 {
            None
        } else {
            Some((sum / count as f64) as f32)
        }
    }
}
