//! Rendering decoded rasters: colorized PNGs, raw float dumps and a terminal
//! preview for quick looks without an image viewer.

use crate::colorscale::{Colorscale, RenderError};
use crate::raster::Raster;
use image::{ImageFormat, Rgba, RgbaImage};
use std::fs;
use std::path::Path;

/// Shades from lowest to highest value; missing samples print as a space.
const ASCII_RAMP: &[u8] = b".:-=+*#%@";

/// Colorize every sample of `raster` through `colorscale` (rescaled).
///
/// Output pixel `(x, y)` is the color of `data[y * width + x]`.
pub fn render_rgba(raster: &Raster, colorscale: &Colorscale) -> Result<RgbaImage, RenderError> {
    colorscale.validate_for(true)?;

    let width = raster.width();
    let data = raster.data();
    let image = RgbaImage::from_fn(width, raster.height(), |x, y| {
        let value = data[y as usize * width as usize + x as usize];
        Rgba(colorscale.lookup(f64::from(value), true))
    });

    tracing::debug!(width, height = raster.height(), "rendered raster");
    Ok(image)
}

/// Render and write a PNG to `path`.
pub fn save_png<P: AsRef<Path>>(
    raster: &Raster,
    colorscale: &Colorscale,
    path: P,
) -> Result<(), RenderError> {
    let image = render_rgba(raster, colorscale)?;
    image.save_with_format(path.as_ref(), ImageFormat::Png)?;
    tracing::info!(path = %path.as_ref().display(), "saved rendered PNG");
    Ok(())
}

/// Write raw samples as consecutive little-endian `f32` values.
pub fn save_raw<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<(), RenderError> {
    let bytes: Vec<u8> = raster.data().iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(path.as_ref(), bytes).map_err(|source| RenderError::Io {
        path: path.as_ref().to_path_buf(),
        source,
    })
}

/// Shaded text preview at most `columns` characters wide.
///
/// Rows are halved relative to columns since terminal cells are about twice
/// as tall as they are wide.
pub fn draw_ascii(raster: &Raster, columns: u32) -> String {
    if raster.is_empty() || columns == 0 {
        return String::new();
    }

    let cols = columns.min(raster.width());
    let rows = ((u64::from(cols) * u64::from(raster.height())) / (2 * u64::from(raster.width()))).max(1) as u32;

    let (min, max) = match (raster.min(), raster.max()) {
        (Some(min), Some(max)) => (min, max),
        _ => return vec![" ".repeat(cols as usize); rows as usize].join("\n"),
    };
    let span = max - min;

    let shade = |value: f32| -> char {
        if value.is_nan() {
            return ' ';
        }
        let normalized = if span > 0.0 { (value - min) / span } else { 0.5 };
        let index = (normalized * (ASCII_RAMP.len() - 1) as f32).round() as usize;
        ASCII_RAMP[index.min(ASCII_RAMP.len() - 1)] as char
    };

    let mut lines = Vec::with_capacity(rows as usize);
    for row in 0..rows {
        let y = (u64::from(row) * u64::from(raster.height()) / u64::from(rows)) as u32;
        let line: String = (0..cols)
            .map(|col| {
                let x = (u64::from(col) * u64::from(raster.width()) / u64::from(cols)) as u32;
                raster.get(x, y).map_or(' ', |v| shade(v))
            })
            .collect();
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn ramp() -> Raster {
        Raster::from_samples(vec![0.0, 1.0, 2.0, f32::NAN], 2, 2)
    }

    #[test]
    fn test_render_maps_each_pixel() {
        let scale = Colorscale::preset("black-white").unwrap().with_range(0.0, 2.0);
        let image = render_rgba(&ramp(), &scale).unwrap();

        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [127, 127, 127, 255]);
        assert_eq!(image.get_pixel(0, 1).0, [255, 255, 255, 255]);
        // NaN never brackets, so it takes the last color
        assert_eq!(image.get_pixel(1, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_render_rejects_degenerate_range() {
        let scale = Colorscale::preset("black-white").unwrap().with_range(1.0, 1.0);
        assert!(matches!(
            render_rgba(&ramp(), &scale),
            Err(RenderError::DegenerateRange(_))
        ));
    }

    #[test]
    fn test_save_png_writes_readable_image() {
        let file = NamedTempFile::new().unwrap();
        let scale = Colorscale::preset("blue-red").unwrap().with_range_of(&ramp()).unwrap();
        save_png(&ramp(), &scale, file.path()).unwrap();

        let decoded = image::load_from_memory(&fs::read(file.path()).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2, 2));
    }

    #[test]
    fn test_save_raw_is_little_endian_f32() {
        let file = NamedTempFile::new().unwrap();
        save_raw(&ramp(), file.path()).unwrap();

        let bytes = fs::read(file.path()).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1.0);
    }

    #[test]
    fn test_ascii_preview_shape_and_shades() {
        let raster = Raster::from_samples((0..32).map(|v| v as f32).collect(), 8, 4);
        let preview = draw_ascii(&raster, 8);
        let lines: Vec<&str> = preview.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.chars().count() == 8));
        assert!(lines[0].starts_with('.'));
        // Bottom-right sample (23 of 0..=31) is the brightest one shown
        assert!(lines[1].ends_with('#'));
    }

    #[test]
    fn test_ascii_preview_missing_data() {
        let raster = Raster::from_samples(vec![f32::NAN; 4], 2, 2);
        assert_eq!(draw_ascii(&raster, 2), "  ");
    }
}
