//! Slippy map tile math (Web Mercator, XYZ addressing, top-left origin).

use crate::Region;
use std::f64::consts::PI;
use thiserror::Error;

/// Highest zoom the engine addresses; `2^30` tiles per axis still fits in `u32`.
pub const MAX_ZOOM: u8 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    #[error("zoom {0} exceeds the maximum of 30")]
    Zoom(u8),

    #[error("tile {x}/{y} is outside the {n}x{n} grid at zoom {z}")]
    OutOfRange { x: u32, y: u32, z: u8, n: u64 },
}

/// Northwest corner of tile `(x, y)` at zoom `z` as `(lat, lon)`.
fn tile_corner(x: u64, y: u64, z: u8) -> (f64, f64) {
    let n = (1u64 << z) as f64;
    let lon = x as f64 / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees();
    (lat, lon)
}

/// Bounding box of slippy tile `(x, y, z)`.
///
/// # Example
/// ```
/// use earthos::tile::tile_to_region;
///
/// let world = tile_to_region(0, 0, 0).unwrap();
/// assert!((world.north - 85.0511).abs() < 1e-3);
/// assert_eq!(world.west, -180.0);
/// ```
pub fn tile_to_region(x: u32, y: u32, z: u8) -> Result<Region, TileError> {
    if z > MAX_ZOOM {
        return Err(TileError::Zoom(z));
    }
    let n = 1u64 << z;
    if u64::from(x) >= n || u64::from(y) >= n {
        return Err(TileError::OutOfRange { x, y, z, n });
    }

    let (north, west) = tile_corner(u64::from(x), u64::from(y), z);
    let (south, east) = tile_corner(u64::from(x) + 1, u64::from(y) + 1, z);

    Ok(Region {
        north,
        south,
        east,
        west,
    })
}

/// Tile containing `(lat, lon)` at zoom `z`, clamped to the grid.
pub fn latlon_to_tile(lat: f64, lon: f64, z: u8) -> Result<(u32, u32), TileError> {
    if z > MAX_ZOOM {
        return Err(TileError::Zoom(z));
    }
    let n = (1u64 << z) as f64;
    let max = n - 1.0;

    let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, max);
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n)
        .floor()
        .clamp(0.0, max);

    Ok((x as u32, y as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-3;

    #[test]
    fn test_whole_world_tile() {
        let r = tile_to_region(0, 0, 0).unwrap();
        assert!((r.north - 85.0511).abs() < EPS);
        assert!((r.south + 85.0511).abs() < EPS);
        assert!((r.east - 180.0).abs() < EPS);
        assert!((r.west + 180.0).abs() < EPS);
    }

    #[test]
    fn test_zoom_one_quadrants() {
        let nw = tile_to_region(0, 0, 1).unwrap();
        assert!((nw.south).abs() < EPS);
        assert!((nw.east).abs() < EPS);

        let se = tile_to_region(1, 1, 1).unwrap();
        assert!((se.north).abs() < EPS);
        assert!((se.west).abs() < EPS);
        assert!((se.east - 180.0).abs() < EPS);
    }

    #[test]
    fn test_out_of_range_tiles() {
        assert_eq!(tile_to_region(0, 0, 31), Err(TileError::Zoom(31)));
        assert!(matches!(
            tile_to_region(2, 0, 1),
            Err(TileError::OutOfRange { n: 2, .. })
        ));
    }

    #[test]
    fn test_latlon_lands_inside_its_tile() {
        let (lat, lon) = (64.149141, -21.940747);
        let (x, y) = latlon_to_tile(lat, lon, 10).unwrap();
        let r = tile_to_region(x, y, 10).unwrap();
        assert!(r.south <= lat && lat <= r.north);
        assert!(r.west <= lon && lon <= r.east);
    }
}
