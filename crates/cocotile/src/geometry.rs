//! Geometry primitives: bounds/polygon conversion and the EPSG:3857 ↔
//! EPSG:4326 reprojection the pipeline needs.
//!
//! Reprojection is deliberately minimal: spherical Web Mercator only, both
//! axes independent and monotone, which is exactly what converting raster
//! extents and label polygons requires.

use geo::{coord, Coord, LineString, MapCoords, Polygon};

use crate::extent::{Bounds, RasterExtent};
use crate::{Error, Result};

/// Spherical Mercator earth radius in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// Build a rectangle polygon from bounds, ring order
/// (min,min) → (min,max) → (max,max) → (max,min).
pub fn bounds_to_polygon(b: Bounds) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (b.min_x, b.min_y),
            (b.min_x, b.max_y),
            (b.max_x, b.max_y),
            (b.max_x, b.min_y),
        ]),
        vec![],
    )
}

fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (lat.to_radians() / 2.0 + std::f64::consts::FRAC_PI_4)
        .tan()
        .ln()
        * EARTH_RADIUS;
    (x, y)
}

fn check_supported(src_epsg: u32, dst_epsg: u32) -> Result<()> {
    let supported = |e| e == EPSG_WGS84 || e == EPSG_WEB_MERCATOR;
    if supported(src_epsg) && supported(dst_epsg) {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "unsupported reprojection EPSG:{} -> EPSG:{}",
            src_epsg, dst_epsg
        )))
    }
}

fn convert(c: Coord<f64>, src_epsg: u32, dst_epsg: u32) -> Coord<f64> {
    match (src_epsg, dst_epsg) {
        (EPSG_WEB_MERCATOR, EPSG_WGS84) => {
            let (lon, lat) = mercator_to_lonlat(c.x, c.y);
            coord! { x: lon, y: lat }
        }
        (EPSG_WGS84, EPSG_WEB_MERCATOR) => {
            let (x, y) = lonlat_to_mercator(c.x, c.y);
            coord! { x: x, y: y }
        }
        _ => c,
    }
}

/// Reproject a polygon between the two supported systems.
pub fn reproject_polygon(poly: &Polygon<f64>, src_epsg: u32, dst_epsg: u32) -> Result<Polygon<f64>> {
    check_supported(src_epsg, dst_epsg)?;
    Ok(poly.map_coords(|c| convert(c, src_epsg, dst_epsg)))
}

/// Reproject a raster extent: corners are converted and pixel sizes
/// recomputed from the converted spans. Pixel counts are unchanged; the
/// pixel grid is assumed to stay axis-aligned, which holds for the
/// Mercator ↔ geodetic pair since both axes convert independently.
pub fn reproject_extent(extent: &RasterExtent, dst_epsg: u32) -> Result<RasterExtent> {
    check_supported(extent.epsg, dst_epsg)?;
    if extent.epsg == dst_epsg {
        return Ok(*extent);
    }

    let tl = convert(
        coord! { x: extent.min_x(), y: extent.max_y() },
        extent.epsg,
        dst_epsg,
    );
    let br = convert(
        coord! { x: extent.max_x(), y: extent.min_y() },
        extent.epsg,
        dst_epsg,
    );

    Ok(RasterExtent {
        origin_x: tl.x,
        origin_y: tl.y,
        pixel_size_x: (br.x - tl.x) / extent.width_px as f64,
        pixel_size_y: -((tl.y - br.y) / extent.height_px as f64),
        width_px: extent.width_px,
        height_px: extent.height_px,
        epsg: dst_epsg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::CoordsIter;

    #[test]
    fn bounds_polygon_ring_order() {
        let b = Bounds {
            min_x: 1.0,
            min_y: 2.0,
            max_x: 3.0,
            max_y: 4.0,
        };
        let poly = bounds_to_polygon(b);
        // Closed ring: 4 corners + repeated first point.
        assert_eq!(poly.exterior().coords_count(), 5);
        let first = poly.exterior().0[0];
        assert_eq!((first.x, first.y), (1.0, 2.0));
    }

    #[test]
    fn mercator_round_trip() {
        let (x, y) = lonlat_to_mercator(28.97, 41.03);
        let (lon, lat) = mercator_to_lonlat(x, y);
        assert!((lon - 28.97).abs() < 1e-9);
        assert!((lat - 41.03).abs() < 1e-9);
    }

    #[test]
    fn extent_reprojection_preserves_pixel_counts() {
        let ext = RasterExtent {
            origin_x: 3_224_000.0,
            origin_y: 5_012_000.0,
            pixel_size_x: 0.5,
            pixel_size_y: -0.5,
            width_px: 2048,
            height_px: 1024,
            epsg: EPSG_WEB_MERCATOR,
        };
        let geo = reproject_extent(&ext, EPSG_WGS84).unwrap();
        assert_eq!(geo.width_px, ext.width_px);
        assert_eq!(geo.height_px, ext.height_px);
        assert_eq!(geo.epsg, EPSG_WGS84);
        assert!(geo.pixel_size_y < 0.0);
        // Corners must agree with direct conversion.
        let (lon, lat) = mercator_to_lonlat(ext.min_x(), ext.max_y());
        assert!((geo.origin_x - lon).abs() < 1e-12);
        assert!((geo.origin_y - lat).abs() < 1e-12);
    }

    #[test]
    fn unsupported_epsg_pair_is_rejected() {
        let poly = bounds_to_polygon(Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 1.0,
            max_y: 1.0,
        });
        assert!(reproject_polygon(&poly, 32635, EPSG_WGS84).is_err());
    }
}
