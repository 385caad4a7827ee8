//! In-crate raster primitives: windowed crop, vector burn-in and PNG export.
//!
//! The burn-in is a scanline even-odd fill sampled at pixel centers; holes
//! in a polygon fall out of the even-odd rule without special casing.

use std::path::Path;

use geo::Polygon;
use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};

use crate::extent::{Bounds, RasterExtent};
use crate::Result;

/// Crop `src` to the pixel window covering `bounds`, producing an
/// `out_w` x `out_h` image. Windows extending beyond the source raster are
/// zero-padded, so the last grid row/column still crops to full cell size.
pub fn crop_to_bounds(
    src: &RgbaImage,
    extent: &RasterExtent,
    bounds: Bounds,
    out_w: u32,
    out_h: u32,
) -> RgbaImage {
    let px0 = ((bounds.min_x - extent.min_x()) / extent.pixel_size_x).round() as i64;
    let py0 = ((extent.max_y() - bounds.max_y) / extent.res_y_abs()).round() as i64;

    let mut out = RgbaImage::new(out_w, out_h);
    for y in 0..out_h {
        let sy = py0 + y as i64;
        if sy < 0 || sy >= src.height() as i64 {
            continue;
        }
        for x in 0..out_w {
            let sx = px0 + x as i64;
            if sx < 0 || sx >= src.width() as i64 {
                continue;
            }
            out.put_pixel(x, y, *src.get_pixel(sx as u32, sy as u32));
        }
    }
    out
}

/// Burn polygons into an RGB mask raster covering `bounds` at the given
/// resolution. Background stays black; covered pixels get `burn`.
pub fn rasterize_polygons(
    polygons: &[Polygon<f64>],
    bounds: Bounds,
    res_x: f64,
    res_y: f64,
    burn: [u8; 3],
) -> RgbImage {
    let width = (bounds.width() / res_x).round().max(1.0) as u32;
    let height = (bounds.height() / res_y).round().max(1.0) as u32;
    let mut mask = RgbImage::new(width, height);

    for poly in polygons {
        burn_polygon(&mut mask, poly, bounds, res_x, res_y, burn);
    }
    mask
}

fn burn_polygon(
    mask: &mut RgbImage,
    poly: &Polygon<f64>,
    bounds: Bounds,
    res_x: f64,
    res_y: f64,
    burn: [u8; 3],
) {
    // Geo -> pixel, y flipped (row 0 is max_y).
    let to_px = |x: f64, y: f64| ((x - bounds.min_x) / res_x, (bounds.max_y - y) / res_y);

    let mut rings: Vec<Vec<(f64, f64)>> = Vec::with_capacity(1 + poly.interiors().len());
    for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
        let pts: Vec<(f64, f64)> = ring.0.iter().map(|c| to_px(c.x, c.y)).collect();
        if pts.len() >= 4 {
            rings.push(pts);
        }
    }
    if rings.is_empty() {
        return;
    }

    // Clamp the scan to the polygon's pixel bounding box.
    let (mut min_px, mut min_py) = (f64::INFINITY, f64::INFINITY);
    let (mut max_px, mut max_py) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for pts in &rings {
        for &(x, y) in pts {
            min_px = min_px.min(x);
            max_px = max_px.max(x);
            min_py = min_py.min(y);
            max_py = max_py.max(y);
        }
    }
    let x_lo = (min_px.floor().max(0.0)) as u32;
    let y_lo = (min_py.floor().max(0.0)) as u32;
    let x_hi = (max_px.ceil() as i64).clamp(0, mask.width() as i64) as u32;
    let y_hi = (max_py.ceil() as i64).clamp(0, mask.height() as i64) as u32;

    for y in y_lo..y_hi {
        let py = y as f64 + 0.5;
        for x in x_lo..x_hi {
            let px = x as f64 + 0.5;

            // Even-odd rule over all rings; a crossing count that is odd
            // puts the pixel center inside (holes naturally excluded).
            let mut inside = false;
            for pts in &rings {
                let n = pts.len();
                let mut j = n - 1;
                for i in 0..n {
                    let (xi, yi) = pts[i];
                    let (xj, yj) = pts[j];
                    if (yi > py) != (yj > py) {
                        let x_inter = (xj - xi) * (py - yi) / (yj - yi + 1e-20) + xi;
                        if px < x_inter {
                            inside = !inside;
                        }
                    }
                    j = i;
                }
            }

            if inside {
                mask.put_pixel(x, y, Rgb(burn));
            }
        }
    }
}

/// Save an RGB image as PNG.
pub fn save_png(path: &Path, img: &RgbImage) -> Result<()> {
    img.save(path)?;
    Ok(())
}

/// Save as PNG with an alpha channel. When `alpha` is absent one is
/// generated: pixels with any nonzero band become opaque. Used for
/// reprojected rasters whose padding collar should be transparent.
pub fn save_png_with_alpha(path: &Path, img: &RgbaImage, alpha: Option<&GrayImage>) -> Result<()> {
    let mut out = img.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        let a = match alpha {
            Some(a) => a.get_pixel(x, y)[0],
            None => {
                let Rgba([r, g, b, _]) = *p;
                if r > 0 || g > 0 || b > 0 {
                    255
                } else {
                    0
                }
            }
        };
        p[3] = a;
    }
    out.save(path)?;
    Ok(())
}

/// Flatten an RGBA tile to RGB for exports that carry no alpha.
pub fn drop_alpha(img: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        out.put_pixel(x, y, Rgb([p[0], p[1], p[2]]));
    }
    out
}
