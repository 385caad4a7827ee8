//! Raster extents and the tile-grid partitioning engine.

use crate::{Error, Result};

/// Spatial footprint of a raster, read once from its georeferencing and
/// immutable afterwards.
///
/// `pixel_size_y` keeps its sign (negative for the usual north-up rasters);
/// use [`RasterExtent::res_y_abs`] wherever a span is needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterExtent {
    /// Geo x of the top-left corner of the top-left pixel.
    pub origin_x: f64,
    /// Geo y of the top-left corner of the top-left pixel.
    pub origin_y: f64,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub width_px: u32,
    pub height_px: u32,
    pub epsg: u32,
}

impl RasterExtent {
    #[inline]
    pub fn res_y_abs(&self) -> f64 {
        self.pixel_size_y.abs()
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.origin_x
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.origin_y
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.origin_x + self.pixel_size_x * self.width_px as f64
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.origin_y - self.res_y_abs() * self.height_px as f64
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_x: self.min_x(),
            min_y: self.min_y(),
            max_x: self.max_x(),
            max_y: self.max_y(),
        }
    }
}

/// Axis-aligned bounding box in the raster's geographic units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// One cell of the tile grid. Ephemeral: generated and consumed per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub row: usize,
    pub col: usize,
    pub bounds: Bounds,
}

/// Regular tiling of a raster extent into equal-size cells.
///
/// Cell count per axis is `ceil(extent / cell)`; the cell span is then
/// recomputed as `total_span / cell_count`, so the grid may extend slightly
/// past the original extent on the last row/column instead of producing an
/// undersized remainder tile. All cells are exactly equal in size.
#[derive(Debug, Clone)]
pub struct TileGrid {
    cols: usize,
    rows: usize,
    x_steps: Vec<f64>,
    y_steps: Vec<f64>,
    cell_width_px: u32,
    cell_height_px: u32,
}

impl TileGrid {
    pub fn new(extent: &RasterExtent, cell_width_px: u32, cell_height_px: u32) -> Result<Self> {
        if cell_width_px == 0 || cell_height_px == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "tile size must be positive, got {}x{}",
                cell_width_px, cell_height_px
            )));
        }
        if extent.width_px == 0 || extent.height_px == 0 {
            return Err(Error::InvalidConfiguration(
                "raster extent has zero pixels".into(),
            ));
        }

        let cols = (extent.width_px as f64 / cell_width_px as f64).ceil() as usize;
        let rows = (extent.height_px as f64 / cell_height_px as f64).ceil() as usize;

        // Equal redistribution: the grid spans cols * cell_width_px pixels
        // even when that overshoots the raster, and every cell gets an equal
        // share of that span.
        let span_x = cell_width_px as f64 * cols as f64 * extent.pixel_size_x;
        let span_y = cell_height_px as f64 * rows as f64 * extent.res_y_abs();
        let cell_span_x = span_x / cols as f64;
        let cell_span_y = span_y / rows as f64;

        let min_x = extent.min_x();
        let max_y = extent.max_y();
        let x_steps = (0..=cols).map(|i| min_x + cell_span_x * i as f64).collect();
        let y_steps = (0..=rows).map(|j| max_y - cell_span_y * j as f64).collect();

        Ok(Self {
            cols,
            rows,
            x_steps,
            y_steps,
            cell_width_px,
            cell_height_px,
        })
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total number of tiles (`rows * cols`).
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel dimensions every tile crops to.
    #[inline]
    pub fn cell_px(&self) -> (u32, u32) {
        (self.cell_width_px, self.cell_height_px)
    }

    pub fn tile(&self, row: usize, col: usize) -> Tile {
        Tile {
            row,
            col,
            bounds: Bounds {
                min_x: self.x_steps[col],
                min_y: self.y_steps[row + 1],
                max_x: self.x_steps[col + 1],
                max_y: self.y_steps[row],
            },
        }
    }

    /// Enumerate tiles column-outer, row-inner. Tile file naming and the
    /// later mask/annotation correlation depend on this order; callers must
    /// preserve it.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.cols).flat_map(move |i| (0..self.rows).map(move |j| self.tile(j, i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width_px: u32, height_px: u32) -> RasterExtent {
        RasterExtent {
            origin_x: 28.9,
            origin_y: 41.1,
            pixel_size_x: 1e-4,
            pixel_size_y: -1e-4,
            width_px,
            height_px,
            epsg: 4326,
        }
    }

    #[test]
    fn grid_counts_and_order() {
        let ext = extent(1000, 700);
        let grid = TileGrid::new(&ext, 512, 512).unwrap();
        assert_eq!(grid.cols(), 2);
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.len(), 4);

        let tiles: Vec<Tile> = grid.tiles().collect();
        assert_eq!(tiles.len(), grid.len());
        // Column-outer, row-inner.
        let rc: Vec<(usize, usize)> = tiles.iter().map(|t| (t.row, t.col)).collect();
        assert_eq!(rc, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn tiles_cover_extent_without_gaps_or_overlap() {
        let ext = extent(1000, 700);
        let grid = TileGrid::new(&ext, 512, 512).unwrap();

        let t00 = grid.tile(0, 0);
        let t01 = grid.tile(0, 1);
        let t10 = grid.tile(1, 0);

        // Adjacent tiles share their boundary exactly (same step value).
        assert_eq!(t00.bounds.max_x, t01.bounds.min_x);
        assert_eq!(t00.bounds.min_y, t10.bounds.max_y);

        // The grid starts at the extent's top-left corner and covers at
        // least the full extent.
        assert_eq!(t00.bounds.min_x, ext.min_x());
        assert_eq!(t00.bounds.max_y, ext.max_y());
        let last = grid.tile(grid.rows() - 1, grid.cols() - 1);
        assert!(last.bounds.max_x >= ext.max_x() - 1e-12);
        assert!(last.bounds.min_y <= ext.min_y() + 1e-12);
    }

    #[test]
    fn all_cells_equal_size() {
        let ext = extent(1000, 700);
        let grid = TileGrid::new(&ext, 512, 512).unwrap();
        let widths: Vec<f64> = grid.tiles().map(|t| t.bounds.width()).collect();
        let heights: Vec<f64> = grid.tiles().map(|t| t.bounds.height()).collect();
        for w in &widths {
            assert!((w - widths[0]).abs() < 1e-12);
        }
        for h in &heights {
            assert!((h - heights[0]).abs() < 1e-12);
        }
    }

    #[test]
    fn oversize_cell_yields_single_full_tile() {
        let ext = extent(300, 200);
        let grid = TileGrid::new(&ext, 512, 512).unwrap();
        assert_eq!(grid.len(), 1);
        let t = grid.tile(0, 0);
        assert_eq!(t.bounds.min_x, ext.min_x());
        assert_eq!(t.bounds.max_y, ext.max_y());
        // Equal redistribution keeps the full (overshooting) cell span.
        assert!((t.bounds.width() - 512.0 * ext.pixel_size_x).abs() < 1e-12);
    }

    #[test]
    fn zero_cell_size_is_a_configuration_error() {
        let ext = extent(100, 100);
        assert!(matches!(
            TileGrid::new(&ext, 0, 512),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            TileGrid::new(&ext, 512, 0),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
