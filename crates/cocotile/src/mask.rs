//! Per-tile mask generation: one color-coded raster per resolved category,
//! plus a combined mask for the whole tile.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use geo::Polygon;
use log::{info, warn};

use crate::category::{self, Category};
use crate::extent::Tile;
use crate::raster;

/// One damage-labelled polygon, already clipped/filtered to a tile.
#[derive(Debug, Clone)]
pub struct LabelFeature {
    /// Raw `damage_gra` attribute value.
    pub damage: String,
    pub geometry: Polygon<f64>,
}

/// Mask files produced for one tile.
#[derive(Debug, Default)]
pub struct TileMasks {
    /// Per-category masks, in materialization order.
    pub category_masks: Vec<PathBuf>,
    /// The combined whole-tile mask.
    pub combined_mask: Option<PathBuf>,
}

/// Burns per-tile label geometry into mask rasters on disk.
///
/// File names encode `(band, tile_row, tile_col, category)`; that encoding
/// is the only linkage the annotation phase has back to the tile image, so
/// the scheme is load-bearing and must not change.
pub struct MaskAssembler<'a> {
    out_dir: &'a Path,
    band: &'a str,
    res_x: f64,
    res_y: f64,
}

impl<'a> MaskAssembler<'a> {
    pub fn new(out_dir: &'a Path, band: &'a str, res_x: f64, res_y: f64) -> Self {
        Self {
            out_dir,
            band,
            res_x,
            res_y,
        }
    }

    fn mask_path(&self, tile: &Tile, category: Option<Category>) -> PathBuf {
        let name = match category {
            Some(c) => format!(
                "{}-{}-{}_{}_seg.png",
                self.band, tile.row, tile.col, c
            ),
            None => format!("{}-{}-{}_seg.png", self.band, tile.row, tile.col),
        };
        self.out_dir.join(name)
    }

    /// Produce this tile's masks from its clipped label features.
    ///
    /// The merge policy runs first for every raw label: "Possibly damaged"
    /// and "Damaged" rasterize once, together, as `uncertain`; a per-tile
    /// set of materialized categories skips later encounters of either.
    /// A failed burn for one category is warned and skipped, the rest of
    /// the tile proceeds.
    pub fn assemble_tile(
        &self,
        tile: &Tile,
        features: &[LabelFeature],
        vocabulary: &BTreeSet<Category>,
    ) -> TileMasks {
        let mut masks = TileMasks::default();

        // Combined mask: all features burned with the fallback color.
        let all: Vec<Polygon<f64>> = features.iter().map(|f| f.geometry.clone()).collect();
        let combined_path = self.mask_path(tile, None);
        match self.burn(&all, tile, Category::Buildings.rgb(), &combined_path) {
            Ok(()) => masks.combined_mask = Some(combined_path),
            Err(e) => warn!(
                "combined mask failed at tile ({}, {}): {}",
                tile.row, tile.col, e
            ),
        }

        // Per-category masks only when the run resolved a real damage
        // vocabulary (not the single-buildings fallback).
        let fallback_only = vocabulary.len() == 1 && vocabulary.contains(&Category::Buildings);
        if fallback_only {
            return masks;
        }

        let mut materialized: HashSet<Category> = HashSet::new();

        for feature in features {
            let raw = feature.damage.as_str();

            // Merge case first: both ambiguous labels collapse into one
            // uncertain mask built from the union of their geometries.
            let (cat, selected): (Category, Vec<Polygon<f64>>) = if category::is_merged_uncertain(raw)
            {
                let union = features
                    .iter()
                    .filter(|f| category::is_merged_uncertain(f.damage.as_str()))
                    .map(|f| f.geometry.clone())
                    .collect();
                (Category::Uncertain, union)
            } else {
                let cat = Category::from_raw_label(raw);
                let selected = features
                    .iter()
                    .filter(|f| Category::from_raw_label(f.damage.as_str()) == cat)
                    .map(|f| f.geometry.clone())
                    .collect();
                (cat, selected)
            };

            if !materialized.insert(cat) {
                continue;
            }

            let path = self.mask_path(tile, Some(cat));
            info!(
                "rasterizing category {} for tile ({}, {}) -> {}",
                cat,
                tile.row,
                tile.col,
                path.display()
            );
            match self.burn(&selected, tile, cat.rgb(), &path) {
                Ok(()) => masks.category_masks.push(path),
                Err(e) => {
                    warn!(
                        "{}",
                        crate::Error::Rasterization {
                            row: tile.row,
                            col: tile.col,
                            category: cat.name(),
                            reason: e.to_string(),
                        }
                    );
                    // Allow a later feature of the same category to retry.
                    materialized.remove(&cat);
                }
            }
        }

        masks
    }

    fn burn(
        &self,
        polygons: &[Polygon<f64>],
        tile: &Tile,
        rgb: [u8; 3],
        path: &Path,
    ) -> crate::Result<()> {
        let mask = raster::rasterize_polygons(polygons, tile.bounds, self.res_x, self.res_y, rgb);
        raster::save_png(path, &mask)
    }
}
