//! cocotile: turn a georeferenced raster plus building-damage vector labels
//! into COCO instance-segmentation training data.
//!
//! The pipeline, tile by tile:
//!
//! 1. [`TileGrid`] partitions the raster extent into equal-size cells.
//! 2. [`MaskAssembler`] burns the damage polygons that touch each tile into
//!    one color-coded mask raster per resolved [`Category`].
//! 3. [`AnnotationBuilder`] traces every color-coded region in every mask
//!    back to a polygon and an `(image_id, category_id)` pair.
//! 4. [`coco::assemble`] merges images, categories and annotations into one
//!    near-COCO document (`licenses` is a single object, not an array).
//!
//! Mask files carry their tile association in their file name:
//! `{band}-{row}-{col}_{category}_seg.{ext}` for per-category masks and
//! `{band}-{row}-{col}_seg.{ext}` for combined masks. External tooling
//! depends on this scheme, so it is part of the public contract.

pub mod annotate;
pub mod category;
pub mod coco;
mod contour;
pub mod extent;
pub mod geometry;
pub mod mask;
pub mod raster;

pub use annotate::AnnotationBuilder;
pub use category::{resolve_categories, Category};
pub use coco::CocoDocument;
pub use extent::{Bounds, RasterExtent, Tile, TileGrid};
pub use mask::{LabelFeature, MaskAssembler, TileMasks};

use thiserror::Error;

/// Failure taxonomy for the tiling and annotation pipeline.
///
/// `InvalidConfiguration` and `OrphanMask` abort a run; `Rasterization` is
/// recovered locally by skipping the affected category (the caller logs it
/// and moves on).
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid tiling parameters or unusable input paths. Fatal, raised
    /// before any processing starts.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Burning one category's geometry into a mask raster failed. That
    /// category is skipped for that tile.
    #[error("rasterization failure at tile ({row}, {col}), category {category}: {reason}")]
    Rasterization {
        row: usize,
        col: usize,
        category: &'static str,
        reason: String,
    },

    /// A label mask's file name did not resolve to any known image after
    /// marker stripping. Fatal: an annotation cannot exist without an
    /// owning image, and a mismatch here means the naming contract broke.
    #[error("label mask {mask:?} does not resolve to any known image")]
    OrphanMask { mask: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
