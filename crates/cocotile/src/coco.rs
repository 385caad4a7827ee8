//! COCO document types and assembly.
//!
//! One deviation from stock COCO, preserved for downstream compatibility:
//! `licenses` is a single object, not an array.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    pub id: u32,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub contributor: String,
    pub date_created: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u32,
    pub name: String,
    pub supercategory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// One exterior ring, flattened `[x0, y0, x1, y1, ...]`. Holes are not
    /// modeled.
    pub segmentation: Vec<Vec<f64>>,
    pub iscrowd: u32,
    pub image_id: u32,
    pub category_id: u32,
    pub id: u32,
    /// `(min_x, min_y, width, height)`.
    pub bbox: [f64; 4],
    pub area: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoDocument {
    pub licenses: License,
    pub info: Info,
    pub images: Vec<CocoImage>,
    pub annotations: Vec<Annotation>,
    pub categories: Vec<CocoCategory>,
}

/// Build the `images` list from tile image files, IDs assigned 1-based in
/// input order. Returns the list plus the file-name → id index the
/// annotation builder resolves masks against.
///
/// File names must be unique: they are the only key back to an image ID.
pub fn build_images(paths: &[PathBuf]) -> Result<(Vec<CocoImage>, HashMap<String, u32>)> {
    let mut images = Vec::with_capacity(paths.len());
    let mut ids = HashMap::with_capacity(paths.len());

    for (index, path) in paths.iter().enumerate() {
        let id = index as u32 + 1;
        let (width, height) = image::image_dimensions(path)?;
        let file_name = file_name_of(path);

        if ids.insert(file_name.clone(), id).is_some() {
            return Err(Error::InvalidConfiguration(format!(
                "duplicate image file name {:?}",
                file_name
            )));
        }
        images.push(CocoImage {
            id,
            width,
            height,
            file_name,
        });
    }

    Ok((images, ids))
}

/// Aggregate the final document. Pure structural merge: no validation
/// beyond what the inputs already guarantee.
pub fn assemble(
    raster_name: &str,
    description: &str,
    contributor: &str,
    images: Vec<CocoImage>,
    annotations: Vec<Annotation>,
    categories: &BTreeSet<Category>,
) -> CocoDocument {
    let now = chrono::Local::now();
    CocoDocument {
        licenses: License {
            name: raster_name.to_string(),
            id: 1,
            url: String::new(),
        },
        info: Info {
            contributor: contributor.to_string(),
            date_created: now.format("%Y-%m-%d").to_string(),
            description: description.to_string(),
            url: String::new(),
            version: String::new(),
            year: now.format("%Y").to_string(),
        },
        images,
        annotations,
        categories: categories
            .iter()
            .map(|c| CocoCategory {
                id: c.id(),
                name: c.name().to_string(),
                supercategory: "Buildings".to_string(),
            })
            .collect(),
    }
}

pub fn write_document(path: &Path, doc: &CocoDocument) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), doc)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    Ok(())
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
