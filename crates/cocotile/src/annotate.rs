//! Label-mask to COCO annotation conversion.
//!
//! For every label-mask file: isolate a padded binary sub-mask per category
//! color, recover the owning image from the mask's file name, trace the
//! sub-mask's boundary contours, simplify them, and emit one annotation per
//! surviving polygon. Annotation IDs come from one monotone counter shared
//! across all masks and tiles; they are never reset or reused.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use geo::{Area, BoundingRect, LineString, Polygon, Simplify};
use image::RgbImage;
use log::debug;

use crate::category::Category;
use crate::coco::{file_name_of, Annotation};
use crate::contour;
use crate::{Error, Result};

/// Suffix that marks a label mask, stripped before image lookup.
const SEG_MARKER: &str = "_seg";

/// Douglas-Peucker tolerance in pixel units. Topology is not preserved:
/// downstream consumers need area/bbox-level fidelity only.
const SIMPLIFY_TOLERANCE: f64 = 1.0;

/// Polygons below this area are degenerate contours (single-pixel noise);
/// they emit no annotation and consume no ID.
const MIN_POLYGON_AREA: f64 = 1.0;

/// Converts label-mask files into COCO annotations, owning the global
/// annotation ID counter for the run.
#[derive(Debug)]
pub struct AnnotationBuilder {
    next_id: u32,
}

impl Default for AnnotationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationBuilder {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Convert every mask in `mask_paths` into annotations, in order.
    ///
    /// `image_ids` maps tile image file names to their COCO image IDs. A
    /// mask whose stripped name matches no image is an [`Error::OrphanMask`]
    /// and aborts the run: it means the naming contract broke and the
    /// output would silently corrupt.
    ///
    /// Only colors of categories in `vocabulary` are isolated; every
    /// emitted `category_id` therefore exists in the document's category
    /// list. `BTreeSet` iteration follows vocabulary order, so annotation
    /// IDs stay deterministic.
    pub fn build(
        &mut self,
        mask_paths: &[PathBuf],
        image_ids: &HashMap<String, u32>,
        vocabulary: &BTreeSet<Category>,
        is_crowd: bool,
    ) -> Result<Vec<Annotation>> {
        let mut annotations = Vec::new();

        for path in mask_paths {
            let mask = image::open(path)?.to_rgb8();
            debug!("annotating mask {}", path.display());

            for &category in vocabulary {
                let Some(sub_mask) = isolate_color(&mask, category.rgb()) else {
                    continue;
                };
                let image_id = resolve_image_id(path, category, image_ids)?;
                self.annotate_sub_mask(
                    &sub_mask,
                    mask.width() as usize + 2,
                    image_id,
                    category.id(),
                    is_crowd,
                    &mut annotations,
                );
            }
        }

        Ok(annotations)
    }

    fn annotate_sub_mask(
        &mut self,
        sub_mask: &[bool],
        padded_width: usize,
        image_id: u32,
        category_id: u32,
        is_crowd: bool,
        out: &mut Vec<Annotation>,
    ) {
        let padded_height = sub_mask.len() / padded_width;
        let contours = contour::find_contours(sub_mask, padded_width, padded_height);

        for ring in contours {
            // Undo the one-pixel padding and swap row/col to x/y.
            let coords: Vec<(f64, f64)> =
                ring.iter().map(|&(r, c)| (c - 1.0, r - 1.0)).collect();
            let poly = Polygon::new(LineString::from(coords), vec![]);
            let poly = poly.simplify(&SIMPLIFY_TOLERANCE);

            // Degenerate contours vanish silently, consuming no ID.
            if poly.exterior().0.len() < 4 || poly.unsigned_area() < MIN_POLYGON_AREA {
                continue;
            }

            let Some(rect) = poly.bounding_rect() else {
                continue;
            };
            let segmentation: Vec<f64> = poly
                .exterior()
                .0
                .iter()
                .flat_map(|c| [c.x, c.y])
                .collect();

            out.push(Annotation {
                segmentation: vec![segmentation],
                iscrowd: is_crowd as u32,
                image_id,
                category_id,
                id: self.next_id,
                bbox: [rect.min().x, rect.min().y, rect.width(), rect.height()],
                area: poly.unsigned_area(),
            });
            self.next_id += 1;
        }
    }
}

/// Binary sub-mask of pixels exactly matching `rgb`, padded with one pixel
/// of background on every side so boundary contours always close. Returns
/// `None` when the color is absent from the mask.
fn isolate_color(mask: &RgbImage, rgb: [u8; 3]) -> Option<Vec<bool>> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let mut sub = vec![false; (w + 2) * (h + 2)];
    let mut any = false;

    for (x, y, p) in mask.enumerate_pixels() {
        if p.0 == rgb {
            sub[(y as usize + 1) * (w + 2) + (x as usize + 1)] = true;
            any = true;
        }
    }
    any.then_some(sub)
}

/// Recover the owning image's ID from a mask file name: strip the `_seg`
/// marker, then the category-name fragment, and look the remainder up in
/// the image index.
fn resolve_image_id(
    mask_path: &Path,
    category: Category,
    image_ids: &HashMap<String, u32>,
) -> Result<u32> {
    let mask_name = file_name_of(mask_path);
    let stripped = mask_name.replacen(SEG_MARKER, "", 1);
    let fragment = format!("_{}", category.name());
    let image_name = stripped.replacen(&fragment, "", 1);

    image_ids
        .get(&image_name)
        .copied()
        .ok_or(Error::OrphanMask { mask: mask_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_mask(dir: &Path, name: &str, width: u32, height: u32, squares: &[(u32, u32, u32, [u8; 3])]) -> PathBuf {
        let mut img = RgbImage::new(width, height);
        for &(x0, y0, side, rgb) in squares {
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    img.put_pixel(x, y, Rgb(rgb));
                }
            }
        }
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn ids_for(names: &[(&str, u32)]) -> HashMap<String, u32> {
        names.iter().map(|&(n, i)| (n.to_string(), i)).collect()
    }

    fn vocab(cats: &[Category]) -> BTreeSet<Category> {
        cats.iter().copied().collect()
    }

    #[test]
    fn two_disjoint_squares_yield_two_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let green = Category::Undamaged.rgb();
        let path = write_mask(
            dir.path(),
            "01-0-0_undamaged_seg.png",
            32,
            32,
            &[(2, 2, 5, green), (20, 20, 5, green)],
        );
        let image_ids = ids_for(&[("01-0-0.png", 1)]);

        let mut builder = AnnotationBuilder::new();
        let anns = builder
            .build(&[path], &image_ids, &vocab(&[Category::Undamaged]), false)
            .unwrap();

        assert_eq!(anns.len(), 2);
        let ids: Vec<u32> = anns.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2]);
        for a in &anns {
            assert_eq!(a.image_id, 1);
            assert_eq!(a.category_id, Category::Undamaged.id());
            assert_eq!(a.iscrowd, 0);
            // 5x5 pixel square: half-pixel contour area 24.5 before
            // simplification; allow simplification slack.
            assert!((20.0..=27.0).contains(&a.area), "area = {}", a.area);
            assert!((a.bbox[2] - 5.0).abs() <= 1.0);
            assert!((a.bbox[3] - 5.0).abs() <= 1.0);
            assert_eq!(a.segmentation.len(), 1);
            assert!(a.segmentation[0].len() >= 8);
        }
    }

    #[test]
    fn ids_stay_monotone_and_gap_free_across_masks() {
        let dir = tempfile::tempdir().unwrap();
        let white = Category::Buildings.rgb();
        let red = Category::Damaged.rgb();
        let m1 = write_mask(dir.path(), "01-0-0_seg.png", 24, 24, &[(1, 1, 6, white)]);
        let m2 = write_mask(
            dir.path(),
            "01-1-0_damaged_seg.png",
            24,
            24,
            &[(2, 2, 4, red), (12, 12, 4, red)],
        );
        let image_ids = ids_for(&[("01-0-0.png", 1), ("01-1-0.png", 2)]);

        let set = vocab(&[Category::Damaged, Category::Buildings]);
        let mut builder = AnnotationBuilder::new();
        let mut anns = builder.build(&[m1], &image_ids, &set, false).unwrap();
        anns.extend(builder.build(&[m2], &image_ids, &set, false).unwrap());

        let ids: Vec<u32> = anns.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(anns[0].image_id, 1);
        assert_eq!(anns[0].category_id, Category::Buildings.id());
        assert_eq!(anns[1].image_id, 2);
    }

    #[test]
    fn single_pixel_noise_consumes_no_id() {
        let dir = tempfile::tempdir().unwrap();
        let green = Category::Undamaged.rgb();
        let mut img = RgbImage::new(16, 16);
        img.put_pixel(3, 3, Rgb(green)); // noise
        for y in 8..13 {
            for x in 8..13 {
                img.put_pixel(x, y, Rgb(green));
            }
        }
        let path = dir.path().join("01-0-0_undamaged_seg.png");
        img.save(&path).unwrap();
        let image_ids = ids_for(&[("01-0-0.png", 1)]);

        let mut builder = AnnotationBuilder::new();
        let anns = builder
            .build(&[path], &image_ids, &vocab(&[Category::Undamaged]), false)
            .unwrap();
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].id, 1);
    }

    #[test]
    fn unmapped_mask_name_is_an_orphan() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mask(
            dir.path(),
            "02-9-9_undamaged_seg.png",
            8,
            8,
            &[(1, 1, 4, Category::Undamaged.rgb())],
        );
        let image_ids = ids_for(&[("01-0-0.png", 1)]);

        let mut builder = AnnotationBuilder::new();
        let err = builder
            .build(&[path], &image_ids, &vocab(&[Category::Undamaged]), false)
            .unwrap_err();
        assert!(matches!(err, Error::OrphanMask { .. }));
    }

    #[test]
    fn unrecognized_colors_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mask(dir.path(), "01-0-0_seg.png", 16, 16, &[(2, 2, 5, [7, 7, 7])]);
        let image_ids = ids_for(&[("01-0-0.png", 1)]);

        let mut builder = AnnotationBuilder::new();
        let anns = builder
            .build(&[path], &image_ids, &vocab(&Category::ALL), false)
            .unwrap();
        assert!(anns.is_empty());
    }

    #[test]
    fn colors_outside_the_vocabulary_emit_no_annotations() {
        let dir = tempfile::tempdir().unwrap();
        // A white combined mask while the run's vocabulary has no
        // buildings entry: isolating it anyway would emit a category_id
        // absent from the document's category list.
        let path = write_mask(
            dir.path(),
            "01-0-0_seg.png",
            16,
            16,
            &[(2, 2, 6, Category::Buildings.rgb())],
        );
        let image_ids = ids_for(&[("01-0-0.png", 1)]);

        let mut builder = AnnotationBuilder::new();
        let anns = builder
            .build(
                &[path],
                &image_ids,
                &vocab(&[Category::Undamaged, Category::Damaged]),
                false,
            )
            .unwrap();
        assert!(anns.is_empty());
    }
}
