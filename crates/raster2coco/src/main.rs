use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use geo::{Intersects, LineString, Polygon};

use cocotile::{
    coco, geometry, raster, resolve_categories, AnnotationBuilder, Category, LabelFeature,
    MaskAssembler, RasterExtent, TileGrid,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "raster2coco", version)]
struct Args {
    /// Input raster (PNG/TIFF/JPEG readable by the image crate).
    #[arg(long)]
    raster: PathBuf,

    /// ESRI world file with the raster's affine georeferencing.
    /// Defaults to the raster path with a .pgw/.wld extension.
    #[arg(long)]
    world_file: Option<PathBuf>,

    /// EPSG code of the raster's CRS (4326 or 3857).
    #[arg(long, default_value_t = 4326)]
    epsg: u32,

    /// Optional GeoJSON FeatureCollection of damage-labelled building
    /// polygons (EPSG:4326) with a `damage_gra` property.
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long, default_value = "out")]
    output_dir: PathBuf,

    /// Tile size in pixels.
    #[arg(long, default_value_t = 512)]
    tile_width: u32,

    #[arg(long, default_value_t = 512)]
    tile_height: u32,

    /// Band prefix used in tile and mask file names.
    #[arg(long, default_value = "01")]
    band: String,

    /// Rasterize per-tile segmentation masks (requires --labels).
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    seg_mask: bool,

    /// Convert the generated masks into a COCO annotation document.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    coco: bool,

    /// Value for the annotations' iscrowd field.
    #[arg(long, default_value_t = false)]
    is_crowd: bool,

    /// Description recorded in the document's info block.
    #[arg(long, default_value = "pre_annotation_sample")]
    description: String,
}

/// Read a six-line ESRI world file into a raster extent. World files
/// reference the center of the top-left pixel; the extent's origin is the
/// pixel's corner, hence the half-pixel shift.
fn read_world_file(path: &Path, width_px: u32, height_px: u32, epsg: u32) -> Result<RasterExtent> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading world file {}", path.display()))?;
    let values: Vec<f64> = text
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("parsing world file {}", path.display()))?;
    if values.len() != 6 {
        anyhow::bail!(
            "world file {} has {} values, expected 6",
            path.display(),
            values.len()
        );
    }

    let [pixel_size_x, rot_y, rot_x, pixel_size_y, center_x, center_y] =
        [values[0], values[1], values[2], values[3], values[4], values[5]];
    if rot_x != 0.0 || rot_y != 0.0 {
        anyhow::bail!("rotated rasters are not supported ({})", path.display());
    }
    if pixel_size_x <= 0.0 || pixel_size_y >= 0.0 {
        anyhow::bail!("world file {} pixel sizes look wrong", path.display());
    }

    Ok(RasterExtent {
        origin_x: center_x - 0.5 * pixel_size_x,
        origin_y: center_y - 0.5 * pixel_size_y,
        pixel_size_x,
        pixel_size_y,
        width_px,
        height_px,
        epsg,
    })
}

fn default_world_file(raster: &Path) -> Option<PathBuf> {
    ["pgw", "wld", "tfw"]
        .iter()
        .map(|ext| raster.with_extension(ext))
        .find(|p| p.exists())
}

// GeoJSON FeatureCollection reading; only the fields the pipeline needs.

#[derive(Debug, serde::Deserialize)]
struct GeoJsonRoot {
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, serde::Deserialize)]
struct GeoJsonFeature {
    #[serde(default)]
    properties: GeoJsonProperties,
    geometry: GeoJsonGeometry,
}

#[derive(Debug, Default, serde::Deserialize)]
struct GeoJsonProperties {
    #[serde(default)]
    damage_gra: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GeoJsonGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

fn rings_to_polygon(rings: Vec<Vec<[f64; 2]>>) -> Option<Polygon<f64>> {
    let mut iter = rings.into_iter();
    let exterior = iter.next()?;
    if exterior.len() < 4 {
        return None;
    }
    let to_ls = |ring: Vec<[f64; 2]>| {
        LineString::from(ring.into_iter().map(|[x, y]| (x, y)).collect::<Vec<_>>())
    };
    Some(Polygon::new(to_ls(exterior), iter.map(to_ls).collect()))
}

fn load_label_features(path: &Path) -> Result<Vec<LabelFeature>> {
    let file = File::open(path).with_context(|| format!("opening labels {}", path.display()))?;
    let root: GeoJsonRoot = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing labels {}", path.display()))?;

    let mut features = Vec::new();
    for feature in root.features {
        let damage = feature.properties.damage_gra.unwrap_or_default();
        match feature.geometry.kind.as_str() {
            "Polygon" => {
                let rings: Vec<Vec<[f64; 2]>> =
                    serde_json::from_value(feature.geometry.coordinates)?;
                if let Some(geometry) = rings_to_polygon(rings) {
                    features.push(LabelFeature {
                        damage: damage.clone(),
                        geometry,
                    });
                }
            }
            "MultiPolygon" => {
                let polys: Vec<Vec<Vec<[f64; 2]>>> =
                    serde_json::from_value(feature.geometry.coordinates)?;
                for rings in polys {
                    if let Some(geometry) = rings_to_polygon(rings) {
                        features.push(LabelFeature {
                            damage: damage.clone(),
                            geometry,
                        });
                    }
                }
            }
            other => warn!("skipping unsupported geometry type {:?}", other),
        }
    }
    Ok(features)
}

/// Serialize the resolved vocabulary as `{name: {id, rgb}}`, the shape
/// downstream tools read from `categories.json`.
fn write_categories_json(path: &Path, vocabulary: &std::collections::BTreeSet<Category>) -> Result<()> {
    let mut map = serde_json::Map::new();
    for cat in vocabulary {
        map.insert(
            cat.name().to_string(),
            serde_json::json!({ "id": cat.id(), "rgb": cat.rgb() }),
        );
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &serde_json::Value::Object(map))?;
    Ok(())
}

fn raster_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "raster".to_string())
}

fn run(args: &Args) -> Result<()> {
    fs::create_dir_all(&args.output_dir)?;

    // ---------------------------------------------------------------------
    // Labels and category vocabulary
    // ---------------------------------------------------------------------
    let features = match &args.labels {
        Some(path) => load_label_features(path)?,
        None => Vec::new(),
    };
    let vocabulary = resolve_categories(features.iter().map(|f| f.damage.as_str()));
    info!(
        "resolved categories: {:?}",
        vocabulary.iter().map(|c| c.name()).collect::<Vec<_>>()
    );

    // ---------------------------------------------------------------------
    // Raster extent; non-4326 inputs get their extent converted up front
    // ---------------------------------------------------------------------
    let (width_px, height_px) = image::image_dimensions(&args.raster)
        .with_context(|| format!("reading raster {}", args.raster.display()))?;
    let world_file = args
        .world_file
        .clone()
        .or_else(|| default_world_file(&args.raster))
        .context("no world file given and no .pgw/.wld/.tfw sidecar found")?;
    let mut extent = read_world_file(&world_file, width_px, height_px, args.epsg)?;

    let mut generate_alpha = false;
    if extent.epsg != geometry::EPSG_WGS84 {
        info!(
            "raster is EPSG:{}, converting extent to EPSG:4326",
            extent.epsg
        );
        generate_alpha = true;
        extent = geometry::reproject_extent(&extent, geometry::EPSG_WGS84)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }

    let grid = TileGrid::new(&extent, args.tile_width, args.tile_height)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    info!(
        "tiling {}x{} px into {} tiles ({} cols x {} rows)",
        extent.width_px,
        extent.height_px,
        grid.len(),
        grid.cols(),
        grid.rows()
    );

    let source = image::open(&args.raster)
        .with_context(|| format!("opening raster {}", args.raster.display()))?
        .to_rgba8();

    let make_masks = args.seg_mask && !features.is_empty();
    if args.labels.is_some() && features.is_empty() {
        warn!("label file contained no usable polygon features");
    }

    let assembler = MaskAssembler::new(
        &args.output_dir,
        &args.band,
        extent.pixel_size_x,
        extent.res_y_abs(),
    );

    // ---------------------------------------------------------------------
    // Tile loop: imagery first, then this tile's masks
    // ---------------------------------------------------------------------
    let (cell_w, cell_h) = grid.cell_px();
    let mut image_list: Vec<PathBuf> = Vec::with_capacity(grid.len());
    let mut category_seg_list: Vec<PathBuf> = Vec::new();
    let mut seg_list: Vec<PathBuf> = Vec::new();

    for tile in grid.tiles() {
        let tile_png = args
            .output_dir
            .join(format!("{}-{}-{}.png", args.band, tile.row, tile.col));

        let pixels = raster::crop_to_bounds(&source, &extent, tile.bounds, cell_w, cell_h);
        let saved = if generate_alpha {
            raster::save_png_with_alpha(&tile_png, &pixels, None)
        } else {
            raster::save_png(&tile_png, &raster::drop_alpha(&pixels))
        };
        if let Err(e) = saved {
            warn!(
                "tile ({}, {}) image export failed: {}",
                tile.row, tile.col, e
            );
            continue;
        }
        image_list.push(tile_png);

        if !make_masks {
            continue;
        }

        // Clip: keep features touching this tile; burn-in handles the
        // actual pixel-level clipping against the tile bounds.
        let tile_poly = geometry::bounds_to_polygon(tile.bounds);
        let tile_features: Vec<LabelFeature> = features
            .iter()
            .filter(|f| tile_poly.intersects(&f.geometry))
            .cloned()
            .collect();
        if tile_features.is_empty() {
            continue;
        }

        let masks = assembler.assemble_tile(&tile, &tile_features, &vocabulary);
        if masks.category_masks.is_empty() {
            // The combined mask stands in only when no per-category mask
            // was materialized for this tile.
            if let Some(combined) = masks.combined_mask {
                seg_list.push(combined);
            }
        } else {
            category_seg_list.extend(masks.category_masks);
        }
    }

    info!("exported {} tile images", image_list.len());

    // ---------------------------------------------------------------------
    // COCO conversion
    // ---------------------------------------------------------------------
    if args.coco {
        write_categories_json(&args.output_dir.join("categories.json"), &vocabulary)?;

        // Per-category masks first, then combined-only tiles; order
        // preserved so annotation IDs are deterministic.
        let mut label_list = category_seg_list;
        label_list.extend(seg_list);
        label_list.dedup();

        let (images, image_ids) =
            coco::build_images(&image_list).map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let mut builder = AnnotationBuilder::new();
        let annotations = builder
            .build(&label_list, &image_ids, &vocabulary, args.is_crowd)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        info!(
            "built {} annotations from {} label masks",
            annotations.len(),
            label_list.len()
        );

        let stem = raster_stem(&args.raster);
        let document = coco::assemble(
            &stem,
            &args.description,
            "raster2coco",
            images,
            annotations,
            &vocabulary,
        );
        let out_path = args.output_dir.join(format!("{}_annotations.json", stem));
        coco::write_document(&out_path, &document)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        info!("wrote {}", out_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    run(&args)
}
