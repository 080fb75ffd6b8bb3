//! PNG previews of rasters with a point-of-interest marker, and a directory
//! browser that picks which raster to preview.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use geo::Centroid;
use geo_types::Geometry;
use image::{ImageFormat, Rgba, RgbaImage};
use log::{debug, info, warn};

use crate::crs::{Crs, Transformer};
use crate::drivers::path_extension;
use crate::error::{ConfigError, FormatError, IoErrorExt, RasterError, Result};
use crate::raster::{RasterGrid, read_geotiff};
use crate::table::{AttributeValue, GeometryTable};

/// Label used when no label column is given or its value is empty.
pub const DEFAULT_LABEL: &str = "Point of Interest";

const MARKER: Rgba<u8> = Rgba([255, 0, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// A labeled position to highlight on a preview.
#[derive(Debug, Clone, PartialEq)]
pub struct PointOfInterest {
    /// X (longitude or easting)
    pub x: f64,
    /// Y (latitude or northing)
    pub y: f64,
    /// System of `x`/`y`; `None` means "same as the raster"
    pub crs: Option<Crs>,
    /// Text shown with the marker
    pub label: String,
}

impl PointOfInterest {
    /// Create a point of interest.
    #[must_use]
    pub fn new(x: f64, y: f64, crs: Option<Crs>, label: impl Into<String>) -> Self {
        Self {
            x,
            y,
            crs,
            label: label.into(),
        }
    }

    /// Build from the first record of `table`.
    ///
    /// Non-point geometries contribute their centroid. The label comes from
    /// `label_column` when given and non-empty, else [`DEFAULT_LABEL`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for an empty table,
    /// [`FormatError::MissingColumn`] for an unknown label column and
    /// [`FormatError::InvalidGeometry`] when the first record has no usable
    /// geometry.
    pub fn from_table(table: &GeometryTable, label_column: Option<&str>) -> Result<Self> {
        let Some(first) = table.records().first() else {
            return Err(ConfigError::InvalidOption {
                option: "point of interest".to_string(),
                message: "table has no records".to_string(),
            }
            .into());
        };

        let point = match &first.geometry {
            Some(Geometry::Point(p)) => Some(*p),
            Some(other) => other.centroid(),
            None => None,
        };
        let Some(point) = point else {
            return Err(FormatError::InvalidGeometry {
                format: "point of interest".to_string(),
                message: "first record has no geometry".to_string(),
                row: Some(1),
            }
            .into());
        };

        let label = match label_column {
            Some(column) => {
                let value = table.value(0, column).ok_or_else(|| FormatError::MissingColumn {
                    format: "point of interest".to_string(),
                    column: column.to_string(),
                    available: table.columns().join(", "),
                })?;
                match value {
                    AttributeValue::Null => DEFAULT_LABEL.to_string(),
                    AttributeValue::String(s) if s.trim().is_empty() => DEFAULT_LABEL.to_string(),
                    other => other.to_string(),
                }
            },
            None => DEFAULT_LABEL.to_string(),
        };

        Ok(Self::new(point.x(), point.y(), table.crs().cloned(), label))
    }
}

/// Options for [`render_view`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    /// 1-based band to display
    pub band: usize,
    /// Marker radius in pixels
    pub marker_radius: u32,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            band: 1,
            marker_radius: 3,
        }
    }
}

impl ViewOptions {
    /// Band 1, 3-pixel marker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the displayed band (1-based).
    #[must_use]
    pub fn with_band(mut self, band: usize) -> Self {
        self.band = band;
        self
    }

    /// Set the marker radius.
    #[must_use]
    pub fn with_marker_radius(mut self, radius: u32) -> Self {
        self.marker_radius = radius;
        self
    }
}

/// What [`render_view`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSummary {
    /// Written PNG
    pub output: PathBuf,
    /// `(col, row)` of the marker, when the point falls on the raster
    pub marker_pixel: Option<(u32, u32)>,
    /// Marker label
    pub label: String,
}

/// Render one band of `raster` as a grayscale PNG with a red marker at `poi`.
///
/// Values are stretched linearly between the band's minimum and maximum;
/// nodata pixels are transparent. The point is transformed into the raster's
/// system when both systems are known and differ.
///
/// The label is not drawn into the image. It is logged with the marker
/// position and returned in [`ViewSummary::label`] for the caller to show.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOption`] for a band outside the raster,
/// raster read errors, CRS errors while placing the marker, and PNG write
/// errors.
pub fn render_view(
    raster: &Path,
    poi: &PointOfInterest,
    output: &Path,
    options: &ViewOptions,
) -> Result<ViewSummary> {
    let grid = read_geotiff(raster)?;
    let mut image = grayscale(&grid, options.band)?;

    let (x, y) = marker_position(&grid, poi)?;
    let marker_pixel = grid
        .transform()
        .geo_to_pixel(x, y)
        .and_then(|(col, row)| pixel_in(col, row, image.width(), image.height()));

    match marker_pixel {
        Some((col, row)) => {
            draw_marker(&mut image, col, row, options.marker_radius);
            info!("{} at ({x:.6}, {y:.6}) -> pixel ({col}, {row})", poi.label);
        },
        None => warn!(
            "{} at ({x:.6}, {y:.6}) lies outside {}",
            poi.label,
            raster.display()
        ),
    }

    image
        .save_with_format(output, ImageFormat::Png)
        .with_write_context("PNG", output)?;
    info!("Wrote preview {}", output.display());

    Ok(ViewSummary {
        output: output.to_path_buf(),
        marker_pixel,
        label: poi.label.clone(),
    })
}

fn grayscale(grid: &RasterGrid, band: usize) -> Result<RgbaImage> {
    let values = band
        .checked_sub(1)
        .and_then(|b| grid.band(b))
        .ok_or_else(|| ConfigError::InvalidOption {
            option: "band".to_string(),
            message: format!("{band} is not in 1..={}", grid.bands()),
        })?;

    let invalid = |v: f64| !v.is_finite() || grid.is_nodata(v);
    let (min, max) = values
        .iter()
        .filter(|v| !invalid(**v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    debug!("Band {band} stretch {min}..{max}");

    let width = dimension(grid.width(), grid)?;
    let height = dimension(grid.height(), grid)?;
    let mut image = RgbaImage::new(width, height);
    for (col, row, pixel) in image.enumerate_pixels_mut() {
        let v = values[[row as usize, col as usize]];
        *pixel = if invalid(v) {
            TRANSPARENT
        } else {
            let level = stretch(v, min, max);
            Rgba([level, level, level, 255])
        };
    }
    Ok(image)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stretch(value: f64, min: f64, max: f64) -> u8 {
    if max <= min {
        return 128;
    }
    (((value - min) / (max - min)) * 255.0).round().clamp(0.0, 255.0) as u8
}

fn dimension(value: usize, grid: &RasterGrid) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        RasterError::InvalidDimensions {
            bands: grid.bands(),
            width: grid.width(),
            height: grid.height(),
        }
        .into()
    })
}

fn marker_position(grid: &RasterGrid, poi: &PointOfInterest) -> Result<(f64, f64)> {
    match (poi.crs.as_ref(), grid.crs()) {
        (Some(from), Some(to)) if !from.is_equivalent(to) => {
            Transformer::new(from, to)?.transform(poi.x, poi.y)
        },
        _ => Ok((poi.x, poi.y)),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_in(col: f64, row: f64, width: u32, height: u32) -> Option<(u32, u32)> {
    if !(col.is_finite() && row.is_finite()) || col < 0.0 || row < 0.0 {
        return None;
    }
    let (c, r) = (col.floor() as u32, row.floor() as u32);
    (c < width && r < height).then_some((c, r))
}

fn draw_marker(image: &mut RgbaImage, col: u32, row: u32, radius: u32) {
    let r = i64::from(radius);
    let (cx, cy) = (i64::from(col), i64::from(row));
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let (px, py) = (cx + dx, cy + dy);
            if let (Ok(px), Ok(py)) = (u32::try_from(px), u32::try_from(py))
                && px < image.width()
                && py < image.height()
            {
                image.put_pixel(px, py, MARKER);
            }
        }
    }
}

/// Raster files (`.tif`, any case) directly inside `dir`, keyed by file name.
///
/// # Errors
///
/// Returns an I/O error if `dir` cannot be listed.
pub fn list_rasters(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut catalog = BTreeMap::new();
    for entry in fs::read_dir(dir).with_read_context("directory", dir)? {
        let path = entry.with_read_context("directory", dir)?.path();
        if path.is_file()
            && path_extension(&path) == "tif"
            && let Some(name) = path.file_name()
        {
            catalog.insert(name.to_string_lossy().into_owned(), path.clone());
        }
    }
    debug!("Found {} raster(s) in {}", catalog.len(), dir.display());
    Ok(catalog)
}

/// Look up `name` in a catalog from [`list_rasters`].
#[must_use]
pub fn resolve_selection<'a>(catalog: &'a BTreeMap<String, PathBuf>, name: &str) -> Option<&'a PathBuf> {
    catalog.get(name)
}

/// Result of [`browse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseOutcome {
    /// The directory holds no rasters; nothing was rendered
    Empty,
    /// The selection is not in the catalog
    UnknownSelection {
        /// Requested name
        selection: String,
        /// Names that are available
        available: Vec<String>,
    },
    /// The selected raster was rendered
    Rendered(ViewSummary),
}

/// List rasters in `dir`, resolve `selection` and render it.
///
/// # Errors
///
/// Returns listing errors and any [`render_view`] error.
pub fn browse(
    dir: &Path,
    selection: &str,
    poi: &PointOfInterest,
    output: &Path,
    options: &ViewOptions,
) -> Result<BrowseOutcome> {
    let catalog = list_rasters(dir)?;
    if catalog.is_empty() {
        warn!("No rasters found in {}", dir.display());
        return Ok(BrowseOutcome::Empty);
    }
    let Some(raster) = resolve_selection(&catalog, selection) else {
        warn!("'{selection}' is not a raster in {}", dir.display());
        return Ok(BrowseOutcome::UnknownSelection {
            selection: selection.to_string(),
            available: catalog.into_keys().collect(),
        });
    };
    render_view(raster, poi, output, options).map(BrowseOutcome::Rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoTransform, SampleType, write_geotiff};
    use crate::table::Record;
    use geo_types::{point, polygon};
    use ndarray::Array3;
    use tempfile::TempDir;

    fn write_raster(path: &Path) {
        // 10x10 geographic pixels over (-94, 44)..(-93, 45), first pixel nodata
        let mut data = Array3::from_shape_fn((1, 10, 10), |(_, r, c)| (r * 10 + c) as f64);
        data[[0, 0, 0]] = -1.0;
        let grid = RasterGrid::new(
            data,
            GeoTransform::new(-94.0, 45.0, 0.1, -0.1),
            Some(Crs::nad83()),
            Some(-1.0),
            SampleType::I16,
        )
        .unwrap();
        write_geotiff(&grid, path).unwrap();
    }

    #[test]
    fn test_render_marker_and_stretch() {
        let dir = TempDir::new().unwrap();
        let raster = dir.path().join("dem.tif");
        write_raster(&raster);
        let output = dir.path().join("dem.png");
        let poi = PointOfInterest::new(-93.45, 44.45, Some(Crs::nad83()), "Site");

        let summary =
            render_view(&raster, &poi, &output, &ViewOptions::new().with_marker_radius(0)).unwrap();
        assert_eq!(summary.marker_pixel, Some((5, 5)));
        assert_eq!(summary.label, "Site");

        let png = image::open(&output).unwrap().to_rgba8();
        assert_eq!(png.dimensions(), (10, 10));
        assert_eq!(*png.get_pixel(0, 0), TRANSPARENT);
        assert_eq!(*png.get_pixel(5, 5), MARKER);
        assert_eq!(png.get_pixel(9, 9).0, [255, 255, 255, 255]);
        assert_eq!(png.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_marker_outside_raster() {
        let dir = TempDir::new().unwrap();
        let raster = dir.path().join("dem.tif");
        write_raster(&raster);
        let poi = PointOfInterest::new(10.0, 10.0, None, DEFAULT_LABEL);
        let summary =
            render_view(&raster, &poi, &dir.path().join("o.png"), &ViewOptions::new()).unwrap();
        assert!(summary.marker_pixel.is_none());
    }

    #[test]
    fn test_invalid_band() {
        let dir = TempDir::new().unwrap();
        let raster = dir.path().join("dem.tif");
        write_raster(&raster);
        let poi = PointOfInterest::new(0.0, 0.0, None, "x");
        for band in [0, 2] {
            let options = ViewOptions::new().with_band(band);
            assert!(render_view(&raster, &poi, &dir.path().join("o.png"), &options).is_err());
        }
    }

    #[test]
    fn test_poi_from_table() {
        let mut table = GeometryTable::new(vec!["name".to_string()], Some(Crs::nad83()));
        table
            .push(Record::new(
                vec![AttributeValue::String("Lake".to_string())],
                Some(Geometry::Point(point!(x: -93.0, y: 45.0))),
            ))
            .unwrap();

        let poi = PointOfInterest::from_table(&table, Some("name")).unwrap();
        assert_eq!((poi.x, poi.y), (-93.0, 45.0));
        assert_eq!(poi.label, "Lake");
        assert_eq!(poi.crs, Some(Crs::nad83()));

        let poi = PointOfInterest::from_table(&table, None).unwrap();
        assert_eq!(poi.label, DEFAULT_LABEL);
        assert!(PointOfInterest::from_table(&table, Some("missing")).is_err());
    }

    #[test]
    fn test_poi_polygon_centroid_and_empty() {
        let mut table = GeometryTable::new(vec!["name".to_string()], None);
        assert!(PointOfInterest::from_table(&table, None).is_err());
        table
            .push(Record::new(
                vec![AttributeValue::Null],
                Some(Geometry::Polygon(polygon![
                    (x: 0.0, y: 0.0),
                    (x: 2.0, y: 0.0),
                    (x: 2.0, y: 2.0),
                    (x: 0.0, y: 2.0),
                ])),
            ))
            .unwrap();
        let poi = PointOfInterest::from_table(&table, Some("name")).unwrap();
        assert_eq!((poi.x, poi.y), (1.0, 1.0));
        assert_eq!(poi.label, DEFAULT_LABEL);
    }

    #[test]
    fn test_list_and_browse() {
        let dir = TempDir::new().unwrap();
        let poi = PointOfInterest::new(-93.5, 44.5, None, "p");
        let output = dir.path().join("view.png");

        assert_eq!(
            browse(dir.path(), "a.tif", &poi, &output, &ViewOptions::new()).unwrap(),
            BrowseOutcome::Empty
        );
        assert!(!output.exists());

        write_raster(&dir.path().join("b.TIF"));
        write_raster(&dir.path().join("a.tif"));
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let catalog = list_rasters(dir.path()).unwrap();
        assert_eq!(catalog.keys().collect::<Vec<_>>(), ["a.tif", "b.TIF"]);
        assert!(resolve_selection(&catalog, "b.TIF").is_some());
        assert!(resolve_selection(&catalog, "c.tif").is_none());

        let outcome = browse(dir.path(), "c.tif", &poi, &output, &ViewOptions::new()).unwrap();
        assert!(matches!(outcome, BrowseOutcome::UnknownSelection { ref available, .. } if available.len() == 2));

        let outcome = browse(dir.path(), "a.tif", &poi, &output, &ViewOptions::new()).unwrap();
        assert!(matches!(outcome, BrowseOutcome::Rendered(_)));
        assert!(output.exists());
    }
}
