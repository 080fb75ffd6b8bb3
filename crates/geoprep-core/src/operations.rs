//! Batch raster harmonization and dataset inspection.
//!
//! [`harmonize_rasters`] brings a list of GeoTIFFs into one reference system
//! and crops each to a boundary polygon. [`describe_dataset`] summarizes any
//! file the driver registry can read.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::crs::{Crs, Transformer};
use crate::drivers::{DriverKind, find_driver_for_path, get_available_drivers, path_extension};
use crate::error::{
    ConfigError, DriverError, GeoPrepError, IoErrorExt, RasterError, Result, ensure_exists,
};
use crate::raster::{crop_to_polygon, read_geotiff, reproject, write_geotiff};
use crate::table::GeometryTable;
use crate::tabular::geocode;
use crate::types::{DatasetInfo, RasterInfo};
use crate::utils::prefixed_output;
use crate::vector::load_vector;

/// Prefix of reprojected raster outputs.
pub const REPROJECTED_PREFIX: &str = "reprojected_";
/// Prefix of cropped raster outputs.
pub const CROPPED_PREFIX: &str = "cropped_";

/// What to do when one raster of a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure and return its error
    #[default]
    Abort,
    /// Record the failure and move on to the next raster
    Continue,
}

/// Options for [`harmonize_rasters`].
#[derive(Debug, Clone, Default)]
pub struct HarmonizeOptions {
    /// Reference system every output ends up in
    pub target_crs: Crs,
    /// Batch failure handling
    pub failure_policy: FailurePolicy,
}

impl HarmonizeOptions {
    /// Default options: EPSG:4269, abort on first failure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target reference system.
    #[must_use]
    pub fn with_target_crs(mut self, crs: Crs) -> Self {
        self.target_crs = crs;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Files produced for one raster.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizedRaster {
    /// Reprojected copy, when the source CRS differed from the target
    pub reprojected: Option<PathBuf>,
    /// Cropped output
    pub cropped: PathBuf,
    /// Metadata of the cropped output
    pub info: RasterInfo,
}

/// Result for one input raster.
#[derive(Debug)]
pub struct RasterOutcome {
    /// Input path
    pub source: PathBuf,
    /// Produced files or the failure
    pub result: std::result::Result<HarmonizedRaster, GeoPrepError>,
}

/// Per-raster outcomes in input order.
#[derive(Debug, Default)]
pub struct HarmonizeReport {
    /// One entry per processed raster
    pub outcomes: Vec<RasterOutcome>,
}

impl HarmonizeReport {
    /// Whether no raster was processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of rasters harmonized successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of rasters that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Reproject (when needed) and crop every raster in `rasters`, in order.
///
/// For each raster whose CRS differs from the target, a nearest-neighbour
/// reprojection is written to `<output_dir>/reprojected_<name>` and the crop
/// reads that file. The first polygon of `boundary` (converted into the
/// raster's CRS) then crops and masks the raster into
/// `<output_dir>/cropped_<name at that stage>`.
///
/// An empty `rasters` list returns an empty report without touching the
/// filesystem.
///
/// # Errors
///
/// Returns [`RasterError::MissingPolygon`] if `boundary` holds no polygon,
/// an I/O error if `output_dir` cannot be created, and under
/// [`FailurePolicy::Abort`] the first per-raster failure.
pub fn harmonize_rasters<P: AsRef<Path>>(
    rasters: &[P],
    boundary: &GeometryTable,
    output_dir: &Path,
    options: &HarmonizeOptions,
) -> Result<HarmonizeReport> {
    let mut report = HarmonizeReport::default();
    if rasters.is_empty() {
        info!("No rasters to harmonize");
        return Ok(report);
    }

    let polygon = boundary.first_polygon().ok_or(RasterError::MissingPolygon)?;
    fs::create_dir_all(output_dir).with_write_context("directory", output_dir)?;

    info!(
        "Harmonizing {} raster(s) to {} into {}",
        rasters.len(),
        options.target_crs,
        output_dir.display()
    );

    for raster in rasters {
        let source = raster.as_ref();
        match harmonize_one(source, polygon, boundary.crs(), output_dir, &options.target_crs) {
            Ok(done) => report.outcomes.push(RasterOutcome {
                source: source.to_path_buf(),
                result: Ok(done),
            }),
            Err(e) if options.failure_policy == FailurePolicy::Abort => {
                error!("Harmonizing {} failed: {e}", source.display());
                return Err(e);
            },
            Err(e) => {
                warn!("Skipping {}: {e}", source.display());
                report.outcomes.push(RasterOutcome {
                    source: source.to_path_buf(),
                    result: Err(e),
                });
            },
        }
    }

    info!(
        "Harmonized {} of {} raster(s)",
        report.succeeded(),
        report.outcomes.len()
    );
    Ok(report)
}

fn harmonize_one(
    source: &Path,
    polygon: &geo_types::Geometry<f64>,
    boundary_crs: Option<&Crs>,
    output_dir: &Path,
    target: &Crs,
) -> Result<HarmonizedRaster> {
    let grid = read_geotiff(source)?;
    let native = grid.crs().ok_or_else(|| RasterError::MissingCrs {
        path: source.to_path_buf(),
    })?;

    let (stage, reprojected) = if native.is_equivalent(target) {
        info!("{} already in {target}", source.display());
        (source.to_path_buf(), None)
    } else {
        let out = prefixed_output(output_dir, REPROJECTED_PREFIX, source);
        info!("Reprojecting {} from {native} to {target}", source.display());
        write_geotiff(&reproject(&grid, target)?, &out)?;
        (out.clone(), Some(out))
    };
    drop(grid);

    let staged = read_geotiff(&stage)?;
    let raster_crs = staged.crs().ok_or_else(|| RasterError::MissingCrs {
        path: stage.clone(),
    })?;

    let mask = match boundary_crs {
        Some(crs) if !crs.is_equivalent(raster_crs) => {
            Transformer::new(crs, raster_crs)?.transform_geometry(polygon)?
        },
        Some(_) => polygon.clone(),
        None => {
            warn!("Boundary has no CRS; assuming {raster_crs}");
            polygon.clone()
        },
    };

    let cropped = crop_to_polygon(&staged, &mask)?.ok_or_else(|| RasterError::NoOverlap {
        path: source.to_path_buf(),
    })?;
    let out = prefixed_output(output_dir, CROPPED_PREFIX, &stage);
    write_geotiff(&cropped, &out)?;
    info!(
        "Cropped {} to {} ({}x{})",
        stage.display(),
        out.display(),
        cropped.width(),
        cropped.height()
    );

    Ok(HarmonizedRaster {
        reprojected,
        info: cropped.info(&out.to_string_lossy()),
        cropped: out,
    })
}

/// Summary of a dataset of any readable kind.
#[derive(Debug, Clone)]
pub enum DatasetDescription {
    /// Vector or geocoded tabular data
    Table(DatasetInfo),
    /// GeoTIFF raster
    Raster(RasterInfo),
}

/// Describe the dataset at `path`.
///
/// Tabular files need the longitude and latitude column names in `coordinates`.
///
/// # Errors
///
/// Returns [`DriverError::UnsupportedExtension`] for unknown formats,
/// [`ConfigError::MissingRequired`] for tabular files without coordinate
/// columns, and any load error.
pub fn describe_dataset(path: &Path, coordinates: Option<(&str, &str)>) -> Result<DatasetDescription> {
    let Some(driver) = find_driver_for_path(path) else {
        return Err(DriverError::UnsupportedExtension {
            path: path.to_path_buf(),
            extension: path_extension(path),
            expected: get_available_drivers()
                .iter()
                .filter(|d| d.capabilities.info.is_supported())
                .flat_map(|d| d.extensions.iter().copied())
                .collect::<Vec<_>>()
                .join(", "),
        }
        .into());
    };
    if !driver.capabilities.info.is_supported() {
        return Err(DriverError::OperationNotSupported {
            driver: driver.short_name.to_string(),
            operation: "info".to_string(),
        }
        .into());
    }
    ensure_exists(path)?;
    let name = path.to_string_lossy();

    match driver.kind {
        DriverKind::Vector => Ok(DatasetDescription::Table(load_vector(path)?.describe(&name)?)),
        DriverKind::Tabular => {
            let (lon, lat) = coordinates.ok_or_else(|| ConfigError::MissingRequired {
                option: "longitude/latitude columns".to_string(),
            })?;
            Ok(DatasetDescription::Table(geocode(path, lon, lat)?.describe(&name)?))
        },
        DriverKind::Raster => Ok(DatasetDescription::Raster(read_geotiff(path)?.info(&name))),
        DriverKind::Image => Err(DriverError::OperationNotSupported {
            driver: driver.short_name.to_string(),
            operation: "info".to_string(),
        }
        .into()),
    }
}
