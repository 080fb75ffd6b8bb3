//! Nearest-neighbour raster reprojection.

use log::debug;

use crate::crs::{Crs, Transformer};
use crate::error::{CrsError, Result};
use crate::raster::{GeoTransform, RasterGrid};

/// Points sampled along each raster edge when projecting its outline.
const EDGE_SAMPLES: usize = 21;

/// Output grid chosen for a reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputGrid {
    /// North-up transform in the target system
    pub transform: GeoTransform,
    /// Columns
    pub width: usize,
    /// Rows
    pub height: usize,
}

/// Choose the default output grid for reprojecting `grid` to `target`.
///
/// The raster outline is densified, transformed and its bounding box becomes
/// the output extent. Square pixels are sized so the output diagonal holds the
/// same number of pixels as the source diagonal.
///
/// # Errors
///
/// Returns [`CrsError::Undefined`] when the grid has no reference system, or a
/// transform error if no edge point can be projected.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn default_output_grid(grid: &RasterGrid, target: &Crs) -> Result<OutputGrid> {
    let source = grid.crs().ok_or_else(|| CrsError::Undefined {
        target: target.identifier(),
    })?;
    let forward = Transformer::new(source, target)?;

    let (w, h) = (grid.width() as f64, grid.height() as f64);
    let gt = grid.transform();
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut first_error = None;

    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        let edges = [(t * w, 0.0), (t * w, h), (0.0, t * h), (w, t * h)];
        for (col, row) in edges {
            let (x, y) = gt.apply(col, row);
            match forward.transform(x, y) {
                Ok((tx, ty)) => {
                    min_x = min_x.min(tx);
                    min_y = min_y.min(ty);
                    max_x = max_x.max(tx);
                    max_y = max_y.max(ty);
                },
                Err(e) => {
                    first_error.get_or_insert(e);
                },
            }
        }
    }

    if !min_x.is_finite() || !max_x.is_finite() {
        return Err(first_error.unwrap_or_else(|| {
            CrsError::Transform {
                source_crs: source.identifier(),
                target_crs: target.identifier(),
                x: gt.origin_x,
                y: gt.origin_y,
                message: "raster outline could not be projected".to_string(),
            }
            .into()
        }));
    }

    let source_diagonal = w.hypot(h);
    let target_diagonal = (max_x - min_x).hypot(max_y - min_y);
    let resolution = target_diagonal / source_diagonal;

    let width = (((max_x - min_x) / resolution).ceil() as usize).max(1);
    let height = (((max_y - min_y) / resolution).ceil() as usize).max(1);

    Ok(OutputGrid {
        transform: GeoTransform::new(min_x, max_y, resolution, -resolution),
        width,
        height,
    })
}

/// Reproject every band of `grid` into `target` using nearest-neighbour
/// resampling on the default output grid.
///
/// Output pixels that map outside the source (or fail to transform) get the
/// source nodata value, or 0 when there is none.
///
/// # Errors
///
/// Returns [`CrsError::Undefined`] when the grid has no reference system and
/// propagates projection setup failures.
pub fn reproject(grid: &RasterGrid, target: &Crs) -> Result<RasterGrid> {
    let Some(source) = grid.crs() else {
        return Err(CrsError::Undefined {
            target: target.identifier(),
        }
        .into());
    };
    if source.is_equivalent(target) {
        return Ok(grid.clone());
    }

    let output = default_output_grid(grid, target)?;
    let inverse = Transformer::new(target, source)?;
    let src_gt = grid.transform();
    let (src_w, src_h) = (grid.width(), grid.height());

    let mut result = grid
        .blank_like(output.width, output.height, output.transform)?
        .with_crs(Some(target.clone()));

    let mut filled = 0usize;
    for row in 0..output.height {
        for col in 0..output.width {
            let (x, y) = output.transform.pixel_center(col, row);
            let Some((src_col, src_row)) = inverse
                .transform(x, y)
                .ok()
                .and_then(|(sx, sy)| src_gt.geo_to_pixel(sx, sy))
                .and_then(|(c, r)| pixel_index(c, r, src_w, src_h))
            else {
                continue;
            };
            for band in 0..grid.bands() {
                result.data_mut()[[band, row, col]] = grid.data()[[band, src_row, src_col]];
            }
            filled += 1;
        }
    }

    debug!(
        "Reprojected {}x{} {source} -> {}x{} {target} ({filled} pixels sampled)",
        src_w, src_h, output.width, output.height
    );
    Ok(result)
}

/// Integer pixel containing fractional position `(col, row)`, if inside.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_index(col: f64, row: f64, width: usize, height: usize) -> Option<(usize, usize)> {
    if !(col.is_finite() && row.is_finite()) || col < 0.0 || row < 0.0 {
        return None;
    }
    let (c, r) = (col.floor() as usize, row.floor() as usize);
    (c < width && r < height).then_some((c, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SampleType;
    use ndarray::Array3;

    fn mercator_grid() -> RasterGrid {
        // 100x100 pixels of 100 m near (-93, 45)
        let data = Array3::from_shape_fn((1, 100, 100), |(_, r, c)| (r * 100 + c) as f64);
        RasterGrid::new(
            data,
            GeoTransform::new(-10_352_712.0, 5_621_521.0, 100.0, -100.0),
            Some(Crs::web_mercator()),
            Some(-1.0),
            SampleType::I32,
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_index() {
        assert_eq!(pixel_index(0.2, 3.9, 4, 4), Some((0, 3)));
        assert_eq!(pixel_index(4.0, 0.0, 4, 4), None);
        assert_eq!(pixel_index(-0.1, 0.0, 4, 4), None);
        assert_eq!(pixel_index(f64::NAN, 0.0, 4, 4), None);
    }

    #[test]
    fn test_output_grid_geographic() {
        let grid = mercator_grid();
        let out = default_output_grid(&grid, &Crs::nad83()).unwrap();
        let (min_x, min_y, max_x, max_y) = out.transform.bounds(out.width, out.height);
        assert!(min_x > -93.1 && max_x < -92.9, "x {min_x}..{max_x}");
        assert!(min_y > 44.8 && max_y < 45.2, "y {min_y}..{max_y}");
        // diagonal pixel count is preserved within rounding
        let diagonal = (out.width as f64).hypot(out.height as f64);
        assert!((diagonal - 100.0 * 2f64.sqrt()).abs() < 3.0, "diagonal {diagonal}");
    }

    #[test]
    fn test_reproject_samples_source_values() {
        let grid = mercator_grid();
        let out = reproject(&grid, &Crs::nad83()).unwrap();
        assert_eq!(out.crs(), Some(&Crs::nad83()));
        assert_eq!(out.sample_type(), SampleType::I32);
        assert_eq!(out.nodata(), Some(-1.0));

        // the centre pixel maps back near the centre of the source
        let (cx, cy) = (out.width() / 2, out.height() / 2);
        let value = out.data()[[0, cy, cx]];
        let (src_row, src_col) = ((value / 100.0).floor(), value % 100.0);
        assert!((src_row - 50.0).abs() <= 3.0, "row {src_row}");
        assert!((src_col - 50.0).abs() <= 3.0, "col {src_col}");

        // every sample is either nodata or a source value
        assert!(out.data().iter().all(|&v| v == -1.0 || (0.0..10_000.0).contains(&v)));
    }

    #[test]
    fn test_same_crs_is_copy() {
        let grid = mercator_grid();
        let out = reproject(&grid, &Crs::web_mercator()).unwrap();
        assert_eq!(out.data(), grid.data());
    }

    #[test]
    fn test_missing_crs() {
        let grid = mercator_grid().with_crs(None);
        assert!(reproject(&grid, &Crs::nad83()).is_err());
    }
}
