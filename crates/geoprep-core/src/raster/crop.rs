//! Cropping and masking rasters to a polygon.

use geo::{BoundingRect, Contains};
use geo_types::{Geometry, Point};
use log::debug;

use crate::error::{FormatError, Result};
use crate::raster::{GeoTransform, RasterGrid};
use crate::utils::geometry_type_name;

/// Crop `grid` to the bounding window of `polygon` and mask pixels whose
/// centres fall outside it with the grid's fill value.
///
/// `polygon` must be in the grid's reference system. Returns `Ok(None)` when
/// the polygon does not overlap the raster.
///
/// # Errors
///
/// Returns [`FormatError::UnsupportedGeometryType`] for non-polygonal geometry.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn crop_to_polygon(grid: &RasterGrid, polygon: &Geometry<f64>) -> Result<Option<RasterGrid>> {
    let contains = |point: &Point<f64>| match polygon {
        Geometry::Polygon(p) => p.contains(point),
        Geometry::MultiPolygon(mp) => mp.contains(point),
        _ => false,
    };
    if !matches!(polygon, Geometry::Polygon(_) | Geometry::MultiPolygon(_)) {
        return Err(FormatError::UnsupportedGeometryType {
            geometry_type: geometry_type_name(polygon).to_string(),
        }
        .into());
    }
    let Some(rect) = polygon.bounding_rect() else {
        return Ok(None);
    };

    let (r_min_x, r_min_y, r_max_x, r_max_y) = grid.bounds();
    let min_x = rect.min().x.max(r_min_x);
    let min_y = rect.min().y.max(r_min_y);
    let max_x = rect.max().x.min(r_max_x);
    let max_y = rect.max().y.min(r_max_y);
    if min_x >= max_x || min_y >= max_y {
        return Ok(None);
    }

    // pixel window covering the intersection, whichever way the axes run
    let gt = grid.transform();
    let corners = [
        gt.geo_to_pixel(min_x, min_y),
        gt.geo_to_pixel(min_x, max_y),
        gt.geo_to_pixel(max_x, min_y),
        gt.geo_to_pixel(max_x, max_y),
    ];
    let Some(corners) = corners.into_iter().collect::<Option<Vec<_>>>() else {
        return Ok(None);
    };
    let col_lo = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let col_hi = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let row_lo = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let row_hi = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

    let col0 = col_lo.floor().max(0.0) as usize;
    let row0 = row_lo.floor().max(0.0) as usize;
    let col1 = (col_hi.ceil().max(0.0) as usize).min(grid.width());
    let row1 = (row_hi.ceil().max(0.0) as usize).min(grid.height());
    if col1 <= col0 || row1 <= row0 {
        return Ok(None);
    }

    let (width, height) = (col1 - col0, row1 - row0);
    #[allow(clippy::cast_precision_loss)]
    let (origin_x, origin_y) = gt.apply(col0 as f64, row0 as f64);
    let transform = GeoTransform {
        origin_x,
        origin_y,
        ..*gt
    };

    let mut cropped = grid.blank_like(width, height, transform)?;
    let mut inside = 0usize;
    for row in 0..height {
        for col in 0..width {
            let (x, y) = transform.pixel_center(col, row);
            if !contains(&Point::new(x, y)) {
                continue;
            }
            inside += 1;
            for band in 0..grid.bands() {
                cropped.data_mut()[[band, row, col]] = grid.data()[[band, row0 + row, col0 + col]];
            }
        }
    }

    debug!(
        "Cropped window cols {col0}..{col1} rows {row0}..{row1}: {inside} of {} pixels inside polygon",
        width * height
    );
    Ok(Some(cropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SampleType;
    use geo_types::{line_string, point, polygon};
    use ndarray::Array3;

    fn grid() -> RasterGrid {
        // 10x10 unit pixels covering (0, 0)..(10, 10)
        let data = Array3::from_elem((2, 10, 10), 7.0);
        RasterGrid::new(
            data,
            GeoTransform::new(0.0, 10.0, 1.0, -1.0),
            None,
            Some(-9999.0),
            SampleType::F32,
        )
        .unwrap()
    }

    #[test]
    fn test_crop_window_and_transform() {
        let poly = Geometry::Polygon(polygon![
            (x: 2.0, y: 2.0),
            (x: 6.0, y: 2.0),
            (x: 6.0, y: 5.0),
            (x: 2.0, y: 5.0),
        ]);
        let cropped = crop_to_polygon(&grid(), &poly).unwrap().unwrap();
        assert_eq!((cropped.bands(), cropped.width(), cropped.height()), (2, 4, 3));
        assert_eq!(cropped.transform().origin_x, 2.0);
        assert_eq!(cropped.transform().origin_y, 5.0);
        assert_eq!(cropped.bounds(), (2.0, 2.0, 6.0, 5.0));
        assert!(cropped.data().iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_triangle_masks_outside_pixels() {
        let poly = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
        ]);
        let cropped = crop_to_polygon(&grid(), &poly).unwrap().unwrap();
        assert_eq!((cropped.width(), cropped.height()), (4, 4));
        // bottom-left pixel centre (0.5, 0.5) is inside, top-right (3.5, 3.5) is not
        assert_eq!(cropped.data()[[0, 3, 0]], 7.0);
        assert_eq!(cropped.data()[[0, 0, 3]], -9999.0);
    }

    #[test]
    fn test_polygon_clipped_to_raster() {
        let poly = Geometry::Polygon(polygon![
            (x: 8.0, y: 8.0),
            (x: 20.0, y: 8.0),
            (x: 20.0, y: 20.0),
            (x: 8.0, y: 20.0),
        ]);
        let cropped = crop_to_polygon(&grid(), &poly).unwrap().unwrap();
        assert_eq!((cropped.width(), cropped.height()), (2, 2));
    }

    #[test]
    fn test_no_overlap() {
        let poly = Geometry::Polygon(polygon![
            (x: 20.0, y: 20.0),
            (x: 30.0, y: 20.0),
            (x: 30.0, y: 30.0),
        ]);
        assert!(crop_to_polygon(&grid(), &poly).unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_polygon() {
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        assert!(crop_to_polygon(&grid(), &line).is_err());
        let pt = Geometry::Point(point!(x: 1.0, y: 1.0));
        assert!(crop_to_polygon(&grid(), &pt).is_err());
    }
}
