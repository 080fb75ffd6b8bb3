//! Raster grids, GeoTIFF I/O, reprojection and cropping.

mod crop;
mod geotiff;
mod geotransform;
mod grid;
mod reproject;

pub use crop::crop_to_polygon;
pub use geotiff::{read_geotiff, write_geotiff};
pub use geotransform::GeoTransform;
pub use grid::{RasterGrid, SampleType};
pub use reproject::{OutputGrid, default_output_grid, reproject};
