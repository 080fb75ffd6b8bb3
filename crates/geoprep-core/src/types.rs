//! Descriptive types for datasets and rasters.
//!
//! This module defines the metadata structures produced by `describe` style
//! operations: table summaries, field schemas and raster information.

/// Information about a vector or tabular dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Path to the dataset
    pub dataset: String,
    /// Driver name
    pub driver: String,
    /// Driver long name
    pub driver_long_name: String,
    /// Number of records
    pub record_count: usize,
    /// Geometry columns information
    pub geometry_columns: Vec<GeometryColumnInfo>,
    /// Schema fields
    pub fields: Vec<FieldInfo>,
}

/// Information about a geometry column.
#[derive(Debug, Clone)]
pub struct GeometryColumnInfo {
    /// Column name
    pub name: String,
    /// Distinct geometry types, e.g. `"Point"` or `"Polygon, MultiPolygon"`
    pub geometry_types: String,
    /// Extension name (e.g., `"geoarrow.wkt"`)
    pub extension: Option<String>,
    /// CRS information
    pub crs: Option<String>,
}

/// Information about a field/column.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Data type
    pub data_type: String,
    /// Whether the field is nullable
    pub nullable: bool,
}

/// Shape of a loaded table, as reported after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    /// Number of records
    pub records: usize,
    /// Number of columns, the geometry column included
    pub columns: usize,
    /// Distinct geometry type names in first-seen order
    pub geometry_types: Vec<String>,
}

/// Metadata of a GeoTIFF raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    /// Path to the raster
    pub path: String,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Band count
    pub bands: usize,
    /// CRS identifier
    pub crs: Option<String>,
    /// `(min_x, min_y, max_x, max_y)` in CRS units
    pub bounds: (f64, f64, f64, f64),
    /// Pixel size `(x, y)` in CRS units
    pub pixel_size: (f64, f64),
    /// Nodata value
    pub nodata: Option<f64>,
    /// On-disk sample type
    pub sample_type: String,
}
