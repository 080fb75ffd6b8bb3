//! Small helpers shared across loaders and raster operations.

use std::path::{Path, PathBuf};

use arrow_schema::DataType;
use geo_types::Geometry;

/// Extension trait for formatting Arrow [`DataType`] into human-readable strings.
///
/// # Examples
///
/// ```
/// use arrow_schema::DataType;
/// use geoprep_core::utils::ArrowDataTypeExt;
///
/// assert_eq!(DataType::Int64.format(), "Integer");
/// assert_eq!(DataType::Utf8.format(), "String");
/// ```
pub trait ArrowDataTypeExt {
    /// Format the data type into a human-readable string.
    fn format(&self) -> String;
}

impl ArrowDataTypeExt for DataType {
    fn format(&self) -> String {
        match self {
            DataType::Null => "Null".to_string(),
            DataType::Boolean => "Boolean".to_string(),
            DataType::Int64 => "Integer".to_string(),
            DataType::Float64 => "Real".to_string(),
            DataType::Utf8 => "String".to_string(),
            DataType::LargeUtf8 => "LargeString".to_string(),
            _ => format!("{self:?}"),
        }
    }
}

/// Name of a geometry's type as used in summaries (`"Point"`, `"MultiPolygon"`, ...).
#[must_use]
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Final path component as a string, lossily converted.
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<dir>/<prefix><file name of source>`.
#[must_use]
pub fn prefixed_output(dir: &Path, prefix: &str, source: &Path) -> PathBuf {
    dir.join(format!("{prefix}{}", file_name(source)))
}
