//! Vector dataset loading (ESRI Shapefile and `GeoJSON`).

use std::convert::TryInto;
use std::path::Path;

use geo_types::Geometry;
use geojson::{Feature, GeoJson, JsonObject};
use log::{debug, error, info, warn};
use shapefile::Shape;
use shapefile::dbase::FieldValue;

use crate::crs::Crs;
use crate::drivers::{DriverKind, find_driver_for_path, path_extension, readable_extensions};
use crate::error::{DriverError, FormatError, IoErrorExt, Result, ensure_exists};
use crate::table::{AttributeValue, GeometryTable, Record};

/// Load a vector dataset into a [`GeometryTable`].
///
/// The format is chosen from the file extension: `.shp` for ESRI Shapefile
/// (attributes from the sibling `.dbf`, reference system from the `.prj` if
/// present) or `.geojson`/`.json` for `GeoJSON` (always EPSG:4326).
///
/// # Errors
///
/// Returns [`DriverError::UnsupportedExtension`] for other extensions, an I/O
/// error if the file is missing or unreadable, or a [`FormatError`] if it
/// cannot be parsed. Errors are logged before being returned.
pub fn load_vector(path: impl AsRef<Path>) -> Result<GeometryTable> {
    let path = path.as_ref();
    let result = load_vector_inner(path);
    match &result {
        Ok(table) => {
            let summary = table.summary();
            info!(
                "Loaded {}: {} records, {} columns, geometry types [{}]",
                path.display(),
                summary.records,
                summary.columns,
                summary.geometry_types.join(", ")
            );
        },
        Err(e) => error!("Failed to load vector data from {}: {e}", path.display()),
    }
    result
}

fn load_vector_inner(path: &Path) -> Result<GeometryTable> {
    let driver = find_driver_for_path(path).filter(|d| d.kind == DriverKind::Vector);
    let Some(driver) = driver else {
        return Err(DriverError::UnsupportedExtension {
            path: path.to_path_buf(),
            extension: path_extension(path),
            expected: readable_extensions(DriverKind::Vector),
        }
        .into());
    };
    ensure_exists(path)?;

    match driver.short_name {
        "ESRI Shapefile" => read_shapefile(path),
        _ => read_geojson(path),
    }
}

fn read_shapefile(path: &Path) -> Result<GeometryTable> {
    let dbf_path = path.with_extension("dbf");
    let dbf = shapefile::dbase::Reader::from_path(&dbf_path).with_read_context("DBF", &dbf_path)?;
    let columns: Vec<String> = dbf
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect();
    drop(dbf);

    let crs = read_prj(path)?;
    let mut table = GeometryTable::new(columns.clone(), crs);

    let mut reader = shapefile::Reader::from_path(path).with_read_context("ESRI Shapefile", path)?;
    for (index, item) in reader.iter_shapes_and_records().enumerate() {
        let row = index + 1;
        let (shape, mut record) = item.with_read_context("ESRI Shapefile", path)?;

        let geometry = match shape {
            Shape::NullShape => None,
            shape => {
                let geometry: Geometry<f64> =
                    shape
                        .try_into()
                        .map_err(|e: &str| FormatError::InvalidGeometry {
                            format: "ESRI Shapefile".to_string(),
                            message: e.to_string(),
                            row: Some(row),
                        })?;
                Some(geometry)
            },
        };

        let attributes = columns
            .iter()
            .map(|name| record.remove(name).map_or(AttributeValue::Null, field_value))
            .collect();
        table.push(Record::new(attributes, geometry))?;
    }
    Ok(table)
}

fn read_prj(path: &Path) -> Result<Option<Crs>> {
    let prj_path = path.with_extension("prj");
    if !prj_path.exists() {
        warn!("{} has no .prj file; reference system is undefined", path.display());
        return Ok(None);
    }
    let wkt = std::fs::read_to_string(&prj_path).with_read_context("PRJ", &prj_path)?;
    let crs = Crs::from_wkt(wkt.trim());
    debug!("Reference system from {}: {crs}", prj_path.display());
    Ok(Some(crs))
}

fn field_value(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            let trimmed = s.trim_end();
            if trimmed.is_empty() {
                AttributeValue::Null
            } else {
                AttributeValue::String(trimmed.to_string())
            }
        },
        FieldValue::Numeric(Some(n)) => number(n),
        FieldValue::Float(Some(n)) => AttributeValue::Float(f64::from(n)),
        FieldValue::Integer(n) => AttributeValue::Int(i64::from(n)),
        FieldValue::Double(n) | FieldValue::Currency(n) => AttributeValue::Float(n),
        FieldValue::Logical(Some(b)) => AttributeValue::Bool(b),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => AttributeValue::Null,
        other => AttributeValue::String(format!("{other:?}")),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number(n: f64) -> AttributeValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        AttributeValue::Int(n as i64)
    } else {
        AttributeValue::Float(n)
    }
}

fn read_geojson(path: &Path) -> Result<GeometryTable> {
    let text = std::fs::read_to_string(path).with_read_context("GeoJSON", path)?;
    let geojson = text.parse::<GeoJson>().map_err(|e| FormatError::Parse {
        format: "GeoJSON".to_string(),
        line: None,
        message: e.to_string(),
    })?;

    let features: Vec<(JsonObject, Option<Geometry<f64>>)> = match geojson {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| convert_feature(feature, index + 1))
            .collect::<Result<_>>()?,
        GeoJson::Feature(feature) => vec![convert_feature(feature, 1)?],
        GeoJson::Geometry(geometry) => {
            vec![(JsonObject::new(), Some(convert_geometry(geometry, 1)?))]
        },
    };

    let mut columns: Vec<String> = Vec::new();
    for (properties, _) in &features {
        for key in properties.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = GeometryTable::new(columns.clone(), Some(Crs::wgs84()));
    for (properties, geometry) in features {
        let attributes = columns
            .iter()
            .map(|c| properties.get(c).map_or(AttributeValue::Null, AttributeValue::from_json))
            .collect();
        table.push(Record::new(attributes, geometry))?;
    }
    Ok(table)
}

fn convert_feature(feature: Feature, row: usize) -> Result<(JsonObject, Option<Geometry<f64>>)> {
    let geometry = feature
        .geometry
        .map(|g| convert_geometry(g, row))
        .transpose()?;
    Ok((feature.properties.unwrap_or_default(), geometry))
}

fn convert_geometry(geometry: geojson::Geometry, row: usize) -> Result<Geometry<f64>> {
    geometry.try_into().map_err(|e: geojson::Error| {
        FormatError::InvalidGeometry {
            format: "GeoJSON".to_string(),
            message: e.to_string(),
            row: Some(row),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoPrepError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unsupported_extension() {
        let err = load_vector("roads.kml").unwrap_err();
        match err {
            GeoPrepError::Driver(DriverError::UnsupportedExtension {
                extension,
                expected,
                ..
            }) => {
                assert_eq!(extension, "kml");
                assert_eq!(expected, "shp, geojson, json");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_vector("/nowhere/roads.shp").unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_geojson_feature_collection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sites.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[-93.2,44.9]},"properties":{"name":"a","n":1}},
                {"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]},"properties":{"name":"b","extra":true}},
                {"type":"Feature","geometry":null,"properties":{}}
            ]}"#,
        )
        .unwrap();

        let table = load_vector(&path).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.crs(), Some(&Crs::wgs84()));
        assert_eq!(table.geometry_types(), vec!["Point", "Polygon"]);
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.value(0, "n"), Some(&AttributeValue::Int(1)));
        assert_eq!(table.value(0, "extra"), Some(&AttributeValue::Null));
        assert!(table.records()[2].geometry.is_none());
    }

    #[test]
    fn test_geojson_bare_geometry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("point.json");
        fs::write(&path, r#"{"type":"Point","coordinates":[1.0,2.0]}"#).unwrap();
        let table = load_vector(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_geojson_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.geojson");
        fs::write(&path, "{not json").unwrap();
        let err = load_vector(&path).unwrap_err();
        assert!(matches!(err, GeoPrepError::Format(FormatError::Parse { .. })));
    }

    #[test]
    fn test_field_value_conversion() {
        assert_eq!(
            field_value(FieldValue::Character(Some("abc   ".into()))),
            AttributeValue::String("abc".into())
        );
        assert_eq!(field_value(FieldValue::Numeric(Some(7.0))), AttributeValue::Int(7));
        assert_eq!(field_value(FieldValue::Numeric(Some(7.5))), AttributeValue::Float(7.5));
        assert_eq!(field_value(FieldValue::Logical(None)), AttributeValue::Null);
    }
}
