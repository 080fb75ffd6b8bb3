//! In-memory geometry tables.
//!
//! A [`GeometryTable`] is an ordered list of [`Record`]s, each holding one
//! [`AttributeValue`] per column and an optional geometry, plus a single
//! optional [`Crs`] shared by every record. Tables can be exported to Arrow
//! (with a WKT geometry column) or written out as `GeoJSON`.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use geo_types::Geometry;
use geozero::ToWkt;
use log::debug;
use serde_json::{Map, Value};

use crate::crs::Crs;
use crate::drivers::find_driver_for_path;
use crate::error::{FormatError, GeoPrepError, IoErrorExt, Result};
use crate::types::{DatasetInfo, FieldInfo, GeometryColumnInfo, TableSummary};
use crate::utils::{ArrowDataTypeExt, geometry_type_name};

/// Name of the geometry column in exports.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// A single attribute cell.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    String(String),
}

impl AttributeValue {
    /// Infer a typed value from raw text.
    ///
    /// Empty (or whitespace) text is `Null`; `true`/`false` (any case) is
    /// `Bool`; then integer, then float; anything else stays a `String`.
    ///
    /// ```
    /// use geoprep_core::table::AttributeValue;
    ///
    /// assert_eq!(AttributeValue::infer(""), AttributeValue::Null);
    /// assert_eq!(AttributeValue::infer("TRUE"), AttributeValue::Bool(true));
    /// assert_eq!(AttributeValue::infer("42"), AttributeValue::Int(42));
    /// assert_eq!(AttributeValue::infer("4.5"), AttributeValue::Float(4.5));
    /// assert_eq!(AttributeValue::infer("Main St"), AttributeValue::String("Main St".into()));
    /// ```
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return Self::Null;
        }
        if text.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(value) = text.parse::<i64>() {
            return Self::Int(value);
        }
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Float(value),
            _ => Self::String(raw.to_string()),
        }
    }

    /// Returns `true` for [`AttributeValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(s) => s.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Convert to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(v) => Value::Bool(*v),
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// Convert from a JSON value; arrays and objects are kept as JSON text.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Bool(*v),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }

    fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DataType::Boolean),
            Self::Int(_) => Some(DataType::Int64),
            Self::Float(_) => Some(DataType::Float64),
            Self::String(_) => Some(DataType::Utf8),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// One row of a [`GeometryTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// One value per table column, in column order
    pub attributes: Vec<AttributeValue>,
    /// Geometry, if the row has one
    pub geometry: Option<Geometry<f64>>,
}

impl Record {
    /// Create a record.
    #[must_use]
    pub fn new(attributes: Vec<AttributeValue>, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            attributes,
            geometry,
        }
    }
}

/// Ordered records with named columns and a shared reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryTable {
    columns: Vec<String>,
    records: Vec<Record>,
    crs: Option<Crs>,
}

impl GeometryTable {
    /// Create an empty table with the given attribute columns.
    #[must_use]
    pub fn new(columns: Vec<String>, crs: Option<Crs>) -> Self {
        Self {
            columns,
            records: Vec::new(),
            crs,
        }
    }

    /// Append a record.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Parse`] if the record's value count does not
    /// match the column count.
    pub fn push(&mut self, record: Record) -> Result<()> {
        if record.attributes.len() != self.columns.len() {
            return Err(FormatError::Parse {
                format: "table".to_string(),
                line: Some(self.records.len() + 1),
                message: format!(
                    "record has {} values but the table has {} columns",
                    record.attributes.len(),
                    self.columns.len()
                ),
            }
            .into());
        }
        self.records.push(record);
        Ok(())
    }

    /// Attribute column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Shared reference system.
    #[must_use]
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Replace the reference system without touching coordinates.
    #[must_use]
    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of a column by exact name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` in column `name`.
    #[must_use]
    pub fn value(&self, row: usize, name: &str) -> Option<&AttributeValue> {
        let column = self.column_index(name)?;
        self.records.get(row)?.attributes.get(column)
    }

    /// Distinct geometry type names in first-seen order.
    #[must_use]
    pub fn geometry_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for geometry in self.records.iter().filter_map(|r| r.geometry.as_ref()) {
            let name = geometry_type_name(geometry);
            if !types.iter().any(|t| t == name) {
                types.push(name.to_string());
            }
        }
        types
    }

    /// Record count, column count (the geometry column included) and geometry types.
    #[must_use]
    pub fn summary(&self) -> TableSummary {
        TableSummary {
            records: self.records.len(),
            columns: self.columns.len() + 1,
            geometry_types: self.geometry_types(),
        }
    }

    /// First polygonal geometry in record order.
    #[must_use]
    pub fn first_polygon(&self) -> Option<&Geometry<f64>> {
        self.records
            .iter()
            .filter_map(|r| r.geometry.as_ref())
            .find(|g| matches!(g, Geometry::Polygon(_) | Geometry::MultiPolygon(_)))
    }

    /// Apply `f` to every geometry, producing a new table with `crs`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_map_geometries<F>(&self, crs: Option<Crs>, mut f: F) -> Result<Self>
    where
        F: FnMut(&Geometry<f64>) -> Result<Geometry<f64>>,
    {
        let records = self
            .records
            .iter()
            .map(|record| {
                let geometry = record.geometry.as_ref().map(&mut f).transpose()?;
                Ok(Record::new(record.attributes.clone(), geometry))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns: self.columns.clone(),
            records,
            crs,
        })
    }

    fn column_type(&self, column: usize) -> DataType {
        let mut unified: Option<DataType> = None;
        for value in self.records.iter().map(|r| &r.attributes[column]) {
            let Some(data_type) = value.data_type() else {
                continue;
            };
            unified = Some(match (unified, data_type) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(DataType::Int64 | DataType::Float64), DataType::Int64 | DataType::Float64) => {
                    DataType::Float64
                },
                _ => DataType::Utf8,
            });
        }
        unified.unwrap_or(DataType::Null)
    }

    fn column_array(&self, column: usize, data_type: &DataType) -> ArrayRef {
        let values = self.records.iter().map(|r| &r.attributes[column]);
        match data_type {
            DataType::Boolean => Arc::new(BooleanArray::from(
                values
                    .map(|v| match v {
                        AttributeValue::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )),
            DataType::Int64 => Arc::new(Int64Array::from(
                values
                    .map(|v| match v {
                        AttributeValue::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )),
            DataType::Float64 => Arc::new(Float64Array::from(
                values.map(AttributeValue::as_f64).collect::<Vec<_>>(),
            )),
            DataType::Utf8 => Arc::new(StringArray::from(
                values
                    .map(|v| (!v.is_null()).then(|| v.to_string()))
                    .collect::<Vec<_>>(),
            )),
            _ => Arc::new(NullArray::new(self.records.len())),
        }
    }

    fn geometry_field(&self) -> Field {
        let mut metadata = HashMap::new();
        metadata.insert(
            "ARROW:extension:name".to_string(),
            "geoarrow.wkt".to_string(),
        );
        if let Some(crs) = &self.crs {
            metadata.insert(
                "ARROW:extension:metadata".to_string(),
                serde_json::json!({ "crs": crs.identifier() }).to_string(),
            );
        }
        Field::new(GEOMETRY_COLUMN, DataType::Utf8, true).with_metadata(metadata)
    }

    /// Export the table as an Arrow record batch.
    ///
    /// Attribute columns get a unified type per column (mixed integers and
    /// floats become `Float64`, other mixes become `Utf8`); the geometry is a
    /// trailing WKT column tagged as `geoarrow.wkt`.
    ///
    /// # Errors
    ///
    /// Returns an error if a geometry cannot be encoded as WKT or Arrow
    /// rejects the batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len() + 1);
        let mut arrays = Vec::with_capacity(self.columns.len() + 1);

        for (index, name) in self.columns.iter().enumerate() {
            let data_type = self.column_type(index);
            arrays.push(self.column_array(index, &data_type));
            fields.push(Field::new(name, data_type, true));
        }

        let wkt = self
            .records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                record
                    .geometry
                    .as_ref()
                    .map(|g| {
                        g.to_wkt().map_err(|e| FormatError::InvalidGeometry {
                            format: "WKT".to_string(),
                            message: e.to_string(),
                            row: Some(row + 1),
                        })
                    })
                    .transpose()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        arrays.push(Arc::new(StringArray::from(wkt)));
        fields.push(self.geometry_field());

        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| GeoPrepError::Other(e.into()))
    }

    /// Describe the table as a dataset loaded from `dataset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Arrow export fails.
    pub fn describe(&self, dataset: &str) -> Result<DatasetInfo> {
        let batch = self.to_record_batch()?;
        let schema = batch.schema();
        let driver = find_driver_for_path(dataset);

        let fields = schema
            .fields()
            .iter()
            .filter(|f| f.name() != GEOMETRY_COLUMN)
            .map(|f| FieldInfo {
                name: f.name().clone(),
                data_type: f.data_type().format(),
                nullable: f.is_nullable(),
            })
            .collect();

        let geometry_columns = vec![GeometryColumnInfo {
            name: GEOMETRY_COLUMN.to_string(),
            geometry_types: self.geometry_types().join(", "),
            extension: Some("geoarrow.wkt".to_string()),
            crs: self.crs.as_ref().map(Crs::identifier),
        }];

        Ok(DatasetInfo {
            dataset: dataset.to_string(),
            driver: driver.as_ref().map_or("Unknown", |d| d.short_name).to_string(),
            driver_long_name: driver.as_ref().map_or("Unknown", |d| d.long_name).to_string(),
            record_count: self.records.len(),
            geometry_columns,
            fields,
        })
    }

    fn to_geojson_feature(&self, record: &Record) -> geojson::Feature {
        let properties: Map<String, Value> = self
            .columns
            .iter()
            .cloned()
            .zip(record.attributes.iter().map(AttributeValue::to_json))
            .collect();
        geojson::Feature {
            bbox: None,
            geometry: record
                .geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }

    /// Serialize the table as `GeoJSON` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_geojson_bytes(&self, options: &GeoJsonWriterOptions) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_geojson_to(&mut out, options)
            .with_write_context("GeoJSON", "<memory>")?;
        Ok(out)
    }

    fn write_geojson_to<W: Write>(
        &self,
        writer: &mut W,
        options: &GeoJsonWriterOptions,
    ) -> std::io::Result<()> {
        let features = self.records.iter().map(|r| self.to_geojson_feature(r));

        if options.feature_collection {
            let collection = geojson::FeatureCollection {
                bbox: None,
                features: features.collect(),
                foreign_members: None,
            };
            if options.pretty_print {
                serde_json::to_writer_pretty(&mut *writer, &collection)?;
            } else {
                serde_json::to_writer(&mut *writer, &collection)?;
            }
            writer.write_all(b"\n")?;
        } else {
            for feature in features {
                serde_json::to_writer(&mut *writer, &feature)?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()
    }

    /// Write the table to a `GeoJSON` file.
    ///
    /// Coordinates are written as stored; callers wanting RFC 7946 output
    /// should normalize to EPSG:4326 first.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Write`](crate::error::IoError::Write) if the
    /// file cannot be created or written.
    pub fn write_geojson(&self, path: &Path, options: &GeoJsonWriterOptions) -> Result<()> {
        let file = File::create(path).with_write_context("GeoJSON", path)?;
        let mut writer = BufWriter::new(file);
        self.write_geojson_to(&mut writer, options)
            .with_write_context("GeoJSON", path)?;
        debug!("Wrote {} features to {}", self.records.len(), path.display());
        Ok(())
    }
}

/// Options controlling `GeoJSON` output.
#[derive(Debug, Clone)]
pub struct GeoJsonWriterOptions {
    /// Write a `FeatureCollection` (true) or newline-delimited features (false)
    pub feature_collection: bool,
    /// Pretty-print the collection
    pub pretty_print: bool,
}

impl Default for GeoJsonWriterOptions {
    fn default() -> Self {
        Self {
            feature_collection: true,
            pretty_print: false,
        }
    }
}

impl GeoJsonWriterOptions {
    /// Default options: compact `FeatureCollection`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle `FeatureCollection` output.
    #[must_use]
    pub fn with_feature_collection(mut self, feature_collection: bool) -> Self {
        self.feature_collection = feature_collection;
        self
    }

    /// Toggle pretty printing.
    #[must_use]
    pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Array;
    use geo_types::{point, polygon};

    fn sample_table() -> GeometryTable {
        let mut table = GeometryTable::new(
            vec!["name".to_string(), "count".to_string(), "score".to_string()],
            Some(Crs::nad83()),
        );
        table
            .push(Record::new(
                vec![
                    AttributeValue::String("a".into()),
                    AttributeValue::Int(1),
                    AttributeValue::Int(3),
                ],
                Some(Geometry::Point(point!(x: -93.0, y: 45.0))),
            ))
            .unwrap();
        table
            .push(Record::new(
                vec![
                    AttributeValue::Null,
                    AttributeValue::Int(2),
                    AttributeValue::Float(2.5),
                ],
                Some(Geometry::Polygon(polygon![
                    (x: 0.0, y: 0.0),
                    (x: 1.0, y: 0.0),
                    (x: 1.0, y: 1.0),
                ])),
            ))
            .unwrap();
        table
            .push(Record::new(
                vec![
                    AttributeValue::String("c".into()),
                    AttributeValue::Null,
                    AttributeValue::Null,
                ],
                None,
            ))
            .unwrap();
        table
    }

    #[test]
    fn test_push_rejects_wrong_arity() {
        let mut table = GeometryTable::new(vec!["a".to_string()], None);
        let err = table.push(Record::new(vec![], None)).unwrap_err();
        assert!(err.to_string().contains("0 values"));
    }

    #[test]
    fn test_summary_counts_geometry_column() {
        let summary = sample_table().summary();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.columns, 4);
        assert_eq!(summary.geometry_types, vec!["Point", "Polygon"]);
    }

    #[test]
    fn test_first_polygon_skips_points() {
        let table = sample_table();
        assert!(matches!(table.first_polygon(), Some(Geometry::Polygon(_))));
    }

    #[test]
    fn test_value_lookup() {
        let table = sample_table();
        assert_eq!(table.value(1, "count"), Some(&AttributeValue::Int(2)));
        assert_eq!(table.value(0, "missing"), None);
        assert_eq!(table.value(9, "count"), None);
    }

    #[test]
    fn test_record_batch_types() {
        let batch = sample_table().to_record_batch().unwrap();
        let schema = batch.schema();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);

        let geometry = schema.field_with_name(GEOMETRY_COLUMN).unwrap();
        assert_eq!(
            geometry.metadata().get("ARROW:extension:name").map(String::as_str),
            Some("geoarrow.wkt")
        );

        let wkt = batch
            .column(3)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(wkt.value(0).starts_with("POINT"));
        assert!(wkt.is_null(2));
    }

    #[test]
    fn test_describe() {
        let info = sample_table().describe("sites.geojson").unwrap();
        assert_eq!(info.driver, "GeoJSON");
        assert_eq!(info.record_count, 3);
        assert_eq!(info.fields.len(), 3);
        assert_eq!(info.fields[2].data_type, "Real");
        assert_eq!(info.geometry_columns[0].crs.as_deref(), Some("EPSG:4269"));
        assert_eq!(info.geometry_columns[0].geometry_types, "Point, Polygon");
    }

    #[test]
    fn test_geojson_feature_collection() {
        let bytes = sample_table()
            .to_geojson_bytes(&GeoJsonWriterOptions::default())
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"].as_array().unwrap().len(), 3);
        assert_eq!(json["features"][0]["properties"]["name"], "a");
        assert!(json["features"][2]["geometry"].is_null());
    }

    #[test]
    fn test_geojson_newline_delimited() {
        let options = GeoJsonWriterOptions::new().with_feature_collection(false);
        let bytes = sample_table().to_geojson_bytes(&options).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(!text.contains("FeatureCollection"));
    }

    #[test]
    fn test_writer_options_builder() {
        let options = GeoJsonWriterOptions::new()
            .with_feature_collection(false)
            .with_pretty_print(true);
        assert!(!options.feature_collection);
        assert!(options.pretty_print);
    }

    #[test]
    fn test_attribute_json_roundtrip() {
        let value = serde_json::json!(3);
        assert_eq!(AttributeValue::from_json(&value), AttributeValue::Int(3));
        assert_eq!(AttributeValue::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!([1, 2])),
            AttributeValue::String("[1,2]".into())
        );
    }
}
