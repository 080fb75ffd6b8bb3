//! Point geometries from tabular longitude/latitude files.
//!
//! CSV files are decoded as UTF-8 and fall back to Latin-1 (Windows-1252)
//! when they are not valid UTF-8. Spreadsheets (`.xlsx`, `.xls`, `.xlsm`,
//! `.ods`) are read with `calamine`, first sheet unless one is configured.

use std::borrow::Cow;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::{UTF_8, WINDOWS_1252};
use geo_types::{Geometry, Point};
use log::{debug, error, info, warn};

use crate::crs::Crs;
use crate::drivers::{DriverKind, find_driver_for_path, path_extension, readable_extensions};
use crate::error::{ConfigError, DriverError, FormatError, IoErrorExt, Result, ensure_exists};
use crate::table::{AttributeValue, GeometryTable, Record};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Options for [`geocode_with_options`].
#[derive(Debug, Clone)]
pub struct TabularOptions {
    /// Worksheet to read; first sheet when `None`
    pub sheet_name: Option<String>,
    /// CSV field delimiter
    pub delimiter: u8,
    /// Reference system assigned to the result
    pub crs: Crs,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            sheet_name: None,
            delimiter: b',',
            crs: Crs::nad83(),
        }
    }
}

impl TabularOptions {
    /// Default options: first sheet, comma delimiter, EPSG:4269.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a named worksheet.
    #[must_use]
    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = Some(sheet_name.into());
        self
    }

    /// Set the CSV delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Assign a different reference system to the result.
    #[must_use]
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }
}

/// Header plus typed cells, before geometry is built.
struct RawTable {
    format: &'static str,
    header: Vec<String>,
    rows: Vec<Vec<AttributeValue>>,
}

/// Build point geometries from the `lon_column` and `lat_column` of a CSV or
/// spreadsheet file. The result is in EPSG:4269.
///
/// # Errors
///
/// See [`geocode_with_options`].
pub fn geocode(
    path: impl AsRef<Path>,
    lon_column: &str,
    lat_column: &str,
) -> Result<GeometryTable> {
    geocode_with_options(path, lon_column, lat_column, &TabularOptions::default())
}

/// Build point geometries from tabular data with explicit options.
///
/// Each row yields one record whose point is `(longitude, latitude)`. Rows
/// with both coordinates empty get no geometry. All columns, the coordinate
/// columns included, are kept as attributes.
///
/// # Errors
///
/// Returns [`DriverError::UnsupportedExtension`] for non-tabular files,
/// [`FormatError::MissingColumn`] when a coordinate column is absent,
/// [`FormatError::InvalidGeometry`] for non-numeric coordinates, and I/O or
/// parse errors for unreadable input. Errors are logged before being returned.
pub fn geocode_with_options(
    path: impl AsRef<Path>,
    lon_column: &str,
    lat_column: &str,
    options: &TabularOptions,
) -> Result<GeometryTable> {
    let path = path.as_ref();
    let result = read_tabular(path, options)
        .and_then(|raw| build_points(raw, lon_column, lat_column, &options.crs));
    match &result {
        Ok(table) => info!(
            "Geocoded {}: {} records, {} columns, CRS {}",
            path.display(),
            table.len(),
            table.summary().columns,
            options.crs
        ),
        Err(e) => error!("Failed to geocode {}: {e}", path.display()),
    }
    result
}

fn read_tabular(path: &Path, options: &TabularOptions) -> Result<RawTable> {
    let driver = find_driver_for_path(path).filter(|d| d.kind == DriverKind::Tabular);
    let Some(driver) = driver else {
        return Err(DriverError::UnsupportedExtension {
            path: path.to_path_buf(),
            extension: path_extension(path),
            expected: readable_extensions(DriverKind::Tabular),
        }
        .into());
    };
    ensure_exists(path)?;

    if driver.short_name == "CSV" {
        let bytes = std::fs::read(path).with_read_context("CSV", path)?;
        let text = decode_text(&bytes, path);
        read_csv(&text, options.delimiter)
    } else {
        read_spreadsheet(path, options.sheet_name.as_deref())
    }
}

/// Decode as UTF-8, falling back to Windows-1252 on malformed input.
fn decode_text<'a>(bytes: &'a [u8], path: &Path) -> Cow<'a, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return text;
    }
    warn!(
        "{} is not valid UTF-8; decoding as Latin-1 instead",
        path.display()
    );
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text
}

fn read_csv(text: &str, delimiter: u8) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let parse_error = |e: csv::Error| FormatError::Parse {
        format: "CSV".to_string(),
        line: e
            .position()
            .and_then(|p| usize::try_from(p.line()).ok()),
        message: e.to_string(),
    };

    let header: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        let mut row: Vec<AttributeValue> = record.iter().map(AttributeValue::infer).collect();
        row.resize(header.len(), AttributeValue::Null);
        rows.push(row);
    }
    Ok(RawTable {
        format: "CSV",
        header,
        rows,
    })
}

fn read_spreadsheet(path: &Path, sheet_name: Option<&str>) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path).with_read_context("XLSX", path)?;

    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| FormatError::Parse {
                format: "XLSX".to_string(),
                line: None,
                message: "workbook has no sheets".to_string(),
            })?,
    };
    let available = workbook.sheet_names();
    if !available.contains(&sheet) {
        return Err(ConfigError::InvalidOption {
            option: "sheet".to_string(),
            message: format!(
                "sheet '{sheet}' not found; available sheets: {}",
                available.join(", ")
            ),
        }
        .into());
    }
    debug!("Reading sheet '{sheet}' of {}", path.display());

    let range = workbook
        .worksheet_range(&sheet)
        .with_read_context("XLSX", path)?;

    let mut rows_iter = range.rows();
    let header: Vec<String> = rows_iter
        .next()
        .map(|cells| {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| match cell {
                    Data::Empty => format!("column_{}", i + 1),
                    other => other.to_string().trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let rows = rows_iter
        .map(|cells| {
            let mut row: Vec<AttributeValue> = cells.iter().map(cell_value).collect();
            row.resize(header.len(), AttributeValue::Null);
            row
        })
        .collect();

    Ok(RawTable {
        format: "XLSX",
        header,
        rows,
    })
}

fn cell_value(cell: &Data) -> AttributeValue {
    match cell {
        Data::Empty => AttributeValue::Null,
        Data::Int(i) => AttributeValue::Int(*i),
        Data::Float(f) => AttributeValue::Float(*f),
        Data::Bool(b) => AttributeValue::Bool(*b),
        Data::String(s) => AttributeValue::infer(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn build_points(raw: RawTable, lon_column: &str, lat_column: &str, crs: &Crs) -> Result<GeometryTable> {
    let find = |column: &str| {
        raw.header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| FormatError::MissingColumn {
                format: raw.format.to_string(),
                column: column.to_string(),
                available: raw.header.join(", "),
            })
    };
    let lon_index = find(lon_column)?;
    let lat_index = find(lat_column)?;

    let mut table = GeometryTable::new(raw.header.clone(), Some(crs.clone()));
    for (index, row) in raw.rows.into_iter().enumerate() {
        let row_number = index + 1;
        let lon = &row[lon_index];
        let lat = &row[lat_index];

        let geometry = if lon.is_null() && lat.is_null() {
            None
        } else {
            let x = coordinate(lon, "longitude", raw.format, row_number)?;
            let y = coordinate(lat, "latitude", raw.format, row_number)?;
            Some(Geometry::Point(Point::new(x, y)))
        };
        table.push(Record::new(row, geometry))?;
    }
    Ok(table)
}

fn coordinate(value: &AttributeValue, axis: &str, format: &str, row: usize) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            FormatError::InvalidGeometry {
                format: format.to_string(),
                message: format!("{axis} '{value}' is not a number"),
                row: Some(row),
            }
            .into()
        })
}
