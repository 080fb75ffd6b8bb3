//! Display utilities for formatting CLI output.
//!
//! Table row structures and printing helpers for drivers, dataset metadata,
//! raster metadata and harmonization results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tabled::{Table, Tabled};

use geoprep_core::drivers::Driver;
use geoprep_core::operations::HarmonizeReport;
use geoprep_core::types::{DatasetInfo, RasterInfo, TableSummary};

/// Table row representation for displaying geometry column information.
#[derive(Tabled)]
pub struct GeometryRow {
    /// Name of the geometry column.
    #[tabled(rename = "Column")]
    pub name: String,
    /// Distinct geometry types in the column.
    #[tabled(rename = "Types")]
    pub geometry_types: String,
    /// Arrow extension name of the encoded column.
    #[tabled(rename = "Extension")]
    pub extension: String,
    /// Coordinate Reference System information.
    #[tabled(rename = "CRS")]
    pub crs: String,
}

/// Table row representation for displaying field/column information.
#[derive(Tabled)]
pub struct FieldRow {
    /// Name of the field.
    #[tabled(rename = "Field")]
    pub name: String,
    /// Data type of the field.
    #[tabled(rename = "Type")]
    pub data_type: String,
    /// Whether the field can contain null values.
    #[tabled(rename = "Nullable")]
    pub nullable: String,
}

/// Table row representation for displaying driver information.
#[derive(Tabled)]
pub struct DriverRow {
    /// Short identifier for the driver (e.g., `GeoJSON`, `GTiff`).
    #[tabled(rename = "Short Name")]
    pub short_name: String,
    /// Full descriptive name of the driver format.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    /// Data kind handled by the driver.
    #[tabled(rename = "Kind")]
    pub kind: String,
    /// Support status for reading dataset metadata and information.
    #[tabled(rename = "Info")]
    pub info: String,
    /// Support status for reading data from this format.
    #[tabled(rename = "Read")]
    pub read: String,
    /// Support status for writing data to this format.
    #[tabled(rename = "Write")]
    pub write: String,
}

impl From<&Driver> for DriverRow {
    fn from(d: &Driver) -> Self {
        Self {
            short_name: d.short_name.to_string(),
            long_name: d.long_name.to_string(),
            kind: d.kind.as_str().to_string(),
            info: d.capabilities.info.as_str().to_string(),
            read: d.capabilities.read.as_str().to_string(),
            write: d.capabilities.write.as_str().to_string(),
        }
    }
}

/// Property/value pair.
#[derive(Tabled)]
pub struct PropertyRow {
    #[tabled(rename = "Property")]
    pub property: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl PropertyRow {
    fn new(property: &str, value: impl ToString) -> Self {
        Self {
            property: property.to_string(),
            value: value.to_string(),
        }
    }
}

/// One harmonized raster.
#[derive(Tabled)]
pub struct OutcomeRow {
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Reprojected")]
    pub reprojected: String,
    #[tabled(rename = "Cropped")]
    pub cropped: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// One raster found by `browse`.
#[derive(Tabled)]
pub struct CatalogRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Path")]
    pub path: String,
}

/// Print the driver registry.
pub fn display_drivers(drivers: &[Driver]) {
    println!("\nAvailable Drivers ({} total):\n", drivers.len());
    let rows: Vec<DriverRow> = drivers.iter().map(DriverRow::from).collect();
    println!("{}", Table::new(rows));
}

/// Display dataset information in a formatted table.
///
/// # Arguments
///
/// * `info` - The dataset information to display
pub fn display_dataset_info(info: &DatasetInfo) {
    println!("\nDataset: {}", info.dataset);
    println!("Driver: {} ({})", info.driver, info.driver_long_name);
    println!("Records: {}", info.record_count);

    if !info.geometry_columns.is_empty() {
        println!("\n=== Geometry Columns ===");

        let geo_rows: Vec<GeometryRow> = info
            .geometry_columns
            .iter()
            .map(|g| GeometryRow {
                name: g.name.clone(),
                geometry_types: if g.geometry_types.is_empty() {
                    "N/A".to_string()
                } else {
                    g.geometry_types.clone()
                },
                extension: g.extension.clone().unwrap_or_else(|| "N/A".to_string()),
                crs: g.crs.clone().unwrap_or_else(|| "N/A".to_string()),
            })
            .collect();
        println!("{}", Table::new(geo_rows));
    }

    if !info.fields.is_empty() {
        println!("\n=== Fields ===");

        let field_rows: Vec<FieldRow> = info
            .fields
            .iter()
            .map(|f| FieldRow {
                name: f.name.clone(),
                data_type: f.data_type.clone(),
                nullable: if f.nullable { "Yes" } else { "No" }.to_string(),
            })
            .collect();
        println!("{}", Table::new(field_rows));
    }
}

/// Rows describing a raster.
#[must_use]
pub fn raster_rows(info: &RasterInfo) -> Vec<PropertyRow> {
    let (min_x, min_y, max_x, max_y) = info.bounds;
    vec![
        PropertyRow::new("Size", format!("{} x {}", info.width, info.height)),
        PropertyRow::new("Bands", info.bands),
        PropertyRow::new("Sample type", &info.sample_type),
        PropertyRow::new("CRS", info.crs.as_deref().unwrap_or("N/A")),
        PropertyRow::new("Bounds", format!("({min_x}, {min_y}) - ({max_x}, {max_y})")),
        PropertyRow::new(
            "Pixel size",
            format!("{} x {}", info.pixel_size.0, info.pixel_size.1),
        ),
        PropertyRow::new(
            "NoData",
            info.nodata.map_or_else(|| "N/A".to_string(), |v| v.to_string()),
        ),
    ]
}

/// Print raster metadata.
pub fn display_raster_info(info: &RasterInfo) {
    println!("\nRaster: {}", info.path);
    println!("Driver: GTiff (GeoTIFF)\n");
    println!("{}", Table::new(raster_rows(info)));
}

/// Print the shape of a loaded table and where it was written.
pub fn display_table_summary(summary: &TableSummary, crs: Option<&str>, output: Option<&PathBuf>) {
    let mut rows = vec![
        PropertyRow::new("Records", summary.records),
        PropertyRow::new("Columns", summary.columns),
        PropertyRow::new("Geometry types", summary.geometry_types.join(", ")),
        PropertyRow::new("CRS", crs.unwrap_or("N/A")),
    ];
    if let Some(output) = output {
        rows.push(PropertyRow::new("Output", output.display()));
    }
    println!("{}", Table::new(rows));
}

/// Rows describing a harmonization report.
#[must_use]
pub fn outcome_rows(report: &HarmonizeReport) -> Vec<OutcomeRow> {
    report
        .outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(done) => OutcomeRow {
                source: o.source.display().to_string(),
                reprojected: done
                    .reprojected
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
                cropped: done.cropped.display().to_string(),
                status: "OK".to_string(),
            },
            Err(e) => OutcomeRow {
                source: o.source.display().to_string(),
                reprojected: "-".to_string(),
                cropped: "-".to_string(),
                status: e.user_message(),
            },
        })
        .collect()
}

/// Print a harmonization report.
pub fn display_harmonize_report(report: &HarmonizeReport) {
    if report.is_empty() {
        println!("No rasters to harmonize.");
        return;
    }
    println!(
        "\nHarmonized {} of {} raster(s):\n",
        report.succeeded(),
        report.outcomes.len()
    );
    println!("{}", Table::new(outcome_rows(report)));
}

/// Print the rasters available for browsing.
pub fn display_catalog(catalog: &BTreeMap<String, PathBuf>) {
    let rows: Vec<CatalogRow> = catalog
        .iter()
        .map(|(name, path)| CatalogRow {
            name: name.clone(),
            path: path.display().to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
}
