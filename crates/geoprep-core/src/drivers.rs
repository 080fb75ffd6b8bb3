//! Driver registry for the file formats `GeoPrep` reads and writes.
//!
//! This module provides a static registry of format drivers together with the
//! file extensions that identify them and their support status for info, read
//! and write operations. Loaders use it to sniff formats from file extensions.
//!
//! # Examples
//!
//! ```
//! use geoprep_core::drivers::find_driver_for_path;
//!
//! let shp = find_driver_for_path("roads.shp").expect("shapefile driver should exist");
//! assert!(shp.capabilities.read.is_supported());
//!
//! let csv = find_driver_for_path("points.CSV").expect("csv should be recognized");
//! assert_eq!(csv.short_name, "CSV");
//! ```

use std::path::Path;

/// Support status for a specific driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// The feature is fully supported and implemented.
    Supported,
    /// The feature is not supported by the driver.
    NotSupported,
}

impl SupportStatus {
    /// Returns `true` if the operation is fully supported and implemented.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoprep_core::drivers::SupportStatus;
    ///
    /// assert!(SupportStatus::Supported.is_supported());
    /// assert!(!SupportStatus::NotSupported.is_supported());
    /// ```
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    /// Returns the string representation of this support status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SupportStatus::Supported => "Supported",
            SupportStatus::NotSupported => "Not Supported",
        }
    }
}

/// Which family of data a driver produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Feature collections with geometries
    Vector,
    /// Rows and columns with coordinate columns
    Tabular,
    /// Georeferenced grids
    Raster,
    /// Plain images (previews)
    Image,
}

impl DriverKind {
    /// Returns the string representation of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            DriverKind::Vector => "Vector",
            DriverKind::Tabular => "Tabular",
            DriverKind::Raster => "Raster",
            DriverKind::Image => "Image",
        }
    }
}

/// Capabilities supported by a format driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    /// Support status for reading dataset metadata and information.
    pub info: SupportStatus,
    /// Support status for reading data from this format.
    pub read: SupportStatus,
    /// Support status for writing data to this format.
    pub write: SupportStatus,
}

impl DriverCapabilities {
    /// Returns `true` if at least one operation is fully supported and implemented.
    #[must_use]
    pub fn has_supported_operation(&self) -> bool {
        self.info.is_supported() || self.read.is_supported() || self.write.is_supported()
    }
}

/// Format driver definition.
///
/// A driver has a short name (used in the CLI), a descriptive long name,
/// the lowercase file extensions it answers to and a set of capabilities.
#[derive(Debug, Clone)]
pub struct Driver {
    /// Short name used in the CLI and for driver identification (e.g., `"GeoJSON"`).
    pub short_name: &'static str,
    /// Long descriptive name for display purposes.
    pub long_name: &'static str,
    /// Data family produced by the driver.
    pub kind: DriverKind,
    /// Lowercase file extensions without the leading dot.
    pub extensions: &'static [&'static str],
    /// Operations supported by this driver (info, read, write).
    pub capabilities: DriverCapabilities,
}

impl Driver {
    /// Creates a new driver definition with specified capabilities.
    #[must_use]
    pub const fn new(
        short_name: &'static str,
        long_name: &'static str,
        kind: DriverKind,
        extensions: &'static [&'static str],
        info: SupportStatus,
        read: SupportStatus,
        write: SupportStatus,
    ) -> Self {
        Self {
            short_name,
            long_name,
            kind,
            extensions,
            capabilities: DriverCapabilities { info, read, write },
        }
    }

    /// Returns `true` if `extension` (any case, no dot) belongs to this driver.
    #[must_use]
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// Returns the complete registry of known drivers.
#[must_use]
pub fn get_drivers() -> Vec<Driver> {
    use DriverKind::{Image, Raster, Tabular, Vector};
    use SupportStatus::{NotSupported, Supported};

    vec![
        Driver::new(
            "ESRI Shapefile",
            "ESRI Shapefile / DBF",
            Vector,
            &["shp"],
            Supported,
            Supported,
            NotSupported,
        ),
        Driver::new(
            "GeoJSON",
            "GeoJSON",
            Vector,
            &["geojson", "json"],
            Supported,
            Supported,
            Supported,
        ),
        Driver::new(
            "CSV",
            "Comma Separated Value (.csv)",
            Tabular,
            &["csv"],
            Supported,
            Supported,
            NotSupported,
        ),
        Driver::new(
            "XLSX",
            "Spreadsheet (.xlsx .xls .xlsm .ods)",
            Tabular,
            &["xlsx", "xls", "xlsm", "ods"],
            Supported,
            Supported,
            NotSupported,
        ),
        Driver::new(
            "GTiff",
            "GeoTIFF",
            Raster,
            &["tif", "tiff"],
            Supported,
            Supported,
            Supported,
        ),
        Driver::new(
            "PNG",
            "Portable Network Graphics preview",
            Image,
            &["png"],
            NotSupported,
            NotSupported,
            Supported,
        ),
    ]
}

/// Returns drivers that have at least one supported operation.
#[must_use]
pub fn get_available_drivers() -> Vec<Driver> {
    get_drivers()
        .into_iter()
        .filter(|d| d.capabilities.has_supported_operation())
        .collect()
}

/// Lowercase extension of `path`, or an empty string when it has none.
#[must_use]
pub fn path_extension(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Finds the driver responsible for a path, judged by its extension.
#[must_use]
pub fn find_driver_for_path(path: impl AsRef<Path>) -> Option<Driver> {
    let extension = path_extension(path);
    if extension.is_empty() {
        return None;
    }
    get_drivers()
        .into_iter()
        .find(|d| d.matches_extension(&extension))
}

/// Comma-separated extensions of every driver of `kind` that supports reading.
#[must_use]
pub fn readable_extensions(kind: DriverKind) -> String {
    get_drivers()
        .iter()
        .filter(|d| d.kind == kind && d.capabilities.read.is_supported())
        .flat_map(|d| d.extensions.iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_driver_for_path() {
        assert_eq!(
            find_driver_for_path("data/roads.SHP").unwrap().short_name,
            "ESRI Shapefile"
        );
        assert_eq!(find_driver_for_path("a/b/scene.TIF").unwrap().short_name, "GTiff");
        assert_eq!(find_driver_for_path("sites.xlsx").unwrap().short_name, "XLSX");
        assert!(find_driver_for_path("notes.txt").is_none());
        assert!(find_driver_for_path("no_extension").is_none());
    }

    #[test]
    fn test_readable_extensions() {
        assert_eq!(readable_extensions(DriverKind::Tabular), "csv, xlsx, xls, xlsm, ods");
        assert_eq!(readable_extensions(DriverKind::Vector), "shp, geojson, json");
        assert_eq!(readable_extensions(DriverKind::Image), "");
    }

    #[test]
    fn test_available_drivers() {
        let drivers = get_available_drivers();
        assert_eq!(drivers.len(), get_drivers().len());
        assert!(drivers.iter().any(|d| d.short_name == "PNG"));
    }

    #[test]
    fn test_support_status() {
        assert!(SupportStatus::Supported.is_supported());
        assert!(!SupportStatus::NotSupported.is_supported());
        assert_eq!(SupportStatus::NotSupported.as_str(), "Not Supported");
    }
}
