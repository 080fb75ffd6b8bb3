//! Custom error types for `GeoPrep` operations.
//!
//! This module provides structured error handling using `thiserror`. Each
//! failure kind (unsupported format, decode failure, CRS fault, raster fault)
//! is a distinct variant so callers can branch on kind rather than message text.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for `GeoPrep` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum GeoPrepError {
    /// Driver-related errors (unknown extension, unsupported operation)
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// I/O errors (file read/write, path issues, permissions)
    #[error(transparent)]
    Io(#[from] IoError),

    /// Format parsing and validation errors
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Coordinate reference system errors
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// Raster reprojection, cropping and encoding errors
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Driver-related errors.
///
/// These errors occur when a path does not map onto a registered driver, or
/// the driver cannot perform the requested operation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// File extension is not handled by the requested loader
    #[error("Unsupported file extension '{extension}' for '{path}'. Expected one of: {expected}")]
    UnsupportedExtension {
        /// The offending path
        path: PathBuf,
        /// The extension found (empty when the path has none)
        extension: String,
        /// Comma-separated list of accepted extensions
        expected: String,
    },

    /// Driver does not support the requested operation
    #[error("Driver '{driver}' does not support {operation}")]
    OperationNotSupported {
        /// The driver name
        driver: String,
        /// The operation that's not supported (e.g., "reading", "writing")
        operation: String,
    },
}

/// I/O related errors.
///
/// These errors occur during file or stream operations, including
/// reading, writing, and path validation.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read from a file
    #[error("Failed to read {format} file '{path}': {source}")]
    Read {
        /// The format being read (e.g., "CSV", "`GeoTIFF`")
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to write to a file
    #[error("Failed to write {format} file '{path}': {source}")]
    Write {
        /// The format being written
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// File was not found
    #[error("File not found: '{path}'")]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
    },
}

/// Format parsing and validation errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Failed to parse a format
    #[error("Failed to parse {format} at line {line}: {message}", line = line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Parse {
        /// The format being parsed
        format: String,
        /// The line number where parsing failed (if available)
        line: Option<usize>,
        /// Description of the parse error
        message: String,
    },

    /// Invalid geometry
    #[error("Invalid geometry in {format}: {message}{}", row.map(|r| format!(" (row {r})")).unwrap_or_default())]
    InvalidGeometry {
        /// The format
        format: String,
        /// Description of the geometry problem
        message: String,
        /// Optional 1-based data row where the error occurred
        row: Option<usize>,
    },

    /// A required column is absent from the input
    #[error("Column '{column}' not found in {format}. Available columns: {available}")]
    MissingColumn {
        /// The format
        format: String,
        /// The requested column
        column: String,
        /// Comma-separated list of available columns
        available: String,
    },

    /// Unsupported geometry type
    #[error("Unsupported geometry type: {geometry_type}")]
    UnsupportedGeometryType {
        /// The unsupported geometry type
        geometry_type: String,
    },
}

/// Coordinate reference system errors.
#[derive(Debug, Error)]
pub enum CrsError {
    /// The dataset carries no reference system
    #[error("Dataset has no coordinate reference system; cannot transform to {target}")]
    Undefined {
        /// The requested target identifier
        target: String,
    },

    /// No projection definition is known for the reference system
    #[error("No projection definition known for {identifier}")]
    UnknownDefinition {
        /// The reference system identifier
        identifier: String,
    },

    /// A reference system string could not be parsed
    #[error("Invalid CRS '{input}': {reason}")]
    Parse {
        /// The raw input
        input: String,
        /// Why it is invalid
        reason: String,
    },

    /// The projection engine rejected a definition
    #[error("Invalid projection definition for {identifier}: {message}")]
    InvalidDefinition {
        /// The reference system identifier
        identifier: String,
        /// Message from the projection engine
        message: String,
    },

    /// A coordinate failed to transform
    #[error("Transform from {source_crs} to {target_crs} failed at ({x}, {y}): {message}")]
    Transform {
        /// Source identifier
        source_crs: String,
        /// Target identifier
        target_crs: String,
        /// Input x coordinate
        x: f64,
        /// Input y coordinate
        y: f64,
        /// Message from the projection engine
        message: String,
    },
}

/// Raster processing errors.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The raster carries no reference system
    #[error("Raster '{path}' has no coordinate reference system")]
    MissingCrs {
        /// The raster path
        path: PathBuf,
    },

    /// The raster carries no georeferencing tags
    #[error("Raster '{path}' has no georeferencing (pixel scale/tiepoint or transformation tag)")]
    MissingGeoTransform {
        /// The raster path
        path: PathBuf,
    },

    /// The cropping table holds no polygon
    #[error("Cropping table contains no polygon geometry")]
    MissingPolygon,

    /// The cropping polygon does not intersect the raster
    #[error("Cropping polygon does not overlap raster '{path}'")]
    NoOverlap {
        /// The raster path
        path: PathBuf,
    },

    /// Dimensions are zero or inconsistent with the sample buffer
    #[error("Invalid raster dimensions: {bands} band(s) of {width}x{height}")]
    InvalidDimensions {
        /// Band count
        bands: usize,
        /// Width in pixels
        width: usize,
        /// Height in pixels
        height: usize,
    },

    /// The TIFF sample layout is not supported
    #[error("Unsupported raster sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// Low-level TIFF encoding/decoding failure
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
}

/// Configuration errors.
///
/// These errors occur when options or configuration are invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired {
        /// The missing option name
        option: String,
    },
}

/// Type alias for Results using `GeoPrepError`.
pub type Result<T> = std::result::Result<T, GeoPrepError>;

impl GeoPrepError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Driver(e) => e.user_message(),
            Self::Io(e) => e.user_message(),
            Self::Format(e) => e.to_string(),
            Self::Crs(e) => format!("Coordinate system error: {e}"),
            Self::Raster(e) => format!("Raster error: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Driver(e) => e.recovery_suggestion(),
            Self::Io(e) => e.recovery_suggestion(),
            Self::Format(e) => e.recovery_suggestion(),
            Self::Crs(CrsError::Undefined { .. }) => {
                Some("Assign a reference system to the dataset before reprojecting.".to_string())
            },
            Self::Crs(CrsError::UnknownDefinition { .. }) => {
                Some("Use an EPSG code or a PROJ string instead of WKT.".to_string())
            },
            Self::Raster(RasterError::NoOverlap { .. }) => {
                Some("Check that the cropping polygon lies within the raster extent.".to_string())
            },
            _ => None,
        }
    }

    /// Check if this error is potentially recoverable.
    ///
    /// Recoverable errors might be fixed by retrying with different
    /// parameters or after the user takes some action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Driver(DriverError::UnsupportedExtension { .. })
                | Self::Format(FormatError::MissingColumn { .. })
        )
    }
}

impl DriverError {
    fn user_message(&self) -> String {
        match self {
            Self::UnsupportedExtension {
                path, extension, ..
            } => {
                if extension.is_empty() {
                    format!("'{}' has no file extension.", path.display())
                } else {
                    format!("Files with extension '.{extension}' are not supported here.")
                }
            },
            Self::OperationNotSupported { driver, operation } => {
                format!("The '{driver}' driver does not support {operation} operation.")
            },
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::UnsupportedExtension { expected, .. } => {
                Some(format!("Convert the file to one of: {expected}."))
            },
            Self::OperationNotSupported { .. } => None,
        }
    }
}

impl IoError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { format, path, .. } => {
                format!("Failed to read {} file: {}", format, path.display())
            },
            Self::Write { format, path, .. } => {
                format!("Failed to write {} file: {}", format, path.display())
            },
            Self::FileNotFound { path } => {
                format!("File not found: {}", path.display())
            },
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::FileNotFound { .. } => {
                Some("Check that the file path is correct and the file exists.".to_string())
            },
            _ => None,
        }
    }
}

impl FormatError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Parse { .. } => Some("Check the file format and ensure it's valid.".to_string()),
            Self::InvalidGeometry { .. } => {
                Some("Ensure coordinate columns hold numeric values.".to_string())
            },
            Self::MissingColumn { available, .. } => {
                Some(format!("Pick a coordinate column from: {available}."))
            },
            _ => None,
        }
    }
}

/// Extension trait for adding I/O context to errors.
///
/// This trait provides convenient methods to wrap errors with file and format
/// context, creating more informative error messages.
pub trait IoErrorExt<T> {
    /// Add read context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Read`] if the underlying operation fails.
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;

    /// Add write context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Write`] if the underlying operation fails.
    fn with_write_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T, E> IoErrorExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoPrepError::Io(IoError::Read {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }

    fn with_write_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoPrepError::Io(IoError::Write {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }
}

impl From<tiff::TiffError> for GeoPrepError {
    fn from(e: tiff::TiffError) -> Self {
        GeoPrepError::Raster(RasterError::Tiff(e))
    }
}

/// Fail with [`IoError::FileNotFound`] when `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path does not exist.
pub fn ensure_exists(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(IoError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into())
    }
}
