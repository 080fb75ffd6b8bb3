//! Multi-band raster grid.

use std::fmt;

use ndarray::{Array3, ArrayView2};

use crate::crs::Crs;
use crate::error::{RasterError, Result};
use crate::raster::GeoTransform;
use crate::types::RasterInfo;

/// On-disk sample type of a raster, kept so derived rasters are written back
/// with the same layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// Unsigned 8-bit
    U8,
    /// Unsigned 16-bit
    U16,
    /// Unsigned 32-bit
    U32,
    /// Signed 8-bit
    I8,
    /// Signed 16-bit
    I16,
    /// Signed 32-bit
    I32,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl SampleType {
    /// Bits per sample.
    #[must_use]
    pub fn bits(self) -> u16 {
        match self {
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 | Self::F32 => 32,
            Self::F64 => 64,
        }
    }

    /// TIFF `SampleFormat` code: 1 unsigned, 2 signed, 3 float.
    #[must_use]
    pub fn sample_format(self) -> u16 {
        match self {
            Self::U8 | Self::U16 | Self::U32 => 1,
            Self::I8 | Self::I16 | Self::I32 => 2,
            Self::F32 | Self::F64 => 3,
        }
    }

    /// Lowercase name, e.g. `"u16"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Round and saturate `value` into the representable range.
    #[must_use]
    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = match self {
            Self::U8 => (f64::from(u8::MIN), f64::from(u8::MAX)),
            Self::U16 => (f64::from(u16::MIN), f64::from(u16::MAX)),
            Self::U32 => (f64::from(u32::MIN), f64::from(u32::MAX)),
            Self::I8 => (f64::from(i8::MIN), f64::from(i8::MAX)),
            Self::I16 => (f64::from(i16::MIN), f64::from(i16::MAX)),
            Self::I32 => (f64::from(i32::MIN), f64::from(i32::MAX)),
            Self::F32 | Self::F64 => return value,
        };
        if value.is_nan() {
            return 0.0;
        }
        value.round().clamp(min, max)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Georeferenced raster with `bands x rows x cols` samples.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    data: Array3<f64>,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: Option<f64>,
    sample_type: SampleType,
}

impl RasterGrid {
    /// Create a grid from band-major samples.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::InvalidDimensions`] if any dimension is zero.
    pub fn new(
        data: Array3<f64>,
        transform: GeoTransform,
        crs: Option<Crs>,
        nodata: Option<f64>,
        sample_type: SampleType,
    ) -> Result<Self> {
        let (bands, height, width) = data.dim();
        if bands == 0 || height == 0 || width == 0 {
            return Err(RasterError::InvalidDimensions {
                bands,
                width,
                height,
            }
            .into());
        }
        Ok(Self {
            data,
            transform,
            crs,
            nodata,
            sample_type,
        })
    }

    /// A grid of the given shape filled with this grid's fill value and
    /// sharing its metadata apart from the transform.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::InvalidDimensions`] if a dimension is zero.
    pub fn blank_like(&self, width: usize, height: usize, transform: GeoTransform) -> Result<Self> {
        Self::new(
            Array3::from_elem((self.bands(), height, width), self.fill_value()),
            transform,
            self.crs.clone(),
            self.nodata,
            self.sample_type,
        )
    }

    /// Number of bands.
    #[must_use]
    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    /// Rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    /// Columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// All samples, band-major.
    #[must_use]
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Mutable samples.
    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    /// One band as a `rows x cols` view. Bands are zero-based.
    #[must_use]
    pub fn band(&self, band: usize) -> Option<ArrayView2<'_, f64>> {
        (band < self.bands()).then(|| self.data.index_axis(ndarray::Axis(0), band))
    }

    /// Affine transform.
    #[must_use]
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Reference system.
    #[must_use]
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Replace the reference system.
    #[must_use]
    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    /// Nodata value.
    #[must_use]
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Value written where there is no data: nodata, or 0 without one.
    #[must_use]
    pub fn fill_value(&self) -> f64 {
        self.nodata.unwrap_or(0.0)
    }

    /// Whether `value` is this grid's nodata (NaN matches a NaN nodata).
    #[must_use]
    pub fn is_nodata(&self, value: f64) -> bool {
        match self.nodata {
            Some(nodata) if nodata.is_nan() => value.is_nan(),
            Some(nodata) => value == nodata,
            None => false,
        }
    }

    /// On-disk sample type.
    #[must_use]
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// `(min_x, min_y, max_x, max_y)` in CRS units.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.width(), self.height())
    }

    /// Metadata summary for `path`.
    #[must_use]
    pub fn info(&self, path: &str) -> RasterInfo {
        RasterInfo {
            path: path.to_string(),
            width: self.width(),
            height: self.height(),
            bands: self.bands(),
            crs: self.crs.as_ref().map(Crs::identifier),
            bounds: self.bounds(),
            pixel_size: self.transform.pixel_size(),
            nodata: self.nodata,
            sample_type: self.sample_type.to_string(),
        }
    }
}
