//! GeoTIFF reading and writing.
//!
//! Supports uncompressed or compressed strips/tiles on read (whatever the
//! `tiff` decoder handles) with interleaved bands, and writes a single
//! uncompressed strip. Georeferencing comes from `ModelPixelScale` +
//! `ModelTiepoint` or `ModelTransformation`, the reference system from the
//! `GeoKeyDirectory` and the nodata value from the GDAL nodata tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::debug;
use ndarray::Array3;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use crate::crs::Crs;
use crate::error::{IoErrorExt, RasterError, Result, ensure_exists};
use crate::raster::{GeoTransform, RasterGrid, SampleType};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GT_CITATION_KEY: u16 = 1026;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Short-valued entries of a GeoKeyDirectory as `(key, value)` pairs.
#[derive(Debug, Default)]
struct GeoKeys(Vec<(u16, u16)>);

impl GeoKeys {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self> {
        let Some(directory) = decoder.find_tag(geo_tag(GEO_KEY_DIRECTORY))? else {
            return Ok(Self::default());
        };
        Ok(Self::parse(&directory.into_u16_vec()?))
    }

    fn parse(directory: &[u16]) -> Self {
        Self(
            directory
                .get(4..)
                .unwrap_or_default()
                .chunks_exact(4)
                .filter(|entry| entry[1] == 0)
                .map(|entry| (entry[0], entry[3]))
                .collect(),
        )
    }

    fn get(&self, key: u16) -> Option<u16> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// EPSG code of the model. Projected models may also carry their base
    /// geographic system, so the key matching the model type wins.
    fn epsg(&self) -> Option<u32> {
        let code = |key: u16| {
            self.get(key)
                .filter(|&v| v != 0 && v != USER_DEFINED)
                .map(u32::from)
        };
        match self.get(GT_MODEL_TYPE_KEY) {
            Some(MODEL_TYPE_GEOGRAPHIC) => {
                code(GEOGRAPHIC_TYPE_KEY).or_else(|| code(PROJECTED_CS_TYPE_KEY))
            },
            _ => code(PROJECTED_CS_TYPE_KEY).or_else(|| code(GEOGRAPHIC_TYPE_KEY)),
        }
    }

    fn pixel_is_point(&self) -> bool {
        self.get(GT_RASTER_TYPE_KEY) == Some(RASTER_PIXEL_IS_POINT)
    }
}

/// Read a GeoTIFF into a [`RasterGrid`].
///
/// # Errors
///
/// Returns an I/O error if the file is missing or unreadable,
/// [`RasterError::MissingGeoTransform`] without georeferencing tags and
/// [`RasterError::UnsupportedSampleFormat`] for planar or exotic layouts.
pub fn read_geotiff(path: impl AsRef<Path>) -> Result<RasterGrid> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let file = File::open(path).with_read_context("GeoTIFF", path)?;
    decode(BufReader::new(file), path)
}

fn decode<R: Read + Seek>(reader: R, path: &Path) -> Result<RasterGrid> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    if let Some(planar) = decoder.find_tag(Tag::PlanarConfiguration)?
        && planar.into_u16()? == 2
    {
        return Err(RasterError::UnsupportedSampleFormat("planar band layout".to_string()).into());
    }

    let keys = GeoKeys::read(&mut decoder)?;
    let mut transform = read_transform(&mut decoder)?.ok_or_else(|| RasterError::MissingGeoTransform {
        path: path.to_path_buf(),
    })?;
    if keys.pixel_is_point() {
        // tie points reference pixel centres
        (transform.origin_x, transform.origin_y) = transform.apply(-0.5, -0.5);
    }
    let crs = read_crs(&mut decoder, &keys)?;
    let nodata = read_nodata(&mut decoder)?;

    let (samples, sample_type) = match decoder.read_image()? {
        DecodingResult::U8(v) => (v.into_iter().map(f64::from).collect::<Vec<_>>(), SampleType::U8),
        DecodingResult::U16(v) => (v.into_iter().map(f64::from).collect(), SampleType::U16),
        DecodingResult::U32(v) => (v.into_iter().map(f64::from).collect(), SampleType::U32),
        DecodingResult::I8(v) => (v.into_iter().map(f64::from).collect(), SampleType::I8),
        DecodingResult::I16(v) => (v.into_iter().map(f64::from).collect(), SampleType::I16),
        DecodingResult::I32(v) => (v.into_iter().map(f64::from).collect(), SampleType::I32),
        DecodingResult::F32(v) => (v.into_iter().map(f64::from).collect(), SampleType::F32),
        DecodingResult::F64(v) => (v, SampleType::F64),
        _ => {
            return Err(
                RasterError::UnsupportedSampleFormat("64-bit integer samples".to_string()).into(),
            );
        },
    };

    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(RasterError::InvalidDimensions {
            bands: if pixels == 0 { 0 } else { samples.len() / pixels },
            width,
            height,
        }
        .into());
    }
    let bands = samples.len() / pixels;

    // interleaved (row, col, band) -> band-major
    let interleaved = Array3::from_shape_vec((height, width, bands), samples).map_err(|_| {
        RasterError::InvalidDimensions {
            bands,
            width,
            height,
        }
    })?;
    let data = interleaved
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned();

    debug!(
        "Read {}: {bands} band(s) {width}x{height} {sample_type}, CRS {}",
        path.display(),
        crs.as_ref().map_or_else(|| "none".to_string(), Crs::identifier)
    );
    RasterGrid::new(data, transform, crs, nodata, sample_type)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<GeoTransform>> {
    if let Some(matrix) = decoder.find_tag(geo_tag(MODEL_TRANSFORMATION))? {
        let m = matrix.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok(Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]])));
        }
    }

    let scale = decoder.find_tag(geo_tag(MODEL_PIXEL_SCALE))?;
    let tiepoint = decoder.find_tag(geo_tag(MODEL_TIEPOINT))?;
    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        return Ok(None);
    };
    let scale = scale.into_f64_vec()?;
    let tie = tiepoint.into_f64_vec()?;
    if scale.len() < 2 || tie.len() < 6 {
        return Ok(None);
    }
    // tiepoint [I, J, K, X, Y, Z] ties raster (I, J) to world (X, Y)
    let origin_x = tie[3] - tie[0] * scale[0];
    let origin_y = tie[4] + tie[1] * scale[1];
    Ok(Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1])))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>, keys: &GeoKeys) -> Result<Option<Crs>> {
    if let Some(code) = keys.epsg() {
        return Ok(Some(Crs::from_epsg(code)));
    }

    if let Some(ascii) = decoder.find_tag(geo_tag(GEO_ASCII_PARAMS))? {
        let text = ascii.into_string()?;
        if let Some(proj) = text
            .split('|')
            .map(str::trim)
            .find(|part| part.starts_with("+proj="))
        {
            return Ok(Some(Crs::from_proj(proj)));
        }
    }
    Ok(None)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    let Some(value) = decoder.find_tag(geo_tag(GDAL_NODATA))? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    Ok(match text.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        other => other.parse().ok(),
    })
}

/// Write a [`RasterGrid`] as a GeoTIFF, keeping band count and sample type.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be created, or a TIFF encoding error.
pub fn write_geotiff(grid: &RasterGrid, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_write_context("GeoTIFF", path)?;
    let mut writer = BufWriter::new(file);
    encode(grid, &mut writer)?;
    writer.flush().with_write_context("GeoTIFF", path)?;
    debug!(
        "Wrote {}: {} band(s) {}x{}",
        path.display(),
        grid.bands(),
        grid.width(),
        grid.height()
    );
    Ok(())
}

fn dimension(value: usize, grid: &RasterGrid) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        RasterError::InvalidDimensions {
            bands: grid.bands(),
            width: grid.width(),
            height: grid.height(),
        }
        .into()
    })
}

#[allow(clippy::cast_possible_truncation)]
fn sample_bytes(grid: &RasterGrid) -> Vec<u8> {
    let sample_type = grid.sample_type();
    let data = grid.data();
    let mut out = Vec::with_capacity(data.len() * usize::from(sample_type.bits() / 8));

    for row in 0..grid.height() {
        for col in 0..grid.width() {
            for band in 0..grid.bands() {
                let v = sample_type.clamp(data[[band, row, col]]);
                match sample_type {
                    SampleType::U8 => out.push(v as u8),
                    SampleType::U16 => out.extend_from_slice(&(v as u16).to_ne_bytes()),
                    SampleType::U32 => out.extend_from_slice(&(v as u32).to_ne_bytes()),
                    SampleType::I8 => out.extend_from_slice(&(v as i8).to_ne_bytes()),
                    SampleType::I16 => out.extend_from_slice(&(v as i16).to_ne_bytes()),
                    SampleType::I32 => out.extend_from_slice(&(v as i32).to_ne_bytes()),
                    SampleType::F32 => out.extend_from_slice(&(v as f32).to_ne_bytes()),
                    SampleType::F64 => out.extend_from_slice(&v.to_ne_bytes()),
                }
            }
        }
    }
    out
}

fn geo_keys(crs: Option<&Crs>) -> Vec<u16> {
    let epsg = crs.and_then(Crs::epsg).and_then(|c| u16::try_from(c).ok());
    let geographic = crs.and_then(Crs::is_geographic).unwrap_or(false);
    let proj = crs.and_then(Crs::proj);

    let mut entries: Vec<[u16; 4]> = vec![
        [
            GT_MODEL_TYPE_KEY,
            0,
            1,
            if geographic {
                MODEL_TYPE_GEOGRAPHIC
            } else {
                MODEL_TYPE_PROJECTED
            },
        ],
        [GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA],
    ];
    if epsg.is_none()
        && let Some(proj) = proj
    {
        let count = u16::try_from(proj.len() + 1).unwrap_or(u16::MAX);
        entries.push([GT_CITATION_KEY, GEO_ASCII_PARAMS, count, 0]);
    }
    if let Some(code) = epsg {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        entries.push([key, 0, 1, code]);
    }

    let count = u16::try_from(entries.len()).unwrap_or(u16::MAX);
    let mut keys = vec![1, 1, 0, count];
    keys.extend(entries.into_iter().flatten());
    keys
}

fn encode<W: Write + Seek>(grid: &RasterGrid, writer: W) -> Result<()> {
    let width = dimension(grid.width(), grid)?;
    let height = dimension(grid.height(), grid)?;
    let bands = grid.bands();
    let samples_per_pixel = u16::try_from(bands).map_err(|_| RasterError::InvalidDimensions {
        bands,
        width: grid.width(),
        height: grid.height(),
    })?;
    let sample_type = grid.sample_type();

    let mut encoder = TiffEncoder::new(writer)?;
    let mut dir = encoder.new_directory()?;

    dir.write_tag(Tag::ImageWidth, width)?;
    dir.write_tag(Tag::ImageLength, height)?;
    dir.write_tag(Tag::BitsPerSample, vec![sample_type.bits(); bands].as_slice())?;
    dir.write_tag(Tag::Compression, 1u16)?;
    dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
    dir.write_tag(Tag::SamplesPerPixel, samples_per_pixel)?;
    dir.write_tag(Tag::RowsPerStrip, height)?;
    dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
    dir.write_tag(
        Tag::SampleFormat,
        vec![sample_type.sample_format(); bands].as_slice(),
    )?;
    if bands > 1 {
        dir.write_tag(Tag::ExtraSamples, vec![0u16; bands - 1].as_slice())?;
    }

    let gt = grid.transform();
    if gt.is_north_up() {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        dir.write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])?;
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        dir.write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let matrix = [
            gt.pixel_width,
            gt.row_rotation,
            0.0,
            gt.origin_x,
            gt.col_rotation,
            gt.pixel_height,
            0.0,
            gt.origin_y,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ];
        dir.write_tag(geo_tag(MODEL_TRANSFORMATION), &matrix[..])?;
    }

    let crs = grid.crs();
    dir.write_tag(geo_tag(GEO_KEY_DIRECTORY), geo_keys(crs).as_slice())?;
    if let Some(proj) = crs.filter(|c| c.epsg().is_none()).and_then(Crs::proj) {
        dir.write_tag(geo_tag(GEO_ASCII_PARAMS), format!("{proj}|").as_str())?;
    }
    if let Some(nodata) = grid.nodata() {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            nodata.to_string()
        };
        dir.write_tag(geo_tag(GDAL_NODATA), text.as_str())?;
    }

    let bytes = sample_bytes(grid);
    let offset = dir.write_data(bytes.as_slice())?;
    let offset = u32::try_from(offset).map_err(|_| {
        RasterError::UnsupportedSampleFormat("raster too large for classic TIFF".to_string())
    })?;
    let byte_count = u32::try_from(bytes.len()).map_err(|_| {
        RasterError::UnsupportedSampleFormat("raster too large for classic TIFF".to_string())
    })?;
    dir.write_tag(Tag::StripOffsets, offset)?;
    dir.write_tag(Tag::StripByteCounts, byte_count)?;
    dir.finish()?;
    Ok(())
}
