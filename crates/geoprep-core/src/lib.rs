//! `geoprep-core` is the library behind the `geoprep` CLI: small, stateless
//! helpers for preparing geospatial data.
//!
//! This crate includes:
//! - **Driver Registry**: supported formats, their extensions and capabilities.
//! - **Geometry tables**: shapefile/GeoJSON loading ([`vector`]) and point
//!   geocoding of CSV/spreadsheet files ([`tabular`]), with Arrow and GeoJSON export.
//! - **CRS handling**: reference system parsing and table normalization ([`crs`], [`normalize`]).
//! - **Rasters**: GeoTIFF I/O, nearest-neighbour reprojection and polygon cropping
//!   ([`raster`]), batched by the harmonizer in [`operations`].
//! - **Previews**: PNG rendering with a point-of-interest marker ([`viewer`]).
//!
//! Every operation takes its inputs explicitly and returns a new value or
//! writes new files; nothing is cached between calls.

pub mod crs;
pub mod drivers;
pub mod error;
pub mod normalize;
pub mod operations;
pub mod raster;
pub mod table;
pub mod tabular;
pub mod types;
pub mod utils;
pub mod vector;
pub mod viewer;

pub use crs::{Crs, Transformer};
pub use error::{GeoPrepError, Result};
pub use normalize::{Normalized, normalize_crs};
pub use operations::{
    FailurePolicy, HarmonizeOptions, HarmonizeReport, RasterOutcome, harmonize_rasters,
};
pub use table::{AttributeValue, GeoJsonWriterOptions, GeometryTable, Record};
pub use tabular::{TabularOptions, geocode, geocode_with_options};
pub use vector::load_vector;
pub use viewer::{BrowseOutcome, PointOfInterest, ViewOptions, ViewSummary, browse, render_view};
