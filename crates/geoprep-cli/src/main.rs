//! Command-line interface for `GeoPrep`, a set of geospatial data-wrangling helpers.
//!
//! This binary is a thin façade over the [`geoprep_core`] library: it parses
//! arguments, configures logging and delegates each subcommand to one library
//! operation.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! Library log records (emitted through the `log` facade) are bridged into `tracing`.
//!
//! # Available Commands
//!
//! - `drivers` - List all available format drivers and their capabilities
//! - `info` - Display dataset or raster metadata
//! - `geocode` - Build point geometries from a CSV/spreadsheet
//! - `normalize` - Reproject a vector or tabular dataset to a target CRS
//! - `harmonize` - Reproject and crop GeoTIFFs to a boundary polygon
//! - `view` - Render a raster preview with a point-of-interest marker
//! - `browse` - List rasters in a directory and preview one of them

mod display;

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geoprep_core::crs::Crs;
use geoprep_core::drivers::{DriverKind, find_driver_for_path, get_available_drivers};
use geoprep_core::error::GeoPrepError;
use geoprep_core::normalize::{Normalized, normalize_crs};
use geoprep_core::operations::{
    DatasetDescription, FailurePolicy, HarmonizeOptions, describe_dataset, harmonize_rasters,
};
use geoprep_core::table::{GeoJsonWriterOptions, GeometryTable};
use geoprep_core::tabular::{TabularOptions, geocode_with_options};
use geoprep_core::vector::load_vector;
use geoprep_core::viewer::{
    BrowseOutcome, PointOfInterest, ViewOptions, browse, list_rasters, render_view,
};

use crate::display::{
    display_catalog, display_dataset_info, display_drivers, display_harmonize_report,
    display_raster_info, display_table_summary,
};

#[derive(Parser)]
#[command(
    name = "geoprep",
    version,
    about = "Geospatial data-wrangling helpers in Rust",
    long_about = "GeoPrep loads shapefiles and lat/lon tables into geometry tables, normalizes\n\
                  coordinate reference systems, reprojects and crops GeoTIFFs to a boundary\n\
                  polygon and renders raster previews with a point-of-interest marker."
)]
/// Command-line arguments and options for the `GeoPrep` CLI.
///
/// This struct defines the top-level CLI interface, including global flags for
/// logging verbosity and the subcommand to execute.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Coordinate columns and sheet selection for tabular inputs.
#[derive(Args, Debug, Clone, Default)]
struct TabularArgs {
    /// Longitude (x) column of a CSV/spreadsheet input.
    #[arg(long, value_name = "COLUMN", requires = "lat")]
    lon: Option<String>,

    /// Latitude (y) column of a CSV/spreadsheet input.
    #[arg(long, value_name = "COLUMN", requires = "lon")]
    lat: Option<String>,

    /// Worksheet to read from a spreadsheet (first sheet by default).
    #[arg(long, value_name = "NAME")]
    sheet: Option<String>,

    /// CSV field delimiter.
    #[arg(long, value_name = "CHAR", default_value_t = ',')]
    delimiter: char,
}

/// Available subcommands for the `GeoPrep` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Lists all available drivers and their capabilities.
    Drivers,

    /// Displays information about a vector, tabular or raster dataset.
    ///
    /// Tabular datasets need `--lon` and `--lat` to build their geometry column.
    Info {
        /// Path to the input dataset.
        #[arg(value_name = "DATASET")]
        input: PathBuf,

        #[command(flatten)]
        tabular: TabularArgs,
    },

    /// Builds point geometries from the longitude/latitude columns of a CSV or spreadsheet.
    Geocode {
        /// Path to the CSV or spreadsheet file.
        #[arg(value_name = "DATASET")]
        input: PathBuf,

        #[command(flatten)]
        tabular: TabularArgs,

        /// Reference system assigned to the points.
        #[arg(long, value_name = "CRS", default_value = "EPSG:4269")]
        crs: Crs,

        /// Write the points as `GeoJSON` to this path.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Pretty-print the `GeoJSON` output.
        #[arg(long)]
        pretty: bool,
    },

    /// Reprojects a dataset to a target reference system if it differs.
    Normalize {
        /// Path to the vector or tabular dataset.
        #[arg(value_name = "DATASET")]
        input: PathBuf,

        #[command(flatten)]
        tabular: TabularArgs,

        /// Target reference system.
        #[arg(long, value_name = "CRS", default_value = "EPSG:4269")]
        target_crs: Crs,

        /// Write the result as `GeoJSON` to this path.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Pretty-print the `GeoJSON` output.
        #[arg(long)]
        pretty: bool,
    },

    /// Reprojects GeoTIFFs to a target CRS when needed and crops them to a boundary polygon.
    Harmonize {
        /// GeoTIFF files to process, in order.
        #[arg(value_name = "RASTER")]
        rasters: Vec<PathBuf>,

        /// Vector dataset whose first polygon is the cropping boundary.
        #[arg(short, long, value_name = "DATASET")]
        boundary: PathBuf,

        /// Directory receiving `reprojected_*` and `cropped_*` outputs.
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Target reference system.
        #[arg(long, value_name = "CRS", default_value = "EPSG:4269")]
        target_crs: Crs,

        /// Keep processing remaining rasters after a failure.
        #[arg(long)]
        keep_going: bool,
    },

    /// Renders a raster band to PNG with a point-of-interest marker.
    View {
        /// GeoTIFF to render.
        #[arg(value_name = "RASTER")]
        raster: PathBuf,

        #[command(flatten)]
        poi: PoiArgs,

        /// Output PNG path.
        #[arg(short, long, value_name = "FILE", default_value = "preview.png")]
        output: PathBuf,
    },

    /// Lists GeoTIFFs in a directory, or previews the one named by `--select`.
    Browse {
        /// Directory to scan for `.tif` files.
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// File name of the raster to preview.
        #[arg(long, value_name = "NAME", requires = "poi")]
        select: Option<String>,

        #[command(flatten)]
        poi: PoiArgs,

        /// Output PNG path.
        #[arg(short, long, value_name = "FILE", default_value = "preview.png")]
        output: PathBuf,
    },
}

/// Where the point of interest comes from and how it is drawn.
#[derive(Args, Debug, Clone)]
struct PoiArgs {
    /// Dataset whose first record is the point of interest.
    #[arg(long, value_name = "DATASET")]
    poi: Option<PathBuf>,

    /// Column holding the marker label.
    #[arg(long, value_name = "COLUMN")]
    label_column: Option<String>,

    #[command(flatten)]
    tabular: TabularArgs,

    /// 1-based band to render.
    #[arg(long, default_value_t = 1)]
    band: usize,

    /// Marker radius in pixels.
    #[arg(long, default_value_t = 3)]
    marker_radius: u32,
}

impl PoiArgs {
    fn view_options(&self) -> ViewOptions {
        ViewOptions::new()
            .with_band(self.band)
            .with_marker_radius(self.marker_radius)
    }

    fn point_of_interest(&self) -> Result<PointOfInterest> {
        let path = self
            .poi
            .as_ref()
            .ok_or_else(|| anyhow!("--poi <DATASET> is required"))?;
        let table = load_table(path, &self.tabular, None)?;
        PointOfInterest::from_table(&table, self.label_column.as_deref()).map_err(user_error)
    }
}

/// Entry point for the `GeoPrep` command-line interface.
///
/// This function parses command-line arguments, configures the logging system based on
/// verbosity flags, and dispatches to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Drivers => handle_drivers(),
        Commands::Info { input, tabular } => {
            info!("Displaying info for {}", input.display());
            handle_info(&input, &tabular)
        },
        Commands::Geocode {
            input,
            tabular,
            crs,
            output,
            pretty,
        } => handle_geocode(&input, &tabular, crs, output.as_ref(), pretty),
        Commands::Normalize {
            input,
            tabular,
            target_crs,
            output,
            pretty,
        } => handle_normalize(&input, &tabular, &target_crs, output.as_ref(), pretty),
        Commands::Harmonize {
            rasters,
            boundary,
            output_dir,
            target_crs,
            keep_going,
        } => handle_harmonize(&rasters, &boundary, &output_dir, target_crs, keep_going),
        Commands::View { raster, poi, output } => handle_view(&raster, &poi, &output),
        Commands::Browse {
            dir,
            select,
            poi,
            output,
        } => handle_browse(&dir, select.as_deref(), &poi, &output),
    }
}

/// Convert a library error into a CLI error carrying its recovery hint.
fn user_error(e: GeoPrepError) -> anyhow::Error {
    match e.recovery_suggestion() {
        Some(hint) => anyhow!("{}\nHint: {hint}", e.user_message()),
        None => anyhow!(e.user_message()),
    }
}

fn tabular_options(args: &TabularArgs, crs: Option<Crs>) -> Result<TabularOptions> {
    let delimiter = Some(args.delimiter)
        .filter(char::is_ascii)
        .and_then(|c| u8::try_from(c).ok())
        .ok_or_else(|| anyhow!("Delimiter '{}' must be a single ASCII character", args.delimiter))?;
    let mut options = TabularOptions::new().with_delimiter(delimiter);
    if let Some(sheet) = &args.sheet {
        options = options.with_sheet_name(sheet);
    }
    if let Some(crs) = crs {
        options = options.with_crs(crs);
    }
    Ok(options)
}

/// Load a vector dataset, or geocode a tabular one with `--lon`/`--lat`.
fn load_table(path: &Path, args: &TabularArgs, crs: Option<Crs>) -> Result<GeometryTable> {
    let kind = find_driver_for_path(path).map(|d| d.kind);
    if kind == Some(DriverKind::Tabular) {
        let (Some(lon), Some(lat)) = (&args.lon, &args.lat) else {
            bail!(
                "{} is tabular; pass --lon and --lat to name its coordinate columns",
                path.display()
            );
        };
        let options = tabular_options(args, crs)?;
        return geocode_with_options(path, lon, lat, &options).map_err(user_error);
    }
    load_vector(path).map_err(user_error)
}

fn write_output(table: &GeometryTable, output: Option<&PathBuf>, pretty: bool) -> Result<()> {
    if let Some(output) = output {
        let options = GeoJsonWriterOptions::new().with_pretty_print(pretty);
        table.write_geojson(output, &options).map_err(user_error)?;
        info!("Wrote {}", output.display());
    }
    Ok(())
}

/// Handles the `drivers` subcommand by displaying a formatted table of available drivers.
#[allow(clippy::unnecessary_wraps)]
fn handle_drivers() -> Result<()> {
    display_drivers(&get_available_drivers());
    Ok(())
}

fn handle_info(input: &Path, tabular: &TabularArgs) -> Result<()> {
    let coordinates = tabular.lon.as_deref().zip(tabular.lat.as_deref());
    match describe_dataset(input, coordinates).map_err(user_error)? {
        DatasetDescription::Table(info) => display_dataset_info(&info),
        DatasetDescription::Raster(info) => display_raster_info(&info),
    }
    Ok(())
}

fn handle_geocode(
    input: &Path,
    tabular: &TabularArgs,
    crs: Crs,
    output: Option<&PathBuf>,
    pretty: bool,
) -> Result<()> {
    let (Some(lon), Some(lat)) = (&tabular.lon, &tabular.lat) else {
        bail!("geocode needs --lon and --lat");
    };
    let options = tabular_options(tabular, Some(crs))?;
    let table = geocode_with_options(input, lon, lat, &options).map_err(user_error)?;
    write_output(&table, output, pretty)?;
    let crs = table.crs().map(Crs::identifier);
    display_table_summary(&table.summary(), crs.as_deref(), output);
    Ok(())
}

fn handle_normalize(
    input: &Path,
    tabular: &TabularArgs,
    target: &Crs,
    output: Option<&PathBuf>,
    pretty: bool,
) -> Result<()> {
    let table = load_table(input, tabular, None)?;
    let normalized = normalize_crs(table, target).map_err(user_error)?;
    match &normalized {
        Normalized::Unchanged(_) => println!("{} is already in {target}", input.display()),
        Normalized::Reprojected(_) => println!("Reprojected {} to {target}", input.display()),
    }
    let table = normalized.into_table();
    write_output(&table, output, pretty)?;
    let crs = table.crs().map(Crs::identifier);
    display_table_summary(&table.summary(), crs.as_deref(), output);
    Ok(())
}

fn handle_harmonize(
    rasters: &[PathBuf],
    boundary: &Path,
    output_dir: &Path,
    target: Crs,
    keep_going: bool,
) -> Result<()> {
    let boundary = load_vector(boundary).map_err(user_error)?;
    let policy = if keep_going {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };
    let options = HarmonizeOptions::new()
        .with_target_crs(target)
        .with_failure_policy(policy);

    let report = harmonize_rasters(rasters, &boundary, output_dir, &options).map_err(user_error)?;
    display_harmonize_report(&report);
    if report.failed() > 0 {
        bail!("{} raster(s) failed", report.failed());
    }
    Ok(())
}

fn handle_view(raster: &Path, poi: &PoiArgs, output: &Path) -> Result<()> {
    let point = poi.point_of_interest()?;
    let summary = render_view(raster, &point, output, &poi.view_options()).map_err(user_error)?;
    print_view(&summary.label, summary.marker_pixel, &summary.output);
    Ok(())
}

fn handle_browse(dir: &Path, select: Option<&str>, poi: &PoiArgs, output: &Path) -> Result<()> {
    let Some(selection) = select else {
        let catalog = list_rasters(dir).map_err(user_error)?;
        if catalog.is_empty() {
            println!("No rasters found in {}", dir.display());
        } else {
            display_catalog(&catalog);
        }
        return Ok(());
    };

    let point = poi.point_of_interest()?;
    match browse(dir, selection, &point, output, &poi.view_options()).map_err(user_error)? {
        BrowseOutcome::Empty => println!("No rasters found in {}", dir.display()),
        BrowseOutcome::UnknownSelection {
            selection,
            available,
        } => bail!(
            "'{selection}' is not a raster in {}. Available: {}",
            dir.display(),
            available.join(", ")
        ),
        BrowseOutcome::Rendered(summary) => {
            print_view(&summary.label, summary.marker_pixel, &summary.output);
        },
    }
    Ok(())
}

fn print_view(label: &str, marker: Option<(u32, u32)>, output: &Path) {
    match marker {
        Some((col, row)) => println!("{label} marked at pixel ({col}, {row})"),
        None => println!("{label} lies outside the raster"),
    }
    println!("Wrote {}", output.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_harmonize() {
        let cli = Cli::try_parse_from([
            "geoprep",
            "harmonize",
            "a.tif",
            "b.tif",
            "--boundary",
            "county.shp",
            "--output-dir",
            "out",
            "--target-crs",
            "epsg:3857",
            "--keep-going",
        ])
        .unwrap();
        let Commands::Harmonize {
            rasters,
            target_crs,
            keep_going,
            ..
        } = cli.command
        else {
            panic!("expected harmonize");
        };
        assert_eq!(rasters.len(), 2);
        assert_eq!(target_crs, Crs::web_mercator());
        assert!(keep_going);
    }

    #[test]
    fn test_cli_rejects_bad_crs() {
        assert!(
            Cli::try_parse_from(["geoprep", "normalize", "a.shp", "--target-crs", "EPSG:abc"])
                .is_err()
        );
    }

    #[test]
    fn test_lon_requires_lat() {
        assert!(Cli::try_parse_from(["geoprep", "geocode", "a.csv", "--lon", "x"]).is_err());
    }

    #[test]
    fn test_tabular_options_delimiter() {
        let args = TabularArgs {
            delimiter: ';',
            ..TabularArgs::default()
        };
        assert_eq!(tabular_options(&args, None).unwrap().delimiter, b';');

        for delimiter in ['é', '\u{00ff}', '→'] {
            let args = TabularArgs {
                delimiter,
                ..TabularArgs::default()
            };
            assert!(tabular_options(&args, None).is_err(), "{delimiter:?}");
        }
    }

    #[test]
    fn test_load_table_tabular_needs_columns() {
        let err = load_table(Path::new("points.csv"), &TabularArgs::default(), None).unwrap_err();
        assert!(err.to_string().contains("--lon and --lat"));
    }

    #[test]
    fn test_user_error_includes_hint() {
        let err = user_error(GeoPrepError::Raster(
            geoprep_core::error::RasterError::NoOverlap {
                path: PathBuf::from("a.tif"),
            },
        ));
        assert!(err.to_string().contains("Hint:"));
    }
}
