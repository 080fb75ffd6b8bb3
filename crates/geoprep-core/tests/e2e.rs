use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use geo_types::{Geometry, polygon};
use geoprep_core::crs::Crs;
use geoprep_core::normalize::{Normalized, normalize_crs};
use geoprep_core::operations::{FailurePolicy, HarmonizeOptions, harmonize_rasters};
use geoprep_core::raster::{GeoTransform, RasterGrid, SampleType, read_geotiff, write_geotiff};
use geoprep_core::table::{AttributeValue, GeoJsonWriterOptions, GeometryTable, Record};
use geoprep_core::tabular::geocode;
use geoprep_core::vector::load_vector;
use geoprep_core::viewer::{BrowseOutcome, PointOfInterest, ViewOptions, browse, render_view};
use ndarray::Array3;
use shapefile::dbase::{FieldName, FieldValue, TableWriterBuilder};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const NAD83_WKT: &str = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// Three square counties written as a shapefile with a `.prj`.
fn write_counties(dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join("counties.shp");
    let builder = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("name")?, 32)
        .add_numeric_field(FieldName::try_from("pop")?, 10, 0);
    {
        let mut writer = shapefile::Writer::from_path(&path, builder)?;
        for (i, name) in ["Hennepin", "Ramsey", "Dakota"].iter().enumerate() {
            let x = -93.0 + i as f64 * 0.02;
            let ring = vec![
                shapefile::Point::new(x, 44.95),
                shapefile::Point::new(x, 44.99),
                shapefile::Point::new(x + 0.015, 44.99),
                shapefile::Point::new(x + 0.015, 44.95),
                shapefile::Point::new(x, 44.95),
            ];
            let shape = shapefile::Polygon::new(shapefile::PolygonRing::Outer(ring));
            let mut record = shapefile::dbase::Record::default();
            record.insert("name".to_string(), FieldValue::Character(Some((*name).to_string())));
            record.insert("pop".to_string(), FieldValue::Numeric(Some(1000.0 * (i + 1) as f64)));
            writer.write_shape_and_record(&shape, &record)?;
        }
    }
    fs::write(dir.join("counties.prj"), NAD83_WKT)?;
    Ok(path)
}

/// 100x100 Web Mercator raster of 100 m pixels with its top-left corner near (-93, 45).
fn write_mercator_raster(path: &Path) -> geoprep_core::Result<()> {
    let data = Array3::from_shape_fn((1, 100, 100), |(_, r, c)| (r + c) as f64);
    let grid = RasterGrid::new(
        data,
        GeoTransform::new(-10_352_712.0, 5_621_521.0, 100.0, -100.0),
        Some(Crs::web_mercator()),
        Some(0.0),
        SampleType::U16,
    )?;
    write_geotiff(&grid, path)
}

fn boundary() -> GeometryTable {
    let mut table = GeometryTable::new(vec!["name".to_string()], Some(Crs::nad83()));
    table
        .push(Record::new(
            vec![AttributeValue::String("study area".to_string())],
            Some(Geometry::Polygon(polygon![
                (x: -92.98, y: 44.95),
                (x: -92.93, y: 44.95),
                (x: -92.93, y: 44.99),
                (x: -92.98, y: 44.99),
            ])),
        ))
        .expect("arity matches");
    table
}

#[test]
fn test_load_shapefile() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_counties(dir.path())?;

    let table = load_vector(&path)?;
    assert_eq!(table.len(), 3);
    assert_eq!(table.columns(), &["name", "pop"]);
    assert_eq!(table.crs(), Some(&Crs::nad83()));
    assert_eq!(table.geometry_types(), vec!["Polygon"]);
    assert_eq!(table.summary().columns, 3);
    assert_eq!(
        table.value(1, "name"),
        Some(&AttributeValue::String("Ramsey".to_string()))
    );
    assert_eq!(table.value(2, "pop"), Some(&AttributeValue::Int(3000)));
    Ok(())
}

#[test]
fn test_geocode_latin1_csv_and_write_geojson() -> TestResult {
    let dir = TempDir::new()?;
    let csv = dir.path().join("sites.csv");
    fs::write(
        &csv,
        b"name,lon,lat\nCaf\xe9 du Nord,-93.25,44.95\nMus\xe9e,-93.1,44.9\n",
    )?;

    let table = geocode(&csv, "lon", "lat")?;
    assert_eq!(table.len(), 2);
    assert_eq!(table.crs(), Some(&Crs::nad83()));
    assert_eq!(
        table.value(0, "name"),
        Some(&AttributeValue::String("Café du Nord".to_string()))
    );
    let Some(Geometry::Point(p)) = &table.records()[1].geometry else {
        panic!("expected a point");
    };
    assert_eq!((p.x(), p.y()), (-93.1, 44.9));

    let out = dir.path().join("sites.geojson");
    table.write_geojson(&out, &GeoJsonWriterOptions::new())?;
    let reloaded = load_vector(&out)?;
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.geometry_types(), vec!["Point"]);
    Ok(())
}

#[test]
fn test_normalize_shapefile() -> TestResult {
    let dir = TempDir::new()?;
    let table = load_vector(write_counties(dir.path())?)?;

    let same = normalize_crs(table.clone(), &Crs::nad83())?;
    assert!(!same.was_reprojected());
    assert_eq!(same.table(), &table);

    let mercator = normalize_crs(table, &Crs::web_mercator())?;
    let Normalized::Reprojected(projected) = mercator else {
        panic!("expected reprojection");
    };
    assert_eq!(projected.crs(), Some(&Crs::web_mercator()));
    let again = normalize_crs(projected.clone(), &Crs::web_mercator())?;
    assert_eq!(again.into_table(), projected);
    Ok(())
}

#[test]
fn test_harmonize_reprojects_and_crops() -> TestResult {
    let dir = TempDir::new()?;
    let raster = dir.path().join("elevation.tif");
    write_mercator_raster(&raster)?;
    let out = dir.path().join("out");

    let report = harmonize_rasters(&[&raster], &boundary(), &out, &HarmonizeOptions::new())?;
    assert_eq!(report.succeeded(), 1);

    let done = report.outcomes[0].result.as_ref().map_err(|e| e.to_string())?;
    assert_eq!(done.reprojected, Some(out.join("reprojected_elevation.tif")));
    assert_eq!(done.cropped, out.join("cropped_reprojected_elevation.tif"));
    assert!(raster.exists());

    let cropped = read_geotiff(&done.cropped)?;
    assert_eq!(cropped.crs(), Some(&Crs::nad83()));
    assert_eq!(cropped.sample_type(), SampleType::U16);

    let (min_x, min_y, max_x, max_y) = cropped.bounds();
    let (px, py) = cropped.transform().pixel_size();
    assert!(min_x >= -92.98 - px && max_x <= -92.93 + px, "x {min_x}..{max_x}");
    assert!(min_y >= 44.95 - py && max_y <= 44.99 + py, "y {min_y}..{max_y}");
    assert!(cropped.data().iter().any(|&v| v > 0.0));
    Ok(())
}

#[test]
fn test_harmonize_same_crs_skips_reprojection() -> TestResult {
    let dir = TempDir::new()?;
    let raster = dir.path().join("merc.tif");
    write_mercator_raster(&raster)?;
    let out = dir.path().join("out");

    let options = HarmonizeOptions::new()
        .with_target_crs(Crs::web_mercator())
        .with_failure_policy(FailurePolicy::Continue);
    let report = harmonize_rasters(&[&raster], &boundary(), &out, &options)?;
    assert_eq!(report.failed(), 0);
    assert!(!out.join("reprojected_merc.tif").exists());
    assert!(out.join("cropped_merc.tif").exists());
    Ok(())
}

#[test]
fn test_harmonize_empty_list() -> TestResult {
    let dir = TempDir::new()?;
    let out = dir.path().join("untouched");
    let none: [PathBuf; 0] = [];
    let boundary = GeometryTable::new(vec![], None);
    let report = harmonize_rasters(&none, &boundary, &out, &HarmonizeOptions::new())?;
    assert!(report.is_empty());
    assert!(!out.exists());
    Ok(())
}

#[test]
fn test_view_and_browse() -> TestResult {
    let dir = TempDir::new()?;
    let rasters = dir.path().join("rasters");
    fs::create_dir(&rasters)?;

    let csv = dir.path().join("poi.csv");
    fs::write(&csv, "label,x,y\nTower,-92.95,44.97\n")?;
    let poi = PointOfInterest::from_table(&geocode(&csv, "x", "y")?, Some("label"))?;
    assert_eq!(poi.label, "Tower");

    let preview = dir.path().join("preview.png");
    assert_eq!(
        browse(&rasters, "merc.tif", &poi, &preview, &ViewOptions::new())?,
        BrowseOutcome::Empty
    );
    assert!(!preview.exists());

    write_mercator_raster(&rasters.join("merc.tif"))?;
    let BrowseOutcome::Rendered(summary) =
        browse(&rasters, "merc.tif", &poi, &preview, &ViewOptions::new())?
    else {
        panic!("expected a rendered preview");
    };
    assert!(preview.exists());
    assert_eq!(summary.label, "Tower");
    assert!(summary.marker_pixel.is_some());

    let direct = render_view(&rasters.join("merc.tif"), &poi, &preview, &ViewOptions::new())?;
    assert_eq!(direct.marker_pixel, summary.marker_pixel);
    Ok(())
}
