//! Coordinate reference systems and coordinate transformation.
//!
//! A [`Crs`] is identified by an EPSG code, a PROJ string or WKT. Projection
//! definitions come from the `crs-definitions` database and transformations are
//! carried out in pure Rust by `proj4rs`.

use std::fmt;
use std::str::FromStr;

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::{CrsError, Result};

/// Default reference system: NAD83 geographic.
pub const DEFAULT_EPSG: u32 = 4269;

const WKT_DISPLAY_CHARS: usize = 50;

/// Coordinate reference system representation.
///
/// Equality follows [`Crs::identifier`], so a `.prj` WKT that resolves to an
/// EPSG code equals the bare code.
#[derive(Debug, Clone)]
pub struct Crs {
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
    /// WKT representation
    wkt: Option<String>,
}

impl Crs {
    /// Create a CRS from an EPSG code
    #[must_use]
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            proj: None,
            wkt: None,
        }
    }

    /// Create a CRS from a PROJ string
    #[must_use]
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            epsg: None,
            proj: Some(proj.into()),
            wkt: None,
        }
    }

    /// Create a CRS from WKT, resolving the EPSG code when possible.
    ///
    /// The code is taken from the outermost `AUTHORITY["EPSG", ...]` clause or,
    /// for ESRI `.prj` files which carry none, from the coordinate system name.
    #[must_use]
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let epsg = epsg_from_authority(&wkt).or_else(|| epsg_from_esri_name(&wkt));
        Self {
            epsg,
            proj: None,
            wkt: Some(wkt),
        }
    }

    /// NAD83 geographic (EPSG:4269)
    #[must_use]
    pub fn nad83() -> Self {
        Self::from_epsg(DEFAULT_EPSG)
    }

    /// WGS84 geographic (EPSG:4326)
    #[must_use]
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Web Mercator (EPSG:3857)
    #[must_use]
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// Get EPSG code if known
    #[must_use]
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get PROJ string
    #[must_use]
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Get WKT representation
    #[must_use]
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Canonical string identifier, used to decide whether two systems match.
    ///
    /// WKT without a resolvable EPSG code is kept whole with runs of
    /// whitespace collapsed.
    #[must_use]
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{code}");
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.split_whitespace().collect::<Vec<_>>().join(" "));
        }
        "Unknown".to_string()
    }

    /// Check if two CRS share the same identifier
    #[must_use]
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        self.identifier() == other.identifier()
    }

    /// PROJ definition used for transformation, if one is known.
    #[must_use]
    pub fn proj_definition(&self) -> Option<String> {
        if let Some(proj) = &self.proj {
            return Some(proj.clone());
        }
        self.epsg
            .and_then(|code| u16::try_from(code).ok())
            .and_then(crs_definitions::from_code)
            .map(|def| def.proj4.to_string())
    }

    /// Whether coordinates are longitude/latitude degrees.
    ///
    /// Returns `None` when no projection definition is known.
    #[must_use]
    pub fn is_geographic(&self) -> Option<bool> {
        self.proj_definition().map(|def| is_longlat(&def))
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.is_equivalent(other)
    }
}

impl fmt::Display for Crs {
    /// The identifier, with long WKT shortened to its first 50 characters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identifier = self.identifier();
        match identifier.char_indices().nth(WKT_DISPLAY_CHARS + 4) {
            Some((end, _)) if identifier.starts_with("WKT:") => {
                write!(f, "{}...", &identifier[..end])
            },
            _ => write!(f, "{identifier}"),
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::nad83()
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    /// Parses `EPSG:4269`, `epsg:3857`, a bare code, a PROJ string or WKT.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parse_code = |code: &str| {
            code.trim().parse::<u32>().map_err(|_| CrsError::Parse {
                input: s.to_string(),
                reason: format!("'{}' is not a valid EPSG code", code.trim()),
            })
        };

        if trimmed.starts_with('+') {
            return Ok(Self::from_proj(trimmed));
        }
        if let Some((authority, code)) = trimmed.split_once(':')
            && authority.eq_ignore_ascii_case("epsg")
        {
            return parse_code(code).map(Self::from_epsg);
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
            return parse_code(trimmed).map(Self::from_epsg);
        }
        let upper = trimmed.to_ascii_uppercase();
        if ["GEOGCS[", "PROJCS[", "GEOGCRS[", "PROJCRS["]
            .iter()
            .any(|prefix| upper.starts_with(prefix))
        {
            return Ok(Self::from_wkt(trimmed));
        }
        Err(CrsError::Parse {
            input: s.to_string(),
            reason: "expected EPSG:<code>, a PROJ string or WKT".to_string(),
        })
    }
}

fn is_longlat(definition: &str) -> bool {
    definition.contains("+proj=longlat") || definition.contains("+proj=latlong")
}

fn epsg_from_authority(wkt: &str) -> Option<u32> {
    let upper = wkt.to_ascii_uppercase();
    let start = upper.rfind("AUTHORITY[\"EPSG\"")?;
    wkt[start..]
        .split('"')
        .nth(3)
        .and_then(|code| code.trim().parse().ok())
}

/// Name inside the first `PROJCS["..."` or, failing that, `GEOGCS["..."`.
fn wkt_root_name(wkt: &str) -> Option<&str> {
    let upper = wkt.to_ascii_uppercase();
    let start = upper.find("PROJCS[\"").or_else(|| upper.find("GEOGCS[\""))?;
    wkt[start..].split('"').nth(1)
}

fn epsg_from_esri_name(wkt: &str) -> Option<u32> {
    let name = wkt_root_name(wkt)?;
    match name {
        "GCS_North_American_1983" => return Some(4269),
        "GCS_WGS_1984" => return Some(4326),
        "GCS_North_American_1927" => return Some(4267),
        "WGS_1984_Web_Mercator_Auxiliary_Sphere" | "WGS_1984_Web_Mercator" => return Some(3857),
        _ => {},
    }

    let utm = |prefix: &str| -> Option<(u32, char)> {
        let zone = name.strip_prefix(prefix)?;
        let hemisphere = zone.chars().last()?;
        let number = zone.strip_suffix(hemisphere)?.parse::<u32>().ok()?;
        (1..=60).contains(&number).then_some((number, hemisphere))
    };
    match utm("NAD_1983_UTM_Zone_") {
        Some((zone, 'N')) => return Some(26900 + zone),
        Some(_) => return None,
        None => {},
    }
    match utm("WGS_1984_UTM_Zone_") {
        Some((zone, 'N')) => Some(32600 + zone),
        Some((zone, 'S')) => Some(32700 + zone),
        _ => None,
    }
}

/// Transforms coordinates between two reference systems.
///
/// Projection objects are built once and reused for every coordinate.
pub struct Transformer {
    source_id: String,
    target_id: String,
    projections: Option<Projections>,
}

struct Projections {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

impl Transformer {
    /// Build a transformer from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::UnknownDefinition`] if either system has no known
    /// PROJ definition, or [`CrsError::InvalidDefinition`] if `proj4rs` rejects it.
    pub fn new(source: &Crs, target: &Crs) -> Result<Self> {
        let source_id = source.identifier();
        let target_id = target.identifier();
        if source_id == target_id {
            return Ok(Self {
                source_id,
                target_id,
                projections: None,
            });
        }

        let (source_proj, source_def) = build_proj(source)?;
        let (target_proj, target_def) = build_proj(target)?;
        Ok(Self {
            source_id,
            target_id,
            projections: Some(Projections {
                source: source_proj,
                target: target_proj,
                source_geographic: is_longlat(&source_def),
                target_geographic: is_longlat(&target_def),
            }),
        })
    }

    /// Whether source and target are the same system.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.projections.is_none()
    }

    /// Transform a single coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::Transform`] if the projection fails or yields a
    /// non-finite coordinate.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some(p) = &self.projections else {
            return Ok((x, y));
        };

        // proj4rs uses radians for geographic coordinates
        let mut point = if p.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&p.source, &p.target, &mut point).map_err(|e| self.fault(x, y, format!("{e:?}")))?;

        let (out_x, out_y) = if p.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if out_x.is_finite() && out_y.is_finite() {
            Ok((out_x, out_y))
        } else {
            Err(self.fault(x, y, "non-finite result".to_string()))
        }
    }

    /// Transform every coordinate of a geometry.
    ///
    /// # Errors
    ///
    /// Returns the first coordinate transform failure.
    pub fn transform_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        if self.is_identity() {
            return Ok(geometry.clone());
        }
        geometry.try_map_coords(|coord| {
            let (x, y) = self.transform(coord.x, coord.y)?;
            Ok(Coord { x, y })
        })
    }

    fn fault(&self, x: f64, y: f64, message: String) -> crate::error::GeoPrepError {
        CrsError::Transform {
            source_crs: self.source_id.clone(),
            target_crs: self.target_id.clone(),
            x,
            y,
            message,
        }
        .into()
    }
}

fn build_proj(crs: &Crs) -> Result<(Proj, String)> {
    let identifier = crs.identifier();
    let definition = crs
        .proj_definition()
        .ok_or_else(|| CrsError::UnknownDefinition {
            identifier: identifier.clone(),
        })?;
    let proj = Proj::from_proj_string(&definition).map_err(|e| CrsError::InvalidDefinition {
        identifier,
        message: format!("{e:?}"),
    })?;
    Ok((proj, definition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Point, point};

    const EPS: f64 = 1e-6;

    #[test]
    fn test_crs_epsg_identifier() {
        let crs = Crs::from_epsg(4269);
        assert_eq!(crs.epsg(), Some(4269));
        assert_eq!(crs.identifier(), "EPSG:4269");
        assert_eq!(Crs::default(), crs);
    }

    #[test]
    fn test_parse_crs_strings() {
        assert_eq!("EPSG:3857".parse::<Crs>().unwrap(), Crs::web_mercator());
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::wgs84());
        assert_eq!("4269".parse::<Crs>().unwrap(), Crs::nad83());
        assert_eq!(
            "+proj=longlat +datum=WGS84".parse::<Crs>().unwrap().proj(),
            Some("+proj=longlat +datum=WGS84")
        );
        assert!("EPSG:abc".parse::<Crs>().is_err());
        assert!("nonsense".parse::<Crs>().is_err());
    }

    #[test]
    fn test_wkt_authority_resolves_epsg() {
        let wkt = r#"GEOGCS["NAD83",DATUM["North_American_Datum_1983",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6269"]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4269"]]"#;
        assert_eq!(Crs::from_wkt(wkt).epsg(), Some(4269));
    }

    #[test]
    fn test_esri_prj_names_resolve_epsg() {
        let nad83 = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(Crs::from_wkt(nad83).epsg(), Some(4269));

        let utm = r#"PROJCS["NAD_1983_UTM_Zone_15N",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]]]]"#;
        assert_eq!(Crs::from_wkt(utm).epsg(), Some(26915));

        let south = r#"PROJCS["WGS_1984_UTM_Zone_33S",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(Crs::from_wkt(south).epsg(), Some(32733));

        let custom = r#"PROJCS["Custom_Lambert",GEOGCS["GCS_Foo"]]"#;
        let crs = Crs::from_wkt(custom);
        assert_eq!(crs.epsg(), None);
        assert!(crs.identifier().starts_with("WKT:PROJCS"));
    }

    #[test]
    fn test_distinct_wkt_with_shared_prefix() {
        let feet = r#"PROJCS["NAD_1983_StatePlane_Minnesota_South_FIPS_2203_Feet",GEOGCS["GCS_North_American_1983"],UNIT["Foot_US",0.3048006096012192]]"#;
        let metres = r#"PROJCS["NAD_1983_StatePlane_Minnesota_South_FIPS_2203",GEOGCS["GCS_North_American_1983"],UNIT["Meter",1.0]]"#;
        let (feet, metres) = (Crs::from_wkt(feet), Crs::from_wkt(metres));
        assert!(!feet.is_equivalent(&metres));
        assert_ne!(feet, metres);

        let spaced = Crs::from_wkt(r#"PROJCS["Custom",  GEOGCS["GCS_Foo"]]"#);
        assert_eq!(spaced, Crs::from_wkt("PROJCS[\"Custom\",\nGEOGCS[\"GCS_Foo\"]]"));

        let shown = metres.to_string();
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), "WKT:".len() + 50 + 3);
    }

    #[test]
    fn test_prj_wkt_equals_epsg_code() {
        let prj = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(Crs::from_wkt(prj), Crs::nad83());
        assert_ne!(Crs::from_wkt(prj), Crs::wgs84());
    }

    #[test]
    fn test_multibyte_zone_name_does_not_panic() {
        let wkt = r#"PROJCS["WGS_1984_UTM_Zone_1é",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(Crs::from_wkt(wkt).epsg(), None);
    }

    #[test]
    fn test_is_geographic() {
        assert_eq!(Crs::nad83().is_geographic(), Some(true));
        assert_eq!(Crs::web_mercator().is_geographic(), Some(false));
        assert_eq!(Crs::from_wkt("PROJCS[\"Nope\"]").is_geographic(), None);
    }

    #[test]
    fn test_identity_transform() {
        let t = Transformer::new(&Crs::nad83(), &Crs::nad83()).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(-93.0, 45.0).unwrap(), (-93.0, 45.0));
    }

    #[test]
    fn test_mercator_roundtrip() {
        let forward = Transformer::new(&Crs::wgs84(), &Crs::web_mercator()).unwrap();
        let back = Transformer::new(&Crs::web_mercator(), &Crs::wgs84()).unwrap();

        let (x, y) = forward.transform(0.0, 0.0).unwrap();
        assert!(x.abs() < EPS && y.abs() < EPS);

        let (x, y) = forward.transform(-122.4, 37.8).unwrap();
        assert!(x < -13_000_000.0 && y > 4_000_000.0);
        let (lon, lat) = back.transform(x, y).unwrap();
        assert!((lon + 122.4).abs() < EPS, "lon {lon}");
        assert!((lat - 37.8).abs() < EPS, "lat {lat}");
    }

    #[test]
    fn test_transform_geometry_keeps_shape() {
        let t = Transformer::new(&Crs::nad83(), &Crs::web_mercator()).unwrap();
        let geometry = Geometry::Point(point!(x: 10.0, y: 0.0));
        let Geometry::Point(p) = t.transform_geometry(&geometry).unwrap() else {
            panic!("expected a point");
        };
        let expected: Point<f64> = point!(x: 1_113_194.907_932_735_7, y: 0.0);
        assert!((p.x() - expected.x()).abs() < 1.0, "x {}", p.x());
        assert!(p.y().abs() < 1e-3);
    }

    #[test]
    fn test_unknown_definition() {
        let result = Transformer::new(&Crs::from_wkt("PROJCS[\"Nope\"]"), &Crs::nad83());
        assert!(matches!(
            result,
            Err(crate::error::GeoPrepError::Crs(CrsError::UnknownDefinition { .. }))
        ));
    }
}
