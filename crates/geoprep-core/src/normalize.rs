//! Reference system normalization for geometry tables.

use log::info;

use crate::crs::{Crs, Transformer};
use crate::error::{CrsError, Result};
use crate::table::GeometryTable;

/// Outcome of [`normalize_crs`].
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The table was already in the target system
    Unchanged(GeometryTable),
    /// Every geometry was transformed into the target system
    Reprojected(GeometryTable),
}

impl Normalized {
    /// The resulting table, whichever branch produced it.
    #[must_use]
    pub fn into_table(self) -> GeometryTable {
        match self {
            Self::Unchanged(table) | Self::Reprojected(table) => table,
        }
    }

    /// Borrow the resulting table.
    #[must_use]
    pub fn table(&self) -> &GeometryTable {
        match self {
            Self::Unchanged(table) | Self::Reprojected(table) => table,
        }
    }

    /// Whether coordinates were transformed.
    #[must_use]
    pub fn was_reprojected(&self) -> bool {
        matches!(self, Self::Reprojected(_))
    }
}

/// Bring `table` into `target`, transforming only when the identifiers differ.
///
/// # Errors
///
/// Returns [`CrsError::Undefined`] if the table has no reference system, and
/// propagates definition or transform failures.
pub fn normalize_crs(table: GeometryTable, target: &Crs) -> Result<Normalized> {
    let Some(source) = table.crs() else {
        return Err(CrsError::Undefined {
            target: target.identifier(),
        }
        .into());
    };

    if source.is_equivalent(target) {
        info!("CRS already {target}; no reprojection needed");
        return Ok(Normalized::Unchanged(table));
    }

    info!("Reprojecting {} records from {source} to {target}", table.len());
    let transformer = Transformer::new(source, target)?;
    let reprojected =
        table.try_map_geometries(Some(target.clone()), |g| transformer.transform_geometry(g))?;
    Ok(Normalized::Reprojected(reprojected))
}
