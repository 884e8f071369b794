//! Mapping simulation cell identities onto the reference grid.
use std::collections::HashMap;

use log::warn;
use ndarray::Array2;

use crate::error::ReferenceGridError;

/// The reference grid: coordinate axes plus a (lat, lon) array of cell ids.
///
/// Cells that are not simulated hold a fill value, NaN, or a non-positive id.
#[derive(Debug, Clone)]
pub struct ReferenceGrid {
    lats: Vec<f64>,
    lons: Vec<f64>,
    cell_ids: Array2<f64>,
    fill_value: Option<f64>,
}

impl ReferenceGrid {
    pub fn new(
        lats: Vec<f64>,
        lons: Vec<f64>,
        cell_ids: Array2<f64>,
        fill_value: Option<f64>,
    ) -> Result<Self, ReferenceGridError> {
        if cell_ids.dim() != (lats.len(), lons.len()) {
            return Err(ReferenceGridError::ShapeMismatch {
                got: cell_ids.shape().to_vec(),
                nlat: lats.len(),
                nlon: lons.len(),
            });
        }
        Ok(Self {
            lats,
            lons,
            cell_ids,
            fill_value,
        })
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    pub fn cell_ids(&self) -> &Array2<f64> {
        &self.cell_ids
    }

    /// The identity in one cell, or `None` if nothing was simulated there.
    pub fn identity_at(&self, ilat: usize, ilon: usize) -> Option<u64> {
        let v = *self.cell_ids.get((ilat, ilon))?;
        if v.is_nan() || self.fill_value.is_some_and(|f| v == f) || v <= 0.0 {
            None
        } else {
            Some(v as u64)
        }
    }
}

/// The position of one simulated cell in the reference grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub ilat: usize,
    pub ilon: usize,
    pub lat: f64,
    pub lon: f64,
}

/// Identity to grid cell lookup, built once per run.
#[derive(Debug, Clone, Default)]
pub struct IdentityLookup {
    cells: HashMap<u64, GridCell>,
    duplicates: Vec<u64>,
}

impl IdentityLookup {
    /// Build the lookup from every valid cell of the reference grid.
    ///
    /// An identity that occurs in more than one cell keeps the last cell in
    /// (lat, lon) row-major order. Such identities are reported by
    /// [`IdentityLookup::duplicates`] and logged as a warning.
    pub fn from_reference_grid(grid: &ReferenceGrid) -> Self {
        let mut cells = HashMap::new();
        let mut duplicates = vec![];
        for (ilat, &lat) in grid.lats.iter().enumerate() {
            for (ilon, &lon) in grid.lons.iter().enumerate() {
                let Some(id) = grid.identity_at(ilat, ilon) else {
                    continue;
                };
                let cell = GridCell { ilat, ilon, lat, lon };
                if cells.insert(id, cell).is_some() {
                    duplicates.push(id);
                }
            }
        }

        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            duplicates.dedup();
            warn!(
                "{} cell id(s) occur more than once in the reference grid, the last occurrence was used: {:?}",
                duplicates.len(),
                duplicates
            );
        }

        Self { cells, duplicates }
    }

    /// The grid cell of an identity. An identity missing from the reference
    /// grid is an error.
    pub fn map(&self, id: u64) -> Result<GridCell, ReferenceGridError> {
        self.cells
            .get(&id)
            .copied()
            .ok_or(ReferenceGridError::UnknownIdentity(id))
    }

    pub fn duplicates(&self) -> &[u64] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
