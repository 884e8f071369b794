//! Dense (time, lat, lon) grids built from the merged table.
//!
//! Each grid covers whole calendar years and the full extent of the reference
//! grid. Positions without a contributing row stay at [`NODATA`]; this is
//! distinct from the zero fill applied when merging file types, which only
//! covers (identity, date) keys that at least one file type had.
use chrono::{Datelike, NaiveDate};
use error_stack::ResultExt;
use itertools::Itertools;
use log::debug;
use ndarray::{Array3, Axis};

use crate::{
    aggregate::KeyedTable,
    error::GridError,
    spatial::{IdentityLookup, ReferenceGrid},
    variable::VariableSpec,
};

/// No-data sentinel, written as both `_FillValue` and `missing_value`.
pub const NODATA: f64 = -9999.0;
/// Preferred chunk shape along (time, lat, lon).
pub const PREFERRED_CHUNKS: [usize; 3] = [10, 20, 40];
/// Deflate level for the variable data.
pub const DEFLATE_LEVEL: i32 = 5;
/// Units written for variables declared without a unit.
pub const UNKNOWN_UNITS: &str = "unknown";

/// Chunk shape for an array of the given shape: the preferred chunk size,
/// clipped to the extent of each axis.
pub fn chunk_sizes(shape: [usize; 3]) -> [usize; 3] {
    let mut chunks = PREFERRED_CHUNKS;
    for (c, &n) in chunks.iter_mut().zip(shape.iter()) {
        *c = (*c).min(n.max(1));
    }
    chunks
}

/// Every day of `year`, from January 1st to December 31st.
pub fn calendar_days(year: i32) -> Vec<NaiveDate> {
    NaiveDate::from_yo_opt(year, 1)
        .map(|start| start.iter_days().take_while(|d| d.year() == year).collect())
        .unwrap_or_default()
}

/// One output variable.
#[derive(Debug, Clone)]
pub struct GridVariable {
    /// The netCDF variable name (the declared name without its unit).
    pub name: String,
    pub units: String,
    pub data: Array3<f64>,
}

impl GridVariable {
    pub fn chunks(&self) -> [usize; 3] {
        let (nt, nlat, nlon) = self.data.dim();
        chunk_sizes([nt, nlat, nlon])
    }
}

/// All output variables for one time span.
#[derive(Debug, Clone)]
pub struct Grid {
    pub dates: Vec<NaiveDate>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub variables: Vec<GridVariable>,
}

impl Grid {
    /// The reference date of the time axis: January 1st of the first year.
    pub fn time_origin(&self) -> Option<NaiveDate> {
        let first = self.dates.first()?;
        NaiveDate::from_yo_opt(first.year(), 1)
    }

    /// CF units string for the time coordinate.
    pub fn time_units(&self) -> String {
        match self.time_origin() {
            Some(origin) => format!("days since {} 00:00:00", origin.format("%Y-%m-%d")),
            None => "days since 1970-01-01 00:00:00".to_string(),
        }
    }

    /// The time coordinate, in days since [`Grid::time_origin`].
    pub fn time_values(&self) -> Vec<i32> {
        let Some(origin) = self.time_origin() else {
            return vec![];
        };
        self.dates
            .iter()
            .map(|d| (*d - origin).num_days() as i32)
            .collect()
    }

    pub fn years(&self) -> Vec<i32> {
        self.dates.iter().map(|d| d.year()).dedup().collect()
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Concatenate grids along the time axis, in the order given.
    pub fn concat(grids: Vec<Grid>) -> Result<Grid, GridError> {
        let mut grids = grids.into_iter();
        let Some(mut out) = grids.next() else {
            return Err(GridError::NoGrids);
        };

        for grid in grids {
            if grid.lats != out.lats || grid.lons != out.lons {
                return Err(GridError::Inconsistent("lat/lon coordinates"));
            }
            if grid.variables.len() != out.variables.len()
                || grid.variables.iter().zip(out.variables.iter()).any(|(a, b)| a.name != b.name)
            {
                return Err(GridError::Inconsistent("variables"));
            }

            out.dates.extend(grid.dates);
            for (acc, var) in out.variables.iter_mut().zip(grid.variables) {
                acc.data = ndarray::concatenate(Axis(0), &[acc.data.view(), var.data.view()])
                    .map_err(|_| GridError::Inconsistent("array shapes"))?;
            }
        }

        Ok(out)
    }
}

/// Places merged rows onto the reference grid.
pub struct GridAssembler<'a> {
    reference: &'a ReferenceGrid,
    lookup: &'a IdentityLookup,
    variables: &'a [VariableSpec],
}

impl<'a> GridAssembler<'a> {
    /// `variables` are the declared variables, used to look up the netCDF
    /// name and units of each merged column.
    pub fn new(reference: &'a ReferenceGrid, lookup: &'a IdentityLookup, variables: &'a [VariableSpec]) -> Self {
        Self {
            reference,
            lookup,
            variables,
        }
    }

    fn name_and_units(&self, column: &str) -> (String, String) {
        if let Some(v) = self.variables.iter().find(|v| v.text() == column) {
            return (v.name().to_string(), v.unit().unwrap_or(UNKNOWN_UNITS).to_string());
        }
        match VariableSpec::decode(column) {
            Ok((name, unit)) => (name, unit.unwrap_or_else(|| UNKNOWN_UNITS.to_string())),
            Err(_) => (column.to_string(), UNKNOWN_UNITS.to_string()),
        }
    }

    /// Build the grid for one calendar year.
    pub fn assemble_year(&self, merged: &KeyedTable, year: i32) -> error_stack::Result<Grid, GridError> {
        let dates = calendar_days(year);
        let shape = (dates.len(), self.reference.lats().len(), self.reference.lons().len());

        let mut variables = merged
            .columns()
            .iter()
            .map(|col| {
                let (name, units) = self.name_and_units(col);
                GridVariable {
                    name,
                    units,
                    data: Array3::from_elem(shape, NODATA),
                }
            })
            .collect_vec();

        let mut n_placed = 0;
        for (&(id, date), values) in merged.rows().filter(|((_, d), _)| d.year() == year) {
            let cell = self
                .lookup
                .map(id)
                .change_context(GridError::Placement)
                .attach_printable_lazy(|| format!("row for date {date}"))?;
            let itime = date.ordinal0() as usize;
            for (var, &v) in variables.iter_mut().zip(values) {
                var.data[[itime, cell.ilat, cell.ilon]] = v;
            }
            n_placed += 1;
        }
        debug!("Placed {n_placed} rows on the {year} grid");

        Ok(Grid {
            dates,
            lats: self.reference.lats().to_vec(),
            lons: self.reference.lons().to_vec(),
            variables,
        })
    }

    /// Build one grid per year present in the merged table, in year order.
    pub fn assemble_years(&self, merged: &KeyedTable) -> error_stack::Result<Vec<Grid>, GridError> {
        merged
            .years()
            .into_iter()
            .map(|year| self.assemble_year(merged, year))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case([365, 100, 200], [10, 20, 40])]
    #[case([366, 2, 3], [10, 2, 3])]
    #[case([5, 0, 50], [5, 1, 40])]
    fn test_chunk_sizes(#[case] shape: [usize; 3], #[case] expected: [usize; 3]) {
        assert_eq!(chunk_sizes(shape), expected);
    }

    #[rstest]
    #[case(2000, 366)]
    #[case(2001, 365)]
    #[case(1900, 365)]
    fn test_calendar_days(#[case] year: i32, #[case] ndays: usize) {
        let days = calendar_days(year);
        assert_eq!(days.len(), ndays);
        assert_eq!(days[0], ymd(year, 1, 1));
        assert_eq!(days[ndays - 1], ymd(year, 12, 31));
    }

    fn reference() -> ReferenceGrid {
        ReferenceGrid::new(
            vec![50.0, 50.5],
            vec![8.0, 8.5, 9.0],
            array![[1.0, -9999.0, -9999.0], [-9999.0, -9999.0, 2.0]],
            Some(-9999.0),
        )
        .unwrap()
    }

    fn merged() -> KeyedTable {
        let mut t = KeyedTable::new(vec!["dN_n2o_emis[kgNha-1]".to_string(), "water".to_string()]);
        t.insert((1, ymd(2000, 1, 2)), vec![0.5, 10.0]);
        t.insert((2, ymd(2000, 1, 2)), vec![1.5, 20.0]);
        t.insert((2, ymd(2001, 12, 31)), vec![2.5, 30.0]);
        t
    }

    #[test]
    fn test_placement() {
        let reference = reference();
        let lookup = IdentityLookup::from_reference_grid(&reference);
        let vars = vec!["dN_n2o_emis[kgNha-1]".parse::<VariableSpec>().unwrap()];
        let assembler = GridAssembler::new(&reference, &lookup, &vars);

        let grid = assembler.assemble_year(&merged(), 2000).unwrap();
        assert_eq!(grid.dates.len(), 366);

        let n2o = grid.variable("dN_n2o_emis").unwrap();
        assert_eq!(n2o.units, "kgNha-1");
        assert_eq!(n2o.data.dim(), (366, 2, 3));
        assert_eq!(n2o.data[[1, 0, 0]], 0.5);
        assert_eq!(n2o.data[[1, 1, 2]], 1.5);
        let n_set = n2o.data.iter().filter(|&&v| v != NODATA).count();
        assert_eq!(n_set, 2);
        assert!(n2o.data.index_axis(Axis(0), 0).iter().all(|&v| v == NODATA));

        let water = grid.variable("water").unwrap();
        assert_eq!(water.units, UNKNOWN_UNITS);
        assert_eq!(water.data[[1, 1, 2]], 20.0);
        assert_eq!(water.chunks(), [10, 2, 3]);
    }

    #[test]
    fn test_assemble_and_concat() {
        let reference = reference();
        let lookup = IdentityLookup::from_reference_grid(&reference);
        let assembler = GridAssembler::new(&reference, &lookup, &[]);

        let grids = assembler.assemble_years(&merged()).unwrap();
        assert_eq!(grids.iter().map(|g| g.years()).collect_vec(), [vec![2000], vec![2001]]);

        let all = Grid::concat(grids).unwrap();
        assert_eq!(all.dates.len(), 366 + 365);
        assert_eq!(all.time_units(), "days since 2000-01-01 00:00:00");
        let time = all.time_values();
        assert_eq!(time[0], 0);
        assert_eq!(time[730], 730);

        let n2o = all.variable("dN_n2o_emis").unwrap();
        assert_eq!(n2o.data.dim(), (731, 2, 3));
        assert_eq!(n2o.data[[730, 1, 2]], 2.5);
    }

    #[test]
    fn test_unknown_identity() {
        let reference = reference();
        let lookup = IdentityLookup::from_reference_grid(&reference);
        let assembler = GridAssembler::new(&reference, &lookup, &[]);
        let mut t = KeyedTable::new(vec!["a".to_string()]);
        t.insert((7, ymd(2000, 1, 1)), vec![1.0]);
        let err = assembler.assemble_year(&t, 2000).unwrap_err();
        assert!(matches!(err.current_context(), GridError::Placement));
    }

    #[test]
    fn test_concat_empty() {
        assert!(matches!(Grid::concat(vec![]), Err(GridError::NoGrids)));
    }
}
