//! Computing composite variables and merging the tables of all file types.
//!
//! Each file type produces exactly the variables declared for it: plain
//! variables are copied from their column, composite variables are the sum of
//! their source columns. Source columns that are not themselves declared are
//! loaded only to compute the sums and never reach the merged table.
//!
//! The per-file-type tables are then joined on (identity, date). A key missing
//! from one file type gets zeros for that file type's variables, matching the
//! "nothing happened on that day" meaning of LandscapeDNDC flux outputs.
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, warn};

use crate::{error::VariableSpecError, table::DailyTable, variable::VariableSpec};

/// The key every row is identified by.
pub type RowKey = (u64, NaiveDate);

/// The variables one file type must supply and the columns to load for them.
#[derive(Debug, Clone)]
pub struct FileTypePlan {
    file_type: String,
    variables: Vec<VariableSpec>,
}

impl FileTypePlan {
    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    /// The raw columns to read from each file of this type, without duplicates
    /// and in first-use order.
    pub fn datacols(&self) -> Vec<String> {
        self.variables
            .iter()
            .flat_map(|v| v.sources().iter().cloned())
            .unique()
            .collect()
    }

    /// The names of the columns this file type contributes to the merged table.
    pub fn output_columns(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.text()).collect()
    }
}

/// The resolved set of variables for a whole run.
#[derive(Debug, Clone)]
pub struct VariablePlan {
    file_types: Vec<FileTypePlan>,
}

impl VariablePlan {
    /// Resolve the declared variables of all file types.
    ///
    /// A composite variable declared more than once (in the same or different
    /// file types) is an error. An identical declaration repeated in another
    /// file type is taken from the first file type that declares it. Two
    /// different declarations sharing a name (e.g. `x[kg]` and `x[g]`) are an
    /// error, since both would become the output variable `x`.
    pub fn new(variables: &IndexMap<String, Vec<VariableSpec>>) -> Result<Self, VariableSpecError> {
        let mut composite_owner: HashMap<String, &str> = HashMap::new();
        for (file_type, vars) in variables {
            for v in vars.iter().filter(|v| v.is_composite()) {
                if let Some(first) = composite_owner.insert(v.name().to_string(), file_type) {
                    return Err(VariableSpecError::DuplicateCompositeTarget {
                        name: v.name().to_string(),
                        first: first.to_string(),
                        second: file_type.to_string(),
                    });
                }
            }
        }

        let mut name_owner: HashMap<&str, (&str, &VariableSpec)> = HashMap::new();
        let mut file_types = vec![];
        for (file_type, vars) in variables {
            let mut kept = vec![];
            for v in vars {
                if let Some(&(owner, first)) = name_owner.get(v.name()) {
                    if first != v {
                        return Err(VariableSpecError::ConflictingDeclarations {
                            name: v.name().to_string(),
                            first_type: owner.to_string(),
                            first: first.text_full(),
                            second_type: file_type.to_string(),
                            second: v.text_full(),
                        });
                    }
                    warn!(
                        "Variable {} is declared for both <{owner}> and <{file_type}>, using the values from <{owner}>",
                        v.text()
                    );
                    continue;
                }
                name_owner.insert(v.name(), (file_type.as_str(), v));
                kept.push(v.clone());
            }
            file_types.push(FileTypePlan {
                file_type: file_type.to_string(),
                variables: kept,
            });
        }

        Ok(Self { file_types })
    }

    pub fn file_types(&self) -> &[FileTypePlan] {
        &self.file_types
    }

    /// All output variables, in the column order of the merged table.
    pub fn variables(&self) -> impl Iterator<Item = &VariableSpec> {
        self.file_types.iter().flat_map(|ft| ft.variables.iter())
    }
}

/// Rows keyed by (identity, date), with one value per named column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedTable {
    columns: Vec<String>,
    rows: BTreeMap<RowKey, Vec<f64>>,
}

impl KeyedTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row, returning `true` if it replaced an existing one.
    pub fn insert(&mut self, key: RowKey, values: Vec<f64>) -> bool {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.insert(key, values).is_some()
    }

    pub fn get(&self, key: &RowKey) -> Option<&[f64]> {
        self.rows.get(key).map(|v| v.as_slice())
    }

    /// Rows in (identity, date) order.
    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &[f64])> {
        self.rows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// One column as a vector, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.values().map(|v| v[i]).collect())
    }

    pub fn identities(&self) -> Vec<u64> {
        self.rows.keys().map(|(id, _)| *id).unique().collect()
    }

    /// The distinct years present, in ascending order.
    pub fn years(&self) -> Vec<i32> {
        self.rows.keys().map(|(_, d)| d.year()).sorted().dedup().collect()
    }
}

/// Compute the declared variables of one file type from its loaded table.
///
/// Rows are keyed by (identity, date); if the same key occurs more than once
/// (e.g. two shards both simulated a cell) the last occurrence wins.
pub fn combine_file_type(plan: &FileTypePlan, table: &DailyTable) -> Result<KeyedTable, VariableSpecError> {
    let mut sources = Vec::with_capacity(plan.variables.len());
    for v in plan.variables.iter() {
        let cols = v
            .sources()
            .iter()
            .map(|s| {
                table.column(s).ok_or_else(|| VariableSpecError::UnresolvedSource {
                    target: v.text(),
                    source_col: s.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        sources.push(cols);
    }

    let mut out = KeyedTable::new(plan.output_columns());
    let mut n_duplicates = 0;
    for (id, date, irow) in table.keys() {
        let values = sources
            .iter()
            .map(|cols| cols.iter().map(|c| c[irow]).sum::<f64>())
            .collect_vec();
        if out.insert((id, date), values) {
            n_duplicates += 1;
        }
    }

    if n_duplicates > 0 {
        warn!(
            "{n_duplicates} duplicate (id, date) row(s) in file type <{}>, the last occurrence of each was kept",
            plan.file_type
        );
    }
    Ok(out)
}

/// Diagnostic for file types that do not cover the same (identity, date)
/// keys. Not an error: the missing combinations are zero-filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCountMismatch {
    pub counts: Vec<(String, usize)>,
}

impl Display for RowCountMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rows differ between file types: ")?;
        let parts = self.counts.iter().map(|(ft, n)| format!("<{ft}> = {n}"));
        write!(f, "{}", parts.format(", "))
    }
}

/// Join the tables of all file types on (identity, date).
///
/// `tables` pairs each file type name with its combined table. The merged
/// columns are the concatenation of the input columns, in input order.
pub fn merge_file_types(tables: Vec<(String, KeyedTable)>) -> (KeyedTable, Option<RowCountMismatch>) {
    let counts = tables.iter().map(|(ft, t)| (ft.clone(), t.len())).collect_vec();
    let mismatch = if counts.iter().map(|(_, n)| n).all_equal() {
        if let Some((_, n)) = counts.first() {
            debug!("All file types have the same number of rows (n={n})");
        }
        None
    } else {
        let mismatch = RowCountMismatch { counts };
        warn!("{mismatch}");
        Some(mismatch)
    };

    let columns = tables.iter().flat_map(|(_, t)| t.columns.iter().cloned()).collect_vec();
    let mut merged = KeyedTable::new(columns);

    let mut offset = 0;
    let ncol = merged.columns.len();
    for (_, table) in tables {
        let width = table.columns.len();
        for (key, values) in table.rows {
            let row = merged.rows.entry(key).or_insert_with(|| vec![0.0; ncol]);
            row[offset..offset + width].copy_from_slice(&values);
        }
        offset += width;
    }

    (merged, mismatch)
}
