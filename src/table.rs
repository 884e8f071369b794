//! A minimal columnar table of daily values keyed by cell identity and date.
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use itertools::Itertools;

/// Daily rows from one or more LandscapeDNDC files of the same type.
///
/// Every column has one value per row; `ids` and `dates` give the key of each
/// row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTable {
    ids: Vec<u64>,
    dates: Vec<NaiveDate>,
    columns: IndexMap<String, Vec<f64>>,
}

impl DailyTable {
    /// Create an empty table with the given data columns.
    pub fn with_columns<S: AsRef<str>>(names: &[S]) -> Self {
        let columns = names
            .iter()
            .map(|n| (n.as_ref().to_string(), vec![]))
            .collect();
        Self {
            ids: vec![],
            dates: vec![],
            columns,
        }
    }

    /// Add one row. `values` must be in the column order of the table.
    pub fn push_row(&mut self, id: u64, date: NaiveDate, values: &[f64]) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.ids.push(id);
        self.dates.push(date);
        for (col, &v) in self.columns.values_mut().zip(values) {
            col.push(v);
        }
    }

    /// Append all rows of `other`. Columns are matched by name; any column
    /// `other` lacks is filled with NaN.
    pub fn append(&mut self, other: DailyTable) {
        let n_other = other.len();
        let mut other_cols = other.columns;
        for (name, col) in self.columns.iter_mut() {
            match other_cols.swap_remove(name) {
                Some(vals) => col.extend(vals),
                None => col.extend(std::iter::repeat(f64::NAN).take(n_other)),
            }
        }
        self.ids.extend(other.ids);
        self.dates.extend(other.dates);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// The distinct years present, in ascending order.
    pub fn years(&self) -> Vec<i32> {
        self.dates.iter().map(|d| d.year()).sorted().dedup().collect()
    }

    /// Keep only the rows for which `keep(id, date)` is true.
    pub fn retain_rows<F: Fn(u64, NaiveDate) -> bool>(&mut self, keep: F) {
        let mask = self
            .ids
            .iter()
            .zip(self.dates.iter())
            .map(|(&id, &d)| keep(id, d))
            .collect_vec();
        self.apply_mask(&mask);
    }

    fn apply_mask(&mut self, mask: &[bool]) {
        fn filter<T: Copy>(v: &[T], mask: &[bool]) -> Vec<T> {
            v.iter().zip(mask).filter(|&(_, &m)| m).map(|(x, _)| *x).collect()
        }
        self.ids = filter(&self.ids, mask);
        self.dates = filter(&self.dates, mask);
        for col in self.columns.values_mut() {
            *col = filter(col, mask);
        }
    }

    /// Sort rows by identity, then date. The sort is stable, so rows with the
    /// same key keep their relative order.
    pub fn sort_by_identity_time(&mut self) {
        let order = (0..self.len())
            .sorted_by_key(|&i| (self.ids[i], self.dates[i]))
            .collect_vec();
        self.ids = order.iter().map(|&i| self.ids[i]).collect();
        self.dates = order.iter().map(|&i| self.dates[i]).collect();
        for col in self.columns.values_mut() {
            *col = order.iter().map(|&i| col[i]).collect();
        }
    }

    /// Iterate over rows as `(id, date, row index)`.
    pub fn keys(&self) -> impl Iterator<Item = (u64, NaiveDate, usize)> + '_ {
        self.ids
            .iter()
            .zip(self.dates.iter())
            .enumerate()
            .map(|(i, (&id, &d))| (id, d, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sort_and_filter() {
        let mut t = DailyTable::with_columns(&["a", "b"]);
        t.push_row(2, ymd(2001, 1, 1), &[1.0, 10.0]);
        t.push_row(1, ymd(2001, 1, 2), &[2.0, 20.0]);
        t.push_row(1, ymd(2000, 1, 1), &[3.0, 30.0]);

        t.sort_by_identity_time();
        assert_eq!(t.ids(), [1, 1, 2]);
        assert_eq!(t.column("a").unwrap(), [3.0, 2.0, 1.0]);
        assert_eq!(t.years(), [2000, 2001]);

        t.retain_rows(|_, d| d.year() == 2001);
        assert_eq!(t.ids(), [1, 2]);
        assert_eq!(t.column("b").unwrap(), [20.0, 10.0]);
    }

    #[test]
    fn test_append() {
        let mut t = DailyTable::with_columns(&["a", "b"]);
        t.push_row(1, ymd(2000, 1, 1), &[1.0, 2.0]);
        let mut u = DailyTable::with_columns(&["b"]);
        u.push_row(2, ymd(2000, 1, 1), &[5.0]);
        t.append(u);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("b").unwrap(), [2.0, 5.0]);
        assert!(t.column("a").unwrap()[1].is_nan());
    }
}
