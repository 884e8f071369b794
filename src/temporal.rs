//! Restricting loaded tables to the requested years.
use std::{fmt::Display, str::FromStr};

use chrono::Datelike;
use itertools::Itertools;

use crate::{error::YearRangeError, table::DailyTable};

/// The years to convert.
///
/// A strictly increasing sequence of consecutive years is stored as an
/// inclusive range; anything else is stored as an explicit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearSelection {
    Range { first: i32, last: i32 },
    Set(Vec<i32>),
}

impl YearSelection {
    /// Build a selection from a list of years. Duplicates are removed and the
    /// years sorted before deciding between a range and a set.
    pub fn new(years: &[i32]) -> Result<Self, YearRangeError> {
        let years = years.iter().copied().sorted().dedup().collect_vec();
        let range = match years.as_slice() {
            [] => return Err(YearRangeError::EmptySelection),
            [first, .., last] if i64::from(*last) - i64::from(*first) == years.len() as i64 - 1 => {
                Some((*first, *last))
            }
            _ => None,
        };

        match range {
            Some((first, last)) => Ok(Self::Range { first, last }),
            None => Ok(Self::Set(years)),
        }
    }

    pub fn range(first: i32, last: i32) -> Result<Self, YearRangeError> {
        if last < first {
            return Err(YearRangeError::InvalidSelection(format!("{first}-{last}")));
        }
        Self::new(&(first..=last).collect_vec())
    }

    pub fn contains(&self, year: i32) -> bool {
        match self {
            Self::Range { first, last } => *first <= year && year <= *last,
            Self::Set(years) => years.binary_search(&year).is_ok(),
        }
    }

    pub fn first(&self) -> i32 {
        match self {
            Self::Range { first, .. } => *first,
            // Set is never empty
            Self::Set(years) => years.first().copied().unwrap_or_default(),
        }
    }

    pub fn last(&self) -> i32 {
        match self {
            Self::Range { last, .. } => *last,
            Self::Set(years) => years.last().copied().unwrap_or_default(),
        }
    }

    pub fn years(&self) -> Vec<i32> {
        match self {
            Self::Range { first, last } => (*first..=*last).collect(),
            Self::Set(years) => years.clone(),
        }
    }

    fn is_single_year(&self) -> bool {
        matches!(self, Self::Set(years) if years.len() == 1)
    }

    fn not_in_data(&self) -> YearRangeError {
        if self.is_single_year() {
            YearRangeError::YearNotInData(self.first())
        } else {
            YearRangeError::RangeNotInData(self.first(), self.last())
        }
    }
}

impl FromStr for YearSelection {
    type Err = YearRangeError;

    /// Parse `2000`, `2000-2005`, `2000,2002,2005` or a comma separated mix
    /// such as `2000-2002,2005`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || YearRangeError::InvalidSelection(s.to_string());
        let mut years = vec![];
        for part in s.split(',').map(str::trim) {
            if let Some((a, b)) = part.split_once('-') {
                let first: i32 = a.trim().parse().map_err(|_| invalid())?;
                let last: i32 = b.trim().parse().map_err(|_| invalid())?;
                if last < first {
                    return Err(invalid());
                }
                years.extend(first..=last);
            } else {
                years.push(part.parse().map_err(|_| invalid())?);
            }
        }
        Self::new(&years)
    }
}

impl Display for YearSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range { first, last } => write!(f, "{first}-{last}"),
            Self::Set(years) => write!(f, "{}", years.iter().join(",")),
        }
    }
}

/// Keep only the rows of `table` in the selected years, then sort by identity
/// and date. An empty result is an error.
pub fn limit_to_years(mut table: DailyTable, years: &YearSelection) -> Result<DailyTable, YearRangeError> {
    match years {
        YearSelection::Range { first, last } => {
            let (first, last) = (*first, *last);
            table.retain_rows(|_, d| first <= d.year() && d.year() <= last);
        }
        YearSelection::Set(_) => table.retain_rows(|_, d| years.contains(d.year())),
    }

    if table.is_empty() {
        return Err(years.not_in_data());
    }

    table.sort_by_identity_time();
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    #[rstest]
    #[case("2000", YearSelection::Set(vec![2000]))]
    #[case("2000-2003", YearSelection::Range { first: 2000, last: 2003 })]
    #[case("2000,2001,2002", YearSelection::Range { first: 2000, last: 2002 })]
    #[case("2002,2000", YearSelection::Set(vec![2000, 2002]))]
    #[case("2000-2001,2005", YearSelection::Set(vec![2000, 2001, 2005]))]
    fn test_parse_years(#[case] s: &str, #[case] expected: YearSelection) {
        assert_eq!(s.parse::<YearSelection>().unwrap(), expected);
    }

    #[test]
    fn test_extreme_years() {
        assert_eq!(
            YearSelection::new(&[i32::MIN, 0]).unwrap(),
            YearSelection::Set(vec![i32::MIN, 0])
        );
        assert_eq!(
            YearSelection::new(&[i32::MAX - 1, i32::MAX]).unwrap(),
            YearSelection::Range { first: i32::MAX - 1, last: i32::MAX }
        );
    }

    #[rstest]
    #[case("")]
    #[case("two thousand")]
    #[case("2005-2000")]
    #[case("2000,,2001")]
    fn test_parse_bad_years(#[case] s: &str) {
        assert!(s.parse::<YearSelection>().is_err());
    }

    fn table() -> DailyTable {
        let mut t = DailyTable::with_columns(&["a"]);
        for (id, y) in [(2, 2001), (1, 2001), (1, 2000), (2, 2003)] {
            t.push_row(id, NaiveDate::from_ymd_opt(y, 6, 1).unwrap(), &[y as f64]);
        }
        t
    }

    #[test]
    fn test_limit_to_years_range() {
        let sel = YearSelection::range(2000, 2001).unwrap();
        let t = limit_to_years(table(), &sel).unwrap();
        assert_eq!(t.ids(), [1, 1, 2]);
        assert_eq!(t.column("a").unwrap(), [2000.0, 2001.0, 2001.0]);
    }

    #[test]
    fn test_limit_to_years_set() {
        let sel = YearSelection::new(&[2000, 2003]).unwrap();
        let t = limit_to_years(table(), &sel).unwrap();
        assert_eq!(t.years(), [2000, 2003]);
    }

    #[test]
    fn test_year_not_in_data() {
        let sel: YearSelection = "1999".parse().unwrap();
        let err = limit_to_years(table(), &sel).unwrap_err();
        assert!(matches!(err, YearRangeError::YearNotInData(1999)));
        assert_eq!(err.to_string(), "Year 1999 not in data");

        let sel: YearSelection = "1990-1995".parse().unwrap();
        let err = limit_to_years(table(), &sel).unwrap_err();
        assert!(matches!(err, YearRangeError::RangeNotInData(1990, 1995)));
    }
}
