//! Reader for LandscapeDNDC daily text output (e.g. `soilchemistry-daily.txt`).
//!
//! These are tab separated tables with a single header line. The header
//! always has an `id` column naming the simulated cell and usually a
//! `datetime` column; older outputs instead have `year` and `julianday`.
//! Data columns are named in the `name[unit]` convention.
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};

use crate::{error::LoadError, table::DailyTable, utils::FileBuf};

pub const ID_COLUMN: &str = "id";
pub const DATETIME_COLUMN: &str = "datetime";
pub const YEAR_COLUMN: &str = "year";
pub const JULIANDAY_COLUMN: &str = "julianday";

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Tab,
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeColumns {
    Datetime(usize),
    YearDay { year: usize, day: usize },
}

/// Where the base and data columns are in one file.
#[derive(Debug)]
struct ColumnLayout {
    delimiter: Delimiter,
    ncol: usize,
    id: usize,
    time: TimeColumns,
    data: Vec<usize>,
}

impl ColumnLayout {
    fn from_header<S: AsRef<str>>(header: &str, datacols: &[S], path: &Path) -> Result<Self, LoadError> {
        let delimiter = if header.contains('\t') {
            Delimiter::Tab
        } else {
            Delimiter::Whitespace
        };
        let names: Vec<&str> = split_line(header, delimiter);
        let find = |name: &str| names.iter().position(|&n| n == name);

        let id = find(ID_COLUMN).ok_or_else(|| LoadError::MissingColumns {
            path: path.to_path_buf(),
            columns: vec![ID_COLUMN.to_string()],
        })?;

        let time = if let Some(i) = find(DATETIME_COLUMN) {
            TimeColumns::Datetime(i)
        } else if let (Some(year), Some(day)) = (find(YEAR_COLUMN), find(JULIANDAY_COLUMN)) {
            TimeColumns::YearDay { year, day }
        } else {
            return Err(LoadError::NoTimeColumn(path.to_path_buf()));
        };

        let mut data = vec![];
        let mut missing = vec![];
        for col in datacols {
            match find(col.as_ref()) {
                Some(i) => data.push(i),
                None => missing.push(col.as_ref().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            });
        }

        Ok(Self {
            delimiter,
            ncol: names.len(),
            id,
            time,
            data,
        })
    }

    /// Split a data line into fields. Returns `None` if the line does not have
    /// one field per header column.
    fn fields<'a>(&self, line: &'a str) -> Option<Vec<std::borrow::Cow<'a, str>>> {
        let mut fields: Vec<std::borrow::Cow<str>> = split_line(line, self.delimiter)
            .into_iter()
            .map(std::borrow::Cow::Borrowed)
            .collect();

        // Whitespace separated files split "YYYY-MM-DD HH:MM:SS" in two
        if let (Delimiter::Whitespace, TimeColumns::Datetime(i)) = (self.delimiter, self.time) {
            if fields.len() == self.ncol + 1 && fields.get(i + 1).is_some_and(|f| f.contains(':')) {
                let time = fields.remove(i + 1);
                fields[i] = std::borrow::Cow::Owned(format!("{} {}", fields[i], time));
            }
        }

        if fields.len() == self.ncol {
            Some(fields)
        } else {
            None
        }
    }
}

fn split_line(line: &str, delimiter: Delimiter) -> Vec<&str> {
    let line = line.trim_end_matches(['\n', '\r']);
    match delimiter {
        Delimiter::Tab => line.split('\t').map(|s| s.trim()).collect(),
        Delimiter::Whitespace => line.split_whitespace().collect(),
    }
}

/// Parse the `datetime` column. Accepts a date with or without a time of day.
pub fn parse_datetime(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_id(s: &str) -> Option<u64> {
    s.parse::<u64>().ok().or_else(|| {
        let v = s.parse::<f64>().ok()?;
        (v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64).then_some(v as u64)
    })
}

fn parse_year_day(year: &str, day: &str) -> Option<NaiveDate> {
    let year = year.parse::<i32>().ok()?;
    let day = parse_id(day)?;
    NaiveDate::from_yo_opt(year, u32::try_from(day).ok()?)
}

/// Read one LandscapeDNDC text table, keeping only the identity, the date and
/// the data columns named in `datacols` (in that order).
///
/// Data lines with the wrong number of fields are skipped with a warning.
/// Any field that does not parse is an error.
pub fn read_ldndc_file<S: AsRef<str>>(path: &Path, datacols: &[S]) -> Result<DailyTable, LoadError> {
    let mut f = FileBuf::open(path)?;
    let header = f.read_header_line()?;
    if header.trim().is_empty() {
        return Err(LoadError::EmptyFile(path.to_path_buf()));
    }

    let layout = ColumnLayout::from_header(&header, datacols, path)?;
    let mut table = DailyTable::with_columns(datacols);
    let mut values = vec![0.0; datacols.len()];
    let mut n_skipped = 0;

    let bad_value = |line: usize, column: &str, value: &str| LoadError::BadValue {
        path: path.to_path_buf(),
        line,
        column: column.to_string(),
        value: value.to_string(),
    };

    let mut line_num = 1;
    loop {
        let line = f.read_data_line()?;
        if line.is_empty() {
            break;
        }
        line_num += 1;
        if line.trim().is_empty() {
            continue;
        }

        let Some(fields) = layout.fields(&line) else {
            debug!("Skipping malformed line {line_num} in {}", path.display());
            n_skipped += 1;
            continue;
        };

        let id_str: &str = &fields[layout.id];
        let id = parse_id(id_str).ok_or_else(|| bad_value(line_num, ID_COLUMN, id_str))?;

        let date = match layout.time {
            TimeColumns::Datetime(i) => {
                parse_datetime(&fields[i]).ok_or_else(|| bad_value(line_num, DATETIME_COLUMN, &fields[i]))?
            }
            TimeColumns::YearDay { year, day } => parse_year_day(&fields[year], &fields[day]).ok_or_else(|| {
                bad_value(line_num, JULIANDAY_COLUMN, &format!("{} {}", fields[year], fields[day]))
            })?,
        };

        for ((v, &icol), name) in values.iter_mut().zip(layout.data.iter()).zip(datacols) {
            let s: &str = &fields[icol];
            *v = s.parse::<f64>().map_err(|_| bad_value(line_num, name.as_ref(), s))?;
        }

        table.push_row(id, date, &values);
    }

    if n_skipped > 0 {
        warn!("{n_skipped} malformed line(s) skipped in {}", path.display());
    }
    debug!(
        "Read {} rows from {}{}",
        table.len(),
        path.display(),
        if f.is_compressed() { " (gzip)" } else { "" }
    );
    Ok(table)
}
