//! Finding the LandscapeDNDC output files of one file type.
//!
//! LandscapeDNDC runs that are split into several parallel jobs write one file
//! per job and output type, e.g. `GLOBAL_002_soilchemistry-daily.txt`. The
//! number in the file name is the "file iterator", which is tracked so that the
//! set of cells each shard simulated can be reported.
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use error_stack::ResultExt;
use itertools::Itertools;
use log::debug;
use regex::Regex;

use crate::error::{InputNotFoundError, LoadError};

/// Return all files in `indir` whose name ends with `file_type` or
/// `file_type` + `.gz`, sorted by path.
///
/// If `limiter` is given, only files whose name contains that substring are
/// kept. An empty selection is an error.
pub fn select_files(
    indir: &Path,
    file_type: &str,
    limiter: Option<&str>,
) -> error_stack::Result<Vec<PathBuf>, InputNotFoundError> {
    if !indir.is_dir() {
        return Err(InputNotFoundError::NotADirectory(indir.to_path_buf()).into());
    }

    let dir_pattern = glob::Pattern::escape(&indir.to_string_lossy());
    let type_pattern = glob::Pattern::escape(file_type);

    let mut infiles = vec![];
    for suffix in ["", ".gz"] {
        let pattern = format!("{dir_pattern}/*{type_pattern}{suffix}");
        let paths = glob::glob(&pattern)
            .map_err(|e| InputNotFoundError::Glob(e.to_string()))
            .attach_printable_lazy(|| format!("pattern was: {pattern}"))?;
        for entry in paths {
            let p = entry.map_err(|e| InputNotFoundError::Glob(e.to_string()))?;
            if p.is_file() {
                infiles.push(p);
            }
        }
    }

    if let Some(limiter) = limiter.filter(|l| !l.is_empty()) {
        infiles.retain(|p| file_name(p).contains(limiter));
    }

    infiles.sort();
    infiles.dedup();

    if infiles.is_empty() {
        return Err(InputNotFoundError::NoMatchingFiles {
            file_type: file_type.to_string(),
            indir: indir.to_path_buf(),
            limiter: limiter.map(|l| l.to_string()),
        }
        .into());
    }

    debug!("Found {} file(s) of type <{file_type}> in {}", infiles.len(), indir.display());
    Ok(infiles)
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Extract the file iterator from a file name, e.g. `GLOBAL_002_soilchemistry-daily.txt` -> 2.
///
/// Each run of two or more digits in the file name is a candidate; runs longer
/// than six digits contribute their last six. No candidate gives 0. Candidates
/// that disagree on their value are an error.
pub fn extract_file_iterator(path: &Path) -> Result<u64, LoadError> {
    static DIGIT_RUN: OnceLock<Regex> = OnceLock::new();
    let re = DIGIT_RUN.get_or_init(|| Regex::new("[0-9]{2,}").expect("file iterator regex should be valid"));

    let name = file_name(path);
    let candidates = re
        .find_iter(&name)
        .map(|m| {
            let digits = m.as_str();
            &digits[digits.len().saturating_sub(6)..]
        })
        .collect_vec();

    let values: BTreeSet<u64> = candidates
        .iter()
        // at most 6 ASCII digits, always fits
        .filter_map(|d| d.parse::<u64>().ok())
        .collect();

    match values.len() {
        0 => Ok(0),
        1 => Ok(values.into_iter().next().unwrap_or_default()),
        _ => Err(LoadError::AmbiguousFileIterator {
            path: path.to_path_buf(),
            matches: candidates.into_iter().map(|s| s.to_string()).collect(),
        }),
    }
}

/// The identities found in each shard, keyed by file iterator.
#[derive(Debug, Default, Clone)]
pub struct ShardIndex {
    shards: BTreeMap<u64, Vec<u64>>,
}

impl ShardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identities seen in one file. The first file recorded for a
    /// given iterator wins; later files with the same iterator (i.e. other
    /// file types from the same shard) are ignored.
    pub fn record<I: IntoIterator<Item = u64>>(&mut self, file_iterator: u64, ids: I) {
        if self.shards.contains_key(&file_iterator) {
            return;
        }
        let ids: Vec<u64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        debug!("Shard {file_iterator} contains {} cell(s)", ids.len());
        self.shards.insert(file_iterator, ids);
    }

    pub fn get(&self, file_iterator: u64) -> Option<&[u64]> {
        self.shards.get(&file_iterator).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u64])> {
        self.shards.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn touch(dir: &Path, names: &[&str]) {
        for n in names {
            std::fs::write(dir.join(n), "id\tdatetime\n").unwrap();
        }
    }

    #[test]
    fn test_select_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "GLOBAL_002_soilchemistry-daily.txt",
                "GLOBAL_001_soilchemistry-daily.txt.gz",
                "GLOBAL_001_physiology-daily.txt",
                "notes.txt",
            ],
        );

        let files = select_files(dir.path(), "soilchemistry-daily.txt", None).unwrap();
        let names = files.iter().map(|p| file_name(p)).collect_vec();
        assert_eq!(
            names,
            ["GLOBAL_001_soilchemistry-daily.txt.gz", "GLOBAL_002_soilchemistry-daily.txt"]
        );

        let files = select_files(dir.path(), "soilchemistry-daily.txt", Some("_002_")).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_select_files_none() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["GLOBAL_001_physiology-daily.txt"]);

        let err = select_files(dir.path(), "soilchemistry-daily.txt", None).unwrap_err();
        assert!(matches!(err.current_context(), InputNotFoundError::NoMatchingFiles { .. }));

        let err = select_files(dir.path(), "physiology-daily.txt", Some("EUROPE")).unwrap_err();
        assert!(matches!(err.current_context(), InputNotFoundError::NoMatchingFiles { .. }));

        let err = select_files(&dir.path().join("missing"), "physiology-daily.txt", None).unwrap_err();
        assert!(matches!(err.current_context(), InputNotFoundError::NotADirectory(_)));
    }

    #[rstest]
    #[case("GLOBAL_002_soilchemistry-daily.txt", 2)]
    #[case("GLOBAL_002_soilchemistry-daily.txt.gz", 2)]
    #[case("soilchemistry-daily.txt", 0)]
    #[case("run_1_soilchemistry-daily.txt", 0)]
    #[case("EU_123456_soilchemistry-daily.txt", 123456)]
    #[case("EU_99123456_soilchemistry-daily.txt", 123456)]
    #[case("EU_05_x_05_soilchemistry-daily.txt", 5)]
    fn test_extract_file_iterator(#[case] name: &str, #[case] expected: u64) {
        assert_eq!(extract_file_iterator(Path::new(name)).unwrap(), expected);
    }

    #[test]
    fn test_ambiguous_file_iterator() {
        let res = extract_file_iterator(Path::new("GLOBAL_2000_002_soilchemistry-daily.txt"));
        assert!(matches!(res, Err(LoadError::AmbiguousFileIterator { .. })));
    }

    #[test]
    fn test_shard_index_first_wins() {
        let mut shards = ShardIndex::new();
        shards.record(2, [5, 3, 5, 1]);
        shards.record(2, [10, 11]);
        shards.record(1, [7]);
        assert_eq!(shards.get(2), Some([1, 3, 5].as_slice()));
        assert_eq!(shards.iter().map(|(k, _)| k).collect_vec(), [1, 2]);
        assert_eq!(shards.len(), 2);
    }
}
