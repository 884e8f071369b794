//! The conversion run, stage by stage.
//!
//! For every file type in the configuration the matching files are found,
//! loaded and restricted to the requested years; the file types are then
//! combined into one table keyed by (identity, date), placed onto the
//! reference grid and written out either per year or as one file.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use log::{debug, info};

use crate::{
    aggregate::{combine_file_type, merge_file_types, KeyedTable, RowCountMismatch, VariablePlan},
    config::Config,
    discovery::{extract_file_iterator, select_files, ShardIndex},
    error::PipelineError,
    grid::{Grid, GridAssembler},
    readers::read_ldndc_file,
    spatial::{IdentityLookup, ReferenceGrid},
    table::DailyTable,
    temporal::{limit_to_years, YearSelection},
    variable::VariableSpec,
};

/// What to convert.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub indir: PathBuf,
    /// The years to convert; all years in the data if `None`.
    pub years: Option<YearSelection>,
    /// Only use input files whose name contains this string.
    pub limiter: Option<String>,
}

/// Whether to write one file per year or a single file for all years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Split,
    Merged,
}

/// The merged table of all file types plus what was learned building it.
#[derive(Debug)]
pub struct MergeOutcome {
    pub table: KeyedTable,
    /// The declared variables, in merged column order.
    pub variables: Vec<VariableSpec>,
    pub shards: ShardIndex,
    pub row_count_mismatch: Option<RowCountMismatch>,
}

/// Load every configured file type and merge them into one table.
pub fn build_merged_table(config: &Config, opts: &RunOptions) -> error_stack::Result<MergeOutcome, PipelineError> {
    let plan = VariablePlan::new(&config.variables).change_context(PipelineError::Variables)?;
    let mut shards = ShardIndex::new();
    let mut tables = vec![];

    for ft in plan.file_types() {
        let file_type = ft.file_type();
        let infiles = select_files(&opts.indir, file_type, opts.limiter.as_deref())
            .change_context_lazy(|| PipelineError::Discovery(file_type.to_string()))?;
        let datacols = ft.datacols();
        info!("Reading {} file(s) of type <{file_type}>", infiles.len());

        let mut table = DailyTable::with_columns(&datacols);
        for path in infiles.iter() {
            let file_iterator = extract_file_iterator(path)
                .change_context_lazy(|| PipelineError::Loading(path.clone()))?;
            let file_table = read_ldndc_file(path, &datacols)
                .change_context_lazy(|| PipelineError::Loading(path.clone()))?;
            shards.record(file_iterator, file_table.ids().iter().copied());

            let file_table = match &opts.years {
                Some(years) => limit_to_years(file_table, years)
                    .change_context_lazy(|| PipelineError::Reconciling(path.clone()))?,
                None => file_table,
            };
            debug!("Using {} rows from {}", file_table.len(), path.display());
            table.append(file_table);
        }
        table.sort_by_identity_time();

        let keyed = combine_file_type(ft, &table)
            .change_context_lazy(|| PipelineError::Aggregating(file_type.to_string()))?;
        tables.push((file_type.to_string(), keyed));
    }

    let (table, row_count_mismatch) = merge_file_types(tables);
    info!(
        "Merged table has {} rows for {} cell(s) and {} variable(s)",
        table.len(),
        table.identities().len(),
        table.columns().len()
    );

    Ok(MergeOutcome {
        table,
        variables: plan.variables().cloned().collect(),
        shards,
        row_count_mismatch,
    })
}

/// Place the merged table onto the reference grid. In split mode there is one
/// grid per year, labelled with that year; otherwise a single unlabelled grid.
pub fn assemble_grids(
    merged: &MergeOutcome,
    reference: &ReferenceGrid,
    mode: OutputMode,
) -> error_stack::Result<Vec<(Option<i32>, Grid)>, PipelineError> {
    let lookup = IdentityLookup::from_reference_grid(reference);
    debug!("Reference grid has {} simulated cells", lookup.len());

    let assembler = GridAssembler::new(reference, &lookup, &merged.variables);
    let years = merged.table.years();
    let grids = assembler
        .assemble_years(&merged.table)
        .change_context(PipelineError::Assembling)?;

    match mode {
        OutputMode::Split => Ok(years.into_iter().map(Some).zip(grids).collect()),
        OutputMode::Merged => {
            let grid = Grid::concat(grids).change_context(PipelineError::Assembling)?;
            Ok(vec![(None, grid)])
        }
    }
}

/// The output file for one grid: `outfile` as is, or with `_<year>` inserted
/// before the `.nc` extension for a per-year file.
pub fn output_path(outdir: &Path, outfile: &str, year: Option<i32>) -> PathBuf {
    match year {
        None => outdir.join(outfile),
        Some(year) => {
            let stem = outfile.strip_suffix(".nc").unwrap_or(outfile);
            outdir.join(format!("{stem}_{year}.nc"))
        }
    }
}

/// Everything needed for a complete run that the configuration does not hold.
#[cfg(feature = "netcdf")]
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub outdir: PathBuf,
    pub outfile: String,
    pub mode: OutputMode,
}

/// Run the whole conversion and return the paths written.
#[cfg(feature = "netcdf")]
pub fn convert(
    config: &Config,
    opts: &RunOptions,
    reference: &ReferenceGrid,
    output: &OutputOptions,
) -> error_stack::Result<Vec<PathBuf>, PipelineError> {
    let merged = build_merged_table(config, opts)?;
    let grids = assemble_grids(&merged, reference, output.mode)?;
    let global_info = config.global_info();

    let mut written = vec![];
    for (year, grid) in grids {
        let path = output_path(&output.outdir, &output.outfile, year);
        crate::writers::write_grid(&path, &grid, &global_info)
            .change_context_lazy(|| PipelineError::Writing(path.clone()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::YearRangeError,
        grid::NODATA,
        test_utils::{write_ldndc_table, EXAMPLE_YAML_CONFIG},
    };
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    const SOIL: &str = "soilchemistry-daily.txt";
    const PHYS: &str = "physiology-daily.txt";

    fn config() -> Config {
        let yaml = format!(
            r#"
info:
  author: test
variables:
  {SOIL}:
    - n_emis[kgNha-1]=n2o_emis[kgNha-1]+no_emis[kgNha-1]
  {PHYS}:
    - n_up[kgNha-1]
"#
        );
        Config::from_yaml_str(&yaml).unwrap()
    }

    fn write_inputs(dir: &Path) {
        write_ldndc_table(
            &dir.join(format!("GLOBAL_001_{SOIL}")),
            &["n2o_emis[kgNha-1]", "no_emis[kgNha-1]"],
            &[
                (1, "2000-01-01", &[0.5, 0.25]),
                (1, "2000-01-02", &[1.0, 2.0]),
                (1, "2001-01-01", &[9.0, 9.0]),
            ],
            false,
        );
        write_ldndc_table(
            &dir.join(format!("GLOBAL_002_{SOIL}.gz")),
            &["n2o_emis[kgNha-1]", "no_emis[kgNha-1]"],
            &[(2, "2000-01-01", &[3.0, 4.0])],
            true,
        );
        write_ldndc_table(
            &dir.join(format!("GLOBAL_001_{PHYS}")),
            &["n_up[kgNha-1]"],
            &[(1, "2000-01-01", &[7.0]), (1, "2001-01-01", &[1.0])],
            false,
        );
        write_ldndc_table(
            &dir.join(format!("GLOBAL_002_{PHYS}")),
            &["n_up[kgNha-1]"],
            &[(2, "2000-01-01", &[8.0])],
            false,
        );
    }

    fn run_options(dir: &Path, years: &str) -> RunOptions {
        RunOptions {
            indir: dir.to_path_buf(),
            years: Some(years.parse().unwrap()),
            limiter: None,
        }
    }

    #[test]
    fn test_merged_table() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());

        let merged = build_merged_table(&config(), &run_options(dir.path(), "2000")).unwrap();
        assert_eq!(merged.table.columns(), ["n_emis[kgNha-1]", "n_up[kgNha-1]"]);

        let n_emis = merged.table.column("n_emis[kgNha-1]").unwrap();
        let expected = [0.75, 3.0, 7.0];
        assert_eq!(n_emis.len(), expected.len());
        for (got, want) in n_emis.iter().zip(expected) {
            assert_abs_diff_eq!(*got, want);
        }

        // (1, 2000-01-02) has no physiology row
        let n_up = merged.table.column("n_up[kgNha-1]").unwrap();
        assert_eq!(n_up, [7.0, 0.0, 8.0]);
        assert!(merged.row_count_mismatch.is_some());

        assert_eq!(merged.shards.get(1), Some([1].as_slice()));
        assert_eq!(merged.shards.get(2), Some([2].as_slice()));
    }

    #[test]
    fn test_source_kept_when_declared_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        write_ldndc_table(
            &dir.path().join("GLOBAL_001_extra-daily.txt"),
            &["n2o_emis[kgNha-1]"],
            &[(1, "2000-01-01", &[0.5])],
            false,
        );
        let yaml = format!(
            "variables:\n  {SOIL}:\n    - n_emis[kgNha-1]=n2o_emis[kgNha-1]+no_emis[kgNha-1]\n  extra-daily.txt:\n    - n2o_emis[kgNha-1]\n"
        );
        let cfg = Config::from_yaml_str(&yaml).unwrap();
        let merged = build_merged_table(&cfg, &run_options(dir.path(), "2000")).unwrap();
        assert_eq!(merged.table.columns(), ["n_emis[kgNha-1]", "n2o_emis[kgNha-1]"]);
        assert!(merged.table.column("no_emis[kgNha-1]").is_none());
    }

    #[test]
    fn test_year_not_in_data() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        let err = build_merged_table(&config(), &run_options(dir.path(), "1999")).unwrap_err();
        assert!(matches!(err.current_context(), PipelineError::Reconciling(_)));
        let year_err = err.downcast_ref::<YearRangeError>().unwrap();
        assert!(matches!(year_err, YearRangeError::YearNotInData(1999)));
    }

    #[test]
    fn test_missing_file_type() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        let cfg = Config::from_yaml_str("variables:\n  missing-daily.txt:\n    - a\n").unwrap();
        let err = build_merged_table(&cfg, &run_options(dir.path(), "2000")).unwrap_err();
        assert!(matches!(err.current_context(), PipelineError::Discovery(ft) if ft == "missing-daily.txt"));
    }

    #[rstest]
    #[case(OutputMode::Split, 2)]
    #[case(OutputMode::Merged, 1)]
    fn test_assemble_grids(#[case] mode: OutputMode, #[case] n_grids: usize) {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        let merged = build_merged_table(&config(), &run_options(dir.path(), "2000-2001")).unwrap();

        let reference = ReferenceGrid::new(
            vec![50.0, 50.5],
            vec![8.0, 8.5],
            array![[1.0, f64::NAN], [f64::NAN, 2.0]],
            None,
        )
        .unwrap();
        let grids = assemble_grids(&merged, &reference, mode).unwrap();
        assert_eq!(grids.len(), n_grids);

        let (label, first) = &grids[0];
        let n_emis = first.variable("n_emis").unwrap();
        assert_eq!(n_emis.units, "kgNha-1");
        assert_eq!(n_emis.data[[0, 0, 0]], 0.75);
        assert_eq!(n_emis.data[[0, 1, 1]], 7.0);
        assert_eq!(n_emis.data[[0, 0, 1]], NODATA);
        // day 3 of 2000 has no rows at all
        assert_eq!(n_emis.data[[2, 0, 0]], NODATA);

        match mode {
            OutputMode::Split => {
                assert_eq!(*label, Some(2000));
                assert_eq!(grids[1].0, Some(2001));
                assert_eq!(first.dates.len(), 366);
            }
            OutputMode::Merged => {
                assert_eq!(*label, None);
                assert_eq!(first.dates.len(), 366 + 365);
                assert_eq!(n_emis.data[[366, 0, 0]], 18.0);
            }
        }
    }

    #[rstest]
    #[case("outfile.nc", None, "outfile.nc")]
    #[case("outfile.nc", Some(2000), "outfile_2000.nc")]
    #[case("europe", Some(2001), "europe_2001.nc")]
    fn test_output_path(#[case] outfile: &str, #[case] year: Option<i32>, #[case] expected: &str) {
        assert_eq!(output_path(Path::new("/out"), outfile, year), Path::new("/out").join(expected));
    }

    #[test]
    fn test_example_config_plan() {
        let cfg = Config::from_yaml_str(EXAMPLE_YAML_CONFIG).unwrap();
        let plan = VariablePlan::new(&cfg.variables).unwrap();
        assert_eq!(plan.variables().count(), 4);
    }
}
