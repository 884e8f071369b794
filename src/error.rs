//! Common errors across the ldndc2nc crate
use std::path::PathBuf;

use itertools::Itertools;

/// Errors in the `name[unit]=src1+src2` variable declaration grammar
#[derive(Debug, thiserror::Error)]
pub enum VariableSpecError {
    #[error("Variable '{0}' does not follow the name[unit] formatting convention")]
    InvalidBrackets(String),
    #[error("Variable line is invalid, it contains more than one '=': {0}")]
    MultipleAssignments(String),
    #[error("Variable line '{decl}' has an empty {part}")]
    EmptyPart { decl: String, part: &'static str },
    #[error("Trying to add incompatible columns into '{target}': {}", .sources.join(", "))]
    IncompatibleSources { target: String, sources: Vec<String> },
    #[error("Composite variable '{name}' is declared more than once (file types '{first}' and '{second}')")]
    DuplicateCompositeTarget { name: String, first: String, second: String },
    #[error("Variable '{name}' is declared differently in file types '{first_type}' ({first}) and '{second_type}' ({second})")]
    ConflictingDeclarations {
        name: String,
        first_type: String,
        first: String,
        second_type: String,
        second: String,
    },
    #[error("Source column '{source_col}' for composite variable '{target}' was not loaded")]
    UnresolvedSource { target: String, source_col: String },
}

/// Errors loading or validating the configuration document
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration file found, searched: {}", .0.iter().map(|p| p.display()).join(", "))]
    NotFound(Vec<PathBuf>),
    #[error("Could not parse configuration: {0}")]
    Invalid(String),
    #[error("Section {0} is not a valid section (expected one of info, project, variables, refdata)")]
    UnknownSection(String),
    #[error("The configuration does not declare any file types under <variables>")]
    NoVariables,
    #[error("File type '{0}' does not declare any variables")]
    EmptyFileType(String),
    #[error("The variable declarations are inconsistent")]
    InvalidVariables,
    #[error("No reference grid given; set <refdata> in the configuration or pass --refinfo")]
    MissingRefdata,
    #[error("Could not read configuration file {}: {reason}", .path.display())]
    CouldNotRead { path: PathBuf, reason: String },
    #[error("Could not write configuration to {}: {reason}", .path.display())]
    CouldNotWrite { path: PathBuf, reason: String },
}

/// Errors finding the input files for one file type
#[derive(Debug, thiserror::Error)]
pub enum InputNotFoundError {
    #[error("Input directory {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("Error globbing for input files: {0}")]
    Glob(String),
    #[error("No LandscapeDNDC input files of type <{file_type}> in {} (pattern: *{file_type}[.gz]{})",
        .indir.display(), .limiter.as_ref().map(|l| format!(", filter: {l}")).unwrap_or_default())]
    NoMatchingFiles {
        file_type: String,
        indir: PathBuf,
        limiter: Option<String>,
    },
}

/// Errors reading one LandscapeDNDC text table
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Could not open {} because: {reason}", .path.display())]
    CouldNotOpen { path: PathBuf, reason: String },
    #[error("Could not read from {} because: {reason}", .path.display())]
    CouldNotRead { path: PathBuf, reason: String },
    #[error("File {} has no header line", .0.display())]
    EmptyFile(PathBuf),
    #[error("File {} is missing required column(s): {}", .path.display(), .columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },
    #[error("File {} has neither a 'datetime' column nor 'year' and 'julianday' columns", .0.display())]
    NoTimeColumn(PathBuf),
    #[error("Could not parse '{value}' in column '{column}' on line {line} of {}", .path.display())]
    BadValue {
        path: PathBuf,
        line: usize,
        column: String,
        value: String,
    },
    #[error("Multiple file iterator candidates ({}) in file name {}", .matches.join(", "), .path.display())]
    AmbiguousFileIterator { path: PathBuf, matches: Vec<String> },
}

/// Errors selecting the requested years from the data
#[derive(Debug, thiserror::Error)]
pub enum YearRangeError {
    #[error("Year {0} not in data")]
    YearNotInData(i32),
    #[error("Year range {0}-{1} not in data")]
    RangeNotInData(i32, i32),
    #[error("No years selected")]
    EmptySelection,
    #[error("Could not interpret '{0}' as a year selection (expected e.g. 2000, 2000-2005 or 2000,2003)")]
    InvalidSelection(String),
}

/// Errors with the reference grid or the identity lookup built from it
#[derive(Debug, thiserror::Error)]
pub enum ReferenceGridError {
    #[error("Specified reffile {} not found", .0.display())]
    FileNotFound(PathBuf),
    #[error("Could not read the reference grid {}", .0.display())]
    CouldNotRead(PathBuf),
    #[error("Var <{var}> not in {}", .path.display())]
    MissingVariable { var: String, path: PathBuf },
    #[error("Cell identifier array has shape {got:?}, expected ({nlat}, {nlon}) from the lat/lon coordinates")]
    ShapeMismatch {
        got: Vec<usize>,
        nlat: usize,
        nlon: usize,
    },
    #[error("Cell identifier variable must have dimensions (lat, lon), found ({})", .0.join(", "))]
    BadDimensions(Vec<String>),
    #[error("Cell id {0} from the simulation output is not present in the reference grid")]
    UnknownIdentity(u64),
}

/// Errors assembling the dense grids
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Cannot concatenate zero grids")]
    NoGrids,
    #[error("Grids to concatenate disagree on their {0}")]
    Inconsistent(&'static str),
    #[error("Error placing simulation rows on the reference grid")]
    Placement,
}

/// Errors writing output artifacts
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("An error occurred while {0}")]
    Context(String),
}

impl WriteError {
    pub fn context<S: ToString>(msg: S) -> Self {
        Self::Context(msg.to_string())
    }
}

/// Top level error, identifying which pipeline stage failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Error in the variable declarations")]
    Variables,
    #[error("Error finding input files for file type <{0}>")]
    Discovery(String),
    #[error("Error loading {}", .0.display())]
    Loading(PathBuf),
    #[error("Error restricting {} to the requested years", .0.display())]
    Reconciling(PathBuf),
    #[error("Error combining the variables of file type <{0}>")]
    Aggregating(String),
    #[error("Error assembling the output grids")]
    Assembling,
    #[error("Error writing {}", .0.display())]
    Writing(PathBuf),
}
