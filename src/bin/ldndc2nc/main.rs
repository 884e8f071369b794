use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use error_stack::ResultExt;
use errors::CliError;
use ldndc2nc::{
    config::{find_config, home_dir, Config},
    pipeline::{convert, OutputMode, OutputOptions, RunOptions},
    spatial::ReferenceGrid,
    temporal::YearSelection,
};
use log::{error, info, warn};

mod errors;

fn main() -> ExitCode {
    let clargs = Ldndc2ncCli::parse();
    if let Err(e) = ldndc2nc::logging::init_logging(clargs.verbosity.log_level_filter(), clargs.log_file.as_deref()) {
        eprintln!("Could not set up logging:\n{e:?}");
        return ExitCode::FAILURE;
    }
    info!("Logging initialized");

    match driver(clargs) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("\nThe conversion failed:\n\n{e:?}\n");
            eprintln!("{}", e.current_context().user_message());
            ExitCode::FAILURE
        }
    }
}

/// Convert LandscapeDNDC daily text output into gridded netCDF files.
///
/// The variables to convert are declared in the configuration file, found
/// with --config or in ./ldndc2nc.conf, ~/ldndc2nc.conf,
/// /etc/ldndc2nc/ldndc2nc.conf or the path in $LDNDC2NC_CONF.
#[derive(Debug, clap::Parser)]
#[command(version)]
struct Ldndc2ncCli {
    /// Directory containing the LandscapeDNDC output files
    #[clap(required_unless_present("check_config_only"))]
    indir: Option<PathBuf>,

    /// Directory to write the netCDF file(s) to
    #[clap(short, long, default_value = ".")]
    outdir: PathBuf,

    /// Output file name; with --split the year is appended before ".nc"
    #[clap(long, default_value = "outfile.nc")]
    outfile: String,

    /// Years to convert, e.g. 2000, 2000-2005 or 2000,2002,2005. Default is
    /// all years in the data.
    #[clap(short, long)]
    years: Option<YearSelection>,

    /// Only use input files whose name contains this string
    #[clap(short, long)]
    limiter: Option<String>,

    /// Write one file per year instead of a single file
    #[clap(short, long)]
    split: bool,

    /// Reference grid file and the name of its cell id variable. Overrides
    /// the refdata section of the configuration.
    #[clap(long, num_args = 2, value_names = ["FILE", "VAR"])]
    refinfo: Option<Vec<String>>,

    /// Configuration file to use
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Write the active configuration as ldndc2nc.conf to the home directory
    #[clap(short = 'S', long)]
    store_config: bool,

    /// Only load and check the configuration, then print it and exit
    #[clap(long)]
    check_config_only: bool,

    /// Also write the log messages to this file
    #[clap(long)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

fn driver(clargs: Ldndc2ncCli) -> error_stack::Result<(), CliError> {
    let config_path = find_config(clargs.config.as_deref())
        .map_err(CliError::input_error)?;
    info!("Using configuration {}", config_path.display());
    let config = Config::from_file(&config_path)
        .change_context_lazy(|| CliError::input_error(format!("invalid configuration in {}", config_path.display())))?;

    if clargs.store_config {
        store_config(&config, &clargs.outdir)?;
    }

    if clargs.check_config_only {
        let text = config
            .to_toml_string()
            .map_err(CliError::input_error)?;
        println!("{text}");
        return Ok(());
    }

    let Some(indir) = clargs.indir.clone() else {
        return Err(CliError::usage_error("the input directory is required unless --check-config-only is given").into());
    };

    let (ref_file, ref_var) = reference_info(&clargs, &config)?;
    let reference = ReferenceGrid::from_netcdf(&ref_file, &ref_var)
        .change_context_lazy(|| CliError::input_error("could not load the reference grid"))?;

    if !clargs.outdir.is_dir() {
        return Err(CliError::usage_error(format!("output directory {} does not exist", clargs.outdir.display())).into());
    }

    let run_opts = RunOptions {
        indir,
        years: clargs.years,
        limiter: clargs.limiter,
    };
    let output = OutputOptions {
        outdir: clargs.outdir,
        outfile: clargs.outfile,
        mode: if clargs.split { OutputMode::Split } else { OutputMode::Merged },
    };

    let written = convert(&config, &run_opts, &reference, &output).map_err(|e| {
        let cli_err = CliError::from(e.current_context());
        e.change_context(cli_err)
    })?;
    info!("Conversion finished, wrote {} file(s)", written.len());
    Ok(())
}

/// The reference grid file and variable: from --refinfo if given, otherwise
/// from the configuration.
fn reference_info(clargs: &Ldndc2ncCli, config: &Config) -> Result<(PathBuf, String), CliError> {
    match (clargs.refinfo.as_deref(), config.refdata.as_ref()) {
        (Some([file, var]), _) => Ok((PathBuf::from(file), var.to_string())),
        (Some(_), _) => Err(CliError::usage_error("--refinfo takes exactly two values, FILE and VAR")),
        (None, Some(refdata)) => Ok((refdata.file.clone(), refdata.var.clone())),
        (None, None) => Err(CliError::usage_error(ldndc2nc::error::ConfigError::MissingRefdata)),
    }
}

fn store_config(config: &Config, fallback_dir: &Path) -> error_stack::Result<(), CliError> {
    let dest = match home_dir() {
        Some(home) => home,
        None => {
            warn!("HOME is not set, storing the configuration in {}", fallback_dir.display());
            fallback_dir.to_path_buf()
        }
    };
    let path = config
        .write_to_dir(&dest)
        .change_context_lazy(|| CliError::runtime_error("could not store the configuration"))?;
    info!("Stored configuration as {}", path.display());
    Ok(())
}
