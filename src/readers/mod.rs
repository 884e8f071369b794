//! Readers for the input files of a conversion run.
pub mod ldndc_files;
#[cfg(feature = "netcdf")]
pub mod reference_grid;

pub use ldndc_files::read_ldndc_file;
