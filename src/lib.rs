//! Convert LandscapeDNDC daily text output into gridded netCDF files.
//!
//! The pipeline reads the per-cell, per-day tables of one or more output file
//! types, reduces them to the declared variables (optionally summing several
//! columns into one composite variable), merges all file types on cell
//! identity and date, and places the result on the lat/lon grid given by a
//! reference netCDF file. Reading the reference grid and writing the output
//! requires the `netcdf` feature.
pub mod aggregate;
pub mod config;
pub mod discovery;
pub mod error;
pub mod grid;
pub mod logging;
pub mod pipeline;
pub mod readers;
pub mod spatial;
pub mod table;
pub mod temporal;
pub mod utils;
pub mod variable;
pub mod writers;

#[cfg(test)]
pub(crate) mod test_utils;
