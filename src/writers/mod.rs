//! Writers for the output artifacts.
#[cfg(feature = "netcdf")]
pub mod netcdf_grid;

#[cfg(feature = "netcdf")]
pub use netcdf_grid::write_grid;
