//! Writing assembled grids to netCDF.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use indexmap::IndexMap;
use log::{info, warn};
use netcdf::{AttributeValue, Extents};

use crate::{
    config::MetaValue,
    error::WriteError,
    grid::{Grid, DEFLATE_LEVEL, NODATA},
};

pub const TIME_DIM_NAME: &str = "time";
pub const LAT_DIM_NAME: &str = "lat";
pub const LON_DIM_NAME: &str = "lon";

impl From<&MetaValue> for AttributeValue {
    fn from(value: &MetaValue) -> Self {
        match value {
            MetaValue::Str(s) => AttributeValue::Str(s.clone()),
            MetaValue::Int(i) => AttributeValue::Longlong(*i),
            MetaValue::Float(f) => AttributeValue::Double(*f),
            // netCDF has no boolean attribute type
            MetaValue::Bool(b) => AttributeValue::Str(b.to_string()),
        }
    }
}

/// Where a file is written before it is renamed to its final path.
fn temporary_nc_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    final_path.with_file_name(name)
}

/// Write `grid` to `path` with `global_info` as the global attributes.
///
/// The file is first written under a temporary name in the same directory
/// and only renamed to `path` once it is complete, so an interrupted run
/// never leaves a truncated file under the final name. If writing fails the
/// temporary file is removed.
pub fn write_grid(path: &Path, grid: &Grid, global_info: &IndexMap<String, MetaValue>) -> error_stack::Result<(), WriteError> {
    let tmp_path = temporary_nc_path(path);
    if let Err(e) = write_grid_to(&tmp_path, grid, global_info) {
        if tmp_path.exists() {
            if let Err(rm_err) = std::fs::remove_file(&tmp_path) {
                warn!("Could not remove incomplete file {}: {rm_err}", tmp_path.display());
            }
        }
        return Err(e);
    }
    std::fs::rename(&tmp_path, path)
        .change_context_lazy(|| WriteError::context(format!("renaming {} to {}", tmp_path.display(), path.display())))?;

    info!("Wrote {} ({} time steps, {} variables)", path.display(), grid.dates.len(), grid.variables.len());
    Ok(())
}

fn write_grid_to(tmp_path: &Path, grid: &Grid, global_info: &IndexMap<String, MetaValue>) -> error_stack::Result<(), WriteError> {
    let mut file = netcdf::create(tmp_path)
        .change_context_lazy(|| WriteError::context(format!("creating {}", tmp_path.display())))?;

    for (key, value) in global_info {
        file.add_attribute(key, AttributeValue::from(value))
            .change_context_lazy(|| WriteError::context(format!("adding global attribute '{key}'")))?;
    }

    write_coordinates(&mut file, grid)?;

    let dims = [TIME_DIM_NAME, LAT_DIM_NAME, LON_DIM_NAME];
    for gvar in grid.variables.iter() {
        let name = gvar.name.as_str();
        let mut var = file
            .add_variable::<f64>(name, &dims)
            .change_context_lazy(|| WriteError::context(format!("creating variable '{name}'")))?;
        var.set_compression(DEFLATE_LEVEL, true)
            .change_context_lazy(|| WriteError::context(format!("setting compression on '{name}'")))?;
        var.set_chunking(&gvar.chunks())
            .change_context_lazy(|| WriteError::context(format!("setting chunk sizes on '{name}'")))?;
        var.set_fill_value(NODATA)
            .change_context_lazy(|| WriteError::context(format!("setting fill value on '{name}'")))?;
        var.put_attribute("missing_value", NODATA)
            .change_context_lazy(|| WriteError::context(format!("adding missing_value to '{name}'")))?;
        var.put_attribute("units", gvar.units.as_str())
            .change_context_lazy(|| WriteError::context(format!("adding units to '{name}'")))?;
        var.put(gvar.data.view(), Extents::All)
            .change_context_lazy(|| WriteError::context(format!("writing data for '{name}'")))?;
    }

    file.close()
        .change_context_lazy(|| WriteError::context(format!("closing {}", tmp_path.display())))?;
    Ok(())
}

fn write_coordinates(file: &mut netcdf::FileMut, grid: &Grid) -> error_stack::Result<(), WriteError> {
    file.add_dimension(TIME_DIM_NAME, grid.dates.len())
        .change_context_lazy(|| WriteError::context("creating the time dimension"))?;
    file.add_dimension(LAT_DIM_NAME, grid.lats.len())
        .change_context_lazy(|| WriteError::context("creating the lat dimension"))?;
    file.add_dimension(LON_DIM_NAME, grid.lons.len())
        .change_context_lazy(|| WriteError::context("creating the lon dimension"))?;

    {
        let mut var = file
            .add_variable::<i32>(TIME_DIM_NAME, &[TIME_DIM_NAME])
            .change_context_lazy(|| WriteError::context("creating the time variable"))?;
        var.put_values(grid.time_values().as_slice(), Extents::All)
            .change_context_lazy(|| WriteError::context("writing the time values"))?;
        let time_attrs = [
            ("standard_name", "time".to_string()),
            ("long_name", "time".to_string()),
            ("units", grid.time_units()),
            ("calendar", "standard".to_string()),
            ("axis", "T".to_string()),
        ];
        for (attr, value) in time_attrs {
            var.put_attribute(attr, value)
                .change_context_lazy(|| WriteError::context(format!("adding '{attr}' to the time variable")))?;
        }
    }

    for (varname, values, standard_name, units, axis) in [
        (LAT_DIM_NAME, &grid.lats, "latitude", "degrees_north", "Y"),
        (LON_DIM_NAME, &grid.lons, "longitude", "degrees_east", "X"),
    ] {
        let mut var = file
            .add_variable::<f64>(varname, &[varname])
            .change_context_lazy(|| WriteError::context(format!("creating the {varname} variable")))?;
        var.put_values(values.as_slice(), Extents::All)
            .change_context_lazy(|| WriteError::context(format!("writing the {varname} values")))?;
        for (attr, value) in [("standard_name", standard_name), ("long_name", standard_name), ("units", units), ("axis", axis)] {
            var.put_attribute(attr, value)
                .change_context_lazy(|| WriteError::context(format!("adding '{attr}' to the {varname} variable")))?;
        }
    }

    Ok(())
}
