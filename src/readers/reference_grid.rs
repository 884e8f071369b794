//! Reading the reference grid from a netCDF file.
use std::path::Path;

use error_stack::ResultExt;
use log::info;
use ndarray::{Array1, Array2, Ix1, Ix2};
use netcdf::{AttributeValue, Extents};

use crate::{error::ReferenceGridError, spatial::ReferenceGrid};

pub const LAT_VARNAME: &str = "lat";
pub const LON_VARNAME: &str = "lon";

fn attr_as_f64(value: AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Schar(v) => Some(v as f64),
        AttributeValue::Uchar(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Ushort(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Uint(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        _ => None,
    }
}

fn read_coordinate(file: &netcdf::File, varname: &str, path: &Path) -> error_stack::Result<Vec<f64>, ReferenceGridError> {
    let var = file
        .variable(varname)
        .ok_or_else(|| ReferenceGridError::MissingVariable {
            var: varname.to_string(),
            path: path.to_path_buf(),
        })?;
    let values: Array1<f64> = var
        .get::<f64, _>(Extents::All)
        .change_context_lazy(|| ReferenceGridError::CouldNotRead(path.to_path_buf()))?
        .into_dimensionality::<Ix1>()
        .change_context_lazy(|| ReferenceGridError::CouldNotRead(path.to_path_buf()))
        .attach_printable_lazy(|| format!("coordinate '{varname}' must be one dimensional"))?;
    Ok(values.to_vec())
}

impl ReferenceGrid {
    /// Read the `lat`/`lon` coordinates and the cell id variable `varname`
    /// from a netCDF file. The cell id variable may be stored either as
    /// (lat, lon) or as (lon, lat).
    pub fn from_netcdf(path: &Path, varname: &str) -> error_stack::Result<Self, ReferenceGridError> {
        if !path.is_file() {
            return Err(ReferenceGridError::FileNotFound(path.to_path_buf()).into());
        }

        let file = netcdf::open(path).change_context_lazy(|| ReferenceGridError::CouldNotRead(path.to_path_buf()))?;
        let lats = read_coordinate(&file, LAT_VARNAME, path)?;
        let lons = read_coordinate(&file, LON_VARNAME, path)?;

        let var = file
            .variable(varname)
            .ok_or_else(|| ReferenceGridError::MissingVariable {
                var: varname.to_string(),
                path: path.to_path_buf(),
            })?;

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let dim_names: Vec<&str> = dims.iter().map(|d| d.as_str()).collect();
        let transpose = match dim_names.as_slice() {
            [LAT_VARNAME, LON_VARNAME] => false,
            [LON_VARNAME, LAT_VARNAME] => true,
            _ => return Err(ReferenceGridError::BadDimensions(dims).into()),
        };

        let fill_value = var
            .attribute_value("_FillValue")
            .and_then(|res| res.ok())
            .and_then(attr_as_f64);

        let cell_ids: Array2<f64> = var
            .get::<f64, _>(Extents::All)
            .change_context_lazy(|| ReferenceGridError::CouldNotRead(path.to_path_buf()))?
            .into_dimensionality::<Ix2>()
            .change_context_lazy(|| ReferenceGridError::CouldNotRead(path.to_path_buf()))?;
        let cell_ids = if transpose { cell_ids.reversed_axes() } else { cell_ids };

        info!(
            "Read reference grid {} ({} lat x {} lon, cell ids from '{varname}')",
            path.display(),
            lats.len(),
            lons.len()
        );
        Ok(ReferenceGrid::new(lats, lons, cell_ids, fill_value)?)
    }
}
