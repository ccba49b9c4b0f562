//! NetCDF raster source.
//!
//! Reads one 2-D `(lat, lon)` variable with regular coordinate variables and
//! derives the affine transform from their spacing. Coordinate values are
//! taken to be cell centres.

use ndarray::Array2;
use ::netcdf::{AttributeValue, Variable};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{GeoTransform, RasterSource};
use crate::error::{ErosivityError, Result};

const LAT_NAMES: [&str; 2] = ["lat", "latitude"];
const LON_NAMES: [&str; 2] = ["lon", "longitude"];

/// Relative tolerance when checking coordinate spacing is regular
const SPACING_TOLERANCE: f64 = 1e-6;

/// A 2-D NetCDF variable on a regular latitude/longitude grid.
#[derive(Debug, Clone)]
pub struct NetCdfRaster {
    path: PathBuf,
    variable: String,
    transform: GeoTransform,
    shape: (usize, usize),
}

impl NetCdfRaster {
    /// Open `variable` from a NetCDF file and derive its transform
    pub fn open(path: impl AsRef<Path>, variable: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ErosivityError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let file = ::netcdf::open(path)?;
        info!("Opened NetCDF file: {}", path.display());

        let var = file.variable(variable).ok_or_else(|| ErosivityError::Raster {
            message: format!("Variable {} not found in {}", variable, path.display()),
        })?;

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if dims.len() != 2 {
            return Err(ErosivityError::Raster {
                message: format!(
                    "Variable {} has {} dimensions, expected (lat, lon)",
                    variable,
                    dims.len()
                ),
            });
        }
        if !LAT_NAMES.contains(&dims[0].as_str()) || !LON_NAMES.contains(&dims[1].as_str()) {
            return Err(ErosivityError::Raster {
                message: format!("Variable {} has dimensions {:?}, expected (lat, lon)", variable, dims),
            });
        }

        let lat = read_coordinate(&file, &dims[0])?;
        let lon = read_coordinate(&file, &dims[1])?;
        let dlat = regular_spacing(&lat, &dims[0])?;
        let dlon = regular_spacing(&lon, &dims[1])?;

        let transform = GeoTransform::new(lon[0] - dlon / 2.0, lat[0] - dlat / 2.0, dlon, dlat);
        transform.ensure_invertible()?;

        debug!(
            variable = variable,
            rows = lat.len(),
            cols = lon.len(),
            "Derived transform from coordinate variables"
        );

        Ok(Self {
            path: path.to_path_buf(),
            variable: variable.to_string(),
            transform,
            shape: (lat.len(), lon.len()),
        })
    }
}

impl RasterSource for NetCdfRaster {
    fn name(&self) -> &str {
        &self.variable
    }

    fn read_band(&self) -> Result<Array2<f64>> {
        let file = ::netcdf::open(&self.path)?;
        let var = file.variable(&self.variable).ok_or_else(|| ErosivityError::Raster {
            message: format!("Variable {} disappeared from {}", self.variable, self.path.display()),
        })?;

        let mut values: Vec<f64> = var.get_values::<f64, _>(..)?;
        if let Some(fill) = fill_value(&var)? {
            for v in values.iter_mut().filter(|v| **v == fill) {
                *v = f64::NAN;
            }
        }

        Array2::from_shape_vec(self.shape, values).map_err(|e| ErosivityError::Raster {
            message: format!("Cannot shape variable {}: {}", self.variable, e),
        })
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }
}

fn read_coordinate(file: &::netcdf::File, name: &str) -> Result<Vec<f64>> {
    let var = file.variable(name).ok_or_else(|| ErosivityError::Raster {
        message: format!("Coordinate variable {} not found", name),
    })?;
    Ok(var.get_values::<f64, _>(..)?)
}

fn regular_spacing(coords: &[f64], name: &str) -> Result<f64> {
    if coords.len() < 2 {
        return Err(ErosivityError::Raster {
            message: format!("Coordinate {} needs at least two values", name),
        });
    }
    let step = coords[1] - coords[0];
    let irregular = coords
        .windows(2)
        .any(|w| ((w[1] - w[0]) - step).abs() > SPACING_TOLERANCE * step.abs().max(1.0));
    if irregular || step == 0.0 {
        return Err(ErosivityError::Raster {
            message: format!("Coordinate {} is not regularly spaced", name),
        });
    }
    Ok(step)
}

fn fill_value(var: &Variable) -> Result<Option<f64>> {
    let Some(attr) = var.attribute("_FillValue") else {
        return Ok(None);
    };
    let fill = match attr.value()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        _ => None,
    };
    Ok(fill)
}
