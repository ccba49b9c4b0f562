//! Raster grids and the sources they are read from.
//!
//! A [`RasterSource`] exposes one band of cell values and an affine
//! transform. [`RasterGrid::open`] reads the band once, masks every cell
//! below the no-data threshold, and is immutable afterwards.

pub mod geotiff;
pub mod geotransform;
#[cfg(feature = "netcdf")]
pub mod netcdf;

use ndarray::Array2;

use crate::error::{ErosivityError, Result};

pub use geotiff::{write_geotiff, GeoTiffRaster};
pub use geotransform::GeoTransform;
#[cfg(feature = "netcdf")]
pub use self::netcdf::NetCdfRaster;

/// A single-band raster that can be read into memory.
pub trait RasterSource {
    /// Human-readable identifier used in logs
    fn name(&self) -> &str;

    /// Read the band as a `(rows, cols)` grid
    fn read_band(&self) -> Result<Array2<f64>>;

    /// Affine transform of the band
    fn transform(&self) -> GeoTransform;
}

/// A raster already held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryRaster {
    name: String,
    values: Array2<f64>,
    transform: GeoTransform,
}

impl InMemoryRaster {
    /// Wrap a grid and its transform
    pub fn new(name: impl Into<String>, values: Array2<f64>, transform: GeoTransform) -> Self {
        Self {
            name: name.into(),
            values,
            transform,
        }
    }
}

impl RasterSource for InMemoryRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_band(&self) -> Result<Array2<f64>> {
        Ok(self.values.clone())
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }
}

/// A masked, georeferenced grid ready for sampling.
///
/// Masked cells (below the no-data threshold, or non-finite) are stored as NaN.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    values: Array2<f64>,
    transform: GeoTransform,
    nodata_threshold: f64,
}

impl RasterGrid {
    /// Build a grid, masking every cell with `value < nodata_threshold`
    pub fn new(
        mut values: Array2<f64>,
        transform: GeoTransform,
        nodata_threshold: f64,
    ) -> Result<Self> {
        transform.ensure_invertible()?;
        if values.is_empty() {
            return Err(ErosivityError::Raster {
                message: "Raster band has no cells".to_string(),
            });
        }

        values.mapv_inplace(|v| {
            if !v.is_finite() || v < nodata_threshold {
                f64::NAN
            } else {
                v
            }
        });

        Ok(Self {
            values,
            transform,
            nodata_threshold,
        })
    }

    /// Read a source's band and mask it
    pub fn open<S: RasterSource + ?Sized>(source: &S, nodata_threshold: f64) -> Result<Self> {
        let values = source.read_band()?;
        Self::new(values, source.transform(), nodata_threshold)
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// The affine transform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Threshold used when masking
    pub fn nodata_threshold(&self) -> f64 {
        self.nodata_threshold
    }

    /// Value at signed indices; `None` when out of bounds or masked
    pub fn get(&self, row: i64, col: i64) -> Option<f64> {
        if row < 0 || col < 0 {
            return None;
        }
        let value = *self.values.get((row as usize, col as usize))?;
        (!value.is_nan()).then_some(value)
    }

    /// Index of the cell whose centre is nearest to `(x, y)`, as `(row, col)`.
    ///
    /// The result may lie outside the grid. Indices beyond the `i64` range
    /// saturate.
    pub fn nearest_cell(&self, x: f64, y: f64) -> Option<(i64, i64)> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        let col = (col - 0.5).round();
        let row = (row - 0.5).round();
        if !col.is_finite() || !row.is_finite() {
            return None;
        }
        Some((row as i64, col as i64))
    }

    /// Count of unmasked cells
    pub fn valid_cells(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}
