//! Test data generation utilities.
//!
//! This module provides functions to generate GeoTIFF rasters and site
//! tables with known patterns for the integration tests.

use erosivity::raster::{write_geotiff, GeoTransform};
use erosivity::{Dataset, Result};
use ndarray::Array2;
use std::path::Path;

/// Side length of the test grids, in cells
pub const GRID_SIZE: usize = 10;

/// Unit cells with the upper-left corner at (0, GRID_SIZE)
pub fn unit_transform() -> GeoTransform {
    GeoTransform::new(0.0, GRID_SIZE as f64, 1.0, -1.0)
}

/// Creates a GeoTIFF where every cell holds `value`.
pub fn create_constant_tif(path: &Path, value: f64) -> Result<()> {
    let values = Array2::from_elem((GRID_SIZE, GRID_SIZE), value);
    write_geotiff(path, &values, &unit_transform())
}

/// Creates a GeoTIFF with values rising from 1.0 in the upper-left cell by
/// `step` per cell in row-major order, multiplied by `factor`.
pub fn create_gradient_tif(path: &Path, step: f64, factor: f64) -> Result<()> {
    write_geotiff(path, &gradient(step, factor), &unit_transform())
}

pub fn gradient(step: f64, factor: f64) -> Array2<f64> {
    Array2::from_shape_fn((GRID_SIZE, GRID_SIZE), |(r, c)| {
        (1.0 + step * (r * GRID_SIZE + c) as f64) * factor
    })
}

/// `n` sites spread over the interior of the test grid, with a text
/// `Continent` column alternating between two labels.
pub fn create_sites(n: usize) -> Dataset {
    let lat: Vec<f64> = (0..n)
        .map(|i| 1.0 + (i / 10) as f64 * 0.9 + (i % 3) as f64 * 0.11)
        .collect();
    let lon: Vec<f64> = (0..n)
        .map(|i| 1.0 + (i % 10) as f64 * 0.83 + (i % 7) as f64 * 0.05)
        .collect();
    let continent: Vec<String> = (0..n)
        .map(|i| if i % 2 == 0 { "Asia" } else { "Europe" }.to_string())
        .collect();

    Dataset::new()
        .with_numeric("Lat", lat)
        .and_then(|d| d.with_numeric("Lon", lon))
        .and_then(|d| d.with_text("Continent", continent))
        .expect("site columns share one length")
}
