//! Point sampling of raster grids.
//!
//! Converts a raster into one scalar per query point using inverse-distance
//! weighting (see [`idw`]). Points are independent and sampled in parallel;
//! results are merged back by row index, so output order always matches
//! input order.

pub mod idw;

use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::SamplingConfig;
use crate::dataset::Dataset;
use crate::error::{ErosivityError, Result};
use crate::logging::{log_operation_end, log_sample_stats};
use crate::maybe_rayon::*;
use crate::raster::{GeoTiffRaster, RasterGrid, RasterSource};

/// A geographic query location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryPoint {
    pub lat: f64,
    pub lon: f64,
}

impl QueryPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Outcome of one sampling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSummary {
    /// Number of query points
    pub points: usize,
    /// Points with no valid neighbourhood cell
    pub missing: usize,
}

/// Sample every point; `None` marks a point with no valid neighbour
pub fn sample_points(grid: &RasterGrid, points: &[QueryPoint]) -> Vec<Option<f64>> {
    points
        .par_iter()
        .map(|p| idw::sample_at(grid, p.lon, p.lat))
        .collect()
}

/// Read the query points from the dataset's latitude/longitude columns
pub fn query_points(dataset: &Dataset, config: &SamplingConfig) -> Result<Vec<QueryPoint>> {
    let lat = dataset.numeric(&config.lat_column)?;
    let lon = dataset.numeric(&config.lon_column)?;
    Ok(lat
        .iter()
        .zip(lon)
        .map(|(&lat, &lon)| QueryPoint::new(lat, lon))
        .collect())
}

/// Sample `source` at every row of `dataset` and write the result into
/// `column`, replacing any existing column of that name.
///
/// Missing results are stored as NaN. The raster is read once and dropped
/// when the pass completes.
pub fn sample_into<S: RasterSource + ?Sized>(
    source: &S,
    dataset: &mut Dataset,
    column: &str,
    nodata_threshold: f64,
    config: &SamplingConfig,
) -> Result<SampleSummary> {
    let start = Instant::now();
    let points = query_points(dataset, config)?;
    let grid = RasterGrid::open(source, nodata_threshold)?;

    let values: Vec<f64> = sample_points(&grid, &points)
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    let missing = values.iter().filter(|v| v.is_nan()).count();

    log_sample_stats(source.name(), column, grid.rows(), grid.cols(), points.len(), missing);
    if missing == points.len() && !points.is_empty() {
        warn!(raster = source.name(), column = column, "No point fell on valid cells");
    }

    dataset.insert_numeric(column, values)?;
    log_operation_end("sample", start, missing == 0);

    Ok(SampleSummary {
        points: points.len(),
        missing,
    })
}

/// Sample every `*.tif` in `dir` into `<prefix><suffix>` columns, where the
/// suffix is the last `_`-separated part of the file stem, then fold those
/// columns into `total_column`.
///
/// Files are processed in name order. Returns the number of rasters used.
pub fn sample_directory(
    dir: impl AsRef<Path>,
    dataset: &mut Dataset,
    prefix: &str,
    total_column: &str,
    config: &SamplingConfig,
) -> Result<usize> {
    let dir = dir.as_ref();
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("tif")))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ErosivityError::Raster {
            message: format!("No .tif files in {}", dir.display()),
        });
    }

    for path in &files {
        let raster = GeoTiffRaster::open(path)?;
        let suffix = raster.name().rsplit('_').next().unwrap_or(raster.name());
        let column = format!("{}{}", prefix, suffix);
        sample_into(&raster, dataset, &column, config.nodata_threshold, config)?;
    }

    let parts = dataset.sum_columns_with_prefix(prefix, total_column)?;
    info!(
        dir = %dir.display(),
        rasters = files.len(),
        columns = parts,
        total = total_column,
        "Aggregated raster directory"
    );
    Ok(files.len())
}
