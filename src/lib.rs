//! # erosivity
//!
//! Point-level rainfall-erosivity estimation from gridded rasters, and
//! Gaussian-process calibration scored with hydrological skill metrics.
//!
//! ## Key Features
//!
//! - **IDW point sampling**: inverse-distance weighting over the 3x3 cells
//!   around each site, with no-data masking and parallel per-point sampling
//! - **Skill metrics**: percentage bias, unbiased RMSE, Nash–Sutcliffe
//!   efficiency and Pearson correlation reported together as a [`SkillReport`]
//! - **Calibration**: seeded 80/20 split, k-fold cross-validated R² and a
//!   Bayesian search over the RBF length scale and noise level
//!
//! ## Architecture
//!
//! - **Data Layer**: [`raster`] sources (GeoTIFF, optional NetCDF) and the
//!   column-oriented [`dataset::Dataset`] with CSV I/O in [`table`]
//! - **Core**: [`sampling`], [`metrics`], [`gp`] and [`calibration`]
//! - **Glue**: layered [`config`] and structured [`logging`]

pub mod calibration;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gp;
pub mod logging;
pub mod maybe_rayon;
pub mod metrics;
pub mod raster;
pub mod sampling;
pub mod table;

pub use calibration::{CalibrationReport, Calibrator, CancellationToken};
pub use config::Config;
pub use dataset::{Column, Dataset};
pub use error::{ErosivityError, Result};
pub use gp::{GaussianProcess, Hyperparameters};
pub use logging::{
    generate_run_id, init_tracing, log_error, log_operation_end, log_operation_start,
    log_sample_stats, log_timed_operation,
};
pub use metrics::{skill_report, SkillReport};
pub use raster::{GeoTransform, RasterGrid, RasterSource};
pub use sampling::{sample_into, sample_points, QueryPoint};
