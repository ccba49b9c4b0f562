//! Configuration management for erosivity.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`EROSIVITY_*`)
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ErosivityError, Result};

/// Command-line arguments for erosivity
#[derive(Parser, Debug)]
#[command(name = "erosivity")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to JSON configuration file
    #[arg(short, long, env = "EROSIVITY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "EROSIVITY_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline step to run
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sample rasters at every site of a CSV table
    Sample {
        /// Input CSV with latitude/longitude columns
        #[arg(short, long)]
        input: PathBuf,

        /// Raster to sample, as `column=path` (repeatable)
        #[arg(short, long = "raster", value_parser = parse_raster_spec, required = true)]
        rasters: Vec<RasterSpec>,

        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,

        /// Cells below this value are treated as missing
        #[arg(long, env = "EROSIVITY_NODATA_THRESHOLD")]
        nodata_threshold: Option<f64>,
    },

    /// Sample a directory of monthly rasters and sum them into one column
    Aggregate {
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding the `*.tif` rasters
        #[arg(short, long)]
        dir: PathBuf,

        /// Prefix of the intermediate per-raster columns
        #[arg(long, default_value = "Rfactor_")]
        prefix: String,

        /// Name of the summed column
        #[arg(long)]
        column: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Keep rows whose columns are all present and >= the minimum valid value
    Filter {
        #[arg(short, long)]
        input: PathBuf,

        /// Columns to check, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        #[arg(short, long)]
        output: PathBuf,

        /// Floor overriding the configured `min_valid`
        #[arg(long, env = "EROSIVITY_MIN_VALID")]
        min_valid: Option<f64>,
    },

    /// Print skill metrics of a predicted column against an observed one
    Metrics {
        #[arg(short, long)]
        input: PathBuf,

        /// Observed (reference) column
        #[arg(long)]
        observed: String,

        /// Predicted (simulated) column
        #[arg(long)]
        predicted: String,

        /// Report one set of metrics per distinct value of this column
        #[arg(long)]
        group_by: Option<String>,

        /// Multiply the predicted column by this factor first
        #[arg(long)]
        scale: Option<f64>,
    },

    /// Calibrate a Gaussian-process regressor and report its skill
    Calibrate {
        #[arg(short, long)]
        input: PathBuf,

        /// Feature columns, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        features: Vec<String>,

        /// Label column
        #[arg(long)]
        label: String,

        /// Random seed for the split, folds and search
        #[arg(long, env = "EROSIVITY_SEED")]
        seed: Option<u64>,

        /// Random exploration points
        #[arg(long, env = "EROSIVITY_INIT_POINTS")]
        init_points: Option<usize>,

        /// Guided refinement iterations
        #[arg(long, env = "EROSIVITY_REFINEMENT_ITERS")]
        refinement_iters: Option<usize>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// A raster to sample and the column it fills
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSpec {
    pub column: String,
    pub path: PathBuf,
}

/// Parse `column=path`; a bare path uses its file stem as the column
pub fn parse_raster_spec(value: &str) -> std::result::Result<RasterSpec, String> {
    match value.split_once('=') {
        Some((column, path)) if !column.is_empty() && !path.is_empty() => Ok(RasterSpec {
            column: column.to_string(),
            path: PathBuf::from(path),
        }),
        Some(_) => Err(format!("expected column=path, got '{}'", value)),
        None => {
            let path = PathBuf::from(value);
            let column = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("cannot derive a column name from '{}'", value))?
                .to_string();
            Ok(RasterSpec { column, path })
        }
    }
}

/// Raster sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Latitude column of the site table
    #[serde(default = "default_lat_column")]
    pub lat_column: String,

    /// Longitude column of the site table
    #[serde(default = "default_lon_column")]
    pub lon_column: String,

    /// Raster cells below this value are masked
    #[serde(default)]
    pub nodata_threshold: f64,

    /// Rows with a value below this floor are dropped before metrics
    #[serde(default = "default_min_valid")]
    pub min_valid: f64,
}

/// How the next candidate is chosen during refinement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Acquisition {
    /// Upper confidence bound `μ + κσ`
    Ucb {
        #[serde(default = "default_kappa")]
        kappa: f64,
    },
    /// Expected improvement over the best score plus `xi`
    Ei {
        #[serde(default)]
        xi: f64,
    },
}

impl Default for Acquisition {
    fn default() -> Self {
        Acquisition::Ucb {
            kappa: default_kappa(),
        }
    }
}

/// Model calibration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Share of rows held out for testing
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Number of cross-validation folds
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Search interval of the kernel length scale
    #[serde(default = "default_bounds")]
    pub length_scale_bounds: (f64, f64),

    /// Search interval of the diagonal noise term
    #[serde(default = "default_bounds")]
    pub alpha_bounds: (f64, f64),

    /// Random exploration points before refinement
    #[serde(default = "default_init_points")]
    pub init_points: usize,

    /// Guided refinement iterations
    #[serde(default = "default_refinement_iters")]
    pub refinement_iters: usize,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    #[serde(default)]
    pub acquisition: Acquisition,

    /// Random candidates scored by the acquisition function per refinement step
    #[serde(default = "default_acquisition_samples")]
    pub acquisition_samples: usize,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<(Self, Command)> {
        Self::from_cli(Cli::parse())
    }

    /// Resolve parsed arguments against the config file and defaults
    pub fn from_cli(cli: Cli) -> Result<(Self, Command)> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let json_config = Self::load_from_file(config_path)?;
            config.merge(json_config);
        }

        if let Some(level) = cli.log_level {
            config.log_level = level;
        }
        config.apply_command(&cli.command);

        Ok((config, cli.command))
    }

    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        self.sampling = other.sampling;
        self.calibration = other.calibration;
        self.log_level = other.log_level;
    }

    /// Apply per-command overrides
    fn apply_command(&mut self, command: &Command) {
        match command {
            Command::Sample {
                nodata_threshold: Some(threshold),
                ..
            } => self.sampling.nodata_threshold = *threshold,
            Command::Filter {
                min_valid: Some(floor),
                ..
            } => self.sampling.min_valid = *floor,
            Command::Calibrate {
                seed,
                init_points,
                refinement_iters,
                ..
            } => {
                if let Some(seed) = seed {
                    self.calibration.random_seed = *seed;
                }
                if let Some(n) = init_points {
                    self.calibration.init_points = *n;
                }
                if let Some(n) = refinement_iters {
                    self.calibration.refinement_iters = *n;
                }
            }
            _ => {}
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ErosivityError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        self.sampling.validate()?;
        self.calibration.validate()
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lat_column.is_empty() || self.lon_column.is_empty() {
            return Err(ErosivityError::Config {
                message: "Coordinate column names cannot be empty".to_string(),
            });
        }
        if self.nodata_threshold.is_nan() {
            return Err(ErosivityError::Config {
                message: "nodata_threshold cannot be NaN".to_string(),
            });
        }
        if !self.min_valid.is_finite() {
            return Err(ErosivityError::Config {
                message: format!("min_valid must be finite, got {}", self.min_valid),
            });
        }
        Ok(())
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ErosivityError::Config {
                message: format!(
                    "test_fraction must be in (0, 1), got {}",
                    self.test_fraction
                ),
            });
        }

        if self.cv_folds < 2 {
            return Err(ErosivityError::Config {
                message: format!("cv_folds must be at least 2, got {}", self.cv_folds),
            });
        }

        for (name, (lower, upper)) in [
            ("length_scale_bounds", self.length_scale_bounds),
            ("alpha_bounds", self.alpha_bounds),
        ] {
            if !(lower.is_finite() && upper.is_finite() && lower > 0.0) {
                return Err(ErosivityError::Config {
                    message: format!("{} must be finite and positive, got [{}, {}]", name, lower, upper),
                });
            }
            if lower > upper {
                return Err(ErosivityError::Config {
                    message: format!("{} are inverted: [{}, {}]", name, lower, upper),
                });
            }
        }

        if self.init_points == 0 {
            return Err(ErosivityError::Config {
                message: "init_points must be at least 1".to_string(),
            });
        }

        if self.acquisition_samples == 0 {
            return Err(ErosivityError::Config {
                message: "acquisition_samples must be at least 1".to_string(),
            });
        }

        let (param, value) = match self.acquisition {
            Acquisition::Ucb { kappa } => ("kappa", kappa),
            Acquisition::Ei { xi } => ("xi", xi),
        };
        if !value.is_finite() || value < 0.0 {
            return Err(ErosivityError::Config {
                message: format!("acquisition {} must be finite and >= 0, got {}", param, value),
            });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            calibration: CalibrationConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            lat_column: default_lat_column(),
            lon_column: default_lon_column(),
            nodata_threshold: 0.0,
            min_valid: default_min_valid(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            cv_folds: default_cv_folds(),
            length_scale_bounds: default_bounds(),
            alpha_bounds: default_bounds(),
            init_points: default_init_points(),
            refinement_iters: default_refinement_iters(),
            random_seed: default_random_seed(),
            acquisition: Acquisition::default(),
            acquisition_samples: default_acquisition_samples(),
        }
    }
}

// Default value functions for serde
fn default_lat_column() -> String {
    "Lat".to_string()
}

fn default_lon_column() -> String {
    "Lon".to_string()
}

fn default_min_valid() -> f64 {
    1.0
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

fn default_bounds() -> (f64, f64) {
    (1e-5, 1e5)
}

fn default_init_points() -> usize {
    500
}

fn default_refinement_iters() -> usize {
    20
}

fn default_random_seed() -> u64 {
    42
}

fn default_kappa() -> f64 {
    2.576
}

fn default_acquisition_samples() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}
