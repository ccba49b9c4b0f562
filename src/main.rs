//! erosivity - raster point sampling and Gaussian-process calibration
//!
//! This is the main entry point for the erosivity command-line tool.

use anyhow::{bail, Context};
use std::path::Path;
use tracing::{error, info};

use erosivity::calibration::Calibrator;
use erosivity::config::{Command, RasterSpec};
use erosivity::metrics::{skill_by_group, skill_report, GroupSkill};
use erosivity::raster::{GeoTiffRaster, RasterSource};
use erosivity::sampling::{sample_directory, sample_into};
use erosivity::table::{read_csv, write_csv};
use erosivity::{init_tracing, log_error, Config, Dataset};

fn main() -> anyhow::Result<()> {
    let (config, command) = Config::load().context("Configuration error")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.log_level);
    info!("Starting erosivity v{}", env!("CARGO_PKG_VERSION"));

    run(&config, command)
}

fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Sample {
            input,
            rasters,
            output,
            ..
        } => {
            let mut dataset = load(&input)?;
            for spec in &rasters {
                let raster = open_raster(spec)?;
                let summary = sample_into(
                    raster.as_ref(),
                    &mut dataset,
                    &spec.column,
                    config.sampling.nodata_threshold,
                    &config.sampling,
                )
                .map_err(|e| {
                    log_error(&e, "sample");
                    e
                })?;
                info!(
                    column = %spec.column,
                    points = summary.points,
                    missing = summary.missing,
                    "Column sampled"
                );
            }
            save(&dataset, &output)
        }

        Command::Aggregate {
            input,
            dir,
            prefix,
            column,
            output,
        } => {
            let mut dataset = load(&input)?;
            let used = sample_directory(&dir, &mut dataset, &prefix, &column, &config.sampling)
                .with_context(|| format!("Failed to aggregate {}", dir.display()))?;
            info!("Summed {} rasters into {}", used, column);
            save(&dataset, &output)
        }

        Command::Filter {
            input,
            columns,
            output,
            ..
        } => {
            let dataset = load(&input)?;
            let names: Vec<&str> = columns.iter().map(String::as_str).collect();
            let filtered = dataset.filter_min(&names, config.sampling.min_valid)?;
            info!(
                before = dataset.row_count(),
                after = filtered.row_count(),
                floor = config.sampling.min_valid,
                "Rows filtered"
            );
            save(&filtered, &output)
        }

        Command::Metrics {
            input,
            observed,
            predicted,
            group_by,
            scale,
        } => {
            let mut dataset = load(&input)?;
            if let Some(factor) = scale {
                dataset.scale_column(&predicted, factor)?;
            }
            let dataset = dataset.filter_min(
                &[observed.as_str(), predicted.as_str()],
                config.sampling.min_valid,
            )?;

            let reports = match group_by {
                Some(group_column) => skill_by_group(&dataset, &group_column, &observed, &predicted)?,
                None => vec![GroupSkill::new(
                    "all".to_string(),
                    dataset.row_count(),
                    skill_report(dataset.numeric(&observed)?, dataset.numeric(&predicted)?),
                )],
            };
            for failed in reports.iter().filter(|r| r.error.is_some()) {
                error!(group = %failed.group, error = ?failed.error, "Metrics undefined for group");
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(())
        }

        Command::Calibrate {
            input,
            features,
            label,
            output,
            ..
        } => {
            let columns: Vec<&str> = features.iter().map(String::as_str).collect();
            let dataset = load(&input)?;
            let dataset = calibration_rows(&dataset, &columns, &label, config.sampling.min_valid)?;

            let mut calibrator =
                Calibrator::from_dataset(&dataset, &columns, &label, config.calibration.clone())?;
            let report = calibrator.run().context("Calibration failed")?;

            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Report written to {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
    }
}

/// Rows with every feature present and the label at or above `min_valid`
fn calibration_rows(
    dataset: &Dataset,
    features: &[&str],
    label: &str,
    min_valid: f64,
) -> anyhow::Result<Dataset> {
    let filtered = dataset
        .filter_min(features, f64::NEG_INFINITY)?
        .filter_min(&[label], min_valid)?;
    info!(
        before = dataset.row_count(),
        after = filtered.row_count(),
        floor = min_valid,
        "Calibration rows selected"
    );
    Ok(filtered)
}

fn load(path: &Path) -> anyhow::Result<Dataset> {
    let dataset = read_csv(path).with_context(|| format!("Failed to read {}", path.display()))?;
    info!(
        "Loaded {} rows x {} columns from {}",
        dataset.row_count(),
        dataset.column_names().len(),
        path.display()
    );
    Ok(dataset)
}

fn save(dataset: &Dataset, path: &Path) -> anyhow::Result<()> {
    write_csv(dataset, path).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} rows to {}", dataset.row_count(), path.display());
    Ok(())
}

/// Open a raster by extension; NetCDF variables are named after the column
fn open_raster(spec: &RasterSpec) -> anyhow::Result<Box<dyn RasterSource>> {
    let extension = spec
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("tif") | Some("tiff") => Ok(Box::new(
            GeoTiffRaster::open(&spec.path)
                .with_context(|| format!("Failed to open {}", spec.path.display()))?,
        )),
        #[cfg(feature = "netcdf")]
        Some("nc") => Ok(Box::new(
            erosivity::raster::NetCdfRaster::open(&spec.path, &spec.column)
                .with_context(|| format!("Failed to open {}", spec.path.display()))?,
        )),
        _ => bail!("Unsupported raster format: {}", spec.path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erosivity::config::CalibrationConfig;
    use erosivity::raster::{write_geotiff, GeoTransform};
    use ndarray::Array2;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_tif(path: &Path, value: f64) {
        let values = Array2::from_elem((10, 10), value);
        write_geotiff(path, &values, &GeoTransform::new(0.0, 10.0, 1.0, -1.0)).unwrap();
    }

    /// Site table on a 10x10 unit grid with upper-left corner at (0, 10)
    fn write_sites(dir: &TempDir, n: usize) -> PathBuf {
        let sites = Dataset::new()
            .with_numeric("Lat", (0..n).map(|i| 1.5 + (i % 7) as f64).collect())
            .unwrap()
            .with_numeric("Lon", (0..n).map(|i| 1.5 + (i % 5) as f64).collect())
            .unwrap()
            .with_text(
                "Continent",
                (0..n)
                    .map(|i| if i % 2 == 0 { "Asia" } else { "Africa" }.to_string())
                    .collect(),
            )
            .unwrap();
        let path = dir.path().join("sites.csv");
        write_csv(&sites, &path).unwrap();
        path
    }

    #[test]
    fn test_sample_filter_metrics_commands() {
        let dir = tempfile::tempdir().unwrap();
        let sites = write_sites(&dir, 12);
        let tif = dir.path().join("GloRESatE.tif");
        write_tif(&tif, 10.0);
        let config = Config::default();

        let sampled = dir.path().join("sampled.csv");
        run(
            &config,
            Command::Sample {
                input: sites,
                rasters: vec![RasterSpec {
                    column: "GloRESatE".to_string(),
                    path: tif,
                }],
                output: sampled.clone(),
                nodata_threshold: None,
            },
        )
        .unwrap();
        let dataset = read_csv(&sampled).unwrap();
        for v in dataset.numeric("GloRESatE").unwrap() {
            assert!((v - 10.0).abs() < 1e-9, "sampled {v}");
        }

        // Observed column with one row below the floor
        let mut dataset = dataset;
        let observed: Vec<f64> = (0..12).map(|i| if i == 3 { 0.5 } else { 8.0 + i as f64 }).collect();
        dataset.insert_numeric("R_Final", observed).unwrap();
        write_csv(&dataset, &sampled).unwrap();

        let filtered = dir.path().join("valid.csv");
        run(
            &config,
            Command::Filter {
                input: sampled,
                columns: vec!["R_Final".to_string(), "GloRESatE".to_string()],
                output: filtered.clone(),
                min_valid: None,
            },
        )
        .unwrap();
        assert_eq!(read_csv(&filtered).unwrap().row_count(), 11);

        run(
            &config,
            Command::Metrics {
                input: filtered,
                observed: "R_Final".to_string(),
                predicted: "GloRESatE".to_string(),
                group_by: Some("Continent".to_string()),
                scale: Some(1.1),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_aggregate_command_sums_rasters() {
        let dir = tempfile::tempdir().unwrap();
        let sites = write_sites(&dir, 6);
        let monthly = dir.path().join("monthly");
        std::fs::create_dir(&monthly).unwrap();
        write_tif(&monthly.join("R_01.tif"), 2.0);
        write_tif(&monthly.join("R_02.tif"), 3.0);

        let output = dir.path().join("annual.csv");
        run(
            &Config::default(),
            Command::Aggregate {
                input: sites,
                dir: monthly,
                prefix: "Rfactor_".to_string(),
                column: "R_annual".to_string(),
                output: output.clone(),
            },
        )
        .unwrap();

        let dataset = read_csv(&output).unwrap();
        for v in dataset.numeric("R_annual").unwrap() {
            assert!((v - 5.0).abs() < 1e-9, "annual sum was {v}");
        }
        assert!(dataset.numeric("Rfactor_01").is_err());
    }

    #[test]
    fn test_calibrate_command_drops_labels_below_floor() {
        let dir = tempfile::tempdir().unwrap();
        let n = 40;
        let x: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let mut label: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        label[5] = 0.0;
        label[9] = f64::NAN;
        let table = Dataset::new()
            .with_numeric("feature", x)
            .unwrap()
            .with_numeric("label", label)
            .unwrap();
        let input = dir.path().join("calibration.csv");
        write_csv(&table, &input).unwrap();

        let config = Config {
            calibration: CalibrationConfig {
                init_points: 15,
                refinement_iters: 3,
                length_scale_bounds: (0.1, 10.0),
                alpha_bounds: (1e-6, 1e-2),
                acquisition_samples: 100,
                ..CalibrationConfig::default()
            },
            ..Config::default()
        };
        let output = dir.path().join("report.json");
        run(
            &config,
            Command::Calibrate {
                input,
                features: vec!["feature".to_string()],
                label: "label".to_string(),
                seed: None,
                init_points: None,
                refinement_iters: None,
                output: Some(output.clone()),
            },
        )
        .unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        let rows = report["train_rows"].as_u64().unwrap() + report["test_rows"].as_u64().unwrap();
        assert_eq!(rows, 38);
        assert_eq!(report["evaluations"].as_u64(), Some(18));
    }

    #[test]
    fn test_calibration_rows_keeps_low_features() {
        let table = Dataset::new()
            .with_numeric("feature", vec![-3.0, 0.0, 2.0, f64::NAN])
            .unwrap()
            .with_numeric("label", vec![5.0, 0.0, 0.9, 4.0])
            .unwrap();
        let rows = calibration_rows(&table, &["feature"], "label", 1.0).unwrap();
        assert_eq!(rows.numeric("feature").unwrap(), &[-3.0][..]);
    }
}
