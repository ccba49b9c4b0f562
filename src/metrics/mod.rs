//! Hydrological skill metrics for paired observed/predicted series.
//!
//! All functions are pure. Inputs must be equal length, non-empty and
//! finite; rows with missing values are expected to be filtered out by the
//! caller (see [`crate::dataset::Dataset::filter_min`]).
//!
//! Degenerate inputs are reported as [`ErosivityError::Degenerate`] rather
//! than NaN:
//! - percentage bias with an observed value of exactly zero,
//! - NSE / R² when every observed value is identical,
//! - correlation when either series has zero variance.
//!
//! Percentage bias divides by the observed value as-is, so observed values
//! close to zero still produce extreme (but finite) results. Filter them
//! beforehand.

pub mod grouped;

use serde::{Deserialize, Serialize};

use crate::error::{ErosivityError, Result};

pub use grouped::{skill_by_group, GroupSkill};

/// Skill of one predicted series against observations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillReport {
    /// Mean of per-row percentage bias
    pub mean_percentage_bias: f64,
    /// Population standard deviation of per-row percentage bias
    pub std_percentage_bias: f64,
    /// Unbiased RMSE: RMS difference of the mean-removed series
    pub ubrmse: f64,
    /// Nash–Sutcliffe efficiency
    pub nse: f64,
    /// Pearson correlation coefficient
    pub correlation: f64,
}

/// Percentage-bias statistics and unbiased RMSE
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentageBias {
    pub mean: f64,
    pub std: f64,
    pub ubrmse: f64,
}

fn check_aligned(observed: &[f64], predicted: &[f64]) -> Result<()> {
    if observed.len() != predicted.len() {
        return Err(ErosivityError::LengthMismatch {
            left: observed.len(),
            right: predicted.len(),
        });
    }
    if observed.is_empty() {
        return Err(ErosivityError::EmptyInput {
            context: "metric series".to_string(),
        });
    }
    for (name, series) in [("observed", observed), ("predicted", predicted)] {
        if let Some(row) = series.iter().position(|v| !v.is_finite()) {
            return Err(ErosivityError::InvalidParameter {
                param: name.to_string(),
                message: format!("non-finite value at row {}", row),
            });
        }
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Per-row `(predicted - observed) / observed * 100`
pub fn percentage_bias_series(observed: &[f64], predicted: &[f64]) -> Result<Vec<f64>> {
    check_aligned(observed, predicted)?;
    if let Some(row) = observed.iter().position(|&o| o == 0.0) {
        return Err(ErosivityError::Degenerate {
            metric: "percentage bias",
            message: format!("observed value is zero at row {}", row),
        });
    }
    Ok(observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (p - o) / o * 100.0)
        .collect())
}

/// Mean and population std of percentage bias, plus unbiased RMSE
pub fn percentage_bias_stats(observed: &[f64], predicted: &[f64]) -> Result<PercentageBias> {
    let bias = percentage_bias_series(observed, predicted)?;
    let n = bias.len() as f64;

    let mean_bias = mean(&bias);
    let std_bias = (bias.iter().map(|b| (b - mean_bias).powi(2)).sum::<f64>() / n).sqrt();

    let mean_obs = mean(observed);
    let mean_pred = mean(predicted);
    let ubrmse = (observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| ((p - mean_pred) - (o - mean_obs)).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();

    Ok(PercentageBias {
        mean: mean_bias,
        std: std_bias,
        ubrmse,
    })
}

/// Nash–Sutcliffe efficiency: `1 - Σ(o - s)² / Σ(o - ō)²`
pub fn nse(observed: &[f64], simulated: &[f64]) -> Result<f64> {
    check_aligned(observed, simulated)?;
    let mean_obs = mean(observed);
    let numerator: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum();
    let denominator: f64 = observed.iter().map(|o| (o - mean_obs).powi(2)).sum();

    if denominator == 0.0 {
        return Err(ErosivityError::Degenerate {
            metric: "NSE",
            message: "observed values are all identical".to_string(),
        });
    }
    Ok(1.0 - numerator / denominator)
}

/// Coefficient of determination; same formula as [`nse`]
pub fn r2_score(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    nse(observed, predicted)
}

/// Pearson linear correlation coefficient
pub fn pearson_correlation(observed: &[f64], simulated: &[f64]) -> Result<f64> {
    check_aligned(observed, simulated)?;
    let mean_obs = mean(observed);
    let mean_sim = mean(simulated);

    let mut cov = 0.0;
    let mut var_obs = 0.0;
    let mut var_sim = 0.0;
    for (o, s) in observed.iter().zip(simulated) {
        let dobs = o - mean_obs;
        let dsim = s - mean_sim;
        cov += dobs * dsim;
        var_obs += dobs * dobs;
        var_sim += dsim * dsim;
    }

    if var_obs == 0.0 || var_sim == 0.0 {
        return Err(ErosivityError::Degenerate {
            metric: "correlation",
            message: "a series has zero variance".to_string(),
        });
    }
    Ok((cov / (var_obs.sqrt() * var_sim.sqrt())).clamp(-1.0, 1.0))
}

/// All five skill scores, computed together
pub fn skill_report(observed: &[f64], predicted: &[f64]) -> Result<SkillReport> {
    let bias = percentage_bias_stats(observed, predicted)?;
    Ok(SkillReport {
        mean_percentage_bias: bias.mean,
        std_percentage_bias: bias.std,
        ubrmse: bias.ubrmse,
        nse: nse(observed, predicted)?,
        correlation: pearson_correlation(observed, predicted)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const OBS: [f64; 5] = [120.0, 340.0, 95.0, 1500.0, 610.0];

    #[test]
    fn test_perfect_prediction() {
        let report = skill_report(&OBS, &OBS).unwrap();
        assert_eq!(report.mean_percentage_bias, 0.0);
        assert_eq!(report.std_percentage_bias, 0.0);
        assert_eq!(report.ubrmse, 0.0);
        assert_eq!(report.nse, 1.0);
        assert_relative_eq!(report.correlation, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_factor_bias() {
        let predicted: Vec<f64> = OBS.iter().map(|o| o * 1.5).collect();
        let bias = percentage_bias_stats(&OBS, &predicted).unwrap();
        assert_relative_eq!(bias.mean, 50.0, epsilon = 1e-9);
        assert_relative_eq!(bias.std, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pearson_correlation(&OBS, &predicted).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_known_values() {
        let observed = [1.0, 2.0, 3.0, 4.0];
        let predicted = [2.0, 2.0, 2.0, 6.0];

        // bias: 100, 0, -33.33.., 50
        let bias = percentage_bias_stats(&observed, &predicted).unwrap();
        assert_relative_eq!(bias.mean, (100.0 + 0.0 - 100.0 / 3.0 + 50.0) / 4.0, epsilon = 1e-12);

        // anomalies: obs [-1.5,-.5,.5,1.5], pred [-1,-1,-1,3]; diff [.5,-.5,-1.5,1.5]
        assert_relative_eq!(bias.ubrmse, (5.0f64 / 4.0).sqrt(), epsilon = 1e-12);

        // Σ(o-s)² = 1+0+1+4 = 6, Σ(o-ō)² = 5
        assert_relative_eq!(nse(&observed, &predicted).unwrap(), 1.0 - 6.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let err = skill_report(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, ErosivityError::LengthMismatch { left: 2, right: 1 }));
        assert!(nse(&[1.0], &[1.0, 2.0]).is_err());
        assert!(pearson_correlation(&[1.0], &[]).is_err());
    }

    #[test]
    fn test_empty_and_non_finite_inputs() {
        assert!(matches!(
            skill_report(&[], &[]),
            Err(ErosivityError::EmptyInput { .. })
        ));
        assert!(matches!(
            nse(&[1.0, f64::NAN], &[1.0, 2.0]),
            Err(ErosivityError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_degenerate_cases() {
        assert!(matches!(
            percentage_bias_series(&[0.0, 1.0], &[1.0, 1.0]),
            Err(ErosivityError::Degenerate { metric: "percentage bias", .. })
        ));
        assert!(matches!(
            nse(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]),
            Err(ErosivityError::Degenerate { metric: "NSE", .. })
        ));
        assert!(matches!(
            pearson_correlation(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]),
            Err(ErosivityError::Degenerate { metric: "correlation", .. })
        ));
    }

    #[test]
    fn test_r2_matches_nse() {
        let predicted = [110.0, 300.0, 100.0, 1400.0, 650.0];
        assert_eq!(r2_score(&OBS, &predicted).unwrap(), nse(&OBS, &predicted).unwrap());
    }
}
