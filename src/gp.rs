//! Gaussian-process regression with a radial-basis kernel.
//!
//! The kernel is `k(a, b) = exp(-|a - b|² / (2 l²))` with a fixed length
//! scale `l`; `alpha` is added to the diagonal of the training covariance
//! as noise/regularisation. Hyperparameters are not re-optimised on fit.
//!
//! The prior mean is zero. With [`GaussianProcess::with_normalized_target`]
//! the targets are standardised before fitting and predictions are mapped
//! back, which is what the Bayesian-search surrogate uses.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{ErosivityError, Result};

/// One point of the hyperparameter search domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// RBF kernel length scale
    pub length_scale: f64,
    /// Value added to the diagonal of the kernel matrix
    pub alpha: f64,
}

impl Hyperparameters {
    /// Validated constructor; both values must be finite and strictly positive
    pub fn new(length_scale: f64, alpha: f64) -> Result<Self> {
        for (param, value) in [("length_scale", length_scale), ("alpha", alpha)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ErosivityError::InvalidParameter {
                    param: param.to_string(),
                    message: format!("must be finite and > 0, got {}", value),
                });
            }
        }
        Ok(Self {
            length_scale,
            alpha,
        })
    }
}

/// Radial-basis kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RbfKernel {
    pub length_scale: f64,
}

impl RbfKernel {
    pub fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        (-0.5 * sq / (self.length_scale * self.length_scale)).exp()
    }

    /// Covariance between every row of `a` and every row of `b`
    pub fn matrix(&self, a: &Array2<f64>, b: &Array2<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(a.nrows(), b.nrows(), |i, j| self.eval(a.row(i), b.row(j)))
    }
}

struct Fitted {
    x_train: Array2<f64>,
    /// K⁻¹ y
    weights: DVector<f64>,
    cholesky: Cholesky<f64, Dyn>,
    y_mean: f64,
    y_scale: f64,
    y_normalized: DVector<f64>,
}

/// A Gaussian-process regressor bound to one set of hyperparameters.
///
/// Created unfitted; [`GaussianProcess::predict`] fails with
/// [`ErosivityError::NotFitted`] until [`GaussianProcess::fit`] succeeds.
pub struct GaussianProcess {
    params: Hyperparameters,
    kernel: RbfKernel,
    normalize_target: bool,
    fitted: Option<Fitted>,
}

impl std::fmt::Debug for GaussianProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianProcess")
            .field("params", &self.params)
            .field("normalize_target", &self.normalize_target)
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

impl GaussianProcess {
    pub fn new(params: Hyperparameters) -> Self {
        Self {
            params,
            kernel: RbfKernel {
                length_scale: params.length_scale,
            },
            normalize_target: false,
            fitted: None,
        }
    }

    /// Standardise targets before fitting
    pub fn with_normalized_target(mut self, normalize: bool) -> Self {
        self.normalize_target = normalize;
        self
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fit on `x` (one row per sample) and targets `y`.
    ///
    /// On failure the model stays unfitted.
    pub fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        self.fitted = None;

        if x.nrows() != y.len() {
            return Err(ErosivityError::LengthMismatch {
                left: x.nrows(),
                right: y.len(),
            });
        }
        if y.is_empty() {
            return Err(ErosivityError::EmptyInput {
                context: "Gaussian-process training set".to_string(),
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ErosivityError::InvalidParameter {
                param: "training data".to_string(),
                message: "contains non-finite values".to_string(),
            });
        }

        let n = y.len();
        let (y_mean, y_scale) = if self.normalize_target {
            let mean = y.iter().sum::<f64>() / n as f64;
            let std = (y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
            (mean, if std > 0.0 { std } else { 1.0 })
        } else {
            (0.0, 1.0)
        };
        let y_normalized = DVector::from_iterator(n, y.iter().map(|v| (v - y_mean) / y_scale));

        let mut k = self.kernel.matrix(x, x);
        for i in 0..n {
            k[(i, i)] += self.params.alpha;
        }

        let cholesky = Cholesky::new(k).ok_or_else(|| ErosivityError::SingularMatrix {
            message: format!(
                "kernel matrix not positive definite (length_scale={}, alpha={})",
                self.params.length_scale, self.params.alpha
            ),
        })?;
        let weights = cholesky.solve(&y_normalized);
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ErosivityError::SingularMatrix {
                message: "kernel solve produced non-finite weights".to_string(),
            });
        }

        self.fitted = Some(Fitted {
            x_train: x.clone(),
            weights,
            cholesky,
            y_mean,
            y_scale,
            y_normalized,
        });
        Ok(())
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(ErosivityError::NotFitted)
    }

    fn check_features(&self, fitted: &Fitted, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != fitted.x_train.ncols() {
            return Err(ErosivityError::LengthMismatch {
                left: fitted.x_train.ncols(),
                right: x.ncols(),
            });
        }
        Ok(())
    }

    /// Posterior mean at each row of `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let fitted = self.fitted()?;
        self.check_features(fitted, x)?;
        let k_star = self.kernel.matrix(x, &fitted.x_train);
        let mean = &k_star * &fitted.weights;
        Ok(mean
            .iter()
            .map(|m| m * fitted.y_scale + fitted.y_mean)
            .collect())
    }

    /// Posterior mean and standard deviation at each row of `x`
    pub fn predict_with_std(&self, x: &Array2<f64>) -> Result<(Vec<f64>, Vec<f64>)> {
        let fitted = self.fitted()?;
        self.check_features(fitted, x)?;
        let k_star = self.kernel.matrix(x, &fitted.x_train);
        let mean = &k_star * &fitted.weights;

        // v = L⁻¹ K*ᵀ; var = k(x, x) - Σ v²
        let v = fitted
            .cholesky
            .l_dirty()
            .solve_lower_triangular(&k_star.transpose())
            .ok_or_else(|| ErosivityError::SingularMatrix {
                message: "triangular solve failed".to_string(),
            })?;

        let means = mean
            .iter()
            .map(|m| m * fitted.y_scale + fitted.y_mean)
            .collect();
        let stds = v
            .column_iter()
            .map(|col| (1.0 - col.norm_squared()).max(0.0).sqrt() * fitted.y_scale)
            .collect();
        Ok((means, stds))
    }

    /// Log marginal likelihood of the (normalised) training targets
    pub fn log_marginal_likelihood(&self) -> Result<f64> {
        let fitted = self.fitted()?;
        let n = fitted.y_normalized.len() as f64;
        let data_fit = -0.5 * fitted.y_normalized.dot(&fitted.weights);
        let log_det: f64 = fitted.cholesky.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
        Ok(data_fit - log_det - 0.5 * n * (2.0 * std::f64::consts::PI).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn params(length_scale: f64, alpha: f64) -> Hyperparameters {
        Hyperparameters::new(length_scale, alpha).unwrap()
    }

    #[test]
    fn test_hyperparameters_must_be_positive() {
        assert!(Hyperparameters::new(0.0, 1.0).is_err());
        assert!(Hyperparameters::new(1.0, -1.0).is_err());
        assert!(Hyperparameters::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let gp = GaussianProcess::new(params(1.0, 1e-3));
        assert!(!gp.is_fitted());
        assert!(matches!(
            gp.predict(&array![[0.0]]),
            Err(ErosivityError::NotFitted)
        ));
        assert!(matches!(
            gp.log_marginal_likelihood(),
            Err(ErosivityError::NotFitted)
        ));
    }

    #[test]
    fn test_interpolates_training_points() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [0.0, 1.0, 4.0, 9.0];
        let mut gp = GaussianProcess::new(params(1.0, 1e-8));
        gp.fit(&x, &y).unwrap();

        let pred = gp.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_relative_eq!(*p, *t, epsilon = 1e-4);
        }

        let (_, std) = gp.predict_with_std(&x).unwrap();
        assert!(std.iter().all(|s| *s < 1e-2));
    }

    #[test]
    fn test_far_from_data_reverts_to_prior() {
        let x = array![[0.0], [1.0]];
        let mut gp = GaussianProcess::new(params(0.5, 1e-6));
        gp.fit(&x, &[5.0, 6.0]).unwrap();

        let (mean, std) = gp.predict_with_std(&array![[100.0]]).unwrap();
        assert_relative_eq!(mean[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(std[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_normalized_target_reverts_to_mean() {
        let x = array![[0.0], [1.0]];
        let mut gp = GaussianProcess::new(params(0.5, 1e-6)).with_normalized_target(true);
        gp.fit(&x, &[5.0, 7.0]).unwrap();

        let mean = gp.predict(&array![[100.0]]).unwrap();
        assert_relative_eq!(mean[0], 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_large_alpha_shrinks_towards_zero() {
        let x = array![[0.0], [1.0], [2.0]];
        let mut gp = GaussianProcess::new(params(1.0, 1e6));
        gp.fit(&x, &[10.0, 10.0, 10.0]).unwrap();
        let pred = gp.predict(&x).unwrap();
        assert!(pred.iter().all(|p| p.abs() < 1e-3));
    }

    #[test]
    fn test_shape_errors() {
        let mut gp = GaussianProcess::new(params(1.0, 1e-3));
        assert!(matches!(
            gp.fit(&array![[0.0], [1.0]], &[1.0]),
            Err(ErosivityError::LengthMismatch { .. })
        ));
        gp.fit(&array![[0.0, 1.0], [1.0, 0.0]], &[1.0, 2.0]).unwrap();
        assert!(gp.predict(&array![[0.0]]).is_err());
    }

    #[test]
    fn test_log_marginal_likelihood_prefers_sensible_length_scale() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64 * 0.5);
        let y: Vec<f64> = x.column(0).iter().map(|v| (v * 0.3).sin()).collect();

        let lml = |ls: f64| {
            let mut gp = GaussianProcess::new(params(ls, 1e-4));
            gp.fit(&x, &y).unwrap();
            gp.log_marginal_likelihood().unwrap()
        };
        assert!(lml(2.0) > lml(0.01));
    }
}
