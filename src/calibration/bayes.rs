//! Sequential Bayesian optimisation over (length_scale, alpha).
//!
//! The loop carries an observation history. The first `init_points`
//! candidates are drawn at random; each refinement step then refits a
//! Gaussian-process surrogate to every successful observation and evaluates
//! the random candidate with the highest acquisition value.
//!
//! Both hyperparameters span several orders of magnitude, so candidates are
//! drawn log-uniformly and the surrogate works on log10 coordinates scaled
//! to the unit square.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{Acquisition, CalibrationConfig};
use crate::error::{ErosivityError, Result};
use crate::gp::{GaussianProcess, Hyperparameters};
use crate::logging::log_evaluation;

/// Length scales tried for the surrogate, in unit-square coordinates
const SURROGATE_LENGTH_SCALES: [f64; 5] = [0.05, 0.1, 0.2, 0.5, 1.0];
const SURROGATE_ALPHA: f64 = 1e-6;

/// Shared flag for stopping a running search from another thread
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Search interval of each hyperparameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub length_scale: (f64, f64),
    pub alpha: (f64, f64),
}

impl SearchBounds {
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            length_scale: config.length_scale_bounds,
            alpha: config.alpha_bounds,
        }
    }

    fn axes(&self) -> [(f64, f64); 2] {
        [self.length_scale, self.alpha]
    }

    /// Map a point of the unit square to hyperparameters
    pub fn from_unit(&self, unit: [f64; 2]) -> Hyperparameters {
        let [ls, alpha] = self.axes().map(|(lo, hi)| (lo.log10(), hi.log10()));
        let scale = |(lo, hi): (f64, f64), u: f64| 10f64.powf(lo + u * (hi - lo));
        Hyperparameters {
            length_scale: scale(ls, unit[0]),
            alpha: scale(alpha, unit[1]),
        }
    }

    /// Inverse of [`SearchBounds::from_unit`]
    pub fn to_unit(&self, params: Hyperparameters) -> [f64; 2] {
        let position = |(lo, hi): (f64, f64), v: f64| {
            let (lo, hi) = (lo.log10(), hi.log10());
            if hi > lo {
                (v.log10() - lo) / (hi - lo)
            } else {
                0.0
            }
        };
        [
            position(self.length_scale, params.length_scale),
            position(self.alpha, params.alpha),
        ]
    }

    pub fn contains(&self, params: Hyperparameters) -> bool {
        let inside = |(lo, hi): (f64, f64), v: f64| v >= lo * (1.0 - 1e-9) && v <= hi * (1.0 + 1e-9);
        inside(self.length_scale, params.length_scale) && inside(self.alpha, params.alpha)
    }
}

/// One objective evaluation; `score` is `None` when it failed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub params: Hyperparameters,
    pub score: Option<f64>,
}

/// Best point found by a completed search
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub best: Hyperparameters,
    pub best_score: f64,
    pub evaluations: usize,
    pub failures: usize,
}

/// Sequential model-based optimiser
pub struct BayesianOptimizer {
    bounds: SearchBounds,
    init_points: usize,
    refinement_iters: usize,
    acquisition: Acquisition,
    acquisition_samples: usize,
    rng: StdRng,
    history: Vec<Observation>,
    cancel: Option<CancellationToken>,
}

impl BayesianOptimizer {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            bounds: SearchBounds::from_config(config),
            init_points: config.init_points,
            refinement_iters: config.refinement_iters,
            acquisition: config.acquisition,
            acquisition_samples: config.acquisition_samples.max(1),
            rng: StdRng::seed_from_u64(config.random_seed),
            history: Vec::new(),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn bounds(&self) -> SearchBounds {
        self.bounds
    }

    /// Every evaluation so far, in order
    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    /// Best successful observation so far
    pub fn best(&self) -> Option<(Hyperparameters, f64)> {
        self.history
            .iter()
            .filter_map(|o| o.score.map(|s| (o.params, s)))
            .fold(None, |best, (p, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((p, s)),
            })
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Maximise `objective` over the search bounds.
    ///
    /// A failing or non-finite evaluation is kept in the history with no
    /// score. Cancellation is checked before and after every evaluation; an
    /// evaluation that finishes after cancellation is discarded, and the
    /// best-so-far stays available through [`BayesianOptimizer::best`].
    #[instrument(skip_all, fields(init_points = self.init_points, refinement_iters = self.refinement_iters))]
    pub fn maximize<F>(&mut self, mut objective: F) -> Result<SearchOutcome>
    where
        F: FnMut(Hyperparameters) -> Result<f64>,
    {
        let total = self.init_points + self.refinement_iters;
        let mut last_error = None;

        for index in 0..total {
            if self.cancelled() {
                return Err(ErosivityError::Cancelled {
                    completed: self.history.len(),
                });
            }

            let candidate = if index < self.init_points {
                self.random_candidate()
            } else {
                self.suggest()
            };

            let result = objective(candidate);

            if self.cancelled() {
                return Err(ErosivityError::Cancelled {
                    completed: self.history.len(),
                });
            }

            let score = match result {
                Ok(score) if score.is_finite() => Some(score),
                Ok(score) => {
                    last_error = Some(ErosivityError::Degenerate {
                        metric: "objective",
                        message: format!("non-finite score {}", score),
                    });
                    None
                }
                Err(e) => {
                    last_error = Some(e);
                    None
                }
            };
            log_evaluation(index, candidate.length_scale, candidate.alpha, score);
            self.history.push(Observation {
                params: candidate,
                score,
            });
        }

        let failures = self.history.iter().filter(|o| o.score.is_none()).count();
        match self.best() {
            Some((best, best_score)) => {
                info!(
                    length_scale = best.length_scale,
                    alpha = best.alpha,
                    score = best_score,
                    evaluations = self.history.len(),
                    failures = failures,
                    "Search finished"
                );
                Ok(SearchOutcome {
                    best,
                    best_score,
                    evaluations: self.history.len(),
                    failures,
                })
            }
            None => Err(last_error.unwrap_or(ErosivityError::EmptyInput {
                context: "hyperparameter search ran no evaluations".to_string(),
            })),
        }
    }

    fn random_unit(&mut self) -> [f64; 2] {
        [self.rng.gen::<f64>(), self.rng.gen::<f64>()]
    }

    fn random_candidate(&mut self) -> Hyperparameters {
        let unit = self.random_unit();
        self.bounds.from_unit(unit)
    }

    /// Next candidate from the surrogate, or a random one if it cannot be fitted
    fn suggest(&mut self) -> Hyperparameters {
        let surrogate = match self.fit_surrogate() {
            Ok(Some(surrogate)) => surrogate,
            Ok(None) => return self.random_candidate(),
            Err(e) => {
                warn!(error = %e, "Surrogate fit failed; sampling at random");
                return self.random_candidate();
            }
        };

        let candidates: Vec<[f64; 2]> = (0..self.acquisition_samples)
            .map(|_| self.random_unit())
            .collect();
        let x = Array2::from_shape_fn((candidates.len(), 2), |(i, j)| candidates[i][j]);

        let best_score = self.best().map(|(_, s)| s).unwrap_or(f64::NEG_INFINITY);
        match self.score_candidates(&surrogate, &x, best_score) {
            Ok(values) => {
                let chosen = values
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                        if v > bv {
                            (i, v)
                        } else {
                            (bi, bv)
                        }
                    })
                    .0;
                debug!(acquisition = values[chosen], "Refinement candidate chosen");
                self.bounds.from_unit(candidates[chosen])
            }
            Err(e) => {
                warn!(error = %e, "Acquisition failed; sampling at random");
                self.random_candidate()
            }
        }
    }

    fn score_candidates(
        &self,
        surrogate: &GaussianProcess,
        x: &Array2<f64>,
        best_score: f64,
    ) -> Result<Vec<f64>> {
        let (mean, std) = surrogate.predict_with_std(x)?;
        match self.acquisition {
            Acquisition::Ucb { kappa } => Ok(upper_confidence_bound(&mean, &std, kappa)),
            Acquisition::Ei { xi } => expected_improvement(&mean, &std, best_score, xi),
        }
    }

    /// Surrogate GP over successful observations, with the length scale of
    /// highest marginal likelihood. `None` below two observations.
    fn fit_surrogate(&self) -> Result<Option<GaussianProcess>> {
        let observed: Vec<([f64; 2], f64)> = self
            .history
            .iter()
            .filter_map(|o| o.score.map(|s| (self.bounds.to_unit(o.params), s)))
            .collect();
        if observed.len() < 2 {
            return Ok(None);
        }

        let x = Array2::from_shape_fn((observed.len(), 2), |(i, j)| observed[i].0[j]);
        let y: Vec<f64> = observed.iter().map(|(_, s)| *s).collect();

        let mut best: Option<(GaussianProcess, f64)> = None;
        let mut last_error = None;
        for &length_scale in &SURROGATE_LENGTH_SCALES {
            let mut gp = GaussianProcess::new(Hyperparameters {
                length_scale,
                alpha: SURROGATE_ALPHA,
            })
            .with_normalized_target(true);
            if let Err(e) = gp.fit(&x, &y) {
                last_error = Some(e);
                continue;
            }
            let lml = gp.log_marginal_likelihood()?;
            if best.as_ref().map_or(true, |(_, b)| lml > *b) {
                best = Some((gp, lml));
            }
        }

        match (best, last_error) {
            (Some((gp, _)), _) => Ok(Some(gp)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(None),
        }
    }
}

/// `μ + κσ`
pub fn upper_confidence_bound(mean: &[f64], std: &[f64], kappa: f64) -> Vec<f64> {
    mean.iter().zip(std).map(|(m, s)| m + kappa * s).collect()
}

/// Expected improvement of each candidate over `best + xi`
pub fn expected_improvement(mean: &[f64], std: &[f64], best: f64, xi: f64) -> Result<Vec<f64>> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| ErosivityError::InvalidParameter {
        param: "normal".to_string(),
        message: e.to_string(),
    })?;
    Ok(mean
        .iter()
        .zip(std)
        .map(|(&m, &s)| {
            let improvement = m - best - xi;
            if s <= 0.0 {
                return improvement.max(0.0);
            }
            let z = improvement / s;
            improvement * normal.cdf(z) + s * normal.pdf(z)
        })
        .collect())
}
