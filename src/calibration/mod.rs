//! Gaussian-process calibration.
//!
//! [`Calibrator`] runs four stages in a fixed order:
//!
//! 1. **split**: seeded train/test partition of the rows
//! 2. **search**: Bayesian search of (length_scale, alpha) maximising the
//!    k-fold cross-validated R² on the training rows
//! 3. **fit**: one regressor at the best point, fitted on all training rows
//! 4. **evaluate**: skill of train and test predictions
//!
//! A stage called out of order returns [`ErosivityError::Sequencing`]. A
//! failing stage moves the calibrator to a terminal failed state and drops
//! any fitted model.

pub mod bayes;
pub mod cv;
pub mod split;

use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

use crate::config::CalibrationConfig;
use crate::dataset::Dataset;
use crate::error::{ErosivityError, Result};
use crate::gp::{GaussianProcess, Hyperparameters};
use crate::logging::{log_error, log_operation_end, log_operation_start, log_timed_operation};
use crate::metrics::{skill_report, SkillReport};

pub use bayes::{BayesianOptimizer, CancellationToken, Observation, SearchBounds, SearchOutcome};
pub use cv::cross_val_r2;
pub use split::{train_test_split, Fold, KFold, TrainTestSplit};

/// Calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    New,
    Split,
    Searched,
    Fitted,
    Evaluated,
    Failed,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::New => "new",
            Stage::Split => "split",
            Stage::Searched => "searched",
            Stage::Fitted => "fitted",
            Stage::Evaluated => "evaluated",
            Stage::Failed => "failed",
        }
    }
}

/// Train and test skill of the fitted model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub train: SkillReport,
    pub test: SkillReport,
}

/// Summary of a completed calibration run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub hyperparameters: Hyperparameters,
    pub best_cv_r2: f64,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train: SkillReport,
    pub test: SkillReport,
    pub generated_at: DateTime<Utc>,
}

pub struct Calibrator {
    config: CalibrationConfig,
    x: Array2<f64>,
    y: Vec<f64>,
    stage: Stage,
    split: Option<TrainTestSplit>,
    search: Option<SearchOutcome>,
    history: Vec<Observation>,
    model: Option<GaussianProcess>,
    evaluation: Option<Evaluation>,
    cancel: Option<CancellationToken>,
}

impl Calibrator {
    /// Calibrator over feature rows `x` and labels `y`.
    ///
    /// All values must be finite and no label may be zero, where percentage
    /// bias is undefined; filter missing and below-floor rows beforehand.
    pub fn new(x: Array2<f64>, y: Vec<f64>, config: CalibrationConfig) -> Result<Self> {
        config.validate()?;
        if x.nrows() != y.len() {
            return Err(ErosivityError::LengthMismatch {
                left: x.nrows(),
                right: y.len(),
            });
        }
        if y.is_empty() || x.ncols() == 0 {
            return Err(ErosivityError::EmptyInput {
                context: "calibration data".to_string(),
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ErosivityError::InvalidParameter {
                param: "calibration data".to_string(),
                message: "contains missing or non-finite values".to_string(),
            });
        }
        if let Some(row) = y.iter().position(|&v| v == 0.0) {
            return Err(ErosivityError::InvalidParameter {
                param: "label".to_string(),
                message: format!("label is zero at row {row}; percentage bias is undefined"),
            });
        }

        Ok(Self {
            config,
            x,
            y,
            stage: Stage::New,
            split: None,
            search: None,
            history: Vec::new(),
            model: None,
            evaluation: None,
            cancel: None,
        })
    }

    /// Calibrator over named columns of a dataset
    pub fn from_dataset(
        dataset: &Dataset,
        features: &[&str],
        label: &str,
        config: CalibrationConfig,
    ) -> Result<Self> {
        let x = dataset.feature_matrix(features)?;
        let y = dataset.numeric(label)?.to_vec();
        Self::new(x, y, config)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn train_test(&self) -> Option<&TrainTestSplit> {
        self.split.as_ref()
    }

    /// Selected hyperparameters, once the search has completed
    pub fn hyperparameters(&self) -> Option<Hyperparameters> {
        self.search.map(|s| s.best)
    }

    /// Every objective evaluation of the search, including a cancelled one
    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    pub fn model(&self) -> Option<&GaussianProcess> {
        self.model.as_ref()
    }

    fn expect_stage(&self, expected: Stage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ErosivityError::Sequencing {
                expected: expected.name(),
                found: self.stage.name(),
            })
        }
    }

    fn fail<T>(&mut self, operation: &str, error: ErosivityError) -> Result<T> {
        log_error(&error, operation);
        self.stage = Stage::Failed;
        self.model = None;
        Err(error)
    }

    fn train_data(&self, split: &TrainTestSplit) -> (Array2<f64>, Vec<f64>) {
        (
            self.x.select(Axis(0), &split.train),
            split.train.iter().map(|&i| self.y[i]).collect(),
        )
    }

    /// Stage 1: seeded train/test partition
    pub fn split(&mut self) -> Result<&TrainTestSplit> {
        self.expect_stage(Stage::New)?;
        match train_test_split(
            self.y.len(),
            self.config.test_fraction,
            self.config.random_seed,
        ) {
            Ok(split) => {
                info!(
                    train_rows = split.train.len(),
                    test_rows = split.test.len(),
                    seed = self.config.random_seed,
                    "Data split"
                );
                self.stage = Stage::Split;
                Ok(&*self.split.insert(split))
            }
            Err(e) => self.fail("split", e),
        }
    }

    /// Stage 2: Bayesian search for the hyperparameters with the best
    /// cross-validated R²
    pub fn search(&mut self) -> Result<SearchOutcome> {
        self.expect_stage(Stage::Split)?;
        let Some(split) = self.split.clone() else {
            return self.fail("search", ErosivityError::NotFitted);
        };

        let start = Instant::now();
        log_operation_start(
            "search",
            Some(&format!(
                "{} initial + {} refinement points, {}-fold CV",
                self.config.init_points, self.config.refinement_iters, self.config.cv_folds
            )),
        );

        let (x_train, y_train) = self.train_data(&split);
        let folds = match KFold::new(self.config.cv_folds, self.config.random_seed)
            .split(y_train.len())
        {
            Ok(folds) => folds,
            Err(e) => return self.fail("search", e),
        };

        let mut optimizer = BayesianOptimizer::new(&self.config);
        if let Some(token) = &self.cancel {
            optimizer = optimizer.with_cancellation(token.clone());
        }
        let result = optimizer.maximize(|params| cross_val_r2(&x_train, &y_train, params, &folds));
        self.history = optimizer.history().to_vec();

        match result {
            Ok(outcome) => {
                log_operation_end("search", start, outcome.failures == 0);
                self.search = Some(outcome);
                self.stage = Stage::Searched;
                Ok(outcome)
            }
            Err(e) => {
                log_operation_end("search", start, false);
                self.fail("search", e)
            }
        }
    }

    /// Stage 3: fit one regressor at the selected point on all training rows
    pub fn fit(&mut self) -> Result<&GaussianProcess> {
        self.expect_stage(Stage::Searched)?;
        let (Some(split), Some(outcome)) = (self.split.clone(), self.search) else {
            return self.fail("fit", ErosivityError::NotFitted);
        };

        let (x_train, y_train) = self.train_data(&split);
        let mut model = GaussianProcess::new(outcome.best);
        match log_timed_operation("fit", || model.fit(&x_train, &y_train)) {
            Ok(()) => {
                self.stage = Stage::Fitted;
                Ok(&*self.model.insert(model))
            }
            Err(e) => self.fail("fit", e),
        }
    }

    /// Stage 4: skill of the fitted model on the train and test rows
    pub fn evaluate(&mut self) -> Result<Evaluation> {
        self.expect_stage(Stage::Fitted)?;
        match self.score() {
            Ok(evaluation) => {
                info!(
                    train_nse = evaluation.train.nse,
                    test_nse = evaluation.test.nse,
                    train_correlation = evaluation.train.correlation,
                    test_correlation = evaluation.test.correlation,
                    "Model evaluated"
                );
                self.evaluation = Some(evaluation);
                self.stage = Stage::Evaluated;
                Ok(evaluation)
            }
            Err(e) => self.fail("evaluate", e),
        }
    }

    fn score(&self) -> Result<Evaluation> {
        let model = self.model.as_ref().ok_or(ErosivityError::NotFitted)?;
        let split = self.split.as_ref().ok_or(ErosivityError::NotFitted)?;

        let report_for = |rows: &[usize]| -> Result<SkillReport> {
            let x = self.x.select(Axis(0), rows);
            let observed: Vec<f64> = rows.iter().map(|&i| self.y[i]).collect();
            let predicted = model.predict(&x)?;
            skill_report(&observed, &predicted)
        };

        Ok(Evaluation {
            train: report_for(&split.train)?,
            test: report_for(&split.test)?,
        })
    }

    /// Report of an evaluated calibration
    pub fn report(&self) -> Result<CalibrationReport> {
        self.expect_stage(Stage::Evaluated)?;
        match (&self.split, self.search, self.evaluation) {
            (Some(split), Some(search), Some(evaluation)) => Ok(CalibrationReport {
                hyperparameters: search.best,
                best_cv_r2: search.best_score,
                evaluations: search.evaluations,
                failed_evaluations: search.failures,
                train_rows: split.train.len(),
                test_rows: split.test.len(),
                train: evaluation.train,
                test: evaluation.test,
                generated_at: Utc::now(),
            }),
            _ => Err(ErosivityError::NotFitted),
        }
    }

    /// Run all four stages
    pub fn run(&mut self) -> Result<CalibrationReport> {
        self.split()?;
        self.search()?;
        self.fit()?;
        self.evaluate()?;
        self.report()
    }
}
