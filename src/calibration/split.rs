//! Seeded train/test and k-fold partitions of row indices.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::{ErosivityError, Result};

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and hold out `ceil(test_fraction * n)` rows.
///
/// Both sides must end up non-empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ErosivityError::InvalidParameter {
            param: "test_fraction".to_string(),
            message: format!("must be in (0, 1), got {}", test_fraction),
        });
    }

    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(ErosivityError::EmptyInput {
            context: format!(
                "{} rows cannot be split with test_fraction {}",
                n, test_fraction
            ),
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}

/// One cross-validation fold, as positions into the training rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub fit: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffled k-fold partitioner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Partition `0..n` into `n_splits` disjoint validation sets.
    ///
    /// The first `n % n_splits` folds get one extra row.
    pub fn split(&self, n: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(ErosivityError::InvalidParameter {
                param: "cv_folds".to_string(),
                message: format!("must be at least 2, got {}", self.n_splits),
            });
        }
        if n < self.n_splits {
            return Err(ErosivityError::InsufficientData {
                rows: n,
                folds: self.n_splits,
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for k in 0..self.n_splits {
            let size = base + usize::from(k < extra);
            let end = start + size;
            let validation = order[start..end].to_vec();
            let fit = order[..start].iter().chain(&order[end..]).copied().collect();
            folds.push(Fold { fit, validation });
            start = end;
        }
        Ok(folds)
    }
}
