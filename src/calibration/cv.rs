//! Cross-validated R² objective.

use ndarray::{Array2, Axis};

use super::split::Fold;
use crate::error::Result;
use crate::gp::{GaussianProcess, Hyperparameters};
use crate::maybe_rayon::*;
use crate::metrics::r2_score;

/// Fit on one fold's complement and score R² on its validation rows
pub fn fold_r2(x: &Array2<f64>, y: &[f64], params: Hyperparameters, fold: &Fold) -> Result<f64> {
    let x_fit = x.select(Axis(0), &fold.fit);
    let y_fit: Vec<f64> = fold.fit.iter().map(|&i| y[i]).collect();
    let x_val = x.select(Axis(0), &fold.validation);
    let y_val: Vec<f64> = fold.validation.iter().map(|&i| y[i]).collect();

    let mut model = GaussianProcess::new(params);
    model.fit(&x_fit, &y_fit)?;
    let predicted = model.predict(&x_val)?;
    r2_score(&y_val, &predicted)
}

/// Mean R² over `folds`; folds are scored in parallel.
///
/// Any failing fold fails the whole evaluation.
pub fn cross_val_r2(
    x: &Array2<f64>,
    y: &[f64],
    params: Hyperparameters,
    folds: &[Fold],
) -> Result<f64> {
    let scores: Vec<f64> = folds
        .par_iter()
        .map(|fold| fold_r2(x, y, params, fold))
        .collect::<Result<Vec<f64>>>()?;
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}
