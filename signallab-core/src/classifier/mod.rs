//! Classifier capability: fit on labelled feature rows, predict class probabilities.
//!
//! - [`Classifier`] fits a [`Model`] from `(X, y)`.
//! - [`Model`] exposes `predict`, `predict_proba`, its class list and the
//!   feature width it was trained on.
//! - [`FitStrategy`] lists the fitting attempts tried in order by
//!   [`fit_with_fallback`]; the plain fit is terminal.
//!
//! Labels are the sign of a forward return: -1, 0 or +1.

mod calibrated;
mod gaussian_nb;

pub use calibrated::{PlattScaler, SigmoidCalibrated, SigmoidCalibratedModel};
pub use gaussian_nb::{GaussianNb, GaussianNbModel};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Class label used for an upward forward return.
pub const UP_CLASS: i8 = 1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("empty training set")]
    EmptyTrainingSet,

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("row {row} has {found} features, expected {expected}")]
    FeatureCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row} contains a non-finite value")]
    NonFinite { row: usize },

    #[error("fit infeasible: {0}")]
    Infeasible(String),
}

/// A fitted model.
pub trait Model: Send + Sync + fmt::Debug {
    /// Model name for logs and signal provenance.
    fn name(&self) -> &str;

    /// Sorted class labels; `predict_proba` columns follow this order.
    fn classes(&self) -> &[i8];

    /// Feature width seen at fit time.
    fn n_features_in(&self) -> usize;

    /// Per-row class probabilities.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError>;

    /// Most probable class per row.
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<i8>, ModelError> {
        let classes = self.classes();
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|probs| {
                let best = probs
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| {
                        if p > acc.1 {
                            (i, p)
                        } else {
                            acc
                        }
                    })
                    .0;
                classes[best]
            })
            .collect())
    }

    /// Probability mass of `class` for a single row; 0.0 when the model never saw it.
    fn probability_of(&self, row: &[f64], class: i8) -> Result<f64, ModelError> {
        let Some(idx) = self.classes().iter().position(|&c| c == class) else {
            return Ok(0.0);
        };
        let probs = self.predict_proba(&[row.to_vec()])?;
        Ok(probs.first().and_then(|p| p.get(idx)).copied().unwrap_or(0.0))
    }
}

/// Fits models.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, x: &[Vec<f64>], y: &[i8]) -> Result<Box<dyn Model>, ModelError>;
}

/// One fitting attempt in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStrategy {
    /// Sigmoid-calibrated fit with stratified k-fold cross-validation.
    Calibrated { folds: usize },
    /// Uncalibrated fit of the base classifier.
    Plain,
}

impl fmt::Display for FitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calibrated { folds } => write!(f, "calibrated(k={folds})"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

impl FitStrategy {
    pub fn fit(
        &self,
        base: &dyn Classifier,
        x: &[Vec<f64>],
        y: &[i8],
    ) -> Result<Box<dyn Model>, ModelError> {
        match *self {
            Self::Calibrated { folds } => SigmoidCalibrated::new(base, folds).fit(x, y),
            Self::Plain => base.fit(x, y),
        }
    }
}

/// Try each strategy in order; the first successful fit wins.
///
/// Returns the model with the strategy that produced it, or the last error.
pub fn fit_with_fallback(
    base: &dyn Classifier,
    strategies: &[FitStrategy],
    x: &[Vec<f64>],
    y: &[i8],
) -> Result<(Box<dyn Model>, FitStrategy), ModelError> {
    let mut last_err = ModelError::Infeasible("no fit strategies configured".into());
    for strategy in strategies {
        match strategy.fit(base, x, y) {
            Ok(model) => return Ok((model, *strategy)),
            Err(e) => {
                debug!(%strategy, error = %e, "fit strategy failed, trying next");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Validate a training matrix and return its feature width.
pub(crate) fn check_training_set(x: &[Vec<f64>], y: &[i8]) -> Result<usize, ModelError> {
    if x.is_empty() || y.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if x.len() != y.len() {
        return Err(ModelError::LengthMismatch {
            features: x.len(),
            labels: y.len(),
        });
    }
    let width = x[0].len();
    check_rows(x, width)?;
    Ok(width)
}

/// Validate prediction rows against the fitted width.
pub(crate) fn check_rows(x: &[Vec<f64>], width: usize) -> Result<(), ModelError> {
    for (row, values) in x.iter().enumerate() {
        if values.len() != width {
            return Err(ModelError::FeatureCount {
                row,
                expected: width,
                found: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite { row });
        }
    }
    Ok(())
}

/// Sorted distinct labels with their counts.
pub(crate) fn class_counts(y: &[i8]) -> Vec<(i8, usize)> {
    let mut counts: Vec<(i8, usize)> = Vec::new();
    for &label in y {
        match counts.iter_mut().find(|(c, _)| *c == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }
    counts.sort_by_key(|(c, _)| *c);
    counts
}
