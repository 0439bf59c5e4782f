//! Gaussian naive Bayes.
//!
//! Per class: prior, per-feature mean and variance. Variances are smoothed by
//! `var_smoothing × (largest feature variance)` and floored so a constant
//! feature never divides by zero. Prediction precomputes
//! `-0.5 * ln(2π var)` and `1 / (2 var)`, so scoring a row is two
//! multiply-adds per feature per class followed by a softmax.
//!
//! A single-class fit is valid: it predicts that class with probability 1.0.

use std::f64::consts::PI;

use super::{check_rows, check_training_set, class_counts, Classifier, Model, ModelError};

/// Absolute variance floor applied after smoothing.
const VAR_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianNb {
    pub var_smoothing: f64,
}

impl Default for GaussianNb {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GaussianNbModel {
    classes: Vec<i8>,
    class_log_prior: Vec<f64>,
    /// Per-class feature means: [n_classes][n_features].
    theta: Vec<Vec<f64>>,
    /// Per-class feature variances after smoothing: [n_classes][n_features].
    var: Vec<Vec<f64>>,
    /// Precomputed -0.5 * ln(2π var).
    neg_half_log_var: Vec<Vec<f64>>,
    /// Precomputed 1 / (2 var).
    inv_2var: Vec<Vec<f64>>,
    n_features: usize,
}

impl GaussianNbModel {
    pub fn theta(&self) -> &[Vec<f64>] {
        &self.theta
    }

    pub fn var(&self) -> &[Vec<f64>] {
        &self.var
    }

    fn joint_log_likelihood(&self, row: &[f64]) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let mut log_prob = self.class_log_prior[c];
                for (i, &feat) in row.iter().enumerate() {
                    log_prob += self.neg_half_log_var[c][i]
                        - (feat - self.theta[c][i]).powi(2) * self.inv_2var[c][i];
                }
                log_prob
            })
            .collect()
    }
}

fn softmax(log_probs: &[f64]) -> Vec<f64> {
    let max = log_probs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = log_probs.iter().map(|&lp| (lp - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn mean_and_var<'a>(rows: impl Iterator<Item = &'a Vec<f64>>, width: usize) -> (Vec<f64>, Vec<f64>) {
    let rows: Vec<&Vec<f64>> = rows.collect();
    let n = rows.len() as f64;
    let mut mean = vec![0.0; width];
    for row in &rows {
        for (m, v) in mean.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut var = vec![0.0; width];
    for row in &rows {
        for ((s, v), m) in var.iter_mut().zip(row.iter()).zip(&mean) {
            *s += (v - m).powi(2);
        }
    }
    var.iter_mut().for_each(|s| *s /= n);
    (mean, var)
}

impl Classifier for GaussianNb {
    fn name(&self) -> &str {
        "gaussian_nb"
    }

    fn fit(&self, x: &[Vec<f64>], y: &[i8]) -> Result<Box<dyn Model>, ModelError> {
        let width = check_training_set(x, y)?;
        let counts = class_counts(y);
        let n = y.len() as f64;

        let (_, overall_var) = mean_and_var(x.iter(), width);
        let epsilon = self.var_smoothing * overall_var.iter().copied().fold(0.0, f64::max);

        let mut classes = Vec::with_capacity(counts.len());
        let mut class_log_prior = Vec::with_capacity(counts.len());
        let mut theta = Vec::with_capacity(counts.len());
        let mut var = Vec::with_capacity(counts.len());

        for (class, count) in counts {
            let members = x
                .iter()
                .zip(y)
                .filter(|(_, label)| **label == class)
                .map(|(row, _)| row);
            let (mean, class_var) = mean_and_var(members, width);
            classes.push(class);
            class_log_prior.push((count as f64 / n).ln());
            theta.push(mean);
            var.push(
                class_var
                    .into_iter()
                    .map(|v| (v + epsilon).max(VAR_FLOOR))
                    .collect::<Vec<f64>>(),
            );
        }

        let neg_half_log_var = var
            .iter()
            .map(|vs| vs.iter().map(|v| -0.5 * (2.0 * PI * v).ln()).collect())
            .collect();
        let inv_2var = var
            .iter()
            .map(|vs| vs.iter().map(|v| 1.0 / (2.0 * v)).collect())
            .collect();

        Ok(Box::new(GaussianNbModel {
            classes,
            class_log_prior,
            theta,
            var,
            neg_half_log_var,
            inv_2var,
            n_features: width,
        }))
    }
}

impl Model for GaussianNbModel {
    fn name(&self) -> &str {
        "gaussian_nb"
    }

    fn classes(&self) -> &[i8] {
        &self.classes
    }

    fn n_features_in(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        check_rows(x, self.n_features)?;
        if self.classes.len() == 1 {
            return Ok(vec![vec![1.0]; x.len()]);
        }
        Ok(x.iter()
            .map(|row| softmax(&self.joint_log_likelihood(row)))
            .collect())
    }
}
