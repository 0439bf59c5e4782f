//! Sigmoid (Platt) probability calibration with stratified k-fold cross-validation.
//!
//! For each fold the base classifier is fitted on the remaining folds and a
//! sigmoid is fitted to its held-out probabilities. Binary problems calibrate
//! the positive column only; multiclass problems calibrate every column
//! one-vs-rest and renormalize. The calibrated prediction is the mean over folds.
//!
//! Folds are assigned round-robin within each class, so every fold holds at
//! least one sample of every class whenever the minority class has at least
//! `folds` samples. Fewer than that is reported as infeasible.

use super::{check_rows, check_training_set, class_counts, Classifier, Model, ModelError};

const MAX_ITER: usize = 100;
const MIN_STEP: f64 = 1e-10;
const SIGMA: f64 = 1e-12;
const EPS: f64 = 1e-5;

/// Platt sigmoid `p = 1 / (1 + exp(a·s + b))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlattScaler {
    pub a: f64,
    pub b: f64,
}

impl PlattScaler {
    /// Fit by Newton's method with backtracking on regularized targets
    /// (Lin, Lin & Weng's formulation of Platt scaling).
    pub fn fit(scores: &[f64], positive: &[bool]) -> Self {
        let prior1 = positive.iter().filter(|&&p| p).count() as f64;
        let prior0 = positive.len() as f64 - prior1;
        let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
        let lo_target = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = positive
            .iter()
            .map(|&p| if p { hi_target } else { lo_target })
            .collect();

        let objective = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let f_apb = f * a + b;
                    if f_apb >= 0.0 {
                        t * f_apb + (-f_apb).exp().ln_1p()
                    } else {
                        (t - 1.0) * f_apb + f_apb.exp().ln_1p()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..MAX_ITER {
            let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &t) in scores.iter().zip(&targets) {
                let f_apb = f * a + b;
                let (p, q) = if f_apb >= 0.0 {
                    let e = (-f_apb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = f_apb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < EPS && g2.abs() < EPS {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (new_a, new_b) = (a + step * da, b + step * db);
                let new_f = objective(new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                break;
            }
        }

        Self { a, b }
    }

    pub fn predict(&self, score: f64) -> f64 {
        let f_apb = score * self.a + self.b;
        if f_apb >= 0.0 {
            let e = (-f_apb).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + f_apb.exp())
        }
    }
}

/// Calibrating wrapper around a base classifier.
pub struct SigmoidCalibrated<'a> {
    base: &'a dyn Classifier,
    folds: usize,
}

impl<'a> SigmoidCalibrated<'a> {
    pub fn new(base: &'a dyn Classifier, folds: usize) -> Self {
        Self { base, folds }
    }

    pub fn folds(&self) -> usize {
        self.folds
    }
}

#[derive(Debug)]
struct CalibratedFold {
    model: Box<dyn Model>,
    /// One scaler for the positive column (binary) or one per class.
    scalers: Vec<PlattScaler>,
}

#[derive(Debug)]
pub struct SigmoidCalibratedModel {
    name: String,
    classes: Vec<i8>,
    n_features: usize,
    folds: Vec<CalibratedFold>,
}

impl SigmoidCalibratedModel {
    pub fn fold_count(&self) -> usize {
        self.folds.len()
    }
}

/// Round-robin fold index per sample, stratified by class.
fn stratified_folds(y: &[i8], classes: &[i8], folds: usize) -> Vec<usize> {
    let mut assignment = vec![0; y.len()];
    for &class in classes {
        let members = y.iter().enumerate().filter(|(_, label)| **label == class);
        for (rank, (idx, _)) in members.enumerate() {
            assignment[idx] = rank % folds;
        }
    }
    assignment
}

fn calibrate(scalers: &[PlattScaler], probs: &[f64]) -> Vec<f64> {
    if probs.len() == 2 {
        let p1 = scalers[0].predict(probs[1]);
        return vec![1.0 - p1, p1];
    }
    let raw: Vec<f64> = scalers
        .iter()
        .zip(probs)
        .map(|(s, &p)| s.predict(p))
        .collect();
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.iter().map(|p| p / sum).collect()
    } else {
        vec![1.0 / raw.len() as f64; raw.len()]
    }
}

impl Classifier for SigmoidCalibrated<'_> {
    fn name(&self) -> &str {
        "sigmoid_calibrated"
    }

    fn fit(&self, x: &[Vec<f64>], y: &[i8]) -> Result<Box<dyn Model>, ModelError> {
        let width = check_training_set(x, y)?;
        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(ModelError::Infeasible(
                "calibration needs at least two classes".into(),
            ));
        }
        if self.folds < 2 {
            return Err(ModelError::Infeasible(format!(
                "calibration needs at least 2 folds, got {}",
                self.folds
            )));
        }
        let minority = counts.iter().map(|(_, n)| *n).min().unwrap_or(0);
        if minority < self.folds {
            return Err(ModelError::Infeasible(format!(
                "minority class has {minority} samples, fewer than {} folds",
                self.folds
            )));
        }

        let classes: Vec<i8> = counts.iter().map(|(c, _)| *c).collect();
        let assignment = stratified_folds(y, &classes, self.folds);

        let mut fitted = Vec::with_capacity(self.folds);
        for k in 0..self.folds {
            let (mut train_x, mut train_y) = (Vec::new(), Vec::new());
            let (mut test_x, mut test_y) = (Vec::new(), Vec::new());
            for (i, &fold) in assignment.iter().enumerate() {
                if fold == k {
                    test_x.push(x[i].clone());
                    test_y.push(y[i]);
                } else {
                    train_x.push(x[i].clone());
                    train_y.push(y[i]);
                }
            }

            let model = self.base.fit(&train_x, &train_y)?;
            if model.classes() != classes.as_slice() {
                return Err(ModelError::Infeasible(format!(
                    "fold {k} saw classes {:?}, expected {classes:?}",
                    model.classes()
                )));
            }
            let held_out = model.predict_proba(&test_x)?;

            let calibrated_columns: Vec<usize> = if classes.len() == 2 {
                vec![1]
            } else {
                (0..classes.len()).collect()
            };
            let scalers = calibrated_columns
                .into_iter()
                .map(|col| {
                    let scores: Vec<f64> = held_out.iter().map(|p| p[col]).collect();
                    let positive: Vec<bool> = test_y.iter().map(|&l| l == classes[col]).collect();
                    PlattScaler::fit(&scores, &positive)
                })
                .collect();

            fitted.push(CalibratedFold { model, scalers });
        }

        Ok(Box::new(SigmoidCalibratedModel {
            name: format!("{}+sigmoid(k={})", self.base.name(), self.folds),
            classes,
            n_features: width,
            folds: fitted,
        }))
    }
}

impl Model for SigmoidCalibratedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn classes(&self) -> &[i8] {
        &self.classes
    }

    fn n_features_in(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        check_rows(x, self.n_features)?;
        let mut mean = vec![vec![0.0; self.classes.len()]; x.len()];
        for fold in &self.folds {
            let probs = fold.model.predict_proba(x)?;
            for (acc, row) in mean.iter_mut().zip(&probs) {
                for (a, p) in acc.iter_mut().zip(calibrate(&fold.scalers, row)) {
                    *a += p;
                }
            }
        }
        let n = self.folds.len() as f64;
        for row in &mut mean {
            row.iter_mut().for_each(|p| *p /= n);
        }
        Ok(mean)
    }
}
