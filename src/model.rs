//! Baseline model trainer: ordinary least squares for claim amounts and
//! logistic regression for claim occurrence, with held-out evaluation.
//!
//! These are comparison points, not production pricing models: simple,
//! reproducible fits a more sophisticated approach has to beat. Fitting is
//! closed-form (normal equations, Cholesky solve) for the regression and
//! full-batch gradient descent for the classifier; the train/test split is a
//! seeded shuffle so every run of the same config reproduces the same
//! metrics.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::ModelError;
use crate::hypothesis::rank_with_ties;
use crate::record::PolicyRecord;
use crate::schema;

/// Columns of [`FeatureTable::from_records`] that are prediction targets, not
/// features. Training never leaks one target into another's feature set.
pub const TARGET_COLUMNS: [&str; 3] = ["TotalClaims", "ClaimSeverity", "ClaimOccurred"];

/// Fewest usable rows a fit will accept.
const MIN_FIT_ROWS: usize = 20;

/// A named-column numeric table. Missing values are NaN; imputation happens
/// at fit time from the training split.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    /// Row-major, one inner vec per record.
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Build the standard modeling table: numeric fields, one-hot encodings
    /// of the low-cardinality dimensions (levels discovered from the data,
    /// sorted for determinism), and the three target columns.
    pub fn from_records(records: &[PolicyRecord]) -> FeatureTable {
        let one_hot_specs: [(&str, fn(&PolicyRecord) -> Option<&String>); 4] = [
            (schema::PROVINCE, |r| r.province.as_ref()),
            (schema::GENDER, |r| r.gender.as_ref()),
            (schema::VEHICLE_TYPE, |r| r.vehicle_type.as_ref()),
            (schema::COVER_TYPE, |r| r.cover_type.as_ref()),
        ];

        // Discover levels per encoded dimension.
        let mut levels: Vec<Vec<String>> = vec![Vec::new(); one_hot_specs.len()];
        for r in records {
            for (i, (_, get)) in one_hot_specs.iter().enumerate() {
                if let Some(v) = get(r) {
                    if !levels[i].contains(v) {
                        levels[i].push(v.clone());
                    }
                }
            }
        }
        for lv in &mut levels {
            lv.sort();
        }

        let mut columns: Vec<String> = vec![
            schema::SUM_INSURED.to_string(),
            schema::CUSTOM_VALUE_ESTIMATE.to_string(),
            schema::REGISTRATION_YEAR.to_string(),
            schema::CALCULATED_PREMIUM_PER_TERM.to_string(),
        ];
        for (i, (name, _)) in one_hot_specs.iter().enumerate() {
            for level in &levels[i] {
                columns.push(format!("{name}={level}"));
            }
        }
        columns.extend(TARGET_COLUMNS.iter().map(|c| c.to_string()));

        let missing = f64::NAN;
        let rows: Vec<Vec<f64>> = records
            .iter()
            .map(|r| {
                let mut row = vec![
                    r.sum_insured.unwrap_or(missing),
                    r.custom_value_estimate.unwrap_or(missing),
                    r.registration_year.map(f64::from).unwrap_or(missing),
                    r.premium_per_term.unwrap_or(missing),
                ];
                for (i, (_, get)) in one_hot_specs.iter().enumerate() {
                    let value = get(r);
                    for level in &levels[i] {
                        row.push(if value == Some(level) { 1.0 } else { 0.0 });
                    }
                }
                row.push(r.total_claims.unwrap_or(missing));
                row.push(r.claim_severity().unwrap_or(missing));
                row.push(if r.claim_occurred() { 1.0 } else { 0.0 });
                row
            })
            .collect();

        FeatureTable { columns, rows }
    }
}

/// Deterministic split/fit knobs.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub seed: u64,
    pub test_fraction: f64,
    /// Gradient-descent step size (classifier only).
    pub learning_rate: f64,
    /// Gradient-descent iteration cap (classifier only).
    pub max_iter: usize,
}

impl TrainConfig {
    pub fn canonical() -> Self {
        TrainConfig { seed: 42, test_fraction: 0.2, learning_rate: 0.1, max_iter: 500 }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    /// Coefficient of determination on the held-out split; 0 when the
    /// held-out target is constant.
    pub r2: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClassificationMetrics {
    /// Rank-based area under the ROC curve.
    pub auc: f64,
    pub accuracy: f64,
    pub log_loss: f64,
}

/// A fitted least-squares baseline plus its held-out evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct RegressionBaseline {
    pub target: String,
    pub feature_names: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Training-split feature means, used to impute missing inputs.
    pub feature_means: Vec<f64>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: RegressionMetrics,
}

impl RegressionBaseline {
    /// Predict one row given features in `feature_names` order; NaN inputs
    /// are imputed with the training means.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut y = self.intercept;
        for (i, &w) in self.coefficients.iter().enumerate() {
            let x = features.get(i).copied().unwrap_or(f64::NAN);
            let x = if x.is_nan() { self.feature_means[i] } else { x };
            y += w * x;
        }
        y
    }
}

/// A fitted logistic baseline plus its held-out evaluation. Coefficients are
/// in standardized feature space; `predict_proba` applies the stored scaling.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationBaseline {
    pub target: String,
    pub feature_names: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: ClassificationMetrics,
}

impl ClassificationBaseline {
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let mut z = self.intercept;
        for (i, &w) in self.coefficients.iter().enumerate() {
            let x = features.get(i).copied().unwrap_or(f64::NAN);
            let x = if x.is_nan() { self.feature_means[i] } else { x };
            z += w * (x - self.feature_means[i]) / self.feature_stds[i];
        }
        sigmoid(z)
    }
}

// ── Fitting ─────────────────────────────────────────────────────────────────

/// Rows the target is present on, shuffled and split. Feature columns are
/// every non-target column except the target itself.
struct Prepared {
    feature_names: Vec<String>,
    feature_cols: Vec<usize>,
    train: Vec<usize>,
    test: Vec<usize>,
}

fn prepare(
    table: &FeatureTable,
    target: &str,
    config: &TrainConfig,
) -> Result<(Prepared, usize), ModelError> {
    let target_col = table
        .column_index(target)
        .ok_or_else(|| ModelError::UnknownColumn(target.to_string()))?;

    let feature_cols: Vec<usize> = (0..table.columns.len())
        .filter(|&i| i != target_col && !TARGET_COLUMNS.contains(&table.columns[i].as_str()))
        .collect();
    let feature_names: Vec<String> =
        feature_cols.iter().map(|&i| table.columns[i].clone()).collect();

    let mut usable: Vec<usize> = (0..table.rows.len())
        .filter(|&i| !table.rows[i][target_col].is_nan())
        .collect();
    if usable.len() < MIN_FIT_ROWS {
        return Err(ModelError::TooFewRows { rows: usable.len(), required: MIN_FIT_ROWS });
    }

    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
    usable.shuffle(&mut rng);
    let n_test = ((usable.len() as f64 * config.test_fraction).round() as usize)
        .clamp(1, usable.len() - 1);
    let test = usable.split_off(usable.len() - n_test);

    debug!(column = target, train = usable.len(), test = test.len(), "prepared split");
    Ok((Prepared { feature_names, feature_cols, train: usable, test }, target_col))
}

/// Column means over the training rows, NaN-skipping; an all-missing column
/// imputes to zero.
fn train_means(table: &FeatureTable, prep: &Prepared) -> Vec<f64> {
    prep.feature_cols
        .iter()
        .map(|&c| {
            let (mut sum, mut n) = (0.0, 0usize);
            for &r in &prep.train {
                let v = table.rows[r][c];
                if !v.is_nan() {
                    sum += v;
                    n += 1;
                }
            }
            if n > 0 { sum / n as f64 } else { 0.0 }
        })
        .collect()
}

fn imputed_row(table: &FeatureTable, prep: &Prepared, means: &[f64], row: usize) -> Vec<f64> {
    prep.feature_cols
        .iter()
        .enumerate()
        .map(|(j, &c)| {
            let v = table.rows[row][c];
            if v.is_nan() { means[j] } else { v }
        })
        .collect()
}

/// Fit an ordinary-least-squares baseline for a continuous target and
/// evaluate it on the held-out split.
pub fn train_regression(
    table: &FeatureTable,
    target: &str,
    config: &TrainConfig,
) -> Result<RegressionBaseline, ModelError> {
    let (prep, target_col) = prepare(table, target, config)?;
    let means = train_means(table, &prep);
    let p = prep.feature_cols.len();
    let n_cols = p + 1; // leading intercept column

    // Normal equations: accumulate XᵀX and Xᵀy over the training rows.
    let mut xtx = vec![0.0; n_cols * n_cols];
    let mut xty = vec![0.0; n_cols];
    for &r in &prep.train {
        let mut x = Vec::with_capacity(n_cols);
        x.push(1.0);
        x.extend(imputed_row(table, &prep, &means, r));
        let y = table.rows[r][target_col];
        for i in 0..n_cols {
            xty[i] += x[i] * y;
            for j in 0..n_cols {
                xtx[i * n_cols + j] += x[i] * x[j];
            }
        }
    }

    let weights = cholesky_solve(&xtx, &xty, n_cols);
    let intercept = weights[0];
    let coefficients = weights[1..].to_vec();

    // Held-out evaluation.
    let (mut se, mut ae) = (0.0, 0.0);
    let mut truths = Vec::with_capacity(prep.test.len());
    for &r in &prep.test {
        let x = imputed_row(table, &prep, &means, r);
        let mut pred = intercept;
        for (j, &w) in coefficients.iter().enumerate() {
            pred += w * x[j];
        }
        let y = table.rows[r][target_col];
        se += (pred - y).powi(2);
        ae += (pred - y).abs();
        truths.push(y);
    }
    let n_test = prep.test.len() as f64;
    let mean_y: f64 = truths.iter().sum::<f64>() / n_test;
    let ss_tot: f64 = truths.iter().map(|y| (y - mean_y).powi(2)).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - se / ss_tot } else { 0.0 };

    Ok(RegressionBaseline {
        target: target.to_string(),
        feature_names: prep.feature_names,
        intercept,
        coefficients,
        feature_means: means,
        train_rows: prep.train.len(),
        test_rows: prep.test.len(),
        metrics: RegressionMetrics {
            rmse: (se / n_test).sqrt(),
            mae: ae / n_test,
            r2,
        },
    })
}

/// Fit a logistic-regression baseline for a 0/1 target and evaluate it on the
/// held-out split.
pub fn train_classification(
    table: &FeatureTable,
    target: &str,
    config: &TrainConfig,
) -> Result<ClassificationBaseline, ModelError> {
    let (prep, target_col) = prepare(table, target, config)?;
    let means = train_means(table, &prep);
    let p = prep.feature_cols.len();

    let label = |r: usize| table.rows[r][target_col] > 0.5;
    let single_class = |rows: &[usize]| {
        rows.iter().all(|&r| label(r)) || rows.iter().all(|&r| !label(r))
    };
    if single_class(&prep.train) || single_class(&prep.test) {
        return Err(ModelError::SingleClassTarget { target: target.to_string() });
    }

    // Standardize features from the training split; constant columns scale
    // by 1 so they contribute nothing without poisoning the gradient.
    let stds: Vec<f64> = (0..p)
        .map(|j| {
            let var = prep
                .train
                .iter()
                .map(|&r| {
                    let x = imputed_row(table, &prep, &means, r)[j];
                    (x - means[j]).powi(2)
                })
                .sum::<f64>()
                / prep.train.len() as f64;
            if var > 0.0 { var.sqrt() } else { 1.0 }
        })
        .collect();

    let standardized: Vec<Vec<f64>> = prep
        .train
        .iter()
        .map(|&r| {
            let x = imputed_row(table, &prep, &means, r);
            (0..p).map(|j| (x[j] - means[j]) / stds[j]).collect()
        })
        .collect();
    let ys: Vec<f64> = prep.train.iter().map(|&r| if label(r) { 1.0 } else { 0.0 }).collect();

    // Full-batch gradient descent on the log-loss.
    let n = standardized.len() as f64;
    let mut w = vec![0.0; p];
    let mut b = 0.0;
    for iter in 0..config.max_iter {
        let mut grad_w = vec![0.0; p];
        let mut grad_b = 0.0;
        for (x, &y) in standardized.iter().zip(&ys) {
            let mut z = b;
            for j in 0..p {
                z += w[j] * x[j];
            }
            let err = sigmoid(z) - y;
            grad_b += err;
            for j in 0..p {
                grad_w[j] += err * x[j];
            }
        }
        let grad_norm = (grad_b.powi(2)
            + grad_w.iter().map(|g| g.powi(2)).sum::<f64>())
        .sqrt()
            / n;
        b -= config.learning_rate * grad_b / n;
        for j in 0..p {
            w[j] -= config.learning_rate * grad_w[j] / n;
        }
        if grad_norm < 1e-6 {
            debug!(iter, "gradient descent converged early");
            break;
        }
    }

    // Held-out evaluation.
    let mut scores = Vec::with_capacity(prep.test.len());
    let mut labels = Vec::with_capacity(prep.test.len());
    for &r in &prep.test {
        let x = imputed_row(table, &prep, &means, r);
        let mut z = b;
        for j in 0..p {
            z += w[j] * (x[j] - means[j]) / stds[j];
        }
        scores.push(sigmoid(z));
        labels.push(label(r));
    }

    let correct = scores
        .iter()
        .zip(&labels)
        .filter(|(s, y)| (**s >= 0.5) == **y)
        .count();
    let eps = 1e-15;
    let ll = scores
        .iter()
        .zip(&labels)
        .map(|(s, &y)| {
            let s = s.clamp(eps, 1.0 - eps);
            if y { -s.ln() } else { -(1.0 - s).ln() }
        })
        .sum::<f64>()
        / scores.len() as f64;

    Ok(ClassificationBaseline {
        target: target.to_string(),
        feature_names: prep.feature_names,
        intercept: b,
        coefficients: w,
        feature_means: means,
        feature_stds: stds,
        train_rows: prep.train.len(),
        test_rows: prep.test.len(),
        metrics: ClassificationMetrics {
            auc: auc(&labels, &scores),
            accuracy: correct as f64 / scores.len() as f64,
            log_loss: ll,
        },
    })
}

/// Rank-based AUC: the probability a random positive outscores a random
/// negative, ties counted half.
pub fn auc(labels: &[bool], scores: &[f64]) -> f64 {
    let n_pos = labels.iter().filter(|&&y| y).count() as f64;
    let n_neg = labels.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return f64::NAN;
    }
    let (ranks, _) = rank_with_ties(scores);
    let rank_pos: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, y)| **y)
        .map(|(r, _)| r)
        .sum();
    (rank_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Solve Ax = b for a symmetric positive semi-definite A (row-major, n × n)
/// by Cholesky decomposition. A ridge proportional to the diagonal scale
/// keeps near-singular systems (collinear one-hot columns) solvable.
fn cholesky_solve(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let diag_scale = (0..n).map(|i| a[i * n + i]).fold(0.0f64, f64::max).max(1.0);
    let ridge = 1e-10 * diag_scale;

    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i * n + k] * l[j * n + k];
            }
            if i == j {
                let val = a[i * n + i] + ridge - sum;
                l[i * n + i] = if val > 0.0 { val.sqrt() } else { 1e-12 };
            } else {
                l[i * n + j] = (a[i * n + j] - sum) / l[j * n + j];
            }
        }
    }

    // Forward substitution: L z = b.
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * n + k] * z[k];
        }
        z[i] = sum / l[i * n + i];
    }
    // Back substitution: Lᵀ x = z.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[k * n + i] * x[k];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}
