use thiserror::Error;

/// Fatal load-time failures. Per-row coercion problems are *not* errors;
/// they degrade the offending field to missing and are reported through
/// `loader::LoadReport`.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed delimited input: {0}")]
    Csv(#[from] csv::Error),

    /// The header row is missing columns the analysis cannot run without.
    #[error("header mismatch: missing required column(s) {missing:?}")]
    HeaderMismatch { missing: Vec<String> },

    /// A file with a valid header but no data rows.
    #[error("{path} contains a header but no data rows")]
    Empty { path: String },
}

/// Failures surfaced by the hypothesis test runner. Statistical validity
/// problems are errors by design: a test that cannot be trusted must not
/// return a p-value at all.
#[derive(Debug, Error)]
pub enum StatError {
    /// A group handed to a test is below the configured minimum sample count.
    #[error(
        "insufficient data for {test} on {dimension}: group {group:?} has {n} samples, \
         minimum is {required}"
    )]
    InsufficientData {
        test: &'static str,
        dimension: String,
        group: String,
        n: usize,
        required: usize,
    },

    /// Input the test statistic is undefined on (fewer than two groups,
    /// all-zero contingency table, zero pooled variance, ...).
    #[error("degenerate input for {test}: {detail}")]
    DegenerateInput { test: &'static str, detail: String },
}

/// Failures from the baseline model trainer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature table has no column named {0:?}")]
    UnknownColumn(String),

    #[error("too few usable rows to fit: have {rows}, need at least {required}")]
    TooFewRows { rows: usize, required: usize },

    /// A split contains only one class, so the classifier (or its AUC) is
    /// undefined.
    #[error("classification target {target:?} has a single class after the train/test split")]
    SingleClassTarget { target: String },
}
