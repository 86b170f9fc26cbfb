//! Pipe-delimited dataset loader.
//!
//! Loading is recover-at-row-granularity: a fatal error is reserved for an
//! unreadable file, a malformed delimited stream, or a header missing
//! required columns. Anything wrong *inside* a row (an unparseable number,
//! a negative financial, a transaction month outside the observation window)
//! degrades that one field to missing, emits a `tracing` warning carrying the
//! row index and field name, and is tallied in the [`LoadReport`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::DataError;
use crate::record::{CoverId, PolicyId, PolicyRecord};
use crate::schema::{self, ColumnMap};

/// Loader policy knobs. The observation window bounds the months the portfolio
/// was actually written over; transaction months outside it are treated as
/// entry errors and coerced to missing.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// First month of the window (first-of-month date, inclusive).
    pub window_start: NaiveDate,
    /// Last month of the window (first-of-month date, inclusive).
    pub window_end: NaiveDate,
}

impl LoaderConfig {
    /// The window the source portfolio covers: Feb 2014 – Aug 2015.
    pub fn canonical() -> Self {
        LoaderConfig {
            window_start: NaiveDate::from_ymd_opt(2014, 2, 1).expect("valid date"),
            window_end: NaiveDate::from_ymd_opt(2015, 8, 1).expect("valid date"),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Why a field was degraded to missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoercionReason {
    /// Not parseable as the field's type (or a non-finite float).
    Unparseable,
    /// A negative financial amount; loaded records are non-negative-or-missing.
    Negative,
    /// A valid date outside the configured observation window.
    OutOfWindow,
}

impl fmt::Display for CoercionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionReason::Unparseable => write!(f, "unparseable"),
            CoercionReason::Negative => write!(f, "negative"),
            CoercionReason::OutOfWindow => write!(f, "out of window"),
        }
    }
}

/// One recovered row-level problem.
#[derive(Debug, Clone, Serialize)]
pub struct CoercionWarning {
    /// 1-based line number in the input (the header is line 1).
    pub row: usize,
    pub field: &'static str,
    pub value: String,
    pub reason: CoercionReason,
}

/// What the load saw: row count plus every recovered coercion, individually
/// and tallied per field.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rows_read: usize,
    pub warnings: Vec<CoercionWarning>,
    pub by_field: BTreeMap<&'static str, usize>,
}

impl LoadReport {
    fn push(&mut self, row: usize, field: &'static str, value: &str, reason: CoercionReason) {
        warn!(row, field, value, %reason, "coerced field to missing");
        *self.by_field.entry(field).or_insert(0) += 1;
        self.warnings.push(CoercionWarning {
            row,
            field,
            value: value.to_string(),
            reason,
        });
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

/// A completed load: the immutable records plus the report describing how
/// cleanly they parsed.
#[derive(Debug)]
pub struct LoadOutcome {
    pub records: Vec<PolicyRecord>,
    pub report: LoadReport,
}

/// Load a pipe-delimited policy file from disk.
///
/// Fatal on an unreadable path, a malformed stream, a header missing required
/// columns, or a file with no data rows.
pub fn load_records(path: impl AsRef<Path>, config: &LoaderConfig) -> Result<LoadOutcome, DataError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let outcome = read_records(file, config)?;
    if outcome.records.is_empty() {
        return Err(DataError::Empty { path: path.display().to_string() });
    }
    info!(
        rows = outcome.report.rows_read,
        coercions = outcome.report.warning_count(),
        "loaded {}",
        path.display()
    );
    Ok(outcome)
}

/// Load from any reader. The file-path wrapper above adds the open/empty
/// checks; this is the entry point tests and benches feed in-memory data to.
pub fn read_records<R: Read>(reader: R, config: &LoaderConfig) -> Result<LoadOutcome, DataError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(true)
        .from_reader(reader);

    let header = rdr.headers()?.clone();
    let map = ColumnMap::resolve(&header)?;

    let mut records = Vec::new();
    let mut report = LoadReport::default();

    for (i, result) in rdr.records().enumerate() {
        let raw = result?;
        // Header is line 1; first data row is line 2.
        let row = RowParser {
            line: i + 2,
            raw: &raw,
            config,
            report: &mut report,
        };
        records.push(row.parse(&map));
        report.rows_read += 1;
    }

    Ok(LoadOutcome { records, report })
}

/// Per-row coercion context. Every accessor returns `Option` and records a
/// warning instead of propagating a parse failure.
struct RowParser<'a> {
    line: usize,
    raw: &'a StringRecord,
    config: &'a LoaderConfig,
    report: &'a mut LoadReport,
}

impl<'a> RowParser<'a> {
    fn parse(mut self, map: &ColumnMap) -> PolicyRecord {
        PolicyRecord {
            cover_id: self.id(map.cover_id, schema::UNDERWRITTEN_COVER_ID).map(CoverId),
            policy_id: self.id(map.policy_id, schema::POLICY_ID).map(PolicyId),
            transaction_month: self.month(map.transaction_month, schema::TRANSACTION_MONTH),
            province: self.text(map.province),
            postal_code: self.text(map.postal_code),
            gender: self.text(map.gender),
            marital_status: map.marital_status.and_then(|c| self.text(c)),
            vehicle_type: self.text(map.vehicle_type),
            make: self.text(map.make),
            model: self.text(map.model),
            registration_year: map
                .registration_year
                .and_then(|c| self.year(c, schema::REGISTRATION_YEAR)),
            custom_value_estimate: self
                .money(map.custom_value_estimate, schema::CUSTOM_VALUE_ESTIMATE),
            sum_insured: map.sum_insured.and_then(|c| self.money(c, schema::SUM_INSURED)),
            premium_per_term: map
                .premium_per_term
                .and_then(|c| self.money(c, schema::CALCULATED_PREMIUM_PER_TERM)),
            cover_type: map.cover_type.and_then(|c| self.text(c)),
            total_premium: self.money(map.total_premium, schema::TOTAL_PREMIUM),
            total_claims: self.money(map.total_claims, schema::TOTAL_CLAIMS),
        }
    }

    // Borrows from the underlying record, not from `self`, so the report can
    // be updated while a cell is in hand.
    fn cell(&self, col: usize) -> &'a str {
        self.raw.get(col).unwrap_or("").trim()
    }

    /// Trimmed non-empty text; empty cells are missing, silently.
    fn text(&self, col: usize) -> Option<String> {
        let s = self.cell(col);
        if s.is_empty() { None } else { Some(s.to_string()) }
    }

    fn id(&mut self, col: usize, field: &'static str) -> Option<u64> {
        let s = self.cell(col);
        if s.is_empty() {
            return None;
        }
        match s.parse::<u64>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.report.push(self.line, field, s, CoercionReason::Unparseable);
                None
            }
        }
    }

    fn year(&mut self, col: usize, field: &'static str) -> Option<i32> {
        let s = self.cell(col);
        if s.is_empty() {
            return None;
        }
        match s.parse::<i32>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.report.push(self.line, field, s, CoercionReason::Unparseable);
                None
            }
        }
    }

    /// Financial amount: thousands separators stripped, must be finite, must
    /// be non-negative. Negative amounts are reversal rows in the raw feed
    /// and load as missing.
    fn money(&mut self, col: usize, field: &'static str) -> Option<f64> {
        let s = self.cell(col);
        if s.is_empty() {
            return None;
        }
        let cleaned: String = s.chars().filter(|&c| c != ',').collect();
        match cleaned.parse::<f64>() {
            Ok(v) if !v.is_finite() => {
                self.report.push(self.line, field, s, CoercionReason::Unparseable);
                None
            }
            Ok(v) if v < 0.0 => {
                self.report.push(self.line, field, s, CoercionReason::Negative);
                None
            }
            Ok(v) => Some(v),
            Err(_) => {
                self.report.push(self.line, field, s, CoercionReason::Unparseable);
                None
            }
        }
    }

    /// Transaction month, snapped to the first of the month. Accepts the
    /// datetime form the raw feed uses plus the date-only and `YYYYMM` forms
    /// seen in processed samples.
    fn month(&mut self, col: usize, field: &'static str) -> Option<NaiveDate> {
        let s = self.cell(col);
        if s.is_empty() {
            return None;
        }
        let Some(date) = parse_month(s) else {
            self.report.push(self.line, field, s, CoercionReason::Unparseable);
            return None;
        };
        if date < self.config.window_start || date > self.config.window_end {
            self.report.push(self.line, field, s, CoercionReason::OutOfWindow);
            return None;
        }
        Some(date)
    }
}

/// Parse one of the accepted month representations to the first of its month.
fn parse_month(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return dt.date().with_day(1);
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.with_day(1);
        }
    }
    // Compact YYYYMM.
    if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = s[..4].parse().ok()?;
        let month: u32 = s[4..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }
    None
}
