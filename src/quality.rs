//! Data quality assessment: missing-value counts, descriptive statistics for
//! the financial columns, and the observed transaction-month range.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::record::PolicyRecord;
use crate::schema;

/// Descriptive statistics for a numeric column.
#[derive(Debug, Clone, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (ddof = 1); zero for a single value.
    pub std_dev: f64,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

/// Compute descriptive statistics over the present values of a column.
/// Percentiles use linear interpolation between order statistics.
/// Returns `None` for an all-missing column.
pub fn describe(values: &mut Vec<f64>) -> Option<Describe> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();

    let interp = |p: f64| -> f64 {
        let h = p * (n - 1) as f64;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = h - lo as f64;
        values[lo] * (1.0 - frac) + values[hi] * frac
    };

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(Describe {
        count: n,
        mean,
        std_dev: variance.sqrt(),
        min: values[0],
        p25: interp(0.25),
        p50: interp(0.50),
        p75: interp(0.75),
        max: values[n - 1],
    })
}

/// Snapshot of how clean one loaded dataset is. Derived, recomputed per run.
#[derive(Debug, Serialize)]
pub struct DataQualityReport {
    pub rows: usize,
    /// Missing count per tracked column, only columns with at least one gap.
    pub missing: BTreeMap<&'static str, usize>,
    pub total_premium: Option<Describe>,
    pub total_claims: Option<Describe>,
    pub custom_value_estimate: Option<Describe>,
    pub sum_insured: Option<Describe>,
    /// Earliest and latest observed transaction month.
    pub month_range: Option<(NaiveDate, NaiveDate)>,
}

impl DataQualityReport {
    pub fn build(records: &[PolicyRecord]) -> Self {
        let mut missing: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut track = |name: &'static str, absent: bool| {
            if absent {
                *missing.entry(name).or_insert(0) += 1;
            }
        };

        let mut premiums = Vec::new();
        let mut claims = Vec::new();
        let mut values = Vec::new();
        let mut sums_insured = Vec::new();
        let mut months: Option<(NaiveDate, NaiveDate)> = None;

        for r in records {
            track(schema::UNDERWRITTEN_COVER_ID, r.cover_id.is_none());
            track(schema::POLICY_ID, r.policy_id.is_none());
            track(schema::TRANSACTION_MONTH, r.transaction_month.is_none());
            track(schema::PROVINCE, r.province.is_none());
            track(schema::POSTAL_CODE, r.postal_code.is_none());
            track(schema::GENDER, r.gender.is_none());
            track(schema::MARITAL_STATUS, r.marital_status.is_none());
            track(schema::VEHICLE_TYPE, r.vehicle_type.is_none());
            track(schema::MAKE, r.make.is_none());
            track(schema::MODEL, r.model.is_none());
            track(schema::REGISTRATION_YEAR, r.registration_year.is_none());
            track(schema::CUSTOM_VALUE_ESTIMATE, r.custom_value_estimate.is_none());
            track(schema::SUM_INSURED, r.sum_insured.is_none());
            track(schema::CALCULATED_PREMIUM_PER_TERM, r.premium_per_term.is_none());
            track(schema::COVER_TYPE, r.cover_type.is_none());
            track(schema::TOTAL_PREMIUM, r.total_premium.is_none());
            track(schema::TOTAL_CLAIMS, r.total_claims.is_none());

            if let Some(p) = r.total_premium {
                premiums.push(p);
            }
            if let Some(c) = r.total_claims {
                claims.push(c);
            }
            if let Some(v) = r.custom_value_estimate {
                values.push(v);
            }
            if let Some(s) = r.sum_insured {
                sums_insured.push(s);
            }
            if let Some(m) = r.transaction_month {
                months = Some(match months {
                    None => (m, m),
                    Some((lo, hi)) => (lo.min(m), hi.max(m)),
                });
            }
        }

        DataQualityReport {
            rows: records.len(),
            missing,
            total_premium: describe(&mut premiums),
            total_claims: describe(&mut claims),
            custom_value_estimate: describe(&mut values),
            sum_insured: describe(&mut sums_insured),
            month_range: months,
        }
    }
}
