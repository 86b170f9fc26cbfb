use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CoverId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PolicyId(pub u64);

/// One row of the source dataset: a single underwritten cover observed in a
/// single transaction month. Created once by the loader and immutable
/// thereafter.
///
/// Every field is optional: the loader degrades unparseable, empty, or
/// out-of-policy values to `None` rather than failing the load. After
/// cleaning, `total_premium` and `total_claims` are non-negative whenever
/// present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRecord {
    pub cover_id: Option<CoverId>,
    pub policy_id: Option<PolicyId>,
    /// First day of the transaction month.
    pub transaction_month: Option<NaiveDate>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub gender: Option<String>,
    pub marital_status: Option<String>,
    pub vehicle_type: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub registration_year: Option<i32>,
    pub custom_value_estimate: Option<f64>,
    pub sum_insured: Option<f64>,
    pub premium_per_term: Option<f64>,
    pub cover_type: Option<String>,
    pub total_premium: Option<f64>,
    pub total_claims: Option<f64>,
}

impl PolicyRecord {
    /// An all-missing record; loader and tests fill in what each row provides.
    pub fn empty() -> Self {
        PolicyRecord {
            cover_id: None,
            policy_id: None,
            transaction_month: None,
            province: None,
            postal_code: None,
            gender: None,
            marital_status: None,
            vehicle_type: None,
            make: None,
            model: None,
            registration_year: None,
            custom_value_estimate: None,
            sum_insured: None,
            premium_per_term: None,
            cover_type: None,
            total_premium: None,
            total_claims: None,
        }
    }

    /// Whether this row carries a claim. Missing claims count as no claim,
    /// mirroring the cleaning rule the whole pipeline is built on.
    pub fn claim_occurred(&self) -> bool {
        self.total_claims.is_some_and(|c| c > 0.0)
    }

    /// Claim amount given that a claim occurred; `None` for claim-free rows.
    pub fn claim_severity(&self) -> Option<f64> {
        self.total_claims.filter(|&c| c > 0.0)
    }

    /// Underwriting margin: premium minus claims, defined only when both are
    /// present.
    pub fn margin(&self) -> Option<f64> {
        match (self.total_premium, self.total_claims) {
            (Some(p), Some(c)) => Some(p - c),
            _ => None,
        }
    }

    /// Row-level loss ratio. `None` when premium is missing or zero: never a
    /// division error and never coerced to zero or infinity.
    pub fn loss_ratio(&self) -> Option<f64> {
        match (self.total_premium, self.total_claims) {
            (Some(p), Some(c)) if p > 0.0 => Some(c / p),
            _ => None,
        }
    }
}
