//! Column names of the policy dataset and header resolution.
//!
//! The raw feed is a 50+ column pipe-delimited file; processed samples carry
//! a narrower column set. Resolution is therefore by name, not by position:
//! the required columns must all be present somewhere in the header, optional
//! columns load as missing when absent, and unknown extra columns are
//! ignored. Column names are matched after trimming surrounding whitespace
//! (the raw feed has been seen with padded headers).

use csv::StringRecord;

use crate::error::DataError;

pub const UNDERWRITTEN_COVER_ID: &str = "UnderwrittenCoverID";
pub const POLICY_ID: &str = "PolicyID";
pub const TRANSACTION_MONTH: &str = "TransactionMonth";
pub const PROVINCE: &str = "Province";
pub const POSTAL_CODE: &str = "PostalCode";
pub const GENDER: &str = "Gender";
pub const MARITAL_STATUS: &str = "MaritalStatus";
pub const VEHICLE_TYPE: &str = "VehicleType";
pub const MAKE: &str = "make"; // lower case in the source feed
pub const MODEL: &str = "Model";
pub const REGISTRATION_YEAR: &str = "RegistrationYear";
pub const CUSTOM_VALUE_ESTIMATE: &str = "CustomValueEstimate";
pub const SUM_INSURED: &str = "SumInsured";
pub const CALCULATED_PREMIUM_PER_TERM: &str = "CalculatedPremiumPerTerm";
pub const COVER_TYPE: &str = "CoverType";
pub const TOTAL_PREMIUM: &str = "TotalPremium";
pub const TOTAL_CLAIMS: &str = "TotalClaims";

/// Columns every input variant must provide. This is the intersection of the
/// raw feed and the processed samples the wider pipeline writes.
pub const REQUIRED_COLUMNS: [&str; 12] = [
    UNDERWRITTEN_COVER_ID,
    POLICY_ID,
    TRANSACTION_MONTH,
    PROVINCE,
    POSTAL_CODE,
    GENDER,
    VEHICLE_TYPE,
    MAKE,
    MODEL,
    CUSTOM_VALUE_ESTIMATE,
    TOTAL_PREMIUM,
    TOTAL_CLAIMS,
];

/// Columns used when present (raw feed only).
pub const OPTIONAL_COLUMNS: [&str; 5] = [
    MARITAL_STATUS,
    REGISTRATION_YEAR,
    SUM_INSURED,
    CALCULATED_PREMIUM_PER_TERM,
    COVER_TYPE,
];

/// Resolved column positions for one input file. Required columns are
/// guaranteed present; optional ones are `None` when the header lacks them.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub cover_id: usize,
    pub policy_id: usize,
    pub transaction_month: usize,
    pub province: usize,
    pub postal_code: usize,
    pub gender: usize,
    pub marital_status: Option<usize>,
    pub vehicle_type: usize,
    pub make: usize,
    pub model: usize,
    pub registration_year: Option<usize>,
    pub custom_value_estimate: usize,
    pub sum_insured: Option<usize>,
    pub premium_per_term: Option<usize>,
    pub cover_type: Option<usize>,
    pub total_premium: usize,
    pub total_claims: usize,
}

impl ColumnMap {
    /// Resolve the header row. Fails with `DataError::HeaderMismatch` listing
    /// every required column that is absent.
    pub fn resolve(header: &StringRecord) -> Result<Self, DataError> {
        let find = |name: &str| header.iter().position(|h| h.trim() == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| find(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DataError::HeaderMismatch { missing });
        }

        // Required lookups cannot fail past this point.
        let must = |name: &str| find(name).expect("required column checked above");

        Ok(ColumnMap {
            cover_id: must(UNDERWRITTEN_COVER_ID),
            policy_id: must(POLICY_ID),
            transaction_month: must(TRANSACTION_MONTH),
            province: must(PROVINCE),
            postal_code: must(POSTAL_CODE),
            gender: must(GENDER),
            marital_status: find(MARITAL_STATUS),
            vehicle_type: must(VEHICLE_TYPE),
            make: must(MAKE),
            model: must(MODEL),
            registration_year: find(REGISTRATION_YEAR),
            custom_value_estimate: must(CUSTOM_VALUE_ESTIMATE),
            sum_insured: find(SUM_INSURED),
            premium_per_term: find(CALCULATED_PREMIUM_PER_TERM),
            cover_type: find(COVER_TYPE),
            total_premium: must(TOTAL_PREMIUM),
            total_claims: must(TOTAL_CLAIMS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> StringRecord {
        StringRecord::from(cols.to_vec())
    }

    fn full_header() -> StringRecord {
        header(&[
            UNDERWRITTEN_COVER_ID,
            POLICY_ID,
            TRANSACTION_MONTH,
            MARITAL_STATUS,
            GENDER,
            PROVINCE,
            POSTAL_CODE,
            VEHICLE_TYPE,
            REGISTRATION_YEAR,
            MAKE,
            MODEL,
            CUSTOM_VALUE_ESTIMATE,
            SUM_INSURED,
            CALCULATED_PREMIUM_PER_TERM,
            COVER_TYPE,
            TOTAL_PREMIUM,
            TOTAL_CLAIMS,
        ])
    }

    #[test]
    fn resolve_full_header() {
        let map = ColumnMap::resolve(&full_header()).expect("full header must resolve");
        assert_eq!(map.cover_id, 0);
        assert_eq!(map.total_claims, 16);
        assert!(map.sum_insured.is_some());
        assert!(map.cover_type.is_some());
    }

    /// Processed samples drop the raw-only columns; the map must still
    /// resolve, with the optional slots empty.
    #[test]
    fn resolve_processed_sample_header() {
        let map = ColumnMap::resolve(&header(&[
            UNDERWRITTEN_COVER_ID,
            POLICY_ID,
            TRANSACTION_MONTH,
            TOTAL_PREMIUM,
            TOTAL_CLAIMS,
            PROVINCE,
            POSTAL_CODE,
            GENDER,
            VEHICLE_TYPE,
            MAKE,
            MODEL,
            CUSTOM_VALUE_ESTIMATE,
        ]))
        .expect("processed sample header must resolve");
        assert!(map.sum_insured.is_none());
        assert!(map.marital_status.is_none());
        assert!(map.registration_year.is_none());
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let err = ColumnMap::resolve(&header(&[UNDERWRITTEN_COVER_ID, POLICY_ID]))
            .expect_err("two-column header must not resolve");
        match err {
            DataError::HeaderMismatch { missing } => {
                assert!(missing.contains(&TOTAL_PREMIUM.to_string()));
                assert!(missing.contains(&PROVINCE.to_string()));
                assert!(!missing.contains(&UNDERWRITTEN_COVER_ID.to_string()));
            }
            other => panic!("expected HeaderMismatch, got {other:?}"),
        }
    }

    /// Header cells arrive padded in some exports; trimming must not change
    /// resolution.
    #[test]
    fn padded_header_cells_resolve() {
        let padded: Vec<String> =
            full_header().iter().map(|c| format!(" {c} ")).collect();
        let rec = StringRecord::from(padded);
        assert!(ColumnMap::resolve(&rec).is_ok());
    }
}
