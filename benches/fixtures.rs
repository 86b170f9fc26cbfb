use chrono::NaiveDate;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use claimlens::record::{CoverId, PolicyId, PolicyRecord};

pub const SMALL: usize = 1_000;
pub const MEDIUM: usize = 10_000;
pub const LARGE: usize = 100_000;

const PROVINCES: [&str; 6] =
    ["Gauteng", "KwaZulu-Natal", "Western Cape", "Eastern Cape", "Limpopo", "Free State"];
const GENDERS: [&str; 2] = ["Male", "Female"];

/// Deterministic in-memory book with a ~3% claim rate.
pub fn synthetic_records(n: usize, seed: u64) -> Vec<PolicyRecord> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let claims = if rng.random_bool(0.03) {
                Some(rng.random_range(500.0..50_000.0))
            } else {
                Some(0.0)
            };
            let month0 = i % 19 + 1; // Feb 2014 .. Aug 2015
            PolicyRecord {
                cover_id: Some(CoverId(i as u64)),
                policy_id: Some(PolicyId(i as u64 / 2)),
                transaction_month: NaiveDate::from_ymd_opt(
                    (2014 + month0 / 12) as i32,
                    (month0 % 12 + 1) as u32,
                    1,
                ),
                province: Some(PROVINCES[rng.random_range(0..PROVINCES.len())].to_string()),
                postal_code: Some(format!("{}", 1000 + 100 * rng.random_range(0..8))),
                gender: Some(GENDERS[rng.random_range(0..GENDERS.len())].to_string()),
                marital_status: None,
                vehicle_type: Some("Passenger Vehicle".to_string()),
                make: Some("TOYOTA".to_string()),
                model: Some("COROLLA".to_string()),
                registration_year: Some(rng.random_range(1998..=2015)),
                custom_value_estimate: Some(rng.random_range(40_000.0..1_500_000.0)),
                sum_insured: Some(rng.random_range(100_000.0..5_000_000.0)),
                premium_per_term: Some(rng.random_range(50.0..900.0)),
                cover_type: Some("Own Damage".to_string()),
                total_premium: Some(rng.random_range(50.0..900.0)),
                total_claims: claims,
            }
        })
        .collect()
}

/// Render records back to the pipe-delimited input shape for loader benches.
pub fn render_pipe_file(records: &[PolicyRecord]) -> String {
    let mut out = String::from(
        "UnderwrittenCoverID|PolicyID|TransactionMonth|MaritalStatus|Gender|Province|\
         PostalCode|VehicleType|RegistrationYear|make|Model|CustomValueEstimate|SumInsured|\
         CalculatedPremiumPerTerm|CoverType|TotalPremium|TotalClaims\n",
    );
    for r in records {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let num = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_default();
        out.push_str(&format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            r.cover_id.map(|c| c.0.to_string()).unwrap_or_default(),
            r.policy_id.map(|p| p.0.to_string()).unwrap_or_default(),
            r.transaction_month
                .map(|m| m.format("%Y-%m-%d 00:00:00").to_string())
                .unwrap_or_default(),
            text(&r.marital_status),
            text(&r.gender),
            text(&r.province),
            text(&r.postal_code),
            text(&r.vehicle_type),
            r.registration_year.map(|y| y.to_string()).unwrap_or_default(),
            text(&r.make),
            text(&r.model),
            num(r.custom_value_estimate),
            num(r.sum_insured),
            num(r.premium_per_term),
            text(&r.cover_type),
            num(r.total_premium),
            num(r.total_claims),
        ));
    }
    out
}
