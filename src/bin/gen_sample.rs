//! Deterministic synthetic policy-file generator.
//!
//! Writes a schema-correct pipe-delimited dataset to stdout and a per-province
//! summary to stderr. Usage: `gen_sample [rows] [seed]`. The generated book
//! plants real frequency and severity differences between provinces so the
//! downstream tests have something to find, and salts in a little dirt
//! (missing cells, reversal rows) so the loader's coercion path is exercised.

use std::collections::HashMap;
use std::env;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal};

/// Per-province generating assumptions. Claim probability and severity scale
/// differ by design; premiums are priced off a shared rate.
struct ProvinceProfile {
    name: &'static str,
    weight: u32,
    claim_probability: f64,
    /// ln-space location of the severity distribution.
    severity_mu: f64,
}

const PROVINCES: [ProvinceProfile; 6] = [
    ProvinceProfile { name: "Gauteng", weight: 35, claim_probability: 0.045, severity_mu: 8.6 },
    ProvinceProfile { name: "KwaZulu-Natal", weight: 20, claim_probability: 0.035, severity_mu: 8.4 },
    ProvinceProfile { name: "Western Cape", weight: 15, claim_probability: 0.022, severity_mu: 8.2 },
    ProvinceProfile { name: "Eastern Cape", weight: 10, claim_probability: 0.030, severity_mu: 8.3 },
    ProvinceProfile { name: "Limpopo", weight: 10, claim_probability: 0.028, severity_mu: 8.1 },
    ProvinceProfile { name: "Free State", weight: 10, claim_probability: 0.025, severity_mu: 8.0 },
];

const GENDERS: [&str; 3] = ["Male", "Female", "Not specified"];
const MARITAL: [&str; 3] = ["Married", "Single", "Not specified"];
const VEHICLE_TYPES: [&str; 3] = ["Passenger Vehicle", "Light Commercial", "Heavy Commercial"];
const MAKES: [(&str, &str); 6] = [
    ("TOYOTA", "COROLLA"),
    ("TOYOTA", "HILUX"),
    ("VOLKSWAGEN", "POLO"),
    ("FORD", "RANGER"),
    ("NISSAN", "NP200"),
    ("BMW", "3 SERIES"),
];
const COVER_TYPES: [&str; 3] = ["Own Damage", "Third Party", "Windscreen"];

/// The 19 months of the observation window, Feb 2014 – Aug 2015.
fn month_string(index: usize) -> String {
    let month0 = 1 + index; // Feb 2014 is month index 1 of 2014
    let year = 2014 + month0 / 12;
    let month = month0 % 12 + 1;
    format!("{year}-{month:02}-01 00:00:00")
}

fn pick_province(rng: &mut ChaCha20Rng) -> &'static ProvinceProfile {
    let total: u32 = PROVINCES.iter().map(|p| p.weight).sum();
    let mut roll = rng.random_range(0..total);
    for p in &PROVINCES {
        if roll < p.weight {
            return p;
        }
        roll -= p.weight;
    }
    &PROVINCES[0]
}

fn main() {
    let rows: usize = env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let seed: u64 = env::args().nth(2).and_then(|s| s.parse().ok()).unwrap_or(42);

    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    // Monthly premium: LogNormal(mu, sigma) around a few hundred per term.
    let premium_dist = LogNormal::new(5.6, 0.7).expect("valid LogNormal params");

    println!(
        "UnderwrittenCoverID|PolicyID|TransactionMonth|MaritalStatus|Gender|Province|\
         PostalCode|VehicleType|RegistrationYear|make|Model|CustomValueEstimate|SumInsured|\
         CalculatedPremiumPerTerm|CoverType|TotalPremium|TotalClaims"
    );

    let mut claim_rows = 0usize;
    let mut premium_total = 0.0f64;
    let mut claims_total = 0.0f64;
    let mut by_province: HashMap<&str, (usize, usize)> = HashMap::new();

    for i in 0..rows {
        let province = pick_province(&mut rng);
        let severity_dist =
            LogNormal::new(province.severity_mu, 1.1).expect("valid LogNormal params");

        let cover_id = 100_000 + i as u64;
        let policy_id = 10_000 + rng.random_range(0..(rows as u64 / 2 + 1));
        let month = month_string(rng.random_range(0..19));
        let marital = MARITAL[rng.random_range(0..MARITAL.len())];
        let gender = if rng.random_bool(0.02) {
            "" // a sprinkling of missing demographics
        } else {
            GENDERS[rng.random_range(0..GENDERS.len())]
        };
        // Postal codes cluster: a handful of codes carry most of the book.
        let postal_code = if rng.random_bool(0.7) {
            1000 + 100 * rng.random_range(0..8)
        } else {
            rng.random_range(1..9999)
        };
        let vehicle_type = VEHICLE_TYPES[rng.random_range(0..VEHICLE_TYPES.len())];
        let registration_year = rng.random_range(1998..=2015);
        let (make, model) = MAKES[rng.random_range(0..MAKES.len())];
        let value_estimate = if rng.random_bool(0.15) {
            String::new()
        } else {
            format!("{}", rng.random_range(40_000..1_500_000))
        };
        let sum_insured = rng.random_range(100_000..5_000_000);
        let premium: f64 = premium_dist.sample(&mut rng);
        let cover_type = COVER_TYPES[rng.random_range(0..COVER_TYPES.len())];

        // A few reversal rows carry a negative premium; the loader is
        // expected to coerce them to missing.
        let premium_cell = if rng.random_bool(0.002) {
            format!("{:.2}", -premium)
        } else {
            premium_total += premium;
            format!("{premium:.2}")
        };

        let claims = if rng.random_bool(province.claim_probability) {
            let severity: f64 = severity_dist.sample(&mut rng);
            claim_rows += 1;
            claims_total += severity;
            let entry = by_province.entry(province.name).or_insert((0, 0));
            entry.1 += 1;
            format!("{severity:.2}")
        } else {
            "0".to_string()
        };
        by_province.entry(province.name).or_insert((0, 0)).0 += 1;

        println!(
            "{cover_id}|{policy_id}|{month}|{marital}|{gender}|{}|{postal_code}|{vehicle_type}|\
             {registration_year}|{make}|{model}|{value_estimate}|{sum_insured}|{:.2}|{cover_type}|\
             {premium_cell}|{claims}",
            province.name,
            premium / 12.0,
        );
    }

    eprintln!(
        "gen_sample: {rows} rows, {claim_rows} claim rows, overall loss ratio {:.3}",
        claims_total / premium_total
    );
    let mut names: Vec<&str> = by_province.keys().copied().collect();
    names.sort_unstable();
    for name in names {
        let (n, claims) = by_province[name];
        eprintln!(
            "  province={name:<16} rows={n:>7}  claim_rows={claims:>6}  freq={:.4}",
            claims as f64 / n as f64
        );
    }
}
