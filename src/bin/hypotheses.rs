//! Statistical battery over a loaded policy file.
//!
//! Runs the standard claim-frequency / severity / margin hypothesis tests
//! across provinces, the largest postal codes, and genders, then prints
//! per-level vs-rest tables. Every verdict line states the significance
//! threshold it was judged at; tests that cannot be trusted (too-small
//! groups, degenerate inputs) report why instead of a p-value.

use std::process;

use claimlens::aggregate::Dimension;
use claimlens::hypothesis::{self, TestRunner};
use claimlens::loader::{LoaderConfig, load_records};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut input = "data/MachineLearningRating_v3.txt".to_string();
    let mut alpha = 0.05;
    let mut min_group: usize = 30;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input = args[i].clone();
            }
            "--alpha" => {
                i += 1;
                alpha = args[i].parse().expect("--alpha requires a number in (0, 1)");
            }
            "--min-group" => {
                i += 1;
                min_group = args[i].parse().expect("--min-group requires a positive integer");
            }
            other => {
                eprintln!("error: unknown argument {other:?}");
                process::exit(2);
            }
        }
        i += 1;
    }

    let outcome = load_records(&input, &LoaderConfig::canonical()).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    let records = &outcome.records;
    let runner = TestRunner { alpha, min_group_size: min_group };

    println!(
        "=== Hypothesis battery ({} rows, alpha = {alpha}, min group = {min_group}) ===",
        records.len()
    );
    for outcome in hypothesis::battery(&runner, records) {
        println!("\n--- {} ---", outcome.name);
        match outcome.result {
            Ok(result) => {
                let df = result.df.map(|d| format!(", df = {d:.1}")).unwrap_or_default();
                println!("  statistic = {:.4}{df}, p = {:.4e}", result.statistic, result.p_value);
                println!("  RESULT: {}", result.verdict());
            }
            Err(e) => println!("  SKIPPED: {e}"),
        }
    }

    print_level_report(&runner, records, Dimension::Province, 0);
    print_level_report(&runner, records, Dimension::PostalCode, 10);
    print_level_report(&runner, records, Dimension::Make, 20);
}

fn print_level_report(
    runner: &TestRunner,
    records: &[claimlens::record::PolicyRecord],
    dim: Dimension,
    top_n: usize,
) {
    let report = hypothesis::level_report(runner, records, dim, top_n);
    if report.is_empty() {
        return;
    }

    let scope = if top_n > 0 { format!("top {top_n}") } else { "all levels".to_string() };
    println!("\n=== {} vs rest ({scope}) ===", dim.label());
    println!(
        "{:<24} | {:>9} | {:>8} | {:>7} | {:>8} | {:>9} | {:>10} | {:>10}",
        dim.label(),
        "records",
        "claims",
        "freq%",
        "LR%",
        "z(freq)",
        "p(freq)",
        "p(sev)"
    );
    println!("{}", "-".repeat(106));
    for l in &report {
        println!(
            "{:<24} | {:>9} | {:>8} | {:>7} | {:>8} | {:>9} | {:>10} | {:>10}",
            l.level,
            l.records,
            l.claims,
            fmt_pct(l.claim_frequency),
            fmt_pct(l.loss_ratio),
            fmt_stat(l.freq_z_vs_rest),
            fmt_p(l.freq_p_vs_rest),
            fmt_p(l.severity_p_vs_rest),
        );
    }
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "n/a".to_string(),
    }
}

fn fmt_stat(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3}"),
        None => "n/a".to_string(),
    }
}

fn fmt_p(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3e}"),
        None => "n/a".to_string(),
    }
}
