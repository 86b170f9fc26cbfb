//! Baseline model fits over a loaded policy file.
//!
//! Builds the standard feature table, fits the claim-severity regression and
//! the claim-occurrence classifier, and prints the held-out metrics.

use std::process;

use claimlens::loader::{LoaderConfig, load_records};
use claimlens::model::{FeatureTable, TrainConfig, train_classification, train_regression};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut input = "data/MachineLearningRating_v3.txt".to_string();
    let mut seed: u64 = 42;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input = args[i].clone();
            }
            "--seed" => {
                i += 1;
                seed = args[i].parse().expect("--seed requires a u64");
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

    let table = FeatureTable::from_records(&outcome.records);
    let config = TrainConfig { seed, ..TrainConfig::canonical() };

    println!(
        "=== Baseline models ({} rows, {} columns, seed {seed}) ===",
        table.rows.len(),
        table.columns.len()
    );

    match train_regression(&table, "ClaimSeverity", &config) {
        Ok(fit) => {
            println!("\n--- Claim severity regression (OLS) ---");
            println!("  train rows: {}, test rows: {}", fit.train_rows, fit.test_rows);
            println!("  RMSE: {:.2}", fit.metrics.rmse);
            println!("  MAE:  {:.2}", fit.metrics.mae);
            println!("  R2:   {:.4}", fit.metrics.r2);
            print_top_weights(&fit.feature_names, &fit.coefficients);
        }
        Err(e) => println!("\n--- Claim severity regression: SKIPPED ({e}) ---"),
    }

    match train_classification(&table, "ClaimOccurred", &config) {
        Ok(fit) => {
            println!("\n--- Claim occurrence classification (logistic) ---");
            println!("  train rows: {}, test rows: {}", fit.train_rows, fit.test_rows);
            println!("  AUC:      {:.4}", fit.metrics.auc);
            println!("  accuracy: {:.4}", fit.metrics.accuracy);
            println!("  log loss: {:.4}", fit.metrics.log_loss);
            print_top_weights(&fit.feature_names, &fit.coefficients);
        }
        Err(e) => println!("\n--- Claim occurrence classification: SKIPPED ({e}) ---"),
    }
}

fn print_top_weights(names: &[String], coefficients: &[f64]) {
    let mut ranked: Vec<(&String, f64)> =
        names.iter().zip(coefficients.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
    println!("  largest weights:");
    for (name, w) in ranked.iter().take(5) {
        println!("    {name:<32} {w:>12.6}");
    }
}
