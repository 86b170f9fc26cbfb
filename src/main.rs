use std::fs::File;
use std::io::BufWriter;
use std::process;

use claimlens::aggregate::{Dimension, GroupedAggregate, group_by, summarize};
use claimlens::loader::{LoadOutcome, LoaderConfig, load_records};
use claimlens::quality::{DataQualityReport, Describe};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut input = "data/MachineLearningRating_v3.txt".to_string();
    let mut dims: Vec<Dimension> = Vec::new();
    let mut top: usize = 0;
    let mut csv_dir: Option<String> = None;
    let mut ndjson_path: Option<String> = None;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input = args[i].clone();
            }
            "--group-by" => {
                i += 1;
                let dim = Dimension::parse(&args[i]).unwrap_or_else(|| {
                    eprintln!("error: unknown dimension {:?}", args[i]);
                    eprintln!("known dimensions: {}", dimension_list());
                    process::exit(2);
                });
                dims.push(dim);
            }
            "--top" => {
                i += 1;
                top = args[i].parse().expect("--top requires a non-negative integer");
            }
            "--csv-dir" => {
                i += 1;
                csv_dir = Some(args[i].clone());
            }
            "--ndjson" => {
                i += 1;
                ndjson_path = Some(args[i].clone());
            }
            "--quiet" => quiet = true,
            other => {
                eprintln!("error: unknown argument {other:?}");
                process::exit(2);
            }
        }
        i += 1;
    }
    if dims.is_empty() {
        dims.push(Dimension::Province);
    }

    let outcome = load_records(&input, &LoaderConfig::canonical()).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });

    if !quiet {
        print_load_summary(&input, &outcome);
        print_quality(&DataQualityReport::build(&outcome.records));
        print_overall(&outcome);
    }

    let aggregates: Vec<(Dimension, GroupedAggregate)> = dims
        .iter()
        .map(|&dim| (dim, group_by(&outcome.records, &[dim])))
        .collect();

    if !quiet {
        for (dim, agg) in &aggregates {
            print_dimension_table(*dim, agg, top);
        }
    }

    if let Some(dir) = &csv_dir {
        std::fs::create_dir_all(dir).unwrap_or_else(|e| {
            eprintln!("error: cannot create {dir}: {e}");
            process::exit(1);
        });
        for (dim, agg) in &aggregates {
            let path = format!("{dir}/{}_summary.csv", dim.label().to_lowercase());
            let file = File::create(&path).unwrap_or_else(|e| {
                eprintln!("error: cannot create {path}: {e}");
                process::exit(1);
            });
            agg.write_csv(BufWriter::new(file)).unwrap_or_else(|e| {
                eprintln!("error: writing {path}: {e}");
                process::exit(1);
            });
            if !quiet {
                println!("Wrote {path}");
            }
        }
    }

    if let Some(path) = &ndjson_path {
        let file = File::create(path).unwrap_or_else(|e| {
            eprintln!("error: cannot create {path}: {e}");
            process::exit(1);
        });
        let mut writer = BufWriter::new(file);
        for (_, agg) in &aggregates {
            agg.write_ndjson(&mut writer).unwrap_or_else(|e| {
                eprintln!("error: writing {path}: {e}");
                process::exit(1);
            });
        }
        if !quiet {
            println!("Wrote {path}");
        }
    }
}

fn dimension_list() -> String {
    Dimension::ALL
        .iter()
        .map(|d| d.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_load_summary(input: &str, outcome: &LoadOutcome) {
    println!("Loaded {input}: {} rows", outcome.report.rows_read);
    if outcome.report.warning_count() > 0 {
        println!("Coerced to missing ({} total):", outcome.report.warning_count());
        for (field, count) in &outcome.report.by_field {
            println!("  {field:<28} {count:>8}");
        }
    }
}

fn print_quality(report: &DataQualityReport) {
    println!("\n=== Data quality ===");
    if let Some((lo, hi)) = report.month_range {
        println!("Transaction months: {} to {}", lo.format("%Y-%m"), hi.format("%Y-%m"));
    }

    println!(
        "{:<22} | {:>9} | {:>12} | {:>12} | {:>10} | {:>10} | {:>10} | {:>10} | {:>12}",
        "Column", "count", "mean", "std", "min", "p25", "p50", "p75", "max"
    );
    println!("{}", "-".repeat(124));
    let row = |name: &str, d: &Option<Describe>| match d {
        Some(d) => println!(
            "{:<22} | {:>9} | {:>12.2} | {:>12.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>12.2}",
            name, d.count, d.mean, d.std_dev, d.min, d.p25, d.p50, d.p75, d.max
        ),
        None => println!("{name:<22} | (no values)"),
    };
    row("TotalPremium", &report.total_premium);
    row("TotalClaims", &report.total_claims);
    row("CustomValueEstimate", &report.custom_value_estimate);
    row("SumInsured", &report.sum_insured);

    if !report.missing.is_empty() {
        println!("\nMissing values per column:");
        let mut entries: Vec<_> = report.missing.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (field, count) in entries {
            println!("  {field:<28} {count:>8}");
        }
    }
}

fn print_overall(outcome: &LoadOutcome) {
    let total = summarize(&outcome.records);
    println!("\n=== Portfolio summary ===");
    println!("Records:         {:>14}", total.record_count);
    println!("Claim rows:      {:>14}", total.claim_count);
    println!("Total premium:   {:>14.2}", total.premium_sum);
    println!("Total claims:    {:>14.2}", total.claims_sum);
    println!("Margin:          {:>14.2}", total.margin());
    println!("Loss ratio:      {:>14}", fmt_ratio(total.loss_ratio()));
    println!("Claim frequency: {:>14}", fmt_pct(total.claim_frequency()));
}

fn print_dimension_table(dim: Dimension, agg: &GroupedAggregate, top: usize) {
    let shown = agg.top_by_count(top);
    let label = if top > 0 {
        format!("top {} of {}", shown.len(), agg.groups.len())
    } else {
        format!("{} levels", agg.groups.len())
    };
    println!("\n=== Loss ratio by {} ({label}) ===", dim.label());
    println!(
        "{:<24} | {:>9} | {:>8} | {:>7} | {:>14} | {:>14} | {:>8}",
        dim.label(),
        "records",
        "claims",
        "freq%",
        "premium",
        "claims_sum",
        "LR%"
    );
    println!("{}", "-".repeat(100));
    for (key, s) in shown {
        println!(
            "{:<24} | {:>9} | {:>8} | {:>7} | {:>14.2} | {:>14.2} | {:>8}",
            key.join(" / "),
            s.record_count,
            s.claim_count,
            fmt_pct(s.claim_frequency()),
            s.premium_sum,
            s.claims_sum,
            fmt_pct(s.loss_ratio()),
        );
    }
}

fn fmt_ratio(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.4}"),
        None => "n/a".to_string(),
    }
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "n/a".to_string(),
    }
}
