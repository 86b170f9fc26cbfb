//! Metric engine: grouped loss-ratio aggregates over policy records.
//!
//! A [`GroupedAggregate`] is derived and read-only: recomputed per analysis,
//! never persisted as a source of truth. The CSV exports exist so notebooks
//! and spreadsheets can pick the tables up; `read_csv` exists so a written
//! table can be verified to round-trip.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use serde::Serialize;
use serde_json::json;

use crate::error::DataError;
use crate::record::PolicyRecord;
use crate::schema;

/// Bucket label for records missing a grouping value. Grouping never drops
/// rows; the gap itself is often the interesting segment.
pub const MISSING_BUCKET: &str = "MISSING";

/// A categorical axis records can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimension {
    Province,
    PostalCode,
    Gender,
    MaritalStatus,
    VehicleType,
    Make,
    Model,
    CoverType,
    TransactionMonth,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Province,
        Dimension::PostalCode,
        Dimension::Gender,
        Dimension::MaritalStatus,
        Dimension::VehicleType,
        Dimension::Make,
        Dimension::Model,
        Dimension::CoverType,
        Dimension::TransactionMonth,
    ];

    /// The source column name this dimension reads from.
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Province => schema::PROVINCE,
            Dimension::PostalCode => schema::POSTAL_CODE,
            Dimension::Gender => schema::GENDER,
            Dimension::MaritalStatus => schema::MARITAL_STATUS,
            Dimension::VehicleType => schema::VEHICLE_TYPE,
            Dimension::Make => schema::MAKE,
            Dimension::Model => schema::MODEL,
            Dimension::CoverType => schema::COVER_TYPE,
            Dimension::TransactionMonth => schema::TRANSACTION_MONTH,
        }
    }

    /// Case-insensitive lookup by column name (CLI `--group-by` values).
    pub fn parse(s: &str) -> Option<Dimension> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(s.trim()))
    }

    /// The record's value on this axis, with missing values bucketed.
    pub fn value(self, r: &PolicyRecord) -> String {
        let text = |v: &Option<String>| v.clone();
        let v = match self {
            Dimension::Province => text(&r.province),
            Dimension::PostalCode => text(&r.postal_code),
            Dimension::Gender => text(&r.gender),
            Dimension::MaritalStatus => text(&r.marital_status),
            Dimension::VehicleType => text(&r.vehicle_type),
            Dimension::Make => text(&r.make),
            Dimension::Model => text(&r.model),
            Dimension::CoverType => text(&r.cover_type),
            Dimension::TransactionMonth => {
                r.transaction_month.map(|m| m.format("%Y-%m").to_string())
            }
        };
        v.unwrap_or_else(|| MISSING_BUCKET.to_string())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Summary statistics for one group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GroupSummary {
    pub record_count: usize,
    /// Rows where a claim occurred.
    pub claim_count: usize,
    /// Sum of present premiums (missing contributes nothing).
    pub premium_sum: f64,
    /// Sum of present claims.
    pub claims_sum: f64,
}

impl GroupSummary {
    pub fn add(&mut self, r: &PolicyRecord) {
        self.record_count += 1;
        if r.claim_occurred() {
            self.claim_count += 1;
        }
        self.premium_sum += r.total_premium.unwrap_or(0.0);
        self.claims_sum += r.total_claims.unwrap_or(0.0);
    }

    pub fn merge(&mut self, other: &GroupSummary) {
        self.record_count += other.record_count;
        self.claim_count += other.claim_count;
        self.premium_sum += other.premium_sum;
        self.claims_sum += other.claims_sum;
    }

    /// Group loss ratio: claims over premium. Undefined (`None`) when the
    /// group collected no premium: reported as such, never coerced to zero
    /// or infinity.
    pub fn loss_ratio(&self) -> Option<f64> {
        if self.premium_sum > 0.0 {
            Some(self.claims_sum / self.premium_sum)
        } else {
            None
        }
    }

    /// Share of rows with a claim. `None` for an empty group.
    pub fn claim_frequency(&self) -> Option<f64> {
        if self.record_count > 0 {
            Some(self.claim_count as f64 / self.record_count as f64)
        } else {
            None
        }
    }

    /// Group underwriting margin: premium collected minus claims paid.
    pub fn margin(&self) -> f64 {
        self.premium_sum - self.claims_sum
    }
}

/// Summarize all records as a single group.
pub fn summarize(records: &[PolicyRecord]) -> GroupSummary {
    let mut total = GroupSummary::default();
    for r in records {
        total.add(r);
    }
    total
}

/// A mapping from group key (one value per dimension) to summary statistics.
/// BTreeMap keeps iteration and export order deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedAggregate {
    /// Column names of the key, in key order.
    pub dimensions: Vec<String>,
    pub groups: BTreeMap<Vec<String>, GroupSummary>,
}

/// Group records by zero or more dimensions. Zero dimensions yields the
/// single whole-population group under an empty key.
pub fn group_by(records: &[PolicyRecord], dims: &[Dimension]) -> GroupedAggregate {
    let mut groups: BTreeMap<Vec<String>, GroupSummary> = BTreeMap::new();
    for r in records {
        let key: Vec<String> = dims.iter().map(|d| d.value(r)).collect();
        groups.entry(key).or_default().add(r);
    }
    GroupedAggregate {
        dimensions: dims.iter().map(|d| d.label().to_string()).collect(),
        groups,
    }
}

const SUMMARY_COLUMNS: [&str; 5] =
    ["record_count", "claim_count", "premium_sum", "claims_sum", "loss_ratio"];

impl GroupedAggregate {
    /// Re-aggregate to the whole-population level. Summing group sums must
    /// reproduce the ungrouped aggregate.
    pub fn total(&self) -> GroupSummary {
        let mut total = GroupSummary::default();
        for summary in self.groups.values() {
            total.merge(summary);
        }
        total
    }

    /// Groups ordered by record count, largest first (key order breaks ties),
    /// truncated to `n` when `n > 0`.
    pub fn top_by_count(&self, n: usize) -> Vec<(&Vec<String>, &GroupSummary)> {
        let mut entries: Vec<_> = self.groups.iter().collect();
        entries.sort_by(|a, b| b.1.record_count.cmp(&a.1.record_count).then(a.0.cmp(b.0)));
        if n > 0 {
            entries.truncate(n);
        }
        entries
    }

    /// Write the aggregate as CSV: key columns, then the summary columns.
    /// An undefined loss ratio is written as an empty field.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DataError> {
        let mut w = csv::Writer::from_writer(writer);
        let header: Vec<&str> = self
            .dimensions
            .iter()
            .map(String::as_str)
            .chain(SUMMARY_COLUMNS)
            .collect();
        w.write_record(&header)?;

        for (key, s) in &self.groups {
            let mut row: Vec<String> = key.clone();
            row.push(s.record_count.to_string());
            row.push(s.claim_count.to_string());
            // `{}` prints the shortest representation that parses back to the
            // same f64, so the round-trip is exact.
            row.push(format!("{}", s.premium_sum));
            row.push(format!("{}", s.claims_sum));
            row.push(s.loss_ratio().map(|lr| format!("{lr}")).unwrap_or_default());
            w.write_record(&row)?;
        }
        w.flush().map_err(|source| DataError::Io {
            path: "<csv writer>".to_string(),
            source,
        })?;
        Ok(())
    }

    /// Read an aggregate previously written by [`write_csv`]. The trailing
    /// `loss_ratio` column is derived and therefore ignored on the way in.
    pub fn read_csv<R: Read>(reader: R) -> Result<GroupedAggregate, DataError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let header = rdr.headers()?.clone();

        let key_width = header
            .iter()
            .position(|c| c == SUMMARY_COLUMNS[0])
            .ok_or_else(|| DataError::HeaderMismatch {
                missing: vec![SUMMARY_COLUMNS[0].to_string()],
            })?;
        let missing: Vec<String> = SUMMARY_COLUMNS
            .iter()
            .enumerate()
            .filter(|&(i, &name)| header.get(key_width + i) != Some(name))
            .map(|(_, name)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DataError::HeaderMismatch { missing });
        }

        let dimensions: Vec<String> =
            header.iter().take(key_width).map(str::to_string).collect();

        let mut groups = BTreeMap::new();
        for result in rdr.records() {
            let rec = result?;
            let key: Vec<String> =
                rec.iter().take(key_width).map(str::to_string).collect();
            let field = |offset: usize| rec.get(key_width + offset).unwrap_or("");
            let summary = GroupSummary {
                record_count: field(0).parse().unwrap_or(0),
                claim_count: field(1).parse().unwrap_or(0),
                premium_sum: field(2).parse().unwrap_or(0.0),
                claims_sum: field(3).parse().unwrap_or(0.0),
            };
            groups.insert(key, summary);
        }
        Ok(GroupedAggregate { dimensions, groups })
    }

    /// Write one JSON object per group, the same one-line-per-entry shape the
    /// rest of the tooling consumes.
    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<(), DataError> {
        let io_err = |source| DataError::Io { path: "<ndjson writer>".to_string(), source };
        for (key, s) in &self.groups {
            let key_obj: serde_json::Map<String, serde_json::Value> = self
                .dimensions
                .iter()
                .zip(key)
                .map(|(d, v)| (d.clone(), json!(v)))
                .collect();
            let line = json!({
                "group": key_obj,
                "record_count": s.record_count,
                "claim_count": s.claim_count,
                "premium_sum": s.premium_sum,
                "claims_sum": s.claims_sum,
                "loss_ratio": s.loss_ratio(),
                "claim_frequency": s.claim_frequency(),
            });
            serde_json::to_writer(&mut writer, &line)
                .map_err(|e| io_err(std::io::Error::other(e)))?;
            writeln!(writer).map_err(io_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn record(province: Option<&str>, premium: Option<f64>, claims: Option<f64>) -> PolicyRecord {
        PolicyRecord {
            province: province.map(str::to_string),
            total_premium: premium,
            total_claims: claims,
            ..PolicyRecord::empty()
        }
    }

    #[test]
    fn single_group_matches_worked_example() {
        // Premiums [100, 200], claims [50, 300] as one group:
        // premium_sum 300, claims_sum 350, loss ratio ≈ 1.1667.
        let records = vec![
            record(Some("Gauteng"), Some(100.0), Some(50.0)),
            record(Some("Gauteng"), Some(200.0), Some(300.0)),
        ];
        let agg = group_by(&records, &[Dimension::Province]);
        let s = &agg.groups[&vec!["Gauteng".to_string()]];
        assert_eq!(s.record_count, 2);
        assert!((s.premium_sum - 300.0).abs() < 1e-12);
        assert!((s.claims_sum - 350.0).abs() < 1e-12);
        assert!((s.loss_ratio().unwrap() - 350.0 / 300.0).abs() < 1e-12);
        assert!((s.loss_ratio().unwrap() - 1.1667).abs() < 1e-4);
    }

    #[test]
    fn zero_premium_group_has_undefined_loss_ratio() {
        let records = vec![
            record(Some("Free State"), Some(0.0), Some(10.0)),
            record(Some("Free State"), None, Some(5.0)),
        ];
        let agg = group_by(&records, &[Dimension::Province]);
        let s = &agg.groups[&vec!["Free State".to_string()]];
        assert_eq!(s.loss_ratio(), None, "zero premium must be undefined, not 0 or inf");
        assert!((s.claims_sum - 15.0).abs() < 1e-12);
    }

    #[test]
    fn missing_dimension_values_bucket_together() {
        let records = vec![
            record(None, Some(10.0), None),
            record(None, Some(20.0), None),
            record(Some("Limpopo"), Some(5.0), None),
        ];
        let agg = group_by(&records, &[Dimension::Province]);
        assert_eq!(agg.groups.len(), 2);
        let s = &agg.groups[&vec![MISSING_BUCKET.to_string()]];
        assert_eq!(s.record_count, 2);
        assert!((s.premium_sum - 30.0).abs() < 1e-12);
    }

    #[test]
    fn zero_dimensions_is_the_whole_population() {
        let records = vec![
            record(Some("Gauteng"), Some(100.0), Some(50.0)),
            record(Some("Limpopo"), Some(200.0), Some(300.0)),
        ];
        let agg = group_by(&records, &[]);
        assert_eq!(agg.groups.len(), 1);
        let s = &agg.groups[&Vec::<String>::new()];
        assert_eq!(s.record_count, 2);
        assert_eq!(s, &summarize(&records));
    }

    #[test]
    fn groups_reaggregate_to_population_total() {
        let records = vec![
            record(Some("Gauteng"), Some(100.0), Some(50.0)),
            record(Some("Limpopo"), Some(200.0), Some(300.0)),
            record(None, Some(40.0), None),
            record(Some("Gauteng"), None, Some(10.0)),
        ];
        let agg = group_by(&records, &[Dimension::Province]);
        let total = agg.total();
        let direct = summarize(&records);
        assert_eq!(total.record_count, direct.record_count);
        assert_eq!(total.claim_count, direct.claim_count);
        assert!((total.premium_sum - direct.premium_sum).abs() < 1e-9);
        assert!((total.claims_sum - direct.claims_sum).abs() < 1e-9);
    }

    #[test]
    fn top_by_count_orders_and_truncates() {
        let records = vec![
            record(Some("A"), Some(1.0), None),
            record(Some("B"), Some(1.0), None),
            record(Some("B"), Some(1.0), None),
            record(Some("C"), Some(1.0), None),
            record(Some("C"), Some(1.0), None),
            record(Some("C"), Some(1.0), None),
        ];
        let agg = group_by(&records, &[Dimension::Province]);
        let top = agg.top_by_count(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, &vec!["C".to_string()]);
        assert_eq!(top[1].0, &vec!["B".to_string()]);
        // n = 0 keeps everything.
        assert_eq!(agg.top_by_count(0).len(), 3);
    }

    #[test]
    fn csv_round_trip_reproduces_keys_and_values() {
        let records = vec![
            record(Some("Gauteng"), Some(100.25), Some(50.125)),
            record(Some("Gauteng"), Some(200.0), Some(300.625)),
            record(Some("Western Cape"), Some(0.0), Some(17.5)),
            record(None, Some(41.333333333333336), None),
        ];
        let agg = group_by(&records, &[Dimension::Province]);

        let mut buf: Vec<u8> = Vec::new();
        agg.write_csv(&mut buf).expect("write");
        let back = GroupedAggregate::read_csv(buf.as_slice()).expect("read");

        assert_eq!(back.dimensions, agg.dimensions);
        assert_eq!(
            back.groups.keys().collect::<Vec<_>>(),
            agg.groups.keys().collect::<Vec<_>>(),
            "group keys must survive the round trip exactly"
        );
        for (key, s) in &agg.groups {
            let b = &back.groups[key];
            assert_eq!(b.record_count, s.record_count);
            assert_eq!(b.claim_count, s.claim_count);
            assert!((b.premium_sum - s.premium_sum).abs() < 1e-9);
            assert!((b.claims_sum - s.claims_sum).abs() < 1e-9);
            match (s.loss_ratio(), b.loss_ratio()) {
                (None, None) => {}
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9),
                other => panic!("loss ratio definedness changed in round trip: {other:?}"),
            }
        }
    }

    #[test]
    fn read_csv_rejects_foreign_header() {
        let input = "Province,count\nGauteng,3\n";
        let err = GroupedAggregate::read_csv(input.as_bytes())
            .expect_err("header without summary columns must fail");
        assert!(matches!(err, DataError::HeaderMismatch { .. }), "got {err:?}");
    }

    #[test]
    fn ndjson_lines_carry_group_and_null_loss_ratio() {
        let records = vec![record(Some("Eastern Cape"), Some(0.0), Some(5.0))];
        let agg = group_by(&records, &[Dimension::Province]);

        let mut buf: Vec<u8> = Vec::new();
        agg.write_ndjson(&mut buf).expect("write");
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);

        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["group"]["Province"], "Eastern Cape");
        assert_eq!(v["record_count"], 1);
        assert!(v["loss_ratio"].is_null(), "undefined loss ratio must serialize as null");
    }

    proptest! {
        /// Grouping by one dimension and re-aggregating reproduces the
        /// ungrouped totals, whatever the data looks like.
        #[test]
        fn grouping_preserves_totals(
            rows in prop::collection::vec(
                (
                    prop_oneof![Just(None), Just(Some("A")), Just(Some("B")), Just(Some("C"))],
                    prop::option::of(0.0..10_000.0f64),
                    prop::option::of(0.0..10_000.0f64),
                ),
                0..60,
            )
        ) {
            let records: Vec<PolicyRecord> =
                rows.iter().map(|(p, prem, cl)| record(*p, *prem, *cl)).collect();
            let agg = group_by(&records, &[Dimension::Province]);
            let total = agg.total();
            let direct = summarize(&records);
            prop_assert_eq!(total.record_count, direct.record_count);
            prop_assert_eq!(total.claim_count, direct.claim_count);
            prop_assert!((total.premium_sum - direct.premium_sum).abs() < 1e-6);
            prop_assert!((total.claims_sum - direct.claims_sum).abs() < 1e-6);
        }
    }
}
