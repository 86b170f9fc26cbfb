//! Hypothesis test runner: chi-square, two-proportion z, Welch t,
//! Mann-Whitney U, and Kruskal-Wallis over grouped claim data.
//!
//! The contract is strict about validity: a group below the configured
//! minimum sample count fails the test with `StatError::InsufficientData`
//! instead of returning a low-confidence p-value, and every result states
//! the significance threshold it was judged at.
//!
//! All p-values are two-sided. The rank tests use the normal / chi-square
//! approximations with tie correction (and continuity correction for
//! Mann-Whitney), matching the reference implementations' asymptotic mode.

use std::fmt;

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

use crate::aggregate::{Dimension, group_by};
use crate::error::StatError;
use crate::record::PolicyRecord;

// ── Distribution tails ──────────────────────────────────────────────────────

fn chi2_sf(stat: f64, df: f64) -> f64 {
    let dist = ChiSquared::new(df).expect("callers guarantee df > 0");
    (1.0 - dist.cdf(stat)).clamp(0.0, 1.0)
}

fn normal_sf(z: f64) -> f64 {
    let dist = Normal::new(0.0, 1.0).expect("unit normal");
    (1.0 - dist.cdf(z)).clamp(0.0, 1.0)
}

fn student_t_sf(t: f64, df: f64) -> f64 {
    let dist = StudentsT::new(0.0, 1.0, df).expect("callers guarantee df > 0");
    (1.0 - dist.cdf(t)).clamp(0.0, 1.0)
}

// ── Sample moments and ranks ────────────────────────────────────────────────

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (ddof = 1). Callers guarantee `xs.len() >= 2`.
fn var_sample(xs: &[f64], mean: f64) -> f64 {
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// 1-based ranks with ties averaged, plus the tie correction term Σ(t³ − t)
/// over tie runs. Ranks come back in input order.
pub(crate) fn rank_with_ties(values: &[f64]) -> (Vec<f64>, f64) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut tie_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j share the average of ranks i+1..=j+1.
        let avg = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        let t = (j - i + 1) as f64;
        tie_sum += t * t * t - t;
        i = j + 1;
    }
    (ranks, tie_sum)
}

// ── Test statistics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChiSquare {
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Pearson chi-square test of independence on an r × c contingency table of
/// counts. Expected cells of zero contribute nothing (a degenerate all-zero
/// table is rejected up front).
pub fn chi_square_independence(table: &[Vec<f64>]) -> Result<ChiSquare, StatError> {
    let degenerate = |detail: String| StatError::DegenerateInput { test: "chi-square", detail };

    let r = table.len();
    if r < 2 {
        return Err(degenerate(format!("need at least 2 rows, have {r}")));
    }
    let c = table[0].len();
    if c < 2 || table.iter().any(|row| row.len() != c) {
        return Err(degenerate("need a rectangular table with at least 2 columns".into()));
    }
    if table.iter().flatten().any(|&v| !v.is_finite() || v < 0.0) {
        return Err(degenerate("cell counts must be finite and non-negative".into()));
    }

    let row_sums: Vec<f64> = table.iter().map(|row| row.iter().sum()).collect();
    let col_sums: Vec<f64> =
        (0..c).map(|j| table.iter().map(|row| row[j]).sum()).collect();
    let total: f64 = row_sums.iter().sum();
    if total <= 0.0 {
        return Err(degenerate("table sums to zero".into()));
    }

    let mut stat = 0.0;
    for i in 0..r {
        for j in 0..c {
            let e = row_sums[i] * col_sums[j] / total;
            if e <= 0.0 {
                continue;
            }
            let d = table[i][j] - e;
            stat += d * d / e;
        }
    }

    let df = ((r - 1) * (c - 1)) as f64;
    Ok(ChiSquare { statistic: stat, df, p_value: chi2_sf(stat, df) })
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TwoProportionZ {
    pub z: f64,
    pub p_value: f64,
}

/// Two-sided pooled two-proportion z-test of H0: p1 = p2, with k successes
/// out of n trials on each side.
pub fn two_proportion_z(
    k1: usize,
    n1: usize,
    k2: usize,
    n2: usize,
) -> Result<TwoProportionZ, StatError> {
    let degenerate =
        |detail: String| StatError::DegenerateInput { test: "two-proportion z", detail };
    if n1 == 0 || n2 == 0 {
        return Err(degenerate("both samples must be non-empty".into()));
    }
    let (p1, p2) = (k1 as f64 / n1 as f64, k2 as f64 / n2 as f64);
    let pool = (k1 + k2) as f64 / (n1 + n2) as f64;
    let se = (pool * (1.0 - pool) * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    if se == 0.0 {
        return Err(degenerate("pooled proportion is 0 or 1, standard error vanishes".into()));
    }
    let z = (p1 - p2) / se;
    Ok(TwoProportionZ { z, p_value: (2.0 * normal_sf(z.abs())).min(1.0) })
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TwoSampleT {
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Welch's two-sided t-test (unequal variances, Welch-Satterthwaite df).
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TwoSampleT, StatError> {
    let degenerate = |detail: String| StatError::DegenerateInput { test: "Welch t", detail };
    if a.len() < 2 || b.len() < 2 {
        return Err(degenerate("each sample needs at least 2 values".into()));
    }
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (var_sample(a, ma), var_sample(b, mb));
    let (sa, sb) = (va / a.len() as f64, vb / b.len() as f64);
    if sa + sb == 0.0 {
        return Err(degenerate("both samples are constant".into()));
    }
    let t = (ma - mb) / (sa + sb).sqrt();
    let df = (sa + sb).powi(2)
        / (sa.powi(2) / (a.len() - 1) as f64 + sb.powi(2) / (b.len() - 1) as f64);
    Ok(TwoSampleT { t, df, p_value: (2.0 * student_t_sf(t.abs(), df)).min(1.0) })
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MannWhitney {
    /// U statistic of the first sample.
    pub u: f64,
    pub p_value: f64,
}

/// Two-sided Mann-Whitney U, normal approximation with tie correction and
/// continuity correction.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Result<MannWhitney, StatError> {
    let degenerate = |detail: String| StatError::DegenerateInput { test: "Mann-Whitney U", detail };
    if a.is_empty() || b.is_empty() {
        return Err(degenerate("both samples must be non-empty".into()));
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let n = n1 + n2;

    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_sum) = rank_with_ties(&pooled);
    let r1: f64 = ranks[..a.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;

    let mu = n1 * n2 / 2.0;
    let tie_adjust = if n > 1.0 { tie_sum / (n * (n - 1.0)) } else { 0.0 };
    let sigma_sq = n1 * n2 / 12.0 * ((n + 1.0) - tie_adjust);
    if sigma_sq <= 0.0 {
        return Err(degenerate("all pooled values are identical".into()));
    }

    let d = u1 - mu;
    // Continuity correction pulls the statistic half a step toward the mean
    // (f64::signum would send 0.0 to 1.0, hence the explicit zero case).
    let cc = if d == 0.0 { 0.0 } else { 0.5 * d.signum() };
    let z = (d - cc) / sigma_sq.sqrt();
    Ok(MannWhitney { u: u1, p_value: (2.0 * normal_sf(z.abs())).min(1.0) })
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct KruskalWallis {
    pub h: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Kruskal-Wallis H across k groups, tie-corrected, chi-square approximation
/// with k − 1 degrees of freedom.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Result<KruskalWallis, StatError> {
    let degenerate = |detail: String| StatError::DegenerateInput { test: "Kruskal-Wallis", detail };
    if groups.len() < 2 {
        return Err(degenerate(format!("need at least 2 groups, have {}", groups.len())));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Err(degenerate("every group must be non-empty".into()));
    }

    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = pooled.len() as f64;
    let (ranks, tie_sum) = rank_with_ties(&pooled);

    let mut h = 0.0;
    let mut offset = 0;
    for g in groups {
        let r: f64 = ranks[offset..offset + g.len()].iter().sum();
        h += r * r / g.len() as f64;
        offset += g.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_sum / (n * n * n - n);
    if correction <= 0.0 {
        return Err(degenerate("all pooled values are identical".into()));
    }
    h /= correction;

    let df = (groups.len() - 1) as f64;
    Ok(KruskalWallis { h, df, p_value: chi2_sf(h, df) })
}

// ── Grouped inputs ──────────────────────────────────────────────────────────

/// Claim frequency counts for one level of a dimension.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyLevel {
    pub level: String,
    pub claims: usize,
    pub records: usize,
}

/// Continuous per-record values for one level of a dimension.
#[derive(Debug, Clone)]
pub struct ValueGroup {
    pub level: String,
    pub values: Vec<f64>,
}

/// Claim counts per level of `dim`, in deterministic level order.
pub fn frequency_by(records: &[PolicyRecord], dim: Dimension) -> Vec<FrequencyLevel> {
    group_by(records, &[dim])
        .groups
        .into_iter()
        .map(|(key, s)| FrequencyLevel {
            level: key.into_iter().next().unwrap_or_default(),
            claims: s.claim_count,
            records: s.record_count,
        })
        .collect()
}

/// Present values of `metric` per level of `dim`, in deterministic level order.
pub fn values_by<F>(records: &[PolicyRecord], dim: Dimension, metric: F) -> Vec<ValueGroup>
where
    F: Fn(&PolicyRecord) -> Option<f64>,
{
    let mut groups: std::collections::BTreeMap<String, Vec<f64>> = Default::default();
    for r in records {
        if let Some(v) = metric(r) {
            groups.entry(dim.value(r)).or_default().push(v);
        }
    }
    groups
        .into_iter()
        .map(|(level, values)| ValueGroup { level, values })
        .collect()
}

/// Claim severity (claim amount given occurrence) per level.
pub fn severity_by(records: &[PolicyRecord], dim: Dimension) -> Vec<ValueGroup> {
    values_by(records, dim, PolicyRecord::claim_severity)
}

/// Underwriting margin per level.
pub fn margin_by(records: &[PolicyRecord], dim: Dimension) -> Vec<ValueGroup> {
    values_by(records, dim, PolicyRecord::margin)
}

// ── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Conclusion {
    RejectNull,
    FailToRejectNull,
}

impl Conclusion {
    fn at(p_value: f64, alpha: f64) -> Self {
        if p_value < alpha { Conclusion::RejectNull } else { Conclusion::FailToRejectNull }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conclusion::RejectNull => write!(f, "reject H0"),
            Conclusion::FailToRejectNull => write!(f, "fail to reject H0"),
        }
    }
}

/// Outcome of one hypothesis test, including the threshold it was judged at.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub test: &'static str,
    pub dimension: String,
    /// What was compared: "claim frequency", "claim severity", "margin".
    pub metric: &'static str,
    pub statistic: f64,
    pub df: Option<f64>,
    pub p_value: f64,
    pub alpha: f64,
    pub conclusion: Conclusion,
    /// For two-sample tests, which level ran higher on the metric.
    pub direction: Option<String>,
}

impl TestResult {
    /// Plain-language interpretation line.
    pub fn verdict(&self) -> String {
        match self.conclusion {
            Conclusion::RejectNull => {
                let direction = self
                    .direction
                    .as_ref()
                    .map(|d| format!("; {d}"))
                    .unwrap_or_default();
                format!(
                    "reject H0: {} differs across {} (p = {:.4e} < {}{})",
                    self.metric, self.dimension, self.p_value, self.alpha, direction
                )
            }
            Conclusion::FailToRejectNull => format!(
                "fail to reject H0: no evidence {} differs across {} (p = {:.4} >= {})",
                self.metric, self.dimension, self.p_value, self.alpha
            ),
        }
    }
}

// ── Runner ──────────────────────────────────────────────────────────────────

/// Applies the statistically appropriate test to grouped claim data and
/// enforces the minimum-sample-count validity gate.
#[derive(Debug, Clone)]
pub struct TestRunner {
    /// Significance threshold results are judged at.
    pub alpha: f64,
    /// Smallest group size a test will accept.
    pub min_group_size: usize,
}

impl TestRunner {
    pub fn canonical() -> Self {
        TestRunner { alpha: 0.05, min_group_size: 30 }
    }

    fn require(
        &self,
        test: &'static str,
        dimension: &str,
        group: &str,
        n: usize,
    ) -> Result<(), StatError> {
        if n < self.min_group_size {
            return Err(StatError::InsufficientData {
                test,
                dimension: dimension.to_string(),
                group: group.to_string(),
                n,
                required: self.min_group_size,
            });
        }
        Ok(())
    }

    /// Chi-square: is claim frequency independent of the dimension?
    pub fn chi_square_frequency(
        &self,
        dimension: &str,
        levels: &[FrequencyLevel],
    ) -> Result<TestResult, StatError> {
        for l in levels {
            self.require("chi-square", dimension, &l.level, l.records)?;
        }
        let table: Vec<Vec<f64>> = levels
            .iter()
            .map(|l| vec![l.claims as f64, (l.records - l.claims) as f64])
            .collect();
        let chi = chi_square_independence(&table)?;
        Ok(TestResult {
            test: "chi-square independence",
            dimension: dimension.to_string(),
            metric: "claim frequency",
            statistic: chi.statistic,
            df: Some(chi.df),
            p_value: chi.p_value,
            alpha: self.alpha,
            conclusion: Conclusion::at(chi.p_value, self.alpha),
            direction: None,
        })
    }

    /// Two-proportion z-test of claim frequency, one level against another
    /// (typically the rest of the population).
    pub fn z_frequency_between(
        &self,
        dimension: &str,
        a: &FrequencyLevel,
        b: &FrequencyLevel,
    ) -> Result<TestResult, StatError> {
        self.require("two-proportion z", dimension, &a.level, a.records)?;
        self.require("two-proportion z", dimension, &b.level, b.records)?;
        let z = two_proportion_z(a.claims, a.records, b.claims, b.records)?;
        Ok(TestResult {
            test: "two-proportion z",
            dimension: dimension.to_string(),
            metric: "claim frequency",
            statistic: z.z,
            df: None,
            p_value: z.p_value,
            alpha: self.alpha,
            conclusion: Conclusion::at(z.p_value, self.alpha),
            direction: Some(direction_label(
                &a.level,
                a.claims as f64 / a.records as f64,
                &b.level,
                b.claims as f64 / b.records as f64,
            )),
        })
    }

    /// Welch t-test of a continuous metric between two levels.
    pub fn welch_between(
        &self,
        dimension: &str,
        metric: &'static str,
        a: &ValueGroup,
        b: &ValueGroup,
    ) -> Result<TestResult, StatError> {
        self.require("Welch t", dimension, &a.level, a.values.len())?;
        self.require("Welch t", dimension, &b.level, b.values.len())?;
        let t = welch_t_test(&a.values, &b.values)?;
        Ok(TestResult {
            test: "Welch t",
            dimension: dimension.to_string(),
            metric,
            statistic: t.t,
            df: Some(t.df),
            p_value: t.p_value,
            alpha: self.alpha,
            conclusion: Conclusion::at(t.p_value, self.alpha),
            direction: Some(direction_label(
                &a.level,
                mean(&a.values),
                &b.level,
                mean(&b.values),
            )),
        })
    }

    /// Mann-Whitney U of a continuous metric between two levels.
    pub fn mann_whitney_between(
        &self,
        dimension: &str,
        metric: &'static str,
        a: &ValueGroup,
        b: &ValueGroup,
    ) -> Result<TestResult, StatError> {
        self.require("Mann-Whitney U", dimension, &a.level, a.values.len())?;
        self.require("Mann-Whitney U", dimension, &b.level, b.values.len())?;
        let mw = mann_whitney_u(&a.values, &b.values)?;
        Ok(TestResult {
            test: "Mann-Whitney U",
            dimension: dimension.to_string(),
            metric,
            statistic: mw.u,
            df: None,
            p_value: mw.p_value,
            alpha: self.alpha,
            conclusion: Conclusion::at(mw.p_value, self.alpha),
            direction: Some(direction_label(
                &a.level,
                mean(&a.values),
                &b.level,
                mean(&b.values),
            )),
        })
    }

    /// Kruskal-Wallis of a continuous metric across every supplied level.
    pub fn kruskal_across(
        &self,
        dimension: &str,
        metric: &'static str,
        groups: &[ValueGroup],
    ) -> Result<TestResult, StatError> {
        for g in groups {
            self.require("Kruskal-Wallis", dimension, &g.level, g.values.len())?;
        }
        let slices: Vec<&[f64]> = groups.iter().map(|g| g.values.as_slice()).collect();
        let kw = kruskal_wallis(&slices)?;
        Ok(TestResult {
            test: "Kruskal-Wallis",
            dimension: dimension.to_string(),
            metric,
            statistic: kw.h,
            df: Some(kw.df),
            p_value: kw.p_value,
            alpha: self.alpha,
            conclusion: Conclusion::at(kw.p_value, self.alpha),
            direction: None,
        })
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::canonical()
    }
}

fn direction_label(a: &str, va: f64, b: &str, vb: f64) -> String {
    if va > vb {
        format!("{a} > {b}")
    } else if vb > va {
        format!("{b} > {a}")
    } else {
        format!("{a} = {b}")
    }
}

// ── Per-level summary with vs-rest tests ────────────────────────────────────

/// One level's row in a dimension report: loss-ratio KPIs plus the
/// level-vs-rest frequency and severity tests. Test fields are `None` when
/// either side is below the runner's minimum or the statistic is degenerate;
/// the KPI columns are always present.
#[derive(Debug, Clone, Serialize)]
pub struct LevelStats {
    pub level: String,
    pub records: usize,
    pub claims: usize,
    pub claim_frequency: Option<f64>,
    pub premium_sum: f64,
    pub claims_sum: f64,
    pub loss_ratio: Option<f64>,
    pub freq_z_vs_rest: Option<f64>,
    pub freq_p_vs_rest: Option<f64>,
    pub severity_p_vs_rest: Option<f64>,
}

/// Summarize the `top_n` largest levels of a dimension (0 = all), testing
/// each against the rest of the population.
pub fn level_report(
    runner: &TestRunner,
    records: &[PolicyRecord],
    dim: Dimension,
    top_n: usize,
) -> Vec<LevelStats> {
    let agg = group_by(records, &[dim]);
    let total = agg.total();
    let severity = severity_by(records, dim);
    let severity_total: usize = severity.iter().map(|g| g.values.len()).sum();

    let mut out = Vec::new();
    for (key, s) in agg.top_by_count(top_n) {
        let level = key[0].clone();

        let rest = FrequencyLevel {
            level: "rest".to_string(),
            claims: total.claim_count - s.claim_count,
            records: total.record_count - s.record_count,
        };
        let here = FrequencyLevel {
            level: level.clone(),
            claims: s.claim_count,
            records: s.record_count,
        };
        let freq = runner.z_frequency_between(dim.label(), &here, &rest).ok();

        let sev_here = severity.iter().find(|g| g.level == level);
        let sev = sev_here.and_then(|g| {
            let rest_values: Vec<f64> = severity
                .iter()
                .filter(|o| o.level != level)
                .flat_map(|o| o.values.iter().copied())
                .collect();
            debug_assert_eq!(g.values.len() + rest_values.len(), severity_total);
            let rest_group = ValueGroup { level: "rest".to_string(), values: rest_values };
            runner
                .mann_whitney_between(dim.label(), "claim severity", g, &rest_group)
                .ok()
        });

        out.push(LevelStats {
            level,
            records: s.record_count,
            claims: s.claim_count,
            claim_frequency: s.claim_frequency(),
            premium_sum: s.premium_sum,
            claims_sum: s.claims_sum,
            loss_ratio: s.loss_ratio(),
            freq_z_vs_rest: freq.as_ref().map(|t| t.statistic),
            freq_p_vs_rest: freq.as_ref().map(|t| t.p_value),
            severity_p_vs_rest: sev.as_ref().map(|t| t.p_value),
        });
    }
    out
}

// ── Battery ─────────────────────────────────────────────────────────────────

/// One named test in the standard battery.
#[derive(Debug)]
pub struct BatteryOutcome {
    pub name: String,
    pub result: Result<TestResult, StatError>,
}

/// The standard battery over a loaded portfolio: claim frequency and severity
/// across provinces, frequency and margin across the ten largest postal
/// codes, and frequency plus severity between genders.
///
/// Levels below the runner's minimum are excluded up front (the tests
/// themselves stay strict); a dimension left with fewer than two eligible
/// levels yields a degenerate-input outcome rather than a silent skip.
pub fn battery(runner: &TestRunner, records: &[PolicyRecord]) -> Vec<BatteryOutcome> {
    let mut out = Vec::new();

    let eligible_freq = |levels: Vec<FrequencyLevel>| -> Vec<FrequencyLevel> {
        levels.into_iter().filter(|l| l.records >= runner.min_group_size).collect()
    };
    let eligible_values = |groups: Vec<ValueGroup>| -> Vec<ValueGroup> {
        groups.into_iter().filter(|g| g.values.len() >= runner.min_group_size).collect()
    };
    let too_few = |test: &'static str, n: usize| StatError::DegenerateInput {
        test,
        detail: format!("fewer than 2 eligible levels ({n})"),
    };

    // Claim frequency across provinces.
    let freq = eligible_freq(frequency_by(records, Dimension::Province));
    out.push(BatteryOutcome {
        name: "claim frequency across Province (chi-square)".to_string(),
        result: if freq.len() < 2 {
            Err(too_few("chi-square", freq.len()))
        } else {
            runner.chi_square_frequency(Dimension::Province.label(), &freq)
        },
    });

    // Claim severity across provinces.
    let sev = eligible_values(severity_by(records, Dimension::Province));
    out.push(BatteryOutcome {
        name: "claim severity across Province (Kruskal-Wallis)".to_string(),
        result: if sev.len() < 2 {
            Err(too_few("Kruskal-Wallis", sev.len()))
        } else {
            runner.kruskal_across(Dimension::Province.label(), "claim severity", &sev)
        },
    });

    // Frequency and margin across the ten largest postal codes.
    let mut zip_freq = eligible_freq(frequency_by(records, Dimension::PostalCode));
    zip_freq.sort_by(|a, b| b.records.cmp(&a.records).then(a.level.cmp(&b.level)));
    zip_freq.truncate(10);
    let zip_levels: Vec<String> = zip_freq.iter().map(|l| l.level.clone()).collect();
    out.push(BatteryOutcome {
        name: "claim frequency across top-10 PostalCode (chi-square)".to_string(),
        result: if zip_freq.len() < 2 {
            Err(too_few("chi-square", zip_freq.len()))
        } else {
            runner.chi_square_frequency(Dimension::PostalCode.label(), &zip_freq)
        },
    });

    let zip_margin: Vec<ValueGroup> = eligible_values(margin_by(records, Dimension::PostalCode))
        .into_iter()
        .filter(|g| zip_levels.contains(&g.level))
        .collect();
    out.push(BatteryOutcome {
        name: "margin across top-10 PostalCode (Kruskal-Wallis)".to_string(),
        result: if zip_margin.len() < 2 {
            Err(too_few("Kruskal-Wallis", zip_margin.len()))
        } else {
            runner.kruskal_across(Dimension::PostalCode.label(), "margin", &zip_margin)
        },
    });

    // Gender: frequency across all labels, severity Male vs Female.
    let gender_freq = eligible_freq(frequency_by(records, Dimension::Gender));
    out.push(BatteryOutcome {
        name: "claim frequency across Gender (chi-square)".to_string(),
        result: if gender_freq.len() < 2 {
            Err(too_few("chi-square", gender_freq.len()))
        } else {
            runner.chi_square_frequency(Dimension::Gender.label(), &gender_freq)
        },
    });

    let gender_sev = severity_by(records, Dimension::Gender);
    let male = gender_sev.iter().find(|g| g.level == "Male");
    let female = gender_sev.iter().find(|g| g.level == "Female");
    out.push(BatteryOutcome {
        name: "claim severity Male vs Female (Mann-Whitney U)".to_string(),
        result: match (male, female) {
            (Some(m), Some(f)) => {
                runner.mann_whitney_between(Dimension::Gender.label(), "claim severity", m, f)
            }
            _ => Err(StatError::DegenerateInput {
                test: "Mann-Whitney U",
                detail: "Male and Female severity samples not both present".to_string(),
            }),
        },
    });

    // Margin is near-symmetric, so the mean comparison gets the parametric
    // test.
    let gender_margin = margin_by(records, Dimension::Gender);
    let male_m = gender_margin.iter().find(|g| g.level == "Male");
    let female_m = gender_margin.iter().find(|g| g.level == "Female");
    out.push(BatteryOutcome {
        name: "margin Male vs Female (Welch t)".to_string(),
        result: match (male_m, female_m) {
            (Some(m), Some(f)) => {
                runner.welch_between(Dimension::Gender.label(), "margin", m, f)
            }
            _ => Err(StatError::DegenerateInput {
                test: "Welch t",
                detail: "Male and Female margin samples not both present".to_string(),
            }),
        },
    });

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Rank helper ───────────────────────────────────────────────────────────

    #[test]
    fn ranks_average_over_ties() {
        let (ranks, tie_sum) = rank_with_ties(&[1.0, 2.0, 2.0, 3.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
        // One run of 2 tied values: 2³ − 2 = 6.
        assert!((tie_sum - 6.0).abs() < 1e-12);
    }

    #[test]
    fn ranks_preserve_input_order() {
        let (ranks, tie_sum) = rank_with_ties(&[30.0, 10.0, 20.0]);
        assert_eq!(ranks, vec![3.0, 1.0, 2.0]);
        assert!((tie_sum - 0.0).abs() < 1e-12);
    }

    // ── Test statistics against reference values ─────────────────────────────

    /// 2x2 table with equal margins: stat = 100/15 ≈ 6.667, df = 1,
    /// p ≈ 0.0098 (reference: scipy.stats.chi2_contingency without Yates).
    #[test]
    fn chi_square_reference_2x2() {
        let chi = chi_square_independence(&[vec![10.0, 20.0], vec![20.0, 10.0]]).unwrap();
        assert!((chi.statistic - 100.0 / 15.0).abs() < 1e-9, "stat {}", chi.statistic);
        assert_eq!(chi.df, 1.0);
        assert!((chi.p_value - 0.0098).abs() < 5e-4, "p {}", chi.p_value);
    }

    #[test]
    fn chi_square_rejects_degenerate_tables() {
        assert!(chi_square_independence(&[vec![1.0, 2.0]]).is_err(), "one row");
        assert!(
            chi_square_independence(&[vec![0.0, 0.0], vec![0.0, 0.0]]).is_err(),
            "all-zero table"
        );
        assert!(
            chi_square_independence(&[vec![1.0, 2.0], vec![1.0]]).is_err(),
            "ragged table"
        );
    }

    /// 30/100 vs 10/100: z ≈ 3.536, p ≈ 4.06e-4.
    #[test]
    fn two_proportion_z_reference() {
        let z = two_proportion_z(30, 100, 10, 100).unwrap();
        assert!((z.z - 3.5355).abs() < 1e-3, "z {}", z.z);
        assert!((z.p_value - 4.07e-4).abs() < 5e-5, "p {}", z.p_value);
    }

    #[test]
    fn two_proportion_z_degenerate_when_no_claims_anywhere() {
        assert!(two_proportion_z(0, 100, 0, 100).is_err());
        assert!(two_proportion_z(0, 0, 1, 10).is_err());
    }

    /// Equal-variance shifted samples: t = -1, df = 8, p ≈ 0.3466
    /// (reference: scipy.stats.ttest_ind(equal_var=False)).
    #[test]
    fn welch_t_reference() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 3.0, 4.0, 5.0, 6.0];
        let t = welch_t_test(&a, &b).unwrap();
        assert!((t.t + 1.0).abs() < 1e-9, "t {}", t.t);
        assert!((t.df - 8.0).abs() < 1e-9, "df {}", t.df);
        assert!((t.p_value - 0.3466).abs() < 1e-3, "p {}", t.p_value);
    }

    #[test]
    fn welch_t_degenerate_on_constant_samples() {
        assert!(welch_t_test(&[1.0, 1.0], &[1.0, 1.0]).is_err());
    }

    /// Fully separated samples: U = 0; asymptotic two-sided p with continuity
    /// correction ≈ 0.0122.
    #[test]
    fn mann_whitney_reference_separated() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [6.0, 7.0, 8.0, 9.0, 10.0];
        let mw = mann_whitney_u(&a, &b).unwrap();
        assert!((mw.u - 0.0).abs() < 1e-9, "u {}", mw.u);
        assert!((mw.p_value - 0.0122).abs() < 1e-3, "p {}", mw.p_value);
    }

    #[test]
    fn mann_whitney_symmetric_in_its_arguments() {
        let a = [1.0, 3.0, 5.0, 7.0, 8.0, 2.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let ab = mann_whitney_u(&a, &b).unwrap();
        let ba = mann_whitney_u(&b, &a).unwrap();
        assert!((ab.p_value - ba.p_value).abs() < 1e-12, "p must not depend on order");
        // U1 + U2 = n1 * n2.
        assert!((ab.u + ba.u - (a.len() * b.len()) as f64).abs() < 1e-9);
    }

    #[test]
    fn mann_whitney_degenerate_when_identical() {
        assert!(mann_whitney_u(&[2.0, 2.0], &[2.0, 2.0, 2.0]).is_err());
    }

    /// Three cleanly separated groups: H = 7.2, df = 2, p ≈ 0.0273
    /// (reference: scipy.stats.kruskal).
    #[test]
    fn kruskal_wallis_reference() {
        let g1 = [1.0, 2.0, 3.0];
        let g2 = [4.0, 5.0, 6.0];
        let g3 = [7.0, 8.0, 9.0];
        let kw = kruskal_wallis(&[&g1, &g2, &g3]).unwrap();
        assert!((kw.h - 7.2).abs() < 1e-9, "h {}", kw.h);
        assert_eq!(kw.df, 2.0);
        assert!((kw.p_value - 0.02732).abs() < 1e-4, "p {}", kw.p_value);
    }

    #[test]
    fn kruskal_wallis_needs_two_nonempty_groups() {
        let g = [1.0, 2.0];
        assert!(kruskal_wallis(&[&g]).is_err());
        let empty: [f64; 0] = [];
        assert!(kruskal_wallis(&[&g, &empty]).is_err());
    }

    // ── Runner gate ───────────────────────────────────────────────────────────

    fn level(name: &str, claims: usize, records: usize) -> FrequencyLevel {
        FrequencyLevel { level: name.to_string(), claims, records }
    }

    #[test]
    fn runner_rejects_small_groups_instead_of_testing() {
        let runner = TestRunner::canonical();
        let err = runner
            .chi_square_frequency("Province", &[level("A", 5, 29), level("B", 10, 100)])
            .expect_err("29 < 30 must be insufficient");
        match err {
            StatError::InsufficientData { group, n, required, .. } => {
                assert_eq!(group, "A");
                assert_eq!(n, 29);
                assert_eq!(required, 30);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn runner_min_group_size_is_configurable() {
        let runner = TestRunner { alpha: 0.05, min_group_size: 5 };
        let result = runner
            .chi_square_frequency("Province", &[level("A", 3, 10), level("B", 4, 10)])
            .expect("10 >= 5 must pass the gate");
        assert_eq!(result.alpha, 0.05);
        assert_eq!(result.metric, "claim frequency");
    }

    #[test]
    fn result_carries_threshold_and_conclusion() {
        let runner = TestRunner { alpha: 0.05, min_group_size: 10 };
        // Strong association: should reject.
        let result = runner
            .chi_square_frequency("Province", &[level("A", 90, 100), level("B", 10, 100)])
            .unwrap();
        assert_eq!(result.conclusion, Conclusion::RejectNull);
        assert!(result.verdict().contains("reject H0"));
        assert!(result.verdict().contains("0.05"), "verdict must state the threshold");
    }

    #[test]
    fn two_sample_results_state_direction() {
        let runner = TestRunner { alpha: 0.05, min_group_size: 10 };
        let hi = level("Gauteng", 40, 100);
        let lo = level("rest", 10, 100);
        let result = runner.z_frequency_between("Province", &hi, &lo).unwrap();
        assert_eq!(result.direction.as_deref(), Some("Gauteng > rest"));
    }

    #[test]
    fn welch_between_gates_and_reports_direction() {
        let runner = TestRunner { alpha: 0.05, min_group_size: 5 };
        let a = ValueGroup {
            level: "Male".to_string(),
            values: vec![10.0, 12.0, 11.0, 13.0, 9.0],
        };
        let b = ValueGroup {
            level: "Female".to_string(),
            values: vec![20.0, 22.0, 21.0, 23.0, 19.0],
        };
        let result = runner.welch_between("Gender", "margin", &a, &b).unwrap();
        assert_eq!(result.test, "Welch t");
        assert_eq!(result.direction.as_deref(), Some("Female > Male"));
        assert_eq!(result.conclusion, Conclusion::RejectNull);

        let short = ValueGroup { level: "Male".to_string(), values: vec![1.0, 2.0] };
        assert!(
            matches!(
                runner.welch_between("Gender", "margin", &short, &b),
                Err(StatError::InsufficientData { .. })
            ),
            "2 < 5 must be insufficient"
        );
    }

    // ── Grouped extraction and battery ────────────────────────────────────────

    use crate::record::PolicyRecord;

    fn record(province: &str, gender: &str, premium: f64, claims: f64) -> PolicyRecord {
        PolicyRecord {
            province: Some(province.to_string()),
            gender: Some(gender.to_string()),
            total_premium: Some(premium),
            total_claims: Some(claims),
            ..PolicyRecord::empty()
        }
    }

    #[test]
    fn frequency_extraction_counts_claims_per_level() {
        let records = vec![
            record("A", "Male", 100.0, 0.0),
            record("A", "Male", 100.0, 50.0),
            record("B", "Female", 100.0, 0.0),
        ];
        let freq = frequency_by(&records, Dimension::Province);
        assert_eq!(freq.len(), 2);
        assert_eq!(freq[0].level, "A");
        assert_eq!(freq[0].claims, 1);
        assert_eq!(freq[0].records, 2);
    }

    #[test]
    fn severity_extraction_keeps_only_claim_rows() {
        let records = vec![
            record("A", "Male", 100.0, 0.0),
            record("A", "Male", 100.0, 250.0),
            record("A", "Male", 100.0, 75.0),
        ];
        let sev = severity_by(&records, Dimension::Province);
        assert_eq!(sev.len(), 1);
        assert_eq!(sev[0].values, vec![250.0, 75.0]);
    }

    /// Two provinces with very different claim rates, enough rows to clear
    /// the gate: the battery's province frequency test must reject.
    #[test]
    fn battery_detects_planted_frequency_difference() {
        let mut records = Vec::new();
        for i in 0..200 {
            // Province A claims 40% of the time, province B 5%.
            records.push(record("A", "Male", 100.0, if i % 5 < 2 { 500.0 } else { 0.0 }));
            records.push(record("B", "Female", 100.0, if i % 20 == 0 { 500.0 } else { 0.0 }));
        }
        let runner = TestRunner { alpha: 0.05, min_group_size: 30 };
        let outcomes = battery(&runner, &records);

        let province_freq = outcomes
            .iter()
            .find(|o| o.name.contains("frequency across Province"))
            .expect("battery must include the province frequency test");
        let result = province_freq.result.as_ref().expect("test must run");
        assert_eq!(result.conclusion, Conclusion::RejectNull);
    }

    #[test]
    fn battery_reports_ineligible_dimensions_as_degenerate() {
        // 40 rows, all in one province: no second eligible level anywhere.
        let records: Vec<PolicyRecord> =
            (0..40).map(|i| record("A", "Male", 100.0, if i % 4 == 0 { 50.0 } else { 0.0 })).collect();
        let runner = TestRunner::canonical();
        let outcomes = battery(&runner, &records);
        let province_freq = outcomes
            .iter()
            .find(|o| o.name.contains("frequency across Province"))
            .unwrap();
        assert!(
            matches!(province_freq.result, Err(StatError::DegenerateInput { .. })),
            "single-level dimension must be degenerate, got {:?}",
            province_freq.result
        );
    }

    #[test]
    fn level_report_always_carries_kpis() {
        let records = vec![
            record("A", "Male", 100.0, 50.0),
            record("A", "Male", 100.0, 0.0),
            record("B", "Female", 0.0, 0.0),
        ];
        let runner = TestRunner::canonical();
        let report = level_report(&runner, &records, Dimension::Province, 0);
        assert_eq!(report.len(), 2);

        let a = report.iter().find(|l| l.level == "A").unwrap();
        assert_eq!(a.records, 2);
        assert_eq!(a.claims, 1);
        assert!((a.loss_ratio.unwrap() - 0.25).abs() < 1e-12);
        // Groups are far below the minimum: tests absent, KPIs present.
        assert!(a.freq_p_vs_rest.is_none());

        let b = report.iter().find(|l| l.level == "B").unwrap();
        assert_eq!(b.loss_ratio, None, "zero-premium level stays undefined");
    }
}
