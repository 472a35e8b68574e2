//! Monthly aggregation and billing breakdowns.
//!
//! Months are contiguous from the first to the last observed month, so a
//! month with no activity shows up as a zero row instead of disappearing.

use crate::config::{BillingConfig, Thresholds};
use crate::models::{MergedSample, QcPolicy, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Direction and size of a month-over-month change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendFlag {
    /// Drop larger than the alert threshold.
    Alert,
    Decline,
    Stable,
    Growth,
    /// Rise larger than the strong-growth threshold.
    StrongGrowth,
}

impl TrendFlag {
    pub fn emoji(&self) -> &'static str {
        match self {
            TrendFlag::Alert => "🔴",
            TrendFlag::Decline => "🟠",
            TrendFlag::Stable => "⚪",
            TrendFlag::Growth => "🔵",
            TrendFlag::StrongGrowth => "🟢",
        }
    }
}

impl fmt::Display for TrendFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendFlag::Alert => write!(f, "Alert"),
            TrendFlag::Decline => write!(f, "Decline"),
            TrendFlag::Stable => write!(f, "Stable"),
            TrendFlag::Growth => write!(f, "Growth"),
            TrendFlag::StrongGrowth => write!(f, "Strong growth"),
        }
    }
}

/// Usage for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub month: YearMonth,
    pub samples: usize,
    pub unique_runs: usize,
    pub unique_workflows: usize,
    /// Percentage change from the previous month; absent for the first month
    /// and after an empty month.
    pub mom_change_pct: Option<f64>,
    pub flag: TrendFlag,
}

/// Percentage change from `previous` to `current`.
pub fn pct_change(previous: usize, current: usize) -> Option<f64> {
    if previous == 0 {
        None
    } else {
        Some((current as f64 - previous as f64) / previous as f64 * 100.0)
    }
}

/// Classify a month-over-month change against the thresholds.
pub fn trend_flag(change: Option<f64>, thresholds: &Thresholds) -> TrendFlag {
    match change {
        None => TrendFlag::Stable,
        Some(c) if c < -thresholds.decline_alert_pct => TrendFlag::Alert,
        Some(c) if c < 0.0 => TrendFlag::Decline,
        Some(c) if c > thresholds.strong_growth_pct => TrendFlag::StrongGrowth,
        Some(c) if c > 0.0 => TrendFlag::Growth,
        Some(_) => TrendFlag::Stable,
    }
}

/// Contiguous month range covering every sample.
fn month_span<'a>(samples: impl IntoIterator<Item = &'a MergedSample>) -> Vec<YearMonth> {
    let mut months = samples.into_iter().map(|s| s.month());
    let Some(first) = months.next() else {
        return Vec::new();
    };
    let (min, max) = months.fold((first, first), |(lo, hi), m| (lo.min(m), hi.max(m)));
    min.range_to(max)
}

/// Group samples by calendar month with month-over-month changes.
///
/// The per-month sample counts always sum to `samples.len()`.
pub fn aggregate_monthly(samples: &[MergedSample], thresholds: &Thresholds) -> Vec<MonthlyUsage> {
    #[derive(Default)]
    struct Bucket<'a> {
        samples: usize,
        runs: BTreeSet<&'a str>,
        workflows: BTreeSet<&'a str>,
    }

    let mut buckets: HashMap<YearMonth, Bucket> = HashMap::new();
    for sample in samples {
        let bucket = buckets.entry(sample.month()).or_default();
        bucket.samples += 1;
        bucket.runs.insert(sample.run_id.as_str());
        bucket.workflows.insert(sample.workflow_label());
    }

    let mut previous: Option<usize> = None;
    month_span(samples)
        .into_iter()
        .map(|month| {
            let (count, runs, workflows) = buckets
                .get(&month)
                .map(|b| (b.samples, b.runs.len(), b.workflows.len()))
                .unwrap_or((0, 0, 0));
            let change = previous.and_then(|p| pct_change(p, count));
            previous = Some(count);

            MonthlyUsage {
                month,
                samples: count,
                unique_runs: runs,
                unique_workflows: workflows,
                mom_change_pct: change,
                flag: trend_flag(change, thresholds),
            }
        })
        .collect()
}

/// Contracted vs non-contracted billable samples for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBilling {
    pub month: YearMonth,
    pub contracted: usize,
    pub non_contracted: usize,
    pub total: usize,
    /// Non-contracted samples relative to contracted ones, in percent.
    pub overbilling_pct: Option<f64>,
}

fn overbilling_pct(contracted: usize, non_contracted: usize) -> Option<f64> {
    if contracted == 0 {
        None
    } else {
        Some(non_contracted as f64 / contracted as f64 * 100.0)
    }
}

/// Split billable samples per month by contract coverage.
pub fn billing_by_month(samples: &[MergedSample], billing: &BillingConfig) -> Vec<MonthlyBilling> {
    let mut counts: HashMap<YearMonth, (usize, usize)> = HashMap::new();
    for sample in samples {
        let entry = counts.entry(sample.month()).or_default();
        if billing.is_contracted(&sample.sample_type) {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    month_span(samples)
        .into_iter()
        .map(|month| {
            let (contracted, non_contracted) = counts.get(&month).copied().unwrap_or_default();
            MonthlyBilling {
                month,
                contracted,
                non_contracted,
                total: contracted + non_contracted,
                overbilling_pct: overbilling_pct(contracted, non_contracted),
            }
        })
        .collect()
}

/// Sample count for one sample type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTypeCount {
    pub sample_type: String,
    pub count: usize,
    pub share_pct: f64,
    pub contracted: bool,
}

/// Count samples per type, largest first.
pub fn sample_type_breakdown(
    samples: &[MergedSample],
    billing: &BillingConfig,
) -> Vec<SampleTypeCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for sample in samples {
        *counts.entry(sample.sample_type.as_str()).or_default() += 1;
    }

    let total = samples.len().max(1) as f64;
    let mut breakdown: Vec<SampleTypeCount> = counts
        .into_iter()
        .map(|(sample_type, count)| SampleTypeCount {
            sample_type: sample_type.to_string(),
            count,
            share_pct: count as f64 / total * 100.0,
            contracted: billing.is_contracted(sample_type),
        })
        .collect();

    breakdown.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.sample_type.cmp(&b.sample_type))
    });
    breakdown
}

/// Sample count for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCount {
    pub workflow: String,
    pub count: usize,
}

/// The `n` workflows with the most samples, ties broken by name.
pub fn top_workflows<'a>(
    samples: impl IntoIterator<Item = &'a MergedSample>,
    n: usize,
) -> Vec<WorkflowCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for sample in samples {
        *counts.entry(sample.workflow_label()).or_default() += 1;
    }

    let mut ranked: Vec<WorkflowCount> = counts
        .into_iter()
        .map(|(workflow, count)| WorkflowCount {
            workflow: workflow.to_string(),
            count,
        })
        .collect();

    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.workflow.cmp(&b.workflow)));
    ranked.truncate(n);
    ranked
}

/// Headline billing reconciliation figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub policy: QcPolicy,
    pub total_billable: usize,
    pub contracted: usize,
    pub non_contracted: usize,
    pub overbilling_pct: Option<f64>,
    /// The most recent month, i.e. the month under dispute.
    pub latest_month: Option<MonthlyBilling>,
    pub monthly: Vec<MonthlyBilling>,
    pub sample_types: Vec<SampleTypeCount>,
    pub top_non_contracted_workflows: Vec<WorkflowCount>,
}

/// Summarize already-filtered billable samples.
pub fn summarize_billing(
    billable: &[MergedSample],
    policy: QcPolicy,
    billing: &BillingConfig,
    top_n: usize,
) -> BillingSummary {
    let monthly = billing_by_month(billable, billing);
    let contracted: usize = monthly.iter().map(|m| m.contracted).sum();
    let non_contracted: usize = monthly.iter().map(|m| m.non_contracted).sum();

    BillingSummary {
        policy,
        total_billable: billable.len(),
        contracted,
        non_contracted,
        overbilling_pct: overbilling_pct(contracted, non_contracted),
        latest_month: monthly.last().cloned(),
        sample_types: sample_type_breakdown(billable, billing),
        top_non_contracted_workflows: top_workflows(
            billable
                .iter()
                .filter(|s| !billing.is_contracted(&s.sample_type)),
            top_n,
        ),
        monthly,
    }
}
