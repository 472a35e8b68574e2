//! Customer health metrics.
//!
//! Everything here works on usage samples (live + finished, any QC result)
//! and on runs and workflows in the live environment.

use super::monthly::{aggregate_monthly, pct_change, MonthlyUsage, WorkflowCount};
use crate::config::Thresholds;
use crate::models::{MergedSample, RiskLevel, Run, RunOutcome, Workflow, YearMonth};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Latest MoM drop (percent) that alone makes churn risk high.
const CHURN_HIGH_DROP_PCT: f64 = 20.0;
/// Latest MoM drop (percent) that alone makes churn risk medium.
const CHURN_MEDIUM_DROP_PCT: f64 = 10.0;
/// Change in fractional growth rate that counts as acceleration.
const ACCELERATION_THRESHOLD: f64 = 0.05;
/// Top-workflow share (percent) above which concentration risk is high.
const CONCENTRATION_HIGH_PCT: f64 = 50.0;
const CONCENTRATION_MEDIUM_PCT: f64 = 30.0;
/// Workflows younger than this many days are new.
const NEW_WORKFLOW_DAYS: i64 = 30;
const MATURE_AVG_AGE_DAYS: f64 = 90.0;
const GROWING_AVG_AGE_DAYS: f64 = 30.0;
/// Three-month trend (percent) below which the scorecard adds risk.
const SCORECARD_TREND_DROP_PCT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnRisk {
    /// Declines in a row, counted back from the latest month.
    pub consecutive_monthly_declines: usize,
    pub latest_mom_change_pct: Option<f64>,
    /// Mean of the last three months minus mean of the first three (needs six months).
    pub three_month_trend: Option<f64>,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub active_workflows: usize,
    pub total_workflows: usize,
    pub workflow_utilization_pct: f64,
    /// 1 - Herfindahl index of per-workflow shares; higher is more diverse.
    pub workflow_diversity_index: f64,
    pub avg_samples_per_workflow: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrowthTrajectory {
    Accelerating,
    Decelerating,
    Stable,
    InsufficientData,
}

impl fmt::Display for GrowthTrajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowthTrajectory::Accelerating => write!(f, "ACCELERATING"),
            GrowthTrajectory::Decelerating => write!(f, "DECELERATING"),
            GrowthTrajectory::Stable => write!(f, "STABLE"),
            GrowthTrajectory::InsufficientData => write!(f, "INSUFFICIENT DATA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Growth {
    pub recent_growth_pct: Option<f64>,
    pub overall_growth_pct: Option<f64>,
    /// Difference between the last two fractional growth rates.
    pub growth_acceleration: Option<f64>,
    pub trajectory: GrowthTrajectory,
}

/// Live run outcomes for one month of `START_TIME`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRuns {
    pub month: YearMonth,
    pub total_runs: usize,
    pub finished: usize,
    pub failed: usize,
    pub canceled: usize,
    pub success_rate_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationalStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationalStatus::Healthy => write!(f, "HEALTHY"),
            OperationalStatus::Warning => write!(f, "WARNING"),
            OperationalStatus::Critical => write!(f, "CRITICAL"),
            OperationalStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalHealth {
    pub monthly: Vec<MonthlyRuns>,
    pub latest_success_rate: Option<f64>,
    pub avg_success_rate: Option<f64>,
    /// Latest success rate minus the previous month's.
    pub success_rate_trend: Option<f64>,
    pub total_failed_runs: usize,
    pub total_canceled_runs: usize,
    pub status: OperationalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    pub top_workflow_pct: f64,
    pub top_3_workflows_pct: f64,
    pub risk: RiskLevel,
    pub workflow_count: usize,
    pub ranking: Vec<WorkflowCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MaturityLevel {
    Mature,
    Growing,
    New,
    Unknown,
}

impl fmt::Display for MaturityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaturityLevel::Mature => write!(f, "MATURE"),
            MaturityLevel::Growing => write!(f, "GROWING"),
            MaturityLevel::New => write!(f, "NEW"),
            MaturityLevel::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maturity {
    pub as_of: NaiveDateTime,
    pub avg_workflow_age_days: Option<f64>,
    pub new_workflows_count: usize,
    pub established_workflows_count: usize,
    pub level: MaturityLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    AtRisk,
    Critical,
}

impl HealthStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "🟢",
            HealthStatus::AtRisk => "🟠",
            HealthStatus::Critical => "🔴",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::AtRisk => write!(f, "AT RISK"),
            HealthStatus::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Single-page health summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub last_month_usage: usize,
    pub last_mom_change_pct: Option<f64>,
    /// Change between the first three and last three months, in percent.
    pub three_month_trend_pct: Option<f64>,
    pub latest_success_rate: Option<f64>,
    pub overall_growth_pct: Option<f64>,
    pub risk_score: u32,
    pub health_score: u32,
    pub status: HealthStatus,
}

/// All customer health metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerHealth {
    pub usage_monthly: Vec<MonthlyUsage>,
    pub churn_risk: ChurnRisk,
    pub engagement: Engagement,
    pub growth: Growth,
    pub operational_health: OperationalHealth,
    pub concentration: Concentration,
    pub maturity: Maturity,
    pub scorecard: Scorecard,
}

/// Compute every health metric.
///
/// `as_of` is the reference instant for workflow ages.
pub fn assess(
    usage: &[MergedSample],
    live_runs: &[Run],
    live_workflows: &[Workflow],
    thresholds: &Thresholds,
    as_of: NaiveDateTime,
) -> CustomerHealth {
    let usage_monthly = aggregate_monthly(usage, thresholds);
    let churn_risk = churn_risk(&usage_monthly);
    let growth = growth(&usage_monthly);
    let operational_health = operational_health(live_runs, thresholds);
    let scorecard = scorecard(&usage_monthly, &operational_health, &growth, thresholds);

    CustomerHealth {
        churn_risk,
        engagement: engagement(usage, live_workflows),
        growth,
        operational_health,
        concentration: concentration(usage),
        maturity: maturity(usage, live_workflows, as_of),
        scorecard,
        usage_monthly,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn counts(monthly: &[MonthlyUsage]) -> Vec<f64> {
    monthly.iter().map(|m| m.samples as f64).collect()
}

/// Mean of the first three and the last three monthly counts.
fn head_tail_means(monthly: &[MonthlyUsage]) -> Option<(f64, f64)> {
    let values = counts(monthly);
    let head = mean(&values[..values.len().min(3)])?;
    let tail = mean(&values[values.len().saturating_sub(3)..])?;
    Some((head, tail))
}

pub fn churn_risk(monthly: &[MonthlyUsage]) -> ChurnRisk {
    let consecutive = monthly
        .iter()
        .rev()
        .take_while(|m| m.mom_change_pct.map(|c| c < 0.0).unwrap_or(false))
        .count();

    let latest = monthly.last().and_then(|m| m.mom_change_pct);

    let three_month_trend = if monthly.len() >= 6 {
        head_tail_means(monthly).map(|(head, tail)| tail - head)
    } else {
        None
    };

    let latest_below = |limit: f64| latest.map(|c| c < -limit).unwrap_or(false);
    let risk_level = if consecutive >= 2 || latest_below(CHURN_HIGH_DROP_PCT) {
        RiskLevel::High
    } else if consecutive >= 1 || latest_below(CHURN_MEDIUM_DROP_PCT) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    ChurnRisk {
        consecutive_monthly_declines: consecutive,
        latest_mom_change_pct: latest,
        three_month_trend,
        risk_level,
    }
}

pub fn engagement(usage: &[MergedSample], live_workflows: &[Workflow]) -> Engagement {
    let mut per_workflow: HashMap<&str, usize> = HashMap::new();
    for sample in usage {
        *per_workflow.entry(sample.workflow_id.as_str()).or_default() += 1;
    }

    let active = per_workflow.len();
    let total = live_workflows.len();
    let sample_total = usage.len() as f64;

    let diversity = if usage.is_empty() {
        0.0
    } else {
        1.0 - per_workflow
            .values()
            .map(|&c| (c as f64 / sample_total).powi(2))
            .sum::<f64>()
    };

    Engagement {
        active_workflows: active,
        total_workflows: total,
        workflow_utilization_pct: if total > 0 {
            active as f64 / total as f64 * 100.0
        } else {
            0.0
        },
        workflow_diversity_index: diversity,
        avg_samples_per_workflow: if active > 0 {
            sample_total / active as f64
        } else {
            0.0
        },
    }
}

pub fn growth(monthly: &[MonthlyUsage]) -> Growth {
    if monthly.len() < 2 {
        return Growth {
            recent_growth_pct: None,
            overall_growth_pct: None,
            growth_acceleration: None,
            trajectory: GrowthTrajectory::InsufficientData,
        };
    }

    let first = monthly[0].samples;
    let last = monthly[monthly.len() - 1].samples;
    let recent = monthly[monthly.len() - 1].mom_change_pct;
    let overall = pct_change(first, last);

    let rates: Vec<f64> = monthly
        .windows(2)
        .filter_map(|w| pct_change(w[0].samples, w[1].samples))
        .map(|pct| pct / 100.0)
        .collect();

    let acceleration = if monthly.len() >= 3 && rates.len() >= 2 {
        Some(rates[rates.len() - 1] - rates[rates.len() - 2])
    } else {
        None
    };

    let trajectory = match acceleration {
        Some(a) if a > ACCELERATION_THRESHOLD => GrowthTrajectory::Accelerating,
        Some(a) if a < -ACCELERATION_THRESHOLD => GrowthTrajectory::Decelerating,
        Some(_) => GrowthTrajectory::Stable,
        None => GrowthTrajectory::InsufficientData,
    };

    Growth {
        recent_growth_pct: recent,
        overall_growth_pct: overall,
        growth_acceleration: acceleration,
        trajectory,
    }
}

pub fn operational_health(live_runs: &[Run], thresholds: &Thresholds) -> OperationalHealth {
    let mut by_month: BTreeMap<YearMonth, (usize, usize, usize, usize)> = BTreeMap::new();
    for run in live_runs {
        let Some(start) = run.start_time else {
            continue;
        };
        let entry = by_month.entry(YearMonth::of(&start)).or_default();
        entry.0 += 1;
        match run.outcome {
            RunOutcome::Finished => entry.1 += 1,
            RunOutcome::Failed => entry.2 += 1,
            RunOutcome::Canceled => entry.3 += 1,
            RunOutcome::Other(_) => {}
        }
    }

    let monthly: Vec<MonthlyRuns> = by_month
        .into_iter()
        .map(|(month, (total, finished, failed, canceled))| MonthlyRuns {
            month,
            total_runs: total,
            finished,
            failed,
            canceled,
            success_rate_pct: finished as f64 / total as f64 * 100.0,
        })
        .collect();

    let rates: Vec<f64> = monthly.iter().map(|m| m.success_rate_pct).collect();
    let latest = rates.last().copied();
    let trend = if rates.len() >= 2 {
        Some(rates[rates.len() - 1] - rates[rates.len() - 2])
    } else {
        None
    };

    let status = match latest {
        Some(r) if r >= thresholds.success_target_pct => OperationalStatus::Healthy,
        Some(r) if r >= thresholds.success_warning_pct => OperationalStatus::Warning,
        Some(_) => OperationalStatus::Critical,
        None => OperationalStatus::Unknown,
    };

    OperationalHealth {
        latest_success_rate: latest,
        avg_success_rate: mean(&rates),
        success_rate_trend: trend,
        total_failed_runs: monthly.iter().map(|m| m.failed).sum(),
        total_canceled_runs: monthly.iter().map(|m| m.canceled).sum(),
        status,
        monthly,
    }
}

pub fn concentration(usage: &[MergedSample]) -> Concentration {
    let ranking = super::monthly::top_workflows(usage, usize::MAX);
    let total = usage.len() as f64;

    let share = |n: usize| -> f64 {
        if usage.is_empty() {
            0.0
        } else {
            ranking.iter().take(n).map(|w| w.count).sum::<usize>() as f64 / total * 100.0
        }
    };

    let top = share(1);
    let top3 = share(3);
    let risk = if top > CONCENTRATION_HIGH_PCT {
        RiskLevel::High
    } else if top > CONCENTRATION_MEDIUM_PCT {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    Concentration {
        top_workflow_pct: top,
        top_3_workflows_pct: top3,
        risk,
        workflow_count: ranking.len(),
        ranking,
    }
}

pub fn maturity(
    usage: &[MergedSample],
    live_workflows: &[Workflow],
    as_of: NaiveDateTime,
) -> Maturity {
    let active: HashSet<&str> = usage.iter().map(|s| s.workflow_id.as_str()).collect();

    let ages: Vec<i64> = live_workflows
        .iter()
        .filter(|w| active.contains(w.id.as_str()))
        .filter_map(|w| w.created)
        .map(|created| (as_of - created).num_days())
        .collect();

    let avg = mean(&ages.iter().map(|&d| d as f64).collect::<Vec<_>>());
    let new_count = ages.iter().filter(|&&d| d < NEW_WORKFLOW_DAYS).count();

    let level = match avg {
        Some(a) if a > MATURE_AVG_AGE_DAYS => MaturityLevel::Mature,
        Some(a) if a > GROWING_AVG_AGE_DAYS => MaturityLevel::Growing,
        Some(_) => MaturityLevel::New,
        None => MaturityLevel::Unknown,
    };

    Maturity {
        as_of,
        avg_workflow_age_days: avg,
        new_workflows_count: new_count,
        established_workflows_count: ages.len() - new_count,
        level,
    }
}

pub fn scorecard(
    monthly: &[MonthlyUsage],
    operational: &OperationalHealth,
    growth: &Growth,
    thresholds: &Thresholds,
) -> Scorecard {
    let last = monthly.last();
    let last_mom = last.and_then(|m| m.mom_change_pct);
    let three_month_trend_pct = head_tail_means(monthly).and_then(|(head, tail)| {
        if head > 0.0 {
            Some((tail - head) / head * 100.0)
        } else {
            None
        }
    });
    let success = operational.latest_success_rate;

    let mut risk_score = 0;
    match last_mom {
        Some(m) if m < -thresholds.decline_alert_pct => risk_score += 40,
        Some(m) if m < 0.0 => risk_score += 20,
        _ => {}
    }
    match success {
        Some(s) if s < thresholds.success_warning_pct => risk_score += 30,
        Some(s) if s < thresholds.success_target_pct => risk_score += 15,
        _ => {}
    }
    if three_month_trend_pct
        .map(|t| t < -SCORECARD_TREND_DROP_PCT)
        .unwrap_or(false)
    {
        risk_score += 30;
    }

    let health_score = 100 - risk_score;
    let status = if health_score >= 75 {
        HealthStatus::Healthy
    } else if health_score >= 50 {
        HealthStatus::AtRisk
    } else {
        HealthStatus::Critical
    };

    Scorecard {
        last_month_usage: last.map(|m| m.samples).unwrap_or(0),
        last_mom_change_pct: last_mom,
        three_month_trend_pct,
        latest_success_rate: success,
        overall_growth_pct: growth.overall_growth_pct,
        risk_score,
        health_score,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::billable::tests::{at, sample};
    use crate::analysis::monthly::TrendFlag;

    fn month_row(month: u32, samples: usize, change: Option<f64>) -> MonthlyUsage {
        MonthlyUsage {
            month: YearMonth::new(2024, month),
            samples,
            unique_runs: 1,
            unique_workflows: 1,
            mom_change_pct: change,
            flag: TrendFlag::Stable,
        }
    }

    fn series(counts: &[usize]) -> Vec<MonthlyUsage> {
        let mut previous = None;
        counts
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let change = previous.and_then(|p| pct_change(p, c));
                previous = Some(c);
                month_row(i as u32 + 1, c, change)
            })
            .collect()
    }

    fn run(month: u32, outcome: RunOutcome) -> Run {
        Run {
            id: format!("r-{}-{:?}", month, outcome),
            workflow_id: Some("wf-1".to_string()),
            outcome,
            start_time: Some(at(2024, month, 1, 8)),
            stop_time: None,
        }
    }

    fn workflow(id: &str, created: Option<NaiveDateTime>) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: Some(format!("[LIVE] {}", id)),
            workflow_type: None,
            created,
        }
    }

    #[test]
    fn test_churn_counts_trailing_declines() {
        let churn = churn_risk(&series(&[100, 90, 120, 110, 100]));
        assert_eq!(churn.consecutive_monthly_declines, 2);
        assert_eq!(churn.risk_level, RiskLevel::High);
        assert_eq!(churn.three_month_trend, None);

        let churn = churn_risk(&series(&[100, 80, 120]));
        assert_eq!(churn.consecutive_monthly_declines, 0);
        assert_eq!(churn.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_churn_latest_drop_levels() {
        // single decline of 12%: medium
        let churn = churn_risk(&series(&[100, 100, 88]));
        assert_eq!(churn.consecutive_monthly_declines, 1);
        assert_eq!(churn.risk_level, RiskLevel::Medium);

        // single decline of 25%: high
        let churn = churn_risk(&series(&[100, 100, 75]));
        assert_eq!(churn.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_three_month_trend_needs_six_months() {
        let churn = churn_risk(&series(&[10, 20, 30, 40, 50, 60]));
        assert_eq!(churn.three_month_trend, Some(30.0));
    }

    #[test]
    fn test_growth_trajectory() {
        let g = growth(&series(&[100]));
        assert_eq!(g.trajectory, GrowthTrajectory::InsufficientData);

        // rates: +10%, +50% -> acceleration 0.4
        let g = growth(&series(&[100, 110, 165]));
        assert_eq!(g.trajectory, GrowthTrajectory::Accelerating);
        assert!((g.overall_growth_pct.unwrap() - 65.0).abs() < 1e-9);
        assert!((g.recent_growth_pct.unwrap() - 50.0).abs() < 1e-9);

        let g = growth(&series(&[100, 150, 150]));
        assert_eq!(g.trajectory, GrowthTrajectory::Decelerating);

        let g = growth(&series(&[100, 110, 121]));
        assert_eq!(g.trajectory, GrowthTrajectory::Stable);
    }

    #[test]
    fn test_operational_health() {
        let mut runs = Vec::new();
        for _ in 0..9 {
            runs.push(run(1, RunOutcome::Finished));
        }
        runs.push(run(1, RunOutcome::Failed));
        for _ in 0..4 {
            runs.push(run(2, RunOutcome::Finished));
        }
        runs.push(run(2, RunOutcome::Canceled));
        runs.push(Run {
            start_time: None,
            ..run(3, RunOutcome::Failed)
        });

        let ops = operational_health(&runs, &Thresholds::default());
        assert_eq!(ops.monthly.len(), 2);
        assert_eq!(ops.monthly[0].success_rate_pct, 90.0);
        assert_eq!(ops.latest_success_rate, Some(80.0));
        assert_eq!(ops.success_rate_trend, Some(-10.0));
        assert_eq!(ops.total_failed_runs, 1);
        assert_eq!(ops.total_canceled_runs, 1);
        assert_eq!(ops.status, OperationalStatus::Warning);

        let empty = operational_health(&[], &Thresholds::default());
        assert_eq!(empty.status, OperationalStatus::Unknown);
        assert_eq!(empty.avg_success_rate, None);
    }

    #[test]
    fn test_engagement_and_concentration() {
        let mut usage = Vec::new();
        for i in 0..6 {
            let mut s = sample(at(2024, 1, i + 1, 9));
            s.workflow_id = "wf-1".to_string();
            s.workflow_name = Some("[LIVE] one".to_string());
            usage.push(s);
        }
        for i in 0..2 {
            let mut s = sample(at(2024, 1, i + 1, 9));
            s.workflow_id = "wf-2".to_string();
            s.workflow_name = Some("[LIVE] two".to_string());
            usage.push(s);
        }

        let workflows = vec![
            workflow("wf-1", None),
            workflow("wf-2", None),
            workflow("wf-3", None),
            workflow("wf-4", None),
        ];

        let e = engagement(&usage, &workflows);
        assert_eq!(e.active_workflows, 2);
        assert_eq!(e.total_workflows, 4);
        assert_eq!(e.workflow_utilization_pct, 50.0);
        assert!((e.workflow_diversity_index - 0.375).abs() < 1e-9);
        assert_eq!(e.avg_samples_per_workflow, 4.0);

        let c = concentration(&usage);
        assert_eq!(c.top_workflow_pct, 75.0);
        assert_eq!(c.top_3_workflows_pct, 100.0);
        assert_eq!(c.risk, RiskLevel::High);
        assert_eq!(c.ranking[0].workflow, "[LIVE] one");
    }

    #[test]
    fn test_maturity_levels() {
        let as_of = at(2024, 6, 30, 0);
        let usage = vec![sample(at(2024, 6, 1, 9))];

        let old = vec![workflow("wf-1", Some(at(2024, 1, 1, 0)))];
        let m = maturity(&usage, &old, as_of);
        assert_eq!(m.level, MaturityLevel::Mature);
        assert_eq!(m.established_workflows_count, 1);

        let fresh = vec![workflow("wf-1", Some(at(2024, 6, 20, 0)))];
        let m = maturity(&usage, &fresh, as_of);
        assert_eq!(m.level, MaturityLevel::New);
        assert_eq!(m.new_workflows_count, 1);

        let undated = vec![workflow("wf-1", None)];
        assert_eq!(maturity(&usage, &undated, as_of).level, MaturityLevel::Unknown);
    }

    #[test]
    fn test_scorecard_scoring() {
        let monthly = series(&[100, 100, 100, 80]);
        let ops = OperationalHealth {
            monthly: Vec::new(),
            latest_success_rate: Some(85.0),
            avg_success_rate: Some(85.0),
            success_rate_trend: None,
            total_failed_runs: 0,
            total_canceled_runs: 0,
            status: OperationalStatus::Warning,
        };
        let g = growth(&monthly);
        let card = scorecard(&monthly, &ops, &g, &Thresholds::default());

        // -20% MoM (40) + success below target (15); 3-month trend is -6.7%
        assert_eq!(card.risk_score, 55);
        assert_eq!(card.health_score, 45);
        assert_eq!(card.status, HealthStatus::Critical);
        assert_eq!(card.last_month_usage, 80);
        assert_eq!(card.overall_growth_pct, Some(-20.0));
    }

    #[test]
    fn test_assess_empty_usage() {
        let health = assess(&[], &[], &[], &Thresholds::default(), at(2024, 1, 1, 0));
        assert!(health.usage_monthly.is_empty());
        assert_eq!(health.churn_risk.risk_level, RiskLevel::Low);
        assert_eq!(health.engagement.workflow_diversity_index, 0.0);
        assert_eq!(health.concentration.risk, RiskLevel::Low);
        assert_eq!(health.scorecard.health_score, 100);
    }
}
