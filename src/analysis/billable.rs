//! Merging and billable-sample classification.
//!
//! A sample is billable when its workflow is live, its run finished and its
//! QC check passed. The [`QcPolicy`] decides what happens to samples whose QC
//! cell is empty; [`sensitivity`] compares both policies.

use crate::models::{
    Dataset, Environment, MergedSample, QcOutcome, QcPolicy, Run, RunOutcome, Workflow, YearMonth,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Workflow identifier given to samples whose check has a blank `WORKFLOW_ID`.
pub const UNKNOWN_WORKFLOW_ID: &str = "unknown";

/// Output of [`merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub samples: Vec<MergedSample>,
    /// Checks whose run identifier is blank or not in the Runs sheet.
    pub orphaned_checks: usize,
    /// Merged samples whose workflow identifier is not in the Workflows sheet.
    pub unknown_workflows: usize,
}

/// Join QC checks to their run and workflow.
///
/// Runs are inner-joined on the run identifier; workflows are looked up by
/// the check's workflow identifier, which is the authoritative source of the
/// environment. Checks with an unknown workflow are kept as unlabeled.
pub fn merge(dataset: &Dataset) -> MergeResult {
    let runs = index_runs(&dataset.runs);
    let workflows = index_workflows(&dataset.workflows);

    let mut result = MergeResult::default();

    for check in &dataset.checks {
        let Some((run_id, run)) = check
            .run_id
            .as_deref()
            .and_then(|id| runs.get(id).map(|run| (id, run)))
        else {
            result.orphaned_checks += 1;
            continue;
        };

        let workflow = check
            .workflow_id
            .as_deref()
            .and_then(|id| workflows.get(id));
        if workflow.is_none() {
            result.unknown_workflows += 1;
        }

        result.samples.push(MergedSample {
            run_id: run_id.to_string(),
            workflow_id: check
                .workflow_id
                .clone()
                .unwrap_or_else(|| UNKNOWN_WORKFLOW_ID.to_string()),
            timestamp: check.timestamp,
            sample_type: check.sample_type.clone(),
            qc: check.qc.clone(),
            outcome: run.outcome.clone(),
            run_start: run.start_time,
            workflow_name: workflow.and_then(|w| w.name.clone()),
            workflow_type: workflow.and_then(|w| w.workflow_type.clone()),
            environment: workflow
                .map(|w| w.environment())
                .unwrap_or(Environment::Unlabeled),
        });
    }

    if result.orphaned_checks > 0 {
        warn!(
            "{} QC checks reference unknown runs and were dropped",
            result.orphaned_checks
        );
    }
    if result.unknown_workflows > 0 {
        warn!(
            "{} samples reference unknown workflows (treated as unlabeled)",
            result.unknown_workflows
        );
    }
    debug!("Merged {} samples", result.samples.len());

    result
}

fn index_runs(runs: &[Run]) -> HashMap<&str, &Run> {
    let mut index = HashMap::with_capacity(runs.len());
    for run in runs {
        if index.contains_key(run.id.as_str()) {
            warn!("Duplicate run id {}; keeping the first row", run.id);
            continue;
        }
        index.insert(run.id.as_str(), run);
    }
    index
}

fn index_workflows(workflows: &[Workflow]) -> HashMap<&str, &Workflow> {
    let mut index = HashMap::with_capacity(workflows.len());
    for workflow in workflows {
        if index.contains_key(workflow.id.as_str()) {
            warn!("Duplicate workflow id {}; keeping the first row", workflow.id);
            continue;
        }
        index.insert(workflow.id.as_str(), workflow);
    }
    index
}

/// Whether a sample counts toward invoicing under `policy`.
pub fn classify_billable(sample: &MergedSample, policy: QcPolicy) -> bool {
    if !is_usage(sample) {
        return false;
    }

    match (&sample.qc, policy) {
        (QcOutcome::Pass, _) => true,
        (QcOutcome::Missing, QcPolicy::TreatAsPass) => true,
        _ => false,
    }
}

/// Whether a sample counts as customer usage: live and finished, any QC.
pub fn is_usage(sample: &MergedSample) -> bool {
    sample.environment == Environment::Live && sample.outcome == RunOutcome::Finished
}

/// Samples billable under `policy`.
pub fn billable_samples(samples: &[MergedSample], policy: QcPolicy) -> Vec<MergedSample> {
    samples
        .iter()
        .filter(|s| classify_billable(s, policy))
        .cloned()
        .collect()
}

/// Samples counting as usage.
pub fn usage_samples(samples: &[MergedSample]) -> Vec<MergedSample> {
    samples.iter().filter(|s| is_usage(s)).cloned().collect()
}

/// Runs whose workflow is live.
pub fn live_runs(dataset: &Dataset) -> Vec<Run> {
    let workflows = index_workflows(&dataset.workflows);

    dataset
        .runs
        .iter()
        .filter(|run| {
            run.workflow_id
                .as_deref()
                .and_then(|id| workflows.get(id))
                .map(|w| w.environment() == Environment::Live)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Workflows whose environment is live.
pub fn live_workflows(dataset: &Dataset) -> Vec<Workflow> {
    dataset
        .workflows
        .iter()
        .filter(|w| w.environment() == Environment::Live)
        .cloned()
        .collect()
}

/// QC outcome counts for a set of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcBreakdown {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub missing: usize,
    pub other: usize,
}

impl QcBreakdown {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a MergedSample>) -> Self {
        let mut breakdown = Self::default();
        for sample in samples {
            breakdown.total += 1;
            match sample.qc {
                QcOutcome::Pass => breakdown.pass += 1,
                QcOutcome::Fail => breakdown.fail += 1,
                QcOutcome::Missing => breakdown.missing += 1,
                QcOutcome::Other(_) => breakdown.other += 1,
            }
        }
        breakdown
    }

    /// `count` as a percentage of the total (0 when empty).
    pub fn pct(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }
}

/// One month of the sensitivity comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityMonth {
    pub month: YearMonth,
    pub treat_as_pass: usize,
    pub exclude_missing: usize,
    pub difference: usize,
}

/// Billing totals under both missing-QC policies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivityReport {
    /// QC outcomes among finished samples in live workflows.
    pub finished_live: QcBreakdown,
    pub exclude_missing_total: usize,
    pub treat_as_pass_total: usize,
    /// Samples billable only when missing QC counts as a pass.
    pub difference: usize,
    /// Difference as a percentage of the treat-as-pass total.
    pub pct_impact: f64,
    pub monthly: Vec<SensitivityMonth>,
}

/// Compare billing under both missing-QC policies.
pub fn sensitivity(samples: &[MergedSample]) -> SensitivityReport {
    let finished_live = QcBreakdown::from_samples(samples.iter().filter(|s| is_usage(s)));

    let mut monthly: BTreeMap<YearMonth, (usize, usize)> = BTreeMap::new();
    for sample in samples {
        let inclusive = classify_billable(sample, QcPolicy::TreatAsPass);
        let conservative = classify_billable(sample, QcPolicy::ExcludeMissing);
        if inclusive || conservative {
            let entry = monthly.entry(sample.month()).or_default();
            entry.0 += inclusive as usize;
            entry.1 += conservative as usize;
        }
    }

    let treat_as_pass_total: usize = monthly.values().map(|(i, _)| i).sum();
    let exclude_missing_total: usize = monthly.values().map(|(_, c)| c).sum();
    let difference = treat_as_pass_total.saturating_sub(exclude_missing_total);
    let pct_impact = if treat_as_pass_total > 0 {
        difference as f64 / treat_as_pass_total as f64 * 100.0
    } else {
        0.0
    };

    SensitivityReport {
        finished_live,
        exclude_missing_total,
        treat_as_pass_total,
        difference,
        pct_impact,
        monthly: monthly
            .into_iter()
            .map(|(month, (inclusive, conservative))| SensitivityMonth {
                month,
                treat_as_pass: inclusive,
                exclude_missing: conservative,
                difference: inclusive.saturating_sub(conservative),
            })
            .collect(),
    }
}

/// Shape of the loaded data, for the report header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataOverview {
    pub checks: usize,
    pub workflows: usize,
    pub runs: usize,
    pub merged_samples: usize,
    pub orphaned_checks: usize,
    pub unknown_workflows: usize,
    pub workflows_by_environment: BTreeMap<Environment, usize>,
    pub samples_by_environment: BTreeMap<Environment, usize>,
    pub runs_by_outcome: BTreeMap<String, usize>,
    pub qc: QcBreakdown,
    pub first_sample: Option<NaiveDateTime>,
    pub last_sample: Option<NaiveDateTime>,
}

/// Summarize the dataset and merge.
pub fn overview(dataset: &Dataset, merged: &MergeResult) -> DataOverview {
    let mut workflows_by_environment = BTreeMap::new();
    for workflow in &dataset.workflows {
        *workflows_by_environment
            .entry(workflow.environment())
            .or_insert(0) += 1;
    }

    let mut samples_by_environment = BTreeMap::new();
    for sample in &merged.samples {
        *samples_by_environment.entry(sample.environment).or_insert(0) += 1;
    }

    let mut runs_by_outcome = BTreeMap::new();
    for run in &dataset.runs {
        *runs_by_outcome.entry(run.outcome.to_string()).or_insert(0) += 1;
    }

    DataOverview {
        checks: dataset.checks.len(),
        workflows: dataset.workflows.len(),
        runs: dataset.runs.len(),
        merged_samples: merged.samples.len(),
        orphaned_checks: merged.orphaned_checks,
        unknown_workflows: merged.unknown_workflows,
        workflows_by_environment,
        samples_by_environment,
        runs_by_outcome,
        qc: QcBreakdown::from_samples(&merged.samples),
        first_sample: merged.samples.iter().map(|s| s.timestamp).min(),
        last_sample: merged.samples.iter().map(|s| s.timestamp).max(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::QcCheck;
    use chrono::NaiveDate;

    pub(crate) fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    /// A live, finished, passing blood sample at the given instant.
    pub(crate) fn sample(ts: NaiveDateTime) -> MergedSample {
        MergedSample {
            run_id: "r1".to_string(),
            workflow_id: "wf-1".to_string(),
            timestamp: ts,
            sample_type: "blood".to_string(),
            qc: QcOutcome::Pass,
            outcome: RunOutcome::Finished,
            run_start: Some(ts),
            workflow_name: Some("[LIVE] wf-1".to_string()),
            workflow_type: Some("extraction".to_string()),
            environment: Environment::Live,
        }
    }

    fn dataset() -> Dataset {
        let check = |run: &str, wf: &str, qc: QcOutcome| QcCheck {
            run_id: Some(run.to_string()),
            workflow_id: Some(wf.to_string()),
            timestamp: at(2024, 1, 10, 9),
            sample_type: "blood".to_string(),
            qc,
        };
        let workflow = |id: &str, name: &str| Workflow {
            id: id.to_string(),
            name: Some(name.to_string()),
            workflow_type: None,
            created: None,
        };
        let run = |id: &str, wf: &str, outcome: RunOutcome| Run {
            id: id.to_string(),
            workflow_id: Some(wf.to_string()),
            outcome,
            start_time: Some(at(2024, 1, 10, 8)),
            stop_time: None,
        };

        Dataset {
            checks: vec![
                check("r1", "wf-1", QcOutcome::Pass),
                check("r1", "wf-1", QcOutcome::Missing),
                check("r2", "wf-2", QcOutcome::Pass),
                check("r3", "wf-1", QcOutcome::Pass),
                check("r-missing", "wf-1", QcOutcome::Pass),
                check("r1", "wf-unknown", QcOutcome::Pass),
            ],
            workflows: vec![workflow("wf-1", "[LIVE] wf-1"), workflow("wf-2", "[TEST] wf-2")],
            runs: vec![
                run("r1", "wf-1", RunOutcome::Finished),
                run("r2", "wf-2", RunOutcome::Finished),
                run("r3", "wf-1", RunOutcome::Failed),
            ],
        }
    }

    #[test]
    fn test_merge_joins_and_counts_orphans() {
        let merged = merge(&dataset());
        assert_eq!(merged.samples.len(), 5);
        assert_eq!(merged.orphaned_checks, 1);
        assert_eq!(merged.unknown_workflows, 1);

        let unknown = merged
            .samples
            .iter()
            .find(|s| s.workflow_id == "wf-unknown")
            .unwrap();
        assert_eq!(unknown.environment, Environment::Unlabeled);
        assert_eq!(merged.samples[2].environment, Environment::Test);
        assert_eq!(merged.samples[3].outcome, RunOutcome::Failed);
    }

    #[test]
    fn test_merge_checks_with_blank_ids() {
        let mut data = dataset();
        data.checks.truncate(1);
        data.checks.push(QcCheck {
            run_id: None,
            ..data.checks[0].clone()
        });
        data.checks.push(QcCheck {
            workflow_id: None,
            ..data.checks[0].clone()
        });

        let merged = merge(&data);
        assert_eq!(merged.samples.len(), 2);
        assert_eq!(merged.orphaned_checks, 1);
        assert_eq!(merged.unknown_workflows, 1);

        let blank = &merged.samples[1];
        assert_eq!(blank.workflow_id, UNKNOWN_WORKFLOW_ID);
        assert_eq!(blank.environment, Environment::Unlabeled);
        assert_eq!(blank.workflow_name, None);
    }

    #[test]
    fn test_classify_billable_policies() {
        let base = sample(at(2024, 1, 1, 0));
        assert!(classify_billable(&base, QcPolicy::ExcludeMissing));
        assert!(classify_billable(&base, QcPolicy::TreatAsPass));

        let missing = MergedSample {
            qc: QcOutcome::Missing,
            ..base.clone()
        };
        assert!(!classify_billable(&missing, QcPolicy::ExcludeMissing));
        assert!(classify_billable(&missing, QcPolicy::TreatAsPass));

        let failed_qc = MergedSample {
            qc: QcOutcome::Fail,
            ..base.clone()
        };
        assert!(!classify_billable(&failed_qc, QcPolicy::TreatAsPass));
        assert!(is_usage(&failed_qc));

        let test_env = MergedSample {
            environment: Environment::Test,
            ..base.clone()
        };
        assert!(!classify_billable(&test_env, QcPolicy::TreatAsPass));

        let canceled = MergedSample {
            outcome: RunOutcome::Canceled,
            ..base
        };
        assert!(!classify_billable(&canceled, QcPolicy::TreatAsPass));
        assert!(!is_usage(&canceled));
    }

    #[test]
    fn test_exclude_missing_is_subset_of_treat_as_pass() {
        let outcomes = [
            QcOutcome::Pass,
            QcOutcome::Fail,
            QcOutcome::Missing,
            QcOutcome::Other("retest".to_string()),
        ];
        let runs = [
            RunOutcome::Finished,
            RunOutcome::Failed,
            RunOutcome::Canceled,
        ];

        for env in Environment::ALL {
            for run in &runs {
                for qc in &outcomes {
                    let s = MergedSample {
                        environment: env,
                        outcome: run.clone(),
                        qc: qc.clone(),
                        ..sample(at(2024, 1, 1, 0))
                    };
                    if classify_billable(&s, QcPolicy::ExcludeMissing) {
                        assert!(classify_billable(&s, QcPolicy::TreatAsPass));
                    }
                    if classify_billable(&s, QcPolicy::TreatAsPass) {
                        assert!(is_usage(&s));
                    }
                }
            }
        }
    }

    #[test]
    fn test_sensitivity_report() {
        let mut samples = vec![
            sample(at(2024, 1, 5, 9)),
            sample(at(2024, 1, 6, 9)),
            sample(at(2024, 2, 1, 9)),
        ];
        samples.push(MergedSample {
            qc: QcOutcome::Missing,
            ..sample(at(2024, 2, 2, 9))
        });
        samples.push(MergedSample {
            qc: QcOutcome::Fail,
            ..sample(at(2024, 2, 3, 9))
        });

        let report = sensitivity(&samples);
        assert_eq!(report.finished_live.total, 5);
        assert_eq!(report.finished_live.pass, 3);
        assert_eq!(report.finished_live.missing, 1);
        assert_eq!(report.finished_live.fail, 1);
        assert_eq!(report.exclude_missing_total, 3);
        assert_eq!(report.treat_as_pass_total, 4);
        assert_eq!(report.difference, 1);
        assert!((report.pct_impact - 25.0).abs() < 1e-9);

        assert_eq!(report.monthly.len(), 2);
        assert_eq!(report.monthly[1].month, YearMonth::new(2024, 2));
        assert_eq!(report.monthly[1].treat_as_pass, 2);
        assert_eq!(report.monthly[1].exclude_missing, 1);
        assert_eq!(report.monthly[1].difference, 1);
    }

    #[test]
    fn test_live_runs_and_overview() {
        let data = dataset();
        let runs = live_runs(&data);
        let ids: Vec<&str> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
        assert_eq!(live_workflows(&data).len(), 1);

        let merged = merge(&data);
        let overview = overview(&data, &merged);
        assert_eq!(overview.checks, 6);
        assert_eq!(overview.merged_samples, 5);
        assert_eq!(
            overview.workflows_by_environment.get(&Environment::Live),
            Some(&1)
        );
        assert_eq!(overview.runs_by_outcome.get("finished"), Some(&2));
        assert_eq!(overview.qc.missing, 1);
    }
}
