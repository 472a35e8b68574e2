//! Investigation of non-contracted sample types.
//!
//! Works on conservative billable samples and answers where the samples
//! outside the contract came from: which workflows, since when, and what
//! those workflows have in common.

use super::monthly::pct_change;
use crate::config::BillingConfig;
use crate::models::{Environment, MergedSample, Workflow, YearMonth};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Name fragments counted across workflows that produced non-contracted samples.
const NAME_PATTERNS: &[(&str, &[&str])] = &[
    ("dna", &["dna"]),
    ("extraction", &["extraction"]),
    ("pcr", &["pcr"]),
    ("normalization", &["normalisation", "normalization"]),
];

/// One workflow that produced non-contracted billable samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonContractedWorkflow {
    pub workflow_id: String,
    pub workflow: String,
    pub count: usize,
    pub first_sample: NaiveDateTime,
    pub last_sample: NaiveDateTime,
    pub workflow_type: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub environment: Environment,
    /// Sample types seen, sorted.
    pub sample_types: Vec<String>,
}

/// Workflow-type counts and average creation date for a group of workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGroup {
    pub workflows: usize,
    pub types: BTreeMap<String, usize>,
    pub avg_created: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub month: YearMonth,
    pub count: usize,
    pub mom_change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub total_non_contracted: usize,
    pub workflows: Vec<NonContractedWorkflow>,
    /// Live workflows that produced non-contracted samples.
    pub with_non_contracted: WorkflowGroup,
    /// Live workflows that did not.
    pub without_non_contracted: WorkflowGroup,
    pub timeline: Vec<TimelinePoint>,
    pub name_patterns: BTreeMap<String, usize>,
}

/// Investigate the non-contracted part of `billable`.
///
/// `live_workflows` is the population split into the with/without groups.
pub fn investigate(
    billable: &[MergedSample],
    live_workflows: &[Workflow],
    billing: &BillingConfig,
) -> Investigation {
    let non_contracted: Vec<&MergedSample> = billable
        .iter()
        .filter(|s| !billing.is_contracted(&s.sample_type))
        .collect();

    let workflows = per_workflow(&non_contracted, live_workflows);
    let involved: HashSet<&str> = workflows.iter().map(|w| w.workflow_id.as_str()).collect();

    let (with, without): (Vec<&Workflow>, Vec<&Workflow>) = live_workflows
        .iter()
        .partition(|w| involved.contains(w.id.as_str()));

    let name_patterns = NAME_PATTERNS
        .iter()
        .map(|(label, needles)| {
            let hits = workflows
                .iter()
                .filter(|w| {
                    let name = w.workflow.to_lowercase();
                    needles.iter().any(|n| name.contains(n))
                })
                .count();
            (label.to_string(), hits)
        })
        .collect();

    Investigation {
        total_non_contracted: non_contracted.len(),
        with_non_contracted: group(&with),
        without_non_contracted: group(&without),
        timeline: timeline(&non_contracted),
        name_patterns,
        workflows,
    }
}

fn per_workflow(samples: &[&MergedSample], workflows: &[Workflow]) -> Vec<NonContractedWorkflow> {
    let created: HashMap<&str, Option<NaiveDateTime>> = workflows
        .iter()
        .map(|w| (w.id.as_str(), w.created))
        .collect();

    let mut by_id: HashMap<&str, NonContractedWorkflow> = HashMap::new();
    for sample in samples {
        let entry = by_id
            .entry(sample.workflow_id.as_str())
            .or_insert_with(|| NonContractedWorkflow {
                workflow_id: sample.workflow_id.clone(),
                workflow: sample.workflow_label().to_string(),
                count: 0,
                first_sample: sample.timestamp,
                last_sample: sample.timestamp,
                workflow_type: sample.workflow_type.clone(),
                created: created.get(sample.workflow_id.as_str()).copied().flatten(),
                environment: sample.environment,
                sample_types: Vec::new(),
            });
        entry.count += 1;
        entry.first_sample = entry.first_sample.min(sample.timestamp);
        entry.last_sample = entry.last_sample.max(sample.timestamp);
        if !entry.sample_types.contains(&sample.sample_type) {
            entry.sample_types.push(sample.sample_type.clone());
        }
    }

    let mut result: Vec<NonContractedWorkflow> = by_id.into_values().collect();
    for w in &mut result {
        w.sample_types.sort();
    }
    result.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.workflow.cmp(&b.workflow))
    });
    result
}

fn group(workflows: &[&Workflow]) -> WorkflowGroup {
    let mut types = BTreeMap::new();
    for w in workflows {
        let key = w
            .workflow_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        *types.entry(key).or_default() += 1;
    }

    WorkflowGroup {
        workflows: workflows.len(),
        types,
        avg_created: average_datetime(workflows.iter().filter_map(|w| w.created)),
    }
}

/// Mean of a set of instants, to the second.
fn average_datetime(values: impl Iterator<Item = NaiveDateTime>) -> Option<NaiveDateTime> {
    let seconds: Vec<i64> = values.map(|v| v.and_utc().timestamp()).collect();
    if seconds.is_empty() {
        return None;
    }
    let mean = seconds.iter().map(|&s| s as i128).sum::<i128>() / seconds.len() as i128;
    DateTime::from_timestamp(mean as i64, 0).map(|dt| dt.naive_utc())
}

fn timeline(samples: &[&MergedSample]) -> Vec<TimelinePoint> {
    let mut counts: BTreeMap<YearMonth, usize> = BTreeMap::new();
    for sample in samples {
        *counts.entry(sample.month()).or_default() += 1;
    }

    let (Some(first), Some(last)) = (
        counts.keys().next().copied(),
        counts.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut previous: Option<usize> = None;
    first
        .range_to(last)
        .into_iter()
        .map(|month| {
            let count = counts.get(&month).copied().unwrap_or(0);
            let change = previous.and_then(|p| pct_change(p, count));
            previous = Some(count);
            TimelinePoint {
                month,
                count,
                mom_change_pct: change,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::billable::tests::{at, sample};

    fn typed(ts: NaiveDateTime, sample_type: &str, wf: &str, name: &str) -> MergedSample {
        let mut s = sample(ts);
        s.sample_type = sample_type.to_string();
        s.workflow_id = wf.to_string();
        s.workflow_name = Some(name.to_string());
        s
    }

    fn workflow(id: &str, kind: &str, created: NaiveDateTime) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: Some(format!("[LIVE] {}", id)),
            workflow_type: Some(kind.to_string()),
            created: Some(created),
        }
    }

    fn fixture() -> (Vec<MergedSample>, Vec<Workflow>) {
        let samples = vec![
            typed(at(2024, 1, 5, 9), "blood", "wf-1", "[LIVE] Blood DNA extraction"),
            typed(at(2024, 1, 6, 9), "tissue", "wf-2", "[LIVE] Tissue DNA extraction"),
            typed(at(2024, 3, 6, 9), "tissue", "wf-2", "[LIVE] Tissue DNA extraction"),
            typed(at(2024, 3, 7, 9), "swab", "wf-2", "[LIVE] Tissue DNA extraction"),
            typed(at(2024, 3, 8, 9), "swab", "wf-3", "[LIVE] PCR normalisation"),
        ];
        let workflows = vec![
            workflow("wf-1", "extraction", at(2023, 1, 1, 0)),
            workflow("wf-2", "extraction", at(2023, 6, 1, 0)),
            workflow("wf-3", "pcr", at(2023, 6, 3, 0)),
        ];
        (samples, workflows)
    }

    #[test]
    fn test_per_workflow_summary() {
        let (samples, workflows) = fixture();
        let inv = investigate(&samples, &workflows, &BillingConfig::default());

        assert_eq!(inv.total_non_contracted, 4);
        assert_eq!(inv.workflows.len(), 2);

        let top = &inv.workflows[0];
        assert_eq!(top.workflow_id, "wf-2");
        assert_eq!(top.count, 3);
        assert_eq!(top.first_sample, at(2024, 1, 6, 9));
        assert_eq!(top.last_sample, at(2024, 3, 7, 9));
        assert_eq!(top.sample_types, vec!["swab", "tissue"]);
        assert_eq!(top.created, Some(at(2023, 6, 1, 0)));
    }

    #[test]
    fn test_workflow_groups() {
        let (samples, workflows) = fixture();
        let inv = investigate(&samples, &workflows, &BillingConfig::default());

        assert_eq!(inv.with_non_contracted.workflows, 2);
        assert_eq!(inv.with_non_contracted.types.get("extraction"), Some(&1));
        assert_eq!(inv.with_non_contracted.types.get("pcr"), Some(&1));
        assert_eq!(inv.with_non_contracted.avg_created, Some(at(2023, 6, 2, 0)));

        assert_eq!(inv.without_non_contracted.workflows, 1);
        assert_eq!(inv.without_non_contracted.avg_created, Some(at(2023, 1, 1, 0)));
    }

    #[test]
    fn test_timeline_fills_gaps() {
        let (samples, workflows) = fixture();
        let inv = investigate(&samples, &workflows, &BillingConfig::default());

        let counts: Vec<usize> = inv.timeline.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![1, 0, 3]);
        assert_eq!(inv.timeline[1].mom_change_pct, Some(-100.0));
        assert_eq!(inv.timeline[2].mom_change_pct, None);
    }

    #[test]
    fn test_name_patterns() {
        let (samples, workflows) = fixture();
        let inv = investigate(&samples, &workflows, &BillingConfig::default());

        assert_eq!(inv.name_patterns["dna"], 1);
        assert_eq!(inv.name_patterns["extraction"], 1);
        assert_eq!(inv.name_patterns["pcr"], 1);
        assert_eq!(inv.name_patterns["normalization"], 1);
    }

    #[test]
    fn test_all_contracted() {
        let samples = vec![sample(at(2024, 1, 1, 9))];
        let inv = investigate(&samples, &[], &BillingConfig::default());
        assert_eq!(inv.total_non_contracted, 0);
        assert!(inv.workflows.is_empty());
        assert!(inv.timeline.is_empty());
        assert_eq!(inv.with_non_contracted.avg_created, None);
    }
}
