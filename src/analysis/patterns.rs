//! Processing patterns over time.

use crate::models::{MergedSample, Run, Workflow};
use chrono::{Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Per-sample-type counts over a fixed set of buckets (hours or weekdays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDistribution {
    pub sample_type: String,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Least-squares line through daily counts; `x` is days since the first day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope_per_day: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDuration {
    pub date: NaiveDate,
    pub runs: usize,
    pub mean_hours: f64,
    pub median_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingPatterns {
    /// 24 buckets, hour 0 first.
    pub by_hour: Vec<TypeDistribution>,
    /// 7 buckets, Monday first.
    pub by_weekday: Vec<TypeDistribution>,
    pub daily: Vec<DailyCount>,
    pub daily_trend: Option<TrendLine>,
    /// Distinct runs by `START_TIME` weekday, Monday first.
    pub runs_by_weekday: Vec<usize>,
    /// Samples by `TIMESTAMP` weekday, Monday first.
    pub samples_by_weekday: Vec<usize>,
    pub run_durations: Vec<DailyDuration>,
    pub workflows_created: Vec<DailyCount>,
}

/// Compute processing patterns for billable samples and live runs/workflows.
pub fn processing_patterns(
    billable: &[MergedSample],
    live_runs: &[Run],
    live_workflows: &[Workflow],
) -> ProcessingPatterns {
    let daily = count_by_day(billable.iter().map(|s| s.timestamp.date()));

    ProcessingPatterns {
        by_hour: distribution(billable, 24, |s| s.timestamp.hour() as usize),
        by_weekday: distribution(billable, 7, |s| {
            s.timestamp.weekday().num_days_from_monday() as usize
        }),
        daily_trend: trend_line(&daily),
        daily,
        runs_by_weekday: runs_by_weekday(billable),
        samples_by_weekday: weekday_counts(billable.iter().map(|s| s.timestamp.date())),
        run_durations: run_durations(live_runs),
        workflows_created: count_by_day(
            live_workflows
                .iter()
                .filter_map(|w| w.created)
                .map(|c| c.date()),
        ),
    }
}

fn distribution(
    samples: &[MergedSample],
    buckets: usize,
    bucket_of: impl Fn(&MergedSample) -> usize,
) -> Vec<TypeDistribution> {
    let mut by_type: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for sample in samples {
        let counts = by_type
            .entry(sample.sample_type.as_str())
            .or_insert_with(|| vec![0; buckets]);
        counts[bucket_of(sample)] += 1;
    }

    by_type
        .into_iter()
        .map(|(sample_type, counts)| TypeDistribution {
            sample_type: sample_type.to_string(),
            counts,
        })
        .collect()
}

fn count_by_day(dates: impl Iterator<Item = NaiveDate>) -> Vec<DailyCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in dates {
        *counts.entry(date).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

fn weekday_counts(dates: impl Iterator<Item = NaiveDate>) -> Vec<usize> {
    let mut counts = vec![0; 7];
    for date in dates {
        counts[date.weekday().num_days_from_monday() as usize] += 1;
    }
    counts
}

fn runs_by_weekday(samples: &[MergedSample]) -> Vec<usize> {
    let mut runs: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); 7];
    for sample in samples {
        if let Some(start) = sample.run_start {
            runs[start.weekday().num_days_from_monday() as usize].insert(sample.run_id.as_str());
        }
    }
    runs.iter().map(|r| r.len()).collect()
}

/// Fit `count = slope * day + intercept`. Needs at least two days.
pub fn trend_line(daily: &[DailyCount]) -> Option<TrendLine> {
    let first = daily.first()?.date;
    if daily.len() < 2 {
        return None;
    }

    let points: Vec<(f64, f64)> = daily
        .iter()
        .map(|d| ((d.date - first).num_days() as f64, d.count as f64))
        .collect();
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some(TrendLine {
        slope_per_day: slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Mean and median run duration per start day. Runs missing a start or stop
/// time are skipped.
pub fn run_durations(runs: &[Run]) -> Vec<DailyDuration> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for run in runs {
        if let (Some(start), Some(hours)) = (run.start_time, run.duration_hours()) {
            by_day.entry(start.date()).or_default().push(hours);
        }
    }

    by_day
        .into_iter()
        .map(|(date, mut hours)| {
            hours.sort_by(|a, b| a.total_cmp(b));
            DailyDuration {
                date,
                runs: hours.len(),
                mean_hours: hours.iter().sum::<f64>() / hours.len() as f64,
                median_hours: median(&hours),
            }
        })
        .collect()
}

/// Median of a sorted, non-empty slice.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::billable::tests::{at, sample};
    use crate::models::RunOutcome;

    fn run(start: chrono::NaiveDateTime, hours: Option<i64>) -> Run {
        Run {
            id: "r".to_string(),
            workflow_id: None,
            outcome: RunOutcome::Finished,
            start_time: Some(start),
            stop_time: hours.map(|h| start + chrono::Duration::hours(h)),
        }
    }

    #[test]
    fn test_hour_and_weekday_distribution() {
        // 2024-01-01 is a Monday
        let mut saliva = sample(at(2024, 1, 6, 14));
        saliva.sample_type = "saliva".to_string();
        let samples = vec![sample(at(2024, 1, 1, 9)), sample(at(2024, 1, 2, 9)), saliva];

        let patterns = processing_patterns(&samples, &[], &[]);
        assert_eq!(patterns.by_hour.len(), 2);
        assert_eq!(patterns.by_hour[0].sample_type, "blood");
        assert_eq!(patterns.by_hour[0].counts[9], 2);
        assert_eq!(patterns.by_hour[1].counts[14], 1);
        assert_eq!(patterns.by_weekday[0].counts, vec![1, 1, 0, 0, 0, 0, 0]);
        assert_eq!(patterns.by_weekday[1].counts[5], 1);
        assert_eq!(patterns.samples_by_weekday, vec![1, 1, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_runs_by_weekday_counts_distinct_runs() {
        let mut other = sample(at(2024, 1, 1, 10));
        other.run_id = "r2".to_string();
        let samples = vec![sample(at(2024, 1, 1, 9)), sample(at(2024, 1, 1, 9)), other];

        let patterns = processing_patterns(&samples, &[], &[]);
        assert_eq!(patterns.runs_by_weekday[0], 2);
        assert_eq!(patterns.samples_by_weekday[0], 3);
    }

    #[test]
    fn test_daily_trend() {
        let day = |d, count| DailyCount {
            date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            count,
        };
        let daily = vec![day(1, 1), day(2, 3), day(3, 5)];
        let line = trend_line(&daily).unwrap();
        assert!((line.slope_per_day - 2.0).abs() < 1e-9);
        assert!((line.intercept - 1.0).abs() < 1e-9);

        assert!(trend_line(&daily[..1]).is_none());
        assert!(trend_line(&[]).is_none());
    }

    #[test]
    fn test_run_durations_skip_incomplete() {
        let runs = vec![
            run(at(2024, 1, 1, 8), Some(2)),
            run(at(2024, 1, 1, 9), Some(4)),
            run(at(2024, 1, 1, 10), Some(9)),
            run(at(2024, 1, 1, 11), None),
            run(at(2024, 1, 2, 8), Some(1)),
        ];

        let durations = run_durations(&runs);
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[0].runs, 3);
        assert_eq!(durations[0].mean_hours, 5.0);
        assert_eq!(durations[0].median_hours, 4.0);
        assert_eq!(durations[1].median_hours, 1.0);
    }

    #[test]
    fn test_workflow_creation_per_day() {
        let workflow = |created| Workflow {
            id: "wf".to_string(),
            name: None,
            workflow_type: None,
            created,
        };
        let workflows = vec![
            workflow(Some(at(2024, 1, 1, 8))),
            workflow(Some(at(2024, 1, 1, 17))),
            workflow(None),
        ];

        let patterns = processing_patterns(&[], &[], &workflows);
        assert_eq!(patterns.workflows_created.len(), 1);
        assert_eq!(patterns.workflows_created[0].count, 2);
        assert!(patterns.daily.is_empty());
        assert!(patterns.daily_trend.is_none());
    }
}
