//! Data models for the billing analysis.
//!
//! This module contains the typed records loaded from the workbook, the
//! merged sample view the analysis runs over, and the report structure.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::analysis::{
    BillingSummary, CustomerHealth, DataOverview, Investigation, ProcessingPatterns,
    SensitivityReport,
};

/// Deployment environment of a workflow, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Live,
    Test,
    Uat,
    Experimental,
    Archived,
    Unlabeled,
}

impl Environment {
    /// All categories, in display order.
    pub const ALL: [Environment; 6] = [
        Environment::Live,
        Environment::Test,
        Environment::Uat,
        Environment::Experimental,
        Environment::Archived,
        Environment::Unlabeled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Live => "live",
            Environment::Test => "test",
            Environment::Uat => "uat",
            Environment::Experimental => "experimental",
            Environment::Archived => "archived",
            Environment::Unlabeled => "unlabeled",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the QC check attached to a sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcOutcome {
    Pass,
    Fail,
    /// The QC cell was empty.
    Missing,
    Other(String),
}

impl QcOutcome {
    /// Parse a normalized cell value. `None` means the cell was empty.
    pub fn from_cell(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            None => QcOutcome::Missing,
            Some(v) if v.is_empty() => QcOutcome::Missing,
            Some(v) => match v.as_str() {
                "pass" => QcOutcome::Pass,
                "fail" => QcOutcome::Fail,
                _ => QcOutcome::Other(v),
            },
        }
    }
}

impl fmt::Display for QcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QcOutcome::Pass => write!(f, "pass"),
            QcOutcome::Fail => write!(f, "fail"),
            QcOutcome::Missing => write!(f, "missing"),
            QcOutcome::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Finished,
    Failed,
    Canceled,
    Other(String),
}

impl From<&str> for RunOutcome {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "finished" => RunOutcome::Finished,
            "failed" => RunOutcome::Failed,
            "canceled" | "cancelled" => RunOutcome::Canceled,
            other => RunOutcome::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Finished => write!(f, "finished"),
            RunOutcome::Failed => write!(f, "failed"),
            RunOutcome::Canceled => write!(f, "canceled"),
            RunOutcome::Other(s) => write!(f, "{}", s),
        }
    }
}

/// How samples with an empty QC cell are treated by the billing filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum QcPolicy {
    /// Only an explicit pass is billable (conservative).
    #[default]
    ExcludeMissing,
    /// A missing QC result counts as a pass.
    TreatAsPass,
}

impl fmt::Display for QcPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QcPolicy::ExcludeMissing => write!(f, "exclude-missing"),
            QcPolicy::TreatAsPass => write!(f, "treat-as-pass"),
        }
    }
}

/// Three-level risk grading used by churn and concentration metrics.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Returns an emoji representation of the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "🟢",
            RiskLevel::Medium => "🟡",
            RiskLevel::High => "🔴",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// A calendar month, used as the grouping key for monthly tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(ts: &NaiveDateTime) -> Self {
        Self::new(ts.year(), ts.month())
    }

    /// The month immediately after this one.
    pub fn next(&self) -> Self {
        if self.month >= 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// Every month from `self` to `last`, inclusive.
    pub fn range_to(&self, last: YearMonth) -> Vec<YearMonth> {
        let mut months = Vec::new();
        let mut current = *self;
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in '{}'", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in '{}'", s))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{}'", s));
        }
        Ok(Self::new(year, month))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One row of the `QC Checks` sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcCheck {
    /// Blank cells give `None`; such checks never join a run.
    pub run_id: Option<String>,
    /// Blank cells give `None`; such checks merge as unlabeled.
    pub workflow_id: Option<String>,
    pub timestamp: NaiveDateTime,
    /// Lower-cased sample type, e.g. `blood`.
    pub sample_type: String,
    pub qc: QcOutcome,
}

/// One row of the `Workflows` sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: Option<String>,
    pub workflow_type: Option<String>,
    pub created: Option<NaiveDateTime>,
}

impl Workflow {
    /// Environment inferred from the workflow name.
    pub fn environment(&self) -> Environment {
        crate::analysis::infer_environment(self.name.as_deref())
    }
}

/// One row of the `Runs` sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub workflow_id: Option<String>,
    pub outcome: RunOutcome,
    pub start_time: Option<NaiveDateTime>,
    pub stop_time: Option<NaiveDateTime>,
}

impl Run {
    /// Wall-clock duration in hours, when both ends are known.
    pub fn duration_hours(&self) -> Option<f64> {
        let (start, stop) = (self.start_time?, self.stop_time?);
        Some((stop - start).num_seconds() as f64 / 3600.0)
    }
}

/// The three tables as loaded from the workbook.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub checks: Vec<QcCheck>,
    pub workflows: Vec<Workflow>,
    pub runs: Vec<Run>,
}

/// A QC check joined with its run and workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSample {
    pub run_id: String,
    pub workflow_id: String,
    pub timestamp: NaiveDateTime,
    pub sample_type: String,
    pub qc: QcOutcome,
    pub outcome: RunOutcome,
    pub run_start: Option<NaiveDateTime>,
    pub workflow_name: Option<String>,
    pub workflow_type: Option<String>,
    pub environment: Environment,
}

impl MergedSample {
    pub fn month(&self) -> YearMonth {
        YearMonth::of(&self.timestamp)
    }

    /// Workflow name, or the workflow identifier when the name is unknown.
    pub fn workflow_label(&self) -> &str {
        self.workflow_name.as_deref().unwrap_or(&self.workflow_id)
    }
}

/// Metadata about the analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the analyzed workbook.
    pub input_file: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Policy used for the headline billing figures.
    pub qc_policy: QcPolicy,
    /// Sample types the customer is contracted for.
    pub contracted_types: Vec<String>,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub overview: DataOverview,
    pub billing: BillingSummary,
    pub sensitivity: SensitivityReport,
    pub investigation: Investigation,
    pub patterns: ProcessingPatterns,
    pub health: CustomerHealth,
    /// Follow-up actions derived from the findings.
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_qc_outcome_from_cell() {
        assert_eq!(QcOutcome::from_cell(Some("PASS")), QcOutcome::Pass);
        assert_eq!(QcOutcome::from_cell(Some(" fail ")), QcOutcome::Fail);
        assert_eq!(QcOutcome::from_cell(Some("")), QcOutcome::Missing);
        assert_eq!(QcOutcome::from_cell(None), QcOutcome::Missing);
        assert_eq!(
            QcOutcome::from_cell(Some("Retest")),
            QcOutcome::Other("retest".to_string())
        );
    }

    #[test]
    fn test_run_outcome_from_str() {
        assert_eq!(RunOutcome::from("Finished"), RunOutcome::Finished);
        assert_eq!(RunOutcome::from("cancelled"), RunOutcome::Canceled);
        assert_eq!(
            RunOutcome::from("paused"),
            RunOutcome::Other("paused".to_string())
        );
    }

    #[test]
    fn test_year_month_ordering_and_display() {
        let jan = YearMonth::of(&ts(2024, 1, 15));
        let dec = YearMonth::of(&ts(2023, 12, 1));
        assert!(dec < jan);
        assert_eq!(dec.next(), jan);
        assert_eq!(jan.to_string(), "2024-01");
        assert_eq!("2024-01".parse::<YearMonth>(), Ok(jan));
        assert!("2024-13".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_range() {
        let months = YearMonth::new(2023, 11).range_to(YearMonth::new(2024, 2));
        let labels: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(labels, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn test_year_month_serializes_as_string() {
        let json = serde_json::to_string(&YearMonth::new(2024, 3)).unwrap();
        assert_eq!(json, "\"2024-03\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, YearMonth::new(2024, 3));
    }

    #[test]
    fn test_run_duration() {
        let run = Run {
            id: "r1".to_string(),
            workflow_id: None,
            outcome: RunOutcome::Finished,
            start_time: Some(ts(2024, 1, 1)),
            stop_time: Some(ts(2024, 1, 1) + chrono::Duration::minutes(90)),
        };
        assert_eq!(run.duration_hours(), Some(1.5));

        let open = Run {
            stop_time: None,
            ..run
        };
        assert_eq!(open.duration_hours(), None);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(RiskLevel::High.to_string(), "HIGH");
    }
}
