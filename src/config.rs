//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.qcbill.toml` files.

use crate::models::QcPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".qcbill.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Workbook layout.
    #[serde(default)]
    pub input: InputConfig,

    /// Billing rules.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Alerting thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "qcbill_report.md".to_string()
}

/// Sheet names inside the workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_checks_sheet")]
    pub checks_sheet: String,

    #[serde(default = "default_workflows_sheet")]
    pub workflows_sheet: String,

    #[serde(default = "default_runs_sheet")]
    pub runs_sheet: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            checks_sheet: default_checks_sheet(),
            workflows_sheet: default_workflows_sheet(),
            runs_sheet: default_runs_sheet(),
        }
    }
}

fn default_checks_sheet() -> String {
    "QC Checks".to_string()
}

fn default_workflows_sheet() -> String {
    "Workflows".to_string()
}

fn default_runs_sheet() -> String {
    "Runs".to_string()
}

/// Billing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Sample types covered by the customer's contract (lower-case).
    #[serde(default = "default_contracted_types")]
    pub contracted_types: Vec<String>,

    /// Policy used for the headline billing figures.
    #[serde(default)]
    pub qc_policy: QcPolicy,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            contracted_types: default_contracted_types(),
            qc_policy: QcPolicy::default(),
        }
    }
}

fn default_contracted_types() -> Vec<String> {
    vec!["blood".to_string(), "saliva".to_string()]
}

impl BillingConfig {
    /// Whether a (lower-cased) sample type is covered by the contract.
    pub fn is_contracted(&self, sample_type: &str) -> bool {
        self.contracted_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(sample_type))
    }
}

/// Percentage thresholds for flags and status levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// A month-over-month drop larger than this raises an alert.
    #[serde(default = "default_decline_alert_pct")]
    pub decline_alert_pct: f64,

    /// A month-over-month rise larger than this counts as strong growth.
    #[serde(default = "default_strong_growth_pct")]
    pub strong_growth_pct: f64,

    /// Run success rate considered healthy.
    #[serde(default = "default_success_target_pct")]
    pub success_target_pct: f64,

    /// Run success rate below which operations are critical.
    #[serde(default = "default_success_warning_pct")]
    pub success_warning_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            decline_alert_pct: default_decline_alert_pct(),
            strong_growth_pct: default_strong_growth_pct(),
            success_target_pct: default_success_target_pct(),
            success_warning_pct: default_success_warning_pct(),
        }
    }
}

fn default_decline_alert_pct() -> f64 {
    15.0
}

fn default_strong_growth_pct() -> f64 {
    20.0
}

fn default_success_target_pct() -> f64 {
    90.0
}

fn default_success_warning_pct() -> f64 {
    80.0
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include text charts in the Markdown report.
    #[serde(default = "default_true")]
    pub include_charts: bool,

    /// Width of text bar charts, in characters.
    #[serde(default = "default_chart_width")]
    pub chart_width: usize,

    /// Number of workflows listed in ranking tables.
    #[serde(default = "default_top_workflows")]
    pub top_workflows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_charts: true,
            chart_width: default_chart_width(),
            top_workflows: default_top_workflows(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_chart_width() -> usize {
    30
}

fn default_top_workflows() -> usize {
    8
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.qcbill.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(policy) = args.qc_policy {
            self.billing.qc_policy = policy;
        }

        if let Some(ref contracted) = args.contracted {
            self.billing.contracted_types = contracted
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }

        if let Some(threshold) = args.decline_threshold {
            self.thresholds.decline_alert_pct = threshold;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
