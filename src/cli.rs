//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::loader::parse_timestamp;
use crate::models::{QcPolicy, RiskLevel};
use chrono::NaiveDateTime;
use clap::Parser;
use std::path::PathBuf;

/// qcbill - billing reconciliation and customer health analysis
///
/// Reads a QC workbook (QC Checks, Workflows, Runs), classifies billable
/// samples, runs the missing-QC sensitivity analysis and scores the
/// customer's usage trend for churn risk. Markdown/JSON reports.
///
/// Examples:
///   qcbill --input data.xlsx
///   qcbill --input data.xlsx --format json --output report.json
///   qcbill --input data.xlsx --contracted blood,saliva --qc-policy treat-as-pass
///   qcbill --input data.xlsx --fail-on-risk high
///   qcbill --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Workbook to analyze (.xlsx, .xls, .ods)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "QCBILL_INPUT",
        required_unless_present = "init_config"
    )]
    pub input: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Defaults to the config file's `general.output` (qcbill_report.md).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .qcbill.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Policy for samples with a missing QC result in the headline figures
    #[arg(long, value_name = "POLICY")]
    pub qc_policy: Option<QcPolicy>,

    /// Contracted sample types (comma-separated)
    ///
    /// Example: --contracted blood,saliva
    #[arg(long, value_name = "TYPES", value_delimiter = ',')]
    pub contracted: Option<Vec<String>>,

    /// Month-over-month decline (percent) that raises an alert
    #[arg(long, value_name = "PCT")]
    pub decline_threshold: Option<f64>,

    /// Reference instant for workflow ages (RFC 3339 or YYYY-MM-DD)
    ///
    /// Defaults to the current time.
    #[arg(long, value_name = "WHEN")]
    pub as_of: Option<String>,

    /// Fail if churn risk is at or above this level
    ///
    /// Useful for scheduled checks. Exit code 2 when the threshold is reached.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on_risk: Option<RiskLevel>,

    /// Dry run: load and validate the workbook, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .qcbill.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.input {
            None => return Err("An input workbook is required (--input)".to_string()),
            Some(ref path) if !path.is_file() => {
                return Err(format!("Input workbook does not exist: {}", path.display()));
            }
            Some(_) => {}
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(threshold) = self.decline_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err("Decline threshold must be between 0 and 100".to_string());
            }
        }

        if let Some(ref contracted) = self.contracted {
            if contracted.iter().all(|t| t.trim().is_empty()) {
                return Err("At least one contracted sample type is required".to_string());
            }
        }

        if self.as_of.is_some() {
            self.as_of_timestamp()?;
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Parsed `--as-of`, if given.
    pub fn as_of_timestamp(&self) -> Result<Option<NaiveDateTime>, String> {
        match self.as_of.as_deref() {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| format!("Cannot parse --as-of value '{}'", raw)),
        }
    }
}
