//! Workbook loading.
//!
//! This module reads the three fixed-schema sheets with calamine, checks
//! that every expected column is present and converts rows into typed
//! records. Missing sheets and columns, blank check timestamps and
//! unparseable dates abort the load with a [`LoadError`]; Runs and Workflows
//! rows with a blank identifier are skipped.

mod cells;

pub use cells::{parse_timestamp, RawSheet};

use crate::config::InputConfig;
use crate::models::{Dataset, QcCheck, QcOutcome, Run, RunOutcome, Workflow};
use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Column names used across the workbook.
pub mod columns {
    pub const RUN_ID: &str = "RUN_ID";
    pub const ID: &str = "ID";
    pub const WORKFLOW_ID: &str = "WORKFLOW_ID";
    pub const TIMESTAMP: &str = "TIMESTAMP";
    pub const SAMPLE_TYPE: &str = "SAMPLE_TYPE";
    pub const QC_CHECK: &str = "QC_CHECK";
    pub const WORKFLOW_NAME: &str = "WORKFLOW_NAME";
    pub const WORKFLOW_TYPE: &str = "WORKFLOW_TYPE";
    pub const WORKFLOW_TIMESTAMP: &str = "WORKFLOW_TIMESTAMP";
    pub const OUTCOME: &str = "OUTCOME";
    pub const START_TIME: &str = "START_TIME";
    pub const STOP_TIME: &str = "STOP_TIME";
}

/// Errors raised while loading the workbook.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open workbook {path}: {source}")]
    Workbook {
        path: String,
        #[source]
        source: calamine::Error,
    },

    #[error("sheet '{name}' not found (available: {available})")]
    MissingSheet { name: String, available: String },

    #[error("sheet '{0}' has no header row")]
    EmptySheet(String),

    #[error("sheet '{sheet}' is missing column '{column}'")]
    MissingColumn { sheet: String, column: String },

    #[error("sheet '{sheet}', row {row}: column '{column}' is empty")]
    MissingValue {
        sheet: String,
        column: String,
        row: usize,
    },

    #[error("sheet '{sheet}', row {row}: cannot parse '{value}' in column '{column}' as a timestamp")]
    UnparseableTimestamp {
        sheet: String,
        column: String,
        row: usize,
        value: String,
    },
}

/// Load all three tables from a workbook on disk.
pub fn load_workbook(path: &Path, input: &InputConfig) -> Result<Dataset, LoadError> {
    info!("Opening workbook: {}", path.display());

    let mut workbook = open_workbook_auto(path).map_err(|source| LoadError::Workbook {
        path: path.display().to_string(),
        source,
    })?;

    let available = workbook.sheet_names();
    debug!("Sheets in workbook: {:?}", available);

    let mut read_sheet = |name: &str| -> Result<RawSheet, LoadError> {
        ensure_sheet(name, &available)?;
        let range = workbook
            .worksheet_range(name)
            .map_err(|source| LoadError::Workbook {
                path: path.display().to_string(),
                source,
            })?;
        RawSheet::from_range(name, &range)
    };

    let checks = read_sheet(&input.checks_sheet)?;
    let workflows = read_sheet(&input.workflows_sheet)?;
    let runs = read_sheet(&input.runs_sheet)?;

    dataset_from_sheets(&checks, &workflows, &runs)
}

/// Fail with [`LoadError::MissingSheet`] unless `name` is one of `available`.
pub fn ensure_sheet(name: &str, available: &[String]) -> Result<(), LoadError> {
    if available.iter().any(|s| s == name) {
        Ok(())
    } else {
        Err(LoadError::MissingSheet {
            name: name.to_string(),
            available: available.join(", "),
        })
    }
}

/// Convert three raw sheets into a typed dataset.
pub fn dataset_from_sheets(
    checks: &RawSheet,
    workflows: &RawSheet,
    runs: &RawSheet,
) -> Result<Dataset, LoadError> {
    let dataset = Dataset {
        checks: parse_checks(checks)?,
        workflows: parse_workflows(workflows)?,
        runs: parse_runs(runs)?,
    };

    info!(
        "Loaded {} QC checks, {} workflows, {} runs",
        dataset.checks.len(),
        dataset.workflows.len(),
        dataset.runs.len()
    );

    Ok(dataset)
}

/// Parse the QC Checks sheet.
pub fn parse_checks(sheet: &RawSheet) -> Result<Vec<QcCheck>, LoadError> {
    let run_col = sheet.column(&[columns::RUN_ID])?;
    let wf_col = sheet.column(&[columns::WORKFLOW_ID])?;
    let ts_col = sheet.column(&[columns::TIMESTAMP])?;
    let type_col = sheet.column(&[columns::SAMPLE_TYPE])?;
    let qc_col = sheet.column(&[columns::QC_CHECK])?;

    (0..sheet.rows.len())
        .map(|row| {
            let sample_type = cells::cell_text(sheet.cell(row, type_col))
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            let qc = cells::cell_text(sheet.cell(row, qc_col));

            Ok(QcCheck {
                run_id: cells::cell_text(sheet.cell(row, run_col)),
                workflow_id: cells::cell_text(sheet.cell(row, wf_col)),
                timestamp: sheet.required_timestamp(row, ts_col)?,
                sample_type,
                qc: QcOutcome::from_cell(qc.as_deref()),
            })
        })
        .collect()
}

/// Parse the Workflows sheet.
pub fn parse_workflows(sheet: &RawSheet) -> Result<Vec<Workflow>, LoadError> {
    let id_col = sheet.column(&[columns::WORKFLOW_ID, columns::ID])?;
    let name_col = sheet.column(&[columns::WORKFLOW_NAME])?;
    let created_col = sheet.column(&[columns::WORKFLOW_TIMESTAMP])?;
    let type_col = sheet.optional_column(&[columns::WORKFLOW_TYPE]);

    let mut workflows = Vec::with_capacity(sheet.rows.len());
    for row in 0..sheet.rows.len() {
        let Some(id) = cells::cell_text(sheet.cell(row, id_col)) else {
            warn!(
                "{} row {}: blank workflow id, row skipped",
                sheet.name,
                RawSheet::excel_row(row)
            );
            continue;
        };

        workflows.push(Workflow {
            id,
            name: cells::cell_text(sheet.cell(row, name_col)),
            workflow_type: type_col.and_then(|col| cells::cell_text(sheet.cell(row, col))),
            created: sheet.timestamp(row, created_col)?,
        });
    }

    Ok(workflows)
}

/// Parse the Runs sheet. The identifier column may be `ID` or `RUN_ID`.
pub fn parse_runs(sheet: &RawSheet) -> Result<Vec<Run>, LoadError> {
    let id_col = sheet.column(&[columns::ID, columns::RUN_ID])?;
    let wf_col = sheet.column(&[columns::WORKFLOW_ID])?;
    let outcome_col = sheet.column(&[columns::OUTCOME])?;
    let start_col = sheet.column(&[columns::START_TIME])?;
    let stop_col = sheet.column(&[columns::STOP_TIME])?;

    let mut runs = Vec::with_capacity(sheet.rows.len());
    for row in 0..sheet.rows.len() {
        let Some(id) = cells::cell_text(sheet.cell(row, id_col)) else {
            warn!(
                "{} row {}: blank run id, row skipped",
                sheet.name,
                RawSheet::excel_row(row)
            );
            continue;
        };
        let outcome = cells::cell_text(sheet.cell(row, outcome_col)).unwrap_or_default();

        runs.push(Run {
            id,
            workflow_id: cells::cell_text(sheet.cell(row, wf_col)),
            outcome: RunOutcome::from(outcome.as_str()),
            start_time: sheet.timestamp(row, start_col)?,
            stop_time: sheet.timestamp(row, stop_col)?,
        });
    }

    Ok(runs)
}
