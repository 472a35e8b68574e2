//! Markdown report generation.
//!
//! This module renders the analysis results as a Markdown document with
//! tables and text charts, or as pretty-printed JSON.

use super::charts::{bar_chart, sparkline};
use crate::analysis::billable::QcBreakdown;
use crate::analysis::health::{CustomerHealth, HealthStatus};
use crate::analysis::patterns::WEEKDAYS;
use crate::analysis::{
    BillingSummary, DataOverview, Investigation, ProcessingPatterns, SensitivityReport,
};
use crate::config::ReportConfig;
use crate::models::{Environment, Report, ReportMetadata};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# QC Billing Analysis Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_overview_section(&report.overview));
    output.push_str(&generate_billing_section(&report.billing, options));
    output.push_str(&generate_sensitivity_section(&report.sensitivity));
    output.push_str(&generate_investigation_section(&report.investigation, options));
    output.push_str(&generate_health_section(&report.health, options));
    output.push_str(&generate_patterns_section(&report.patterns, options));
    output.push_str(&generate_recommendations_section(&report.recommendations));
    output.push_str(&generate_footer());

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Signed percentage, or `n/a`.
fn fmt_change(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.1}%", v),
        None => "n/a".to_string(),
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "n/a".to_string(),
    }
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", metadata.input_file));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **QC Policy:** `{}`\n", metadata.qc_policy));
    section.push_str(&format!(
        "- **Contracted Sample Types:** {}\n",
        metadata.contracted_types.join(", ")
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Data Overview](#data-overview)\n");
    toc.push_str("- [Billing Reconciliation](#billing-reconciliation)\n");
    toc.push_str("- [Missing QC Sensitivity](#missing-qc-sensitivity)\n");
    toc.push_str("- [Non-Contracted Samples](#non-contracted-samples)\n");
    toc.push_str("- [Customer Health](#customer-health)\n");
    toc.push_str("- [Processing Patterns](#processing-patterns)\n");

    if !report.recommendations.is_empty() {
        toc.push_str("- [Recommendations](#recommendations)\n");
    }

    toc.push('\n');

    toc
}

fn generate_overview_section(overview: &DataOverview) -> String {
    let mut section = String::new();

    section.push_str("## Data Overview\n\n");
    section.push_str("| Table | Rows |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!("| QC Checks | {} |\n", overview.checks));
    section.push_str(&format!("| Workflows | {} |\n", overview.workflows));
    section.push_str(&format!("| Runs | {} |\n", overview.runs));
    section.push_str(&format!("| Merged samples | {} |\n\n", overview.merged_samples));

    if overview.orphaned_checks > 0 || overview.unknown_workflows > 0 {
        section.push_str(&format!(
            "> ⚠️ {} QC checks reference unknown runs and were dropped; {} merged samples reference unknown workflows.\n\n",
            overview.orphaned_checks, overview.unknown_workflows
        ));
    }

    if let (Some(first), Some(last)) = (overview.first_sample, overview.last_sample) {
        section.push_str(&format!(
            "Samples span **{}** to **{}**.\n\n",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        ));
    }

    section.push_str("### Environments\n\n");
    section.push_str("| Environment | Workflows | Samples |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for env in Environment::ALL {
        let workflows = overview.workflows_by_environment.get(&env).copied().unwrap_or(0);
        let samples = overview.samples_by_environment.get(&env).copied().unwrap_or(0);
        section.push_str(&format!("| {} | {} | {} |\n", env, workflows, samples));
    }
    section.push('\n');

    if !overview.runs_by_outcome.is_empty() {
        section.push_str("### Run Outcomes\n\n");
        section.push_str("| Outcome | Runs |\n");
        section.push_str("|:---|:---:|\n");
        for (outcome, count) in &overview.runs_by_outcome {
            section.push_str(&format!("| {} | {} |\n", outcome, count));
        }
        section.push('\n');
    }

    section.push_str("### QC Results (all samples)\n\n");
    section.push_str(&qc_table(&overview.qc));

    section
}

fn qc_table(qc: &QcBreakdown) -> String {
    let mut table = String::new();
    table.push_str("| Pass | Fail | Missing | Other | **Total** |\n");
    table.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    table.push_str(&format!(
        "| {} ({:.1}%) | {} ({:.1}%) | {} ({:.1}%) | {} | **{}** |\n\n",
        qc.pass,
        qc.pct(qc.pass),
        qc.fail,
        qc.pct(qc.fail),
        qc.missing,
        qc.pct(qc.missing),
        qc.other,
        qc.total
    ));
    table
}

fn generate_billing_section(billing: &BillingSummary, options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Billing Reconciliation\n\n");
    section.push_str(&format!(
        "Billable samples under the `{}` policy: **{}**\n\n",
        billing.policy, billing.total_billable
    ));
    section.push_str("| Contracted | Non-contracted | Overbilling |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} |\n\n",
        billing.contracted,
        billing.non_contracted,
        fmt_pct(billing.overbilling_pct)
    ));

    if let Some(ref latest) = billing.latest_month {
        section.push_str(&format!(
            "Latest month ({}): {} contracted, {} non-contracted ({} overbilling).\n\n",
            latest.month,
            latest.contracted,
            latest.non_contracted,
            fmt_pct(latest.overbilling_pct)
        ));
    }

    if !billing.monthly.is_empty() {
        section.push_str("### By Month\n\n");
        section.push_str("| Month | Contracted | Non-contracted | Total | Overbilling |\n");
        section.push_str("|:---|:---:|:---:|:---:|:---:|\n");
        for m in &billing.monthly {
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                m.month,
                m.contracted,
                m.non_contracted,
                m.total,
                fmt_pct(m.overbilling_pct)
            ));
        }
        section.push('\n');
    }

    if !billing.sample_types.is_empty() {
        section.push_str("### Sample Types\n\n");
        section.push_str("| Sample Type | Samples | Share | Contracted |\n");
        section.push_str("|:---|:---:|:---:|:---:|\n");
        for t in &billing.sample_types {
            section.push_str(&format!(
                "| {} | {} | {:.1}% | {} |\n",
                t.sample_type,
                t.count,
                t.share_pct,
                if t.contracted { "✅" } else { "❌" }
            ));
        }
        section.push('\n');

        if options.include_charts {
            let rows: Vec<(String, f64)> = billing
                .sample_types
                .iter()
                .map(|t| (t.sample_type.clone(), t.count as f64))
                .collect();
            section.push_str(&bar_chart(&rows, options.chart_width));
        }
    }

    if !billing.top_non_contracted_workflows.is_empty() {
        section.push_str("### Workflows Producing Non-Contracted Samples\n\n");
        section.push_str("| Workflow | Samples |\n");
        section.push_str("|:---|:---:|\n");
        for w in billing
            .top_non_contracted_workflows
            .iter()
            .take(options.top_workflows)
        {
            section.push_str(&format!("| {} | {} |\n", w.workflow, w.count));
        }
        section.push('\n');
    }

    section
}

fn generate_sensitivity_section(sensitivity: &SensitivityReport) -> String {
    let mut section = String::new();

    section.push_str("## Missing QC Sensitivity\n\n");
    section.push_str("QC results of finished live samples:\n\n");
    section.push_str(&qc_table(&sensitivity.finished_live));

    section.push_str("| Policy | Billable |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!(
        "| exclude-missing | {} |\n",
        sensitivity.exclude_missing_total
    ));
    section.push_str(&format!(
        "| treat-as-pass | {} |\n\n",
        sensitivity.treat_as_pass_total
    ));
    section.push_str(&format!(
        "Treating missing QC as pass adds **{}** samples ({:.1}% of the treat-as-pass total).\n\n",
        sensitivity.difference, sensitivity.pct_impact
    ));

    let affected: Vec<_> = sensitivity
        .monthly
        .iter()
        .filter(|m| m.difference > 0)
        .collect();
    if !affected.is_empty() {
        section.push_str("| Month | Exclude missing | Treat as pass | Difference |\n");
        section.push_str("|:---|:---:|:---:|:---:|\n");
        for m in affected {
            section.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                m.month, m.exclude_missing, m.treat_as_pass, m.difference
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_investigation_section(inv: &Investigation, options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Non-Contracted Samples\n\n");

    if inv.total_non_contracted == 0 {
        section.push_str("No billable samples outside the contracted sample types. 🎉\n\n");
        return section;
    }

    section.push_str(&format!(
        "**{}** billable samples fall outside the contracted sample types, from {} workflows.\n\n",
        inv.total_non_contracted,
        inv.workflows.len()
    ));

    section.push_str("### Workflows\n\n");
    section.push_str("| Workflow | Samples | Sample Types | First | Last | Type | Created |\n");
    section.push_str("|:---|:---:|:---|:---|:---|:---|:---|\n");
    for w in inv.workflows.iter().take(options.top_workflows) {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            w.workflow,
            w.count,
            w.sample_types.join(", "),
            w.first_sample.format("%Y-%m-%d"),
            w.last_sample.format("%Y-%m-%d"),
            w.workflow_type.as_deref().unwrap_or("-"),
            w.created
                .map(|c| c.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    section.push('\n');

    section.push_str("### Live Workflow Comparison\n\n");
    section.push_str("| Group | Workflows | Avg. Created | Types |\n");
    section.push_str("|:---|:---:|:---|:---|\n");
    for (label, group) in [
        ("With non-contracted", &inv.with_non_contracted),
        ("Without non-contracted", &inv.without_non_contracted),
    ] {
        let types: Vec<String> = group
            .types
            .iter()
            .map(|(t, c)| format!("{} ({})", t, c))
            .collect();
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            label,
            group.workflows,
            group
                .avg_created
                .map(|c| c.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
            types.join(", ")
        ));
    }
    section.push('\n');

    if !inv.timeline.is_empty() {
        section.push_str("### Timeline\n\n");
        section.push_str("| Month | Samples | MoM |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for p in &inv.timeline {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                p.month,
                p.count,
                fmt_change(p.mom_change_pct)
            ));
        }
        section.push('\n');
    }

    let patterns: Vec<String> = inv
        .name_patterns
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(name, count)| format!("`{}` ({})", name, count))
        .collect();
    if !patterns.is_empty() {
        section.push_str(&format!(
            "Workflow names mention: {}\n\n",
            patterns.join(", ")
        ));
    }

    section
}

fn generate_health_section(health: &CustomerHealth, options: &ReportConfig) -> String {
    let mut section = String::new();
    let card = &health.scorecard;

    section.push_str("## Customer Health\n\n");
    section.push_str(&format!(
        "### {} Health Score: {}/100 ({})\n\n",
        card.status.emoji(),
        card.health_score,
        card.status
    ));
    section.push_str("| Last Month Usage | MoM | 3-Month Trend | Success Rate | Overall Growth |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n\n",
        card.last_month_usage,
        fmt_change(card.last_mom_change_pct),
        fmt_change(card.three_month_trend_pct),
        fmt_pct(card.latest_success_rate),
        fmt_change(card.overall_growth_pct)
    ));

    if card.status != HealthStatus::Healthy {
        section.push_str(&format!("> Risk score: {}\n\n", card.risk_score));
    }

    // Monthly usage
    if !health.usage_monthly.is_empty() {
        section.push_str("### Monthly Usage\n\n");
        if options.include_charts {
            let values: Vec<f64> = health.usage_monthly.iter().map(|m| m.samples as f64).collect();
            section.push_str(&format!("`{}`\n\n", sparkline(&values)));
        }
        section.push_str("| Month | Samples | Runs | Workflows | MoM | Flag |\n");
        section.push_str("|:---|:---:|:---:|:---:|:---:|:---|\n");
        for m in &health.usage_monthly {
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} {} |\n",
                m.month,
                m.samples,
                m.unique_runs,
                m.unique_workflows,
                fmt_change(m.mom_change_pct),
                m.flag.emoji(),
                m.flag
            ));
        }
        section.push('\n');
    }

    let churn = &health.churn_risk;
    section.push_str(&format!(
        "### {} Churn Risk: {}\n\n",
        churn.risk_level.emoji(),
        churn.risk_level
    ));
    section.push_str(&format!(
        "- Consecutive monthly declines: {}\n",
        churn.consecutive_monthly_declines
    ));
    section.push_str(&format!(
        "- Latest MoM change: {}\n",
        fmt_change(churn.latest_mom_change_pct)
    ));
    if let Some(trend) = churn.three_month_trend {
        section.push_str(&format!("- Three-month trend: {:+.1} samples/month\n", trend));
    }
    section.push('\n');

    let growth = &health.growth;
    section.push_str(&format!("### Growth: {}\n\n", growth.trajectory));
    section.push_str(&format!(
        "- Recent: {} | Overall: {}",
        fmt_change(growth.recent_growth_pct),
        fmt_change(growth.overall_growth_pct)
    ));
    if let Some(a) = growth.growth_acceleration {
        section.push_str(&format!(" | Acceleration: {:+.3}", a));
    }
    section.push_str("\n\n");

    let ops = &health.operational_health;
    section.push_str(&format!("### Operational Health: {}\n\n", ops.status));
    if !ops.monthly.is_empty() {
        section.push_str("| Month | Runs | Finished | Failed | Canceled | Success |\n");
        section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");
        for m in &ops.monthly {
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} | {:.1}% |\n",
                m.month, m.total_runs, m.finished, m.failed, m.canceled, m.success_rate_pct
            ));
        }
        section.push('\n');
    }
    section.push_str(&format!(
        "- Latest success rate: {} (trend {})\n- Average success rate: {}\n- Failed runs: {} | Canceled runs: {}\n\n",
        fmt_pct(ops.latest_success_rate),
        fmt_change(ops.success_rate_trend),
        fmt_pct(ops.avg_success_rate),
        ops.total_failed_runs,
        ops.total_canceled_runs
    ));

    let e = &health.engagement;
    section.push_str("### Engagement\n\n");
    section.push_str(&format!(
        "- Active workflows: {} of {} live ({:.1}%)\n- Diversity index: {:.2}\n- Samples per active workflow: {:.1}\n\n",
        e.active_workflows,
        e.total_workflows,
        e.workflow_utilization_pct,
        e.workflow_diversity_index,
        e.avg_samples_per_workflow
    ));

    let c = &health.concentration;
    section.push_str(&format!(
        "### {} Concentration: {}\n\n",
        c.risk.emoji(),
        c.risk
    ));
    section.push_str(&format!(
        "Top workflow: {:.1}% of usage, top 3: {:.1}% ({} active workflows).\n\n",
        c.top_workflow_pct, c.top_3_workflows_pct, c.workflow_count
    ));
    if options.include_charts && !c.ranking.is_empty() {
        let rows: Vec<(String, f64)> = c
            .ranking
            .iter()
            .take(options.top_workflows)
            .map(|w| (w.workflow.clone(), w.count as f64))
            .collect();
        section.push_str(&bar_chart(&rows, options.chart_width));
    }

    let m = &health.maturity;
    section.push_str(&format!("### Maturity: {}\n\n", m.level));
    section.push_str(&format!(
        "- Average age of active live workflows: {} (as of {})\n- New (< 30 days): {} | Established: {}\n\n",
        m.avg_workflow_age_days
            .map(|d| format!("{:.0} days", d))
            .unwrap_or_else(|| "n/a".to_string()),
        m.as_of.format("%Y-%m-%d"),
        m.new_workflows_count,
        m.established_workflows_count
    ));

    section
}

fn generate_patterns_section(patterns: &ProcessingPatterns, options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Processing Patterns\n\n");

    if patterns.daily.is_empty() {
        section.push_str("No billable samples to analyze.\n\n");
        return section;
    }

    section.push_str("### Weekly Usage\n\n");
    section.push_str("| Day | Samples | Runs |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (i, day) in WEEKDAYS.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            day, patterns.samples_by_weekday[i], patterns.runs_by_weekday[i]
        ));
    }
    section.push('\n');

    if options.include_charts {
        section.push_str("### Samples by Hour\n\n");
        let mut hours = vec![0usize; 24];
        for dist in &patterns.by_hour {
            for (h, count) in dist.counts.iter().enumerate() {
                hours[h] += count;
            }
        }
        let rows: Vec<(String, f64)> = hours
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(h, &c)| (format!("{:02}:00", h), c as f64))
            .collect();
        section.push_str(&bar_chart(&rows, options.chart_width));
    }

    section.push_str("### Daily Usage\n\n");
    section.push_str(&format!(
        "{} active days, {} to {}.",
        patterns.daily.len(),
        patterns.daily[0].date,
        patterns.daily[patterns.daily.len() - 1].date
    ));
    if let Some(line) = patterns.daily_trend {
        section.push_str(&format!(" Trend: {:+.3} samples/day.", line.slope_per_day));
    }
    section.push_str("\n\n");
    if options.include_charts {
        let values: Vec<f64> = patterns.daily.iter().map(|d| d.count as f64).collect();
        section.push_str(&format!("`{}`\n\n", sparkline(&values)));
    }

    if !patterns.run_durations.is_empty() {
        let runs: usize = patterns.run_durations.iter().map(|d| d.runs).sum();
        let weighted: f64 = patterns
            .run_durations
            .iter()
            .map(|d| d.mean_hours * d.runs as f64)
            .sum();
        section.push_str("### Run Durations\n\n");
        section.push_str(&format!(
            "{} live runs with start and stop times, mean {:.1} h over {} days.\n\n",
            runs,
            weighted / runs as f64,
            patterns.run_durations.len()
        ));
        if options.include_charts {
            let values: Vec<f64> = patterns.run_durations.iter().map(|d| d.median_hours).collect();
            section.push_str(&format!("Daily median: `{}`\n\n", sparkline(&values)));
        }
    }

    if !patterns.workflows_created.is_empty() {
        let total: usize = patterns.workflows_created.iter().map(|d| d.count).sum();
        section.push_str("### Workflow Creation\n\n");
        section.push_str(&format!(
            "{} live workflows created on {} days, most recently {}.\n\n",
            total,
            patterns.workflows_created.len(),
            patterns.workflows_created[patterns.workflows_created.len() - 1].date
        ));
    }

    section
}

/// Generate the recommendations section.
fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");

    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by qcbill v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}
