//! qcbill - QC billing reconciliation and customer health analysis
//!
//! A CLI tool that reads a QC workbook (QC Checks, Workflows, Runs),
//! reconciles billable samples against the contracted sample types and
//! scores the customer's usage trend for churn risk.
//!
//! Exit codes:
//!   0 - Success (churn risk below --fail-on-risk, or no --fail-on-risk set)
//!   1 - Runtime error (unreadable workbook, missing sheet/column, config, I/O)
//!   2 - Churn risk at or above the --fail-on-risk level

mod analysis;
mod cli;
mod config;
mod loader;
mod models;
mod report;

use analysis::health::{CustomerHealth, HealthStatus, OperationalStatus};
use analysis::{BillingSummary, SensitivityReport};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, Thresholds, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Dataset, QcPolicy, Report, ReportMetadata, RiskLevel};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("qcbill v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_analysis(args) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .qcbill.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize sheet names, contracted types, thresholds and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete analysis. Returns exit code (0 or 2).
fn run_analysis(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let input = args
        .input
        .clone()
        .context("An input workbook is required (--input)")?;
    let as_of = args
        .as_of_timestamp()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_else(|| Utc::now().naive_utc());

    // Step 1: Load the workbook
    println!("📥 Loading workbook: {}", input.display());
    let dataset = load_dataset(&input, &config, args.quiet)?;

    if args.dry_run {
        return handle_dry_run(&dataset);
    }

    // Step 2: Merge and classify
    println!("\n🔬 Analyzing samples...");
    let merged = analysis::merge(&dataset);
    let overview = analysis::overview(&dataset, &merged);

    let policy = config.billing.qc_policy;
    let billable = analysis::billable_samples(&merged.samples, policy);
    let conservative = analysis::billable_samples(&merged.samples, QcPolicy::ExcludeMissing);
    let usage = analysis::usage_samples(&merged.samples);
    let live_runs = analysis::live_runs(&dataset);
    let live_workflows = analysis::live_workflows(&dataset);

    info!(
        "{} merged samples, {} billable ({}), {} usage",
        merged.samples.len(),
        billable.len(),
        policy,
        usage.len()
    );

    // Step 3: Aggregate
    let billing = analysis::summarize_billing(
        &billable,
        policy,
        &config.billing,
        config.report.top_workflows,
    );
    let sensitivity = analysis::sensitivity(&merged.samples);
    let investigation = analysis::investigate(&conservative, &live_workflows, &config.billing);
    let patterns = analysis::processing_patterns(&billable, &live_runs, &live_workflows);
    let health = analysis::assess(
        &usage,
        &live_runs,
        &live_workflows,
        &config.thresholds,
        as_of,
    );

    let recommendations =
        build_recommendations(&billing, &sensitivity, &health, &config.thresholds);

    // Step 4: Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let metadata = ReportMetadata {
        input_file: input.display().to_string(),
        analysis_date: Utc::now(),
        qc_policy: policy,
        contracted_types: config.billing.contracted_types.clone(),
        duration_seconds: duration,
    };

    let report = Report {
        metadata,
        overview,
        billing,
        sensitivity,
        investigation,
        patterns,
        health,
        recommendations,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };

    let mut output_path = PathBuf::from(&config.general.output);
    if args.output.is_none() && args.format == OutputFormat::Json {
        output_path.set_extension("json");
    }
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&report);
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on-risk threshold
    if let Some(fail_level) = args.fail_on_risk {
        let risk = report.health.churn_risk.risk_level;
        if risk >= fail_level {
            eprintln!(
                "\n⛔ Churn risk is {} (threshold {}). Failing (exit code 2).",
                risk, fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Load the workbook with a spinner on the terminal.
fn load_dataset(input: &Path, config: &Config, quiet: bool) -> Result<Dataset> {
    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Reading sheets...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let result = loader::load_workbook(input, &config.input)
        .with_context(|| format!("Failed to load workbook {}", input.display()));

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let dataset = result?;
    info!(
        "Loaded {} QC checks, {} workflows, {} runs",
        dataset.checks.len(),
        dataset.workflows.len(),
        dataset.runs.len()
    );
    Ok(dataset)
}

/// Handle --dry-run: print what was loaded and exit.
fn handle_dry_run(dataset: &Dataset) -> Result<i32> {
    println!("\n🔍 Dry run: workbook loaded and validated.\n");
    println!("   QC Checks: {} rows", dataset.checks.len());
    println!("   Workflows: {} rows", dataset.workflows.len());
    println!("   Runs:      {} rows", dataset.runs.len());
    println!("\n✅ Dry run complete. No report was written.");
    Ok(0)
}

/// Print the console summary.
fn print_summary(report: &Report) {
    let billing = &report.billing;
    let health = &report.health;
    let card = &health.scorecard;

    println!("\n📊 Analysis Summary:");
    println!(
        "   Billable samples ({}): {} | contracted {} | non-contracted {}",
        billing.policy, billing.total_billable, billing.contracted, billing.non_contracted
    );
    if let Some(pct) = billing.overbilling_pct {
        println!("   Overbilling: {:.1}%", pct);
    }
    println!(
        "   Missing-QC sensitivity: +{} samples ({:.1}%)",
        report.sensitivity.difference, report.sensitivity.pct_impact
    );
    println!(
        "   {} Health: {}/100 ({}) | {} Churn risk: {}",
        card.status.emoji(),
        card.health_score,
        card.status,
        health.churn_risk.risk_level.emoji(),
        health.churn_risk.risk_level
    );
}

/// Follow-up actions derived from the findings.
fn build_recommendations(
    billing: &BillingSummary,
    sensitivity: &SensitivityReport,
    health: &CustomerHealth,
    thresholds: &Thresholds,
) -> Vec<String> {
    let mut recs = Vec::new();

    if billing.non_contracted > 0 {
        let workflows: Vec<&str> = billing
            .top_non_contracted_workflows
            .iter()
            .take(3)
            .map(|w| w.workflow.as_str())
            .collect();
        recs.push(format!(
            "Review {} billable samples outside the contracted types before invoicing; most come from {}.",
            billing.non_contracted,
            workflows.join(", ")
        ));
    }

    if sensitivity.difference > 0 {
        recs.push(format!(
            "Resolve the QC status of {} samples with a missing QC result; they change the billable total by {:.1}%.",
            sensitivity.difference, sensitivity.pct_impact
        ));
    }

    match health.churn_risk.risk_level {
        RiskLevel::High => recs.push(format!(
            "Churn risk is high ({} consecutive monthly declines); schedule an account review.",
            health.churn_risk.consecutive_monthly_declines
        )),
        RiskLevel::Medium => recs.push(
            "Usage is softening; check in with the customer about upcoming sample volumes."
                .to_string(),
        ),
        RiskLevel::Low => {}
    }

    match health.operational_health.status {
        OperationalStatus::Critical | OperationalStatus::Warning => {
            if let Some(rate) = health.operational_health.latest_success_rate {
                recs.push(format!(
                    "Run success rate is {:.1}% (target {:.0}%); investigate failed and canceled runs.",
                    rate, thresholds.success_target_pct
                ));
            }
        }
        OperationalStatus::Healthy | OperationalStatus::Unknown => {}
    }

    if health.concentration.risk == RiskLevel::High {
        recs.push(format!(
            "Usage is concentrated: the top workflow carries {:.1}% of samples.",
            health.concentration.top_workflow_pct
        ));
    }

    if recs.is_empty() && health.scorecard.status == HealthStatus::Healthy {
        recs.push("No billing discrepancies or health concerns found.".to_string());
    }

    recs
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
