use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use placement_compliance::compliance::{
    ComplianceReport, ComplianceRepository, ComplianceService, FixedClock,
    InMemoryComplianceRepository, RecordId, StaticDirectory, StudentComplianceRecord,
    TracingNotifier,
};
use placement_compliance::config::AppConfig;
use placement_compliance::error::AppError;
use placement_compliance::telemetry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "placement-compliance",
    about = "Inspect and maintain student placement compliance records",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the compliance report for a stored record
    Report(ReportArgs),
    /// Apply escalation and audit readiness rules to a batch of records
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Path to a record serialized as JSON
    record: PathBuf,
    /// Evaluation instant (RFC 3339, defaults to now)
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Record files to sweep
    #[arg(required = true)]
    records: Vec<PathBuf>,
    /// Evaluation instant (RFC 3339, defaults to now)
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
    /// Write updated records back to their files
    #[arg(long)]
    write: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Report(args) => run_report(&config, args),
        Command::Sweep(args) => run_sweep(&config, args).await,
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as RFC 3339 ({err})"))
}

fn read_record(path: &Path) -> Result<StudentComplianceRecord, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn run_report(config: &AppConfig, args: ReportArgs) -> Result<(), AppError> {
    let record = read_record(&args.record)?;
    let now = args.now.unwrap_or_else(Utc::now);
    let report = ComplianceReport::build(&record, now, &config.policy, &StaticDirectory::default());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(&report);
    }
    Ok(())
}

async fn run_sweep(config: &AppConfig, args: SweepArgs) -> Result<(), AppError> {
    let now = args.now.unwrap_or_else(Utc::now);
    let repository = Arc::new(InMemoryComplianceRepository::default());
    let mut paths: BTreeMap<RecordId, PathBuf> = BTreeMap::new();

    for path in args.records {
        let record = read_record(&path)?;
        if paths.contains_key(&record.id) {
            return Err(AppError::InvalidArgument(format!(
                "record {} appears in more than one file",
                record.id
            )));
        }
        repository
            .save(&record, 0)
            .map_err(|err| AppError::Service(err.into()))?;
        paths.insert(record.id.clone(), path);
    }

    let service = Arc::new(ComplianceService::new(
        repository.clone(),
        Arc::new(TracingNotifier),
        Arc::new(FixedClock(now)),
        config.policy.clone(),
    ));
    let report = service.sweep(paths.keys().cloned().collect()).await;

    info!(
        updated = report.updated.len(),
        unchanged = report.unchanged.len(),
        failed = report.failed.len(),
        "sweep finished"
    );
    println!("Sweep at {now}");
    println!("- updated: {}", join_ids(&report.updated));
    println!("- unchanged: {}", join_ids(&report.unchanged));
    if !report.conflicted.is_empty() {
        println!("- conflicted: {}", join_ids(&report.conflicted));
    }
    if !report.failed.is_empty() {
        println!("- failed: {}", join_ids(&report.failed));
    }

    if args.write {
        for record_id in &report.updated {
            let Some(path) = paths.get(record_id) else {
                continue;
            };
            let record = repository
                .load(record_id)
                .map_err(|err| AppError::Service(err.into()))?;
            std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
        }
    }

    Ok(())
}

fn join_ids(ids: &[RecordId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(RecordId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_report(report: &ComplianceReport) {
    println!("Compliance report for {}", report.record_id);
    println!(
        "Student {} on placement {} (evaluated {})",
        report.student_id, report.placement_id, report.generated_at
    );
    println!(
        "Overall {:.2}% | risk {} | status {}{}",
        report.overall_score,
        report.risk_label,
        report.status_label,
        if report.escalation_required {
            " | escalation required"
        } else {
            ""
        }
    );
    println!(
        "Units: {}/{} completed, {} in progress ({}%)",
        report.progress.completed_units,
        report.progress.total_units,
        report.progress.in_progress_units,
        report.progress.completion_pct
    );

    println!("\nAreas");
    for area in &report.areas {
        println!(
            "- {}: {} ({:.2}%), {}/{} requirements met, {} open flags{}",
            area.category_label,
            area.status_label,
            area.percentage,
            area.requirements_met,
            area.requirements_total,
            area.open_flags,
            if area.overdue_requirements > 0 {
                format!(", {} overdue", area.overdue_requirements)
            } else {
                String::new()
            }
        );
    }

    println!("\nIssues");
    for entry in &report.issue_counts {
        println!("- {}: {}", entry.status_label, entry.count);
    }
    for issue in &report.active_issues {
        let assignee = issue
            .assignee
            .as_deref()
            .map(|name| format!(", assigned to {name}"))
            .unwrap_or_default();
        println!(
            "  * [{}] {} ({}), {}, due {}{}{}",
            issue.type_label,
            issue.description,
            issue.category_label,
            issue.status_label,
            issue.due_date,
            if issue.overdue { " OVERDUE" } else { "" },
            assignee
        );
    }

    if report.audits.is_empty() {
        println!("\nUpcoming audits: none");
    } else {
        println!("\nUpcoming audits");
        for audit in &report.audits {
            println!(
                "- {} {} on {} ({}), {}% prepared{}{}",
                audit.id,
                audit.type_label,
                audit.scheduled_at,
                audit.status_label,
                audit.readiness_pct,
                if audit.at_risk { ", at risk" } else { "" },
                if audit.overdue { ", overdue" } else { "" }
            );
        }
    }

    let logbook = &report.logbook;
    println!(
        "\nLogbook: {} entries, {} verified, {} pending, {} awaiting clarification, {} rejected",
        logbook.total,
        logbook.verified,
        logbook.pending,
        logbook.requires_clarification,
        logbook.rejected
    );
    if let Some(average) = logbook.average_quality {
        println!("Average quality of countable entries: {average}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_instant_accepts_offsets() {
        let instant = parse_instant("2025-03-01T10:00:00+10:00").expect("valid instant");
        assert_eq!(instant.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn cli_parses_sweep_arguments() {
        let cli = Cli::try_parse_from([
            "placement-compliance",
            "sweep",
            "a.json",
            "b.json",
            "--now",
            "2025-03-01T00:00:00Z",
            "--write",
        ])
        .expect("cli parses");
        match cli.command {
            Command::Sweep(args) => {
                assert_eq!(args.records.len(), 2);
                assert!(args.write);
                assert!(args.now.is_some());
            }
            other => panic!("expected sweep, got {other:?}"),
        }
    }
}
