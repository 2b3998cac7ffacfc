//! Read-only derived statistics over a record, with display labels and resolved names.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::areas::AreaStatus;
use super::audits::{AuditScheduleItem, AuditStatus, AuditType};
use super::domain::{AuditId, ComplianceCategory, IssueId, PlacementId, RecordId, StudentId, UserId};
use super::engine::{ComplianceEngine, ComplianceStatus, RiskLevel};
use super::issues::{ComplianceIssue, ImpactLevel, IssueStatus, IssueType};
use super::logbook::VerificationStatus;
use super::policy::CompliancePolicy;
use super::record::StudentComplianceRecord;
use super::repository::IdentityDirectory;
use super::requirements::RequirementStatus;

#[derive(Debug, Clone, Serialize)]
pub struct AreaView {
    pub category: ComplianceCategory,
    pub category_label: &'static str,
    pub status: AreaStatus,
    pub status_label: &'static str,
    pub score: f32,
    pub max_score: f32,
    pub percentage: f32,
    pub requirements_met: usize,
    pub requirements_total: usize,
    pub overdue_requirements: usize,
    pub open_flags: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueCountEntry {
    pub status: IssueStatus,
    pub status_label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueView {
    pub id: IssueId,
    pub issue_type: IssueType,
    pub type_label: &'static str,
    pub category_label: &'static str,
    pub status_label: &'static str,
    pub impact: ImpactLevel,
    pub impact_label: &'static str,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub overdue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub name: String,
    pub role_label: &'static str,
    pub confirmation_label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    pub id: AuditId,
    pub audit_type: AuditType,
    pub type_label: &'static str,
    pub status: AuditStatus,
    pub status_label: &'static str,
    pub scheduled_at: DateTime<Utc>,
    pub hours_until: i64,
    pub readiness_pct: f32,
    pub at_risk: bool,
    pub overdue: bool,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogbookStats {
    pub total: usize,
    pub pending: usize,
    pub verified: usize,
    pub requires_clarification: usize,
    pub rejected: usize,
    pub superseded: usize,
    pub countable: usize,
    pub open_flags: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_quality: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub total_units: u32,
    pub completed_units: u32,
    pub in_progress_units: u32,
    pub completion_pct: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub record_id: RecordId,
    pub student_id: StudentId,
    pub placement_id: PlacementId,
    pub generated_at: DateTime<Utc>,
    pub version: u64,
    pub overall_score: f32,
    pub risk_level: RiskLevel,
    pub risk_label: &'static str,
    pub compliance_status: ComplianceStatus,
    pub status_label: &'static str,
    pub escalation_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_review_date: Option<DateTime<Utc>>,
    pub progress: ProgressView,
    pub areas: Vec<AreaView>,
    pub issue_counts: Vec<IssueCountEntry>,
    pub active_issues: Vec<IssueView>,
    pub audits: Vec<AuditView>,
    pub logbook: LogbookStats,
}

impl ComplianceReport {
    /// Build a report as of `now`. The record is not modified; time rules are not applied.
    pub fn build(
        record: &StudentComplianceRecord,
        now: DateTime<Utc>,
        policy: &CompliancePolicy,
        directory: &dyn IdentityDirectory,
    ) -> Self {
        let assessment = ComplianceEngine::new(policy.clone()).recompute(record);
        let window = policy.readiness_window();

        let areas = record
            .areas
            .iter()
            .zip(&assessment.areas)
            .map(|(area, summary)| AreaView {
                category: area.category,
                category_label: area.category.label(),
                status: summary.status,
                status_label: summary.status.label(),
                score: summary.score,
                max_score: summary.max_score,
                percentage: summary.percentage,
                requirements_met: area
                    .requirements()
                    .iter()
                    .filter(|requirement| requirement.status == RequirementStatus::Met)
                    .count(),
                requirements_total: area.requirements().len(),
                overdue_requirements: area
                    .requirements()
                    .iter()
                    .filter(|requirement| requirement.is_overdue(now))
                    .count(),
                open_flags: area.active_flags().count(),
            })
            .collect();

        let issue_counts = [
            IssueStatus::Open,
            IssueStatus::InProgress,
            IssueStatus::Escalated,
            IssueStatus::Resolved,
        ]
        .into_iter()
        .map(|status| IssueCountEntry {
            status,
            status_label: status.label(),
            count: record
                .issues
                .issues()
                .iter()
                .filter(|issue| issue.status == status)
                .count(),
        })
        .collect();

        let mut active_issues: Vec<IssueView> = record
            .issues
            .active()
            .map(|issue| issue_view(issue, now, directory))
            .collect();
        active_issues.sort_by(|a, b| {
            b.issue_type
                .cmp(&a.issue_type)
                .then(a.due_date.cmp(&b.due_date))
        });

        let mut audits: Vec<AuditView> = record
            .audits
            .items()
            .iter()
            .filter(|audit| !audit.status.is_terminal())
            .map(|audit| audit_view(audit, now, window, directory))
            .collect();
        audits.sort_by_key(|audit| audit.scheduled_at);

        Self {
            record_id: record.id.clone(),
            student_id: record.student_id.clone(),
            placement_id: record.placement_id.clone(),
            generated_at: now,
            version: record.version,
            overall_score: assessment.overall_score,
            risk_level: assessment.risk_level,
            risk_label: assessment.risk_level.label(),
            compliance_status: assessment.compliance_status,
            status_label: assessment.compliance_status.label(),
            escalation_required: assessment.escalation_required,
            next_review_date: record.next_review_date,
            progress: ProgressView {
                total_units: record.assessment_progress.total_units,
                completed_units: record.assessment_progress.completed_units,
                in_progress_units: record.assessment_progress.in_progress_units,
                completion_pct: record.assessment_progress.completion_percentage(),
            },
            areas,
            issue_counts,
            active_issues,
            audits,
            logbook: logbook_stats(record),
        }
    }
}

fn display_name(directory: &dyn IdentityDirectory, user: &UserId) -> String {
    directory
        .display_name(user)
        .unwrap_or_else(|| user.to_string())
}

fn issue_view(
    issue: &ComplianceIssue,
    now: DateTime<Utc>,
    directory: &dyn IdentityDirectory,
) -> IssueView {
    IssueView {
        id: issue.id.clone(),
        issue_type: issue.issue_type,
        type_label: issue.issue_type.label(),
        category_label: issue.category.label(),
        status_label: issue.status.label(),
        impact: issue.impact_level,
        impact_label: issue.impact_level.label(),
        description: issue.description.clone(),
        due_date: issue.due_date,
        overdue: issue.is_overdue(now),
        assignee: issue
            .assigned_to
            .as_ref()
            .map(|user| display_name(directory, user)),
    }
}

fn audit_view(
    audit: &AuditScheduleItem,
    now: DateTime<Utc>,
    window: chrono::Duration,
    directory: &dyn IdentityDirectory,
) -> AuditView {
    let readiness = audit.readiness_view(now, window);
    AuditView {
        id: audit.id.clone(),
        audit_type: audit.audit_type,
        type_label: audit.audit_type.label(),
        status: audit.status,
        status_label: audit.status.label(),
        scheduled_at: audit.scheduled_at,
        hours_until: readiness.hours_until,
        readiness_pct: (readiness.readiness * 100.0).round(),
        at_risk: readiness.at_risk,
        overdue: readiness.overdue,
        participants: audit
            .participants
            .iter()
            .map(|participant| ParticipantView {
                name: display_name(directory, &participant.user_id),
                role_label: participant.role.label(),
                confirmation_label: participant.confirmation.label(),
            })
            .collect(),
    }
}

fn logbook_stats(record: &StudentComplianceRecord) -> LogbookStats {
    let entries = record.logbook.entries();
    let mut stats = LogbookStats {
        total: entries.len(),
        ..LogbookStats::default()
    };

    for entry in entries {
        match entry.verification_status {
            VerificationStatus::Pending => stats.pending += 1,
            VerificationStatus::Verified => stats.verified += 1,
            VerificationStatus::RequiresClarification => stats.requires_clarification += 1,
            VerificationStatus::Rejected => stats.rejected += 1,
        }
        if entry.superseded_by.is_some() {
            stats.superseded += 1;
        }
        stats.open_flags += entry.active_flags().count();
    }

    let countable: Vec<u8> = record
        .logbook
        .countable_evidence()
        .map(|entry| entry.quality_score)
        .collect();
    stats.countable = countable.len();
    if !countable.is_empty() {
        let sum: u32 = countable.iter().map(|score| u32::from(*score)).sum();
        stats.average_quality = Some((sum as f32 / countable.len() as f32 * 10.0).round() / 10.0);
    }
    stats
}
