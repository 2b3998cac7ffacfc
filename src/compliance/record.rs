use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::areas::ComplianceArea;
use super::audits::AuditSchedule;
use super::domain::{ComplianceCategory, ComplianceError, PlacementId, RecordId, Severity, StudentId};
use super::engine::{ComplianceAssessment, ComplianceStatus, RiskLevel};
use super::issues::{ImpactLevel, IssueDraft, IssueSource, IssueTracker, IssueType};
use super::logbook::{Logbook, LogbookEntryType, Submission};
use super::policy::CompliancePolicy;
use super::repository::{ComplianceEvent, EventKind};

/// Unit counts toward the qualification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentProgress {
    pub total_units: u32,
    pub completed_units: u32,
    pub in_progress_units: u32,
}

impl AssessmentProgress {
    pub fn completion_percentage(&self) -> f32 {
        if self.total_units == 0 {
            return 0.0;
        }
        (self.completed_units.min(self.total_units) as f32 / self.total_units as f32 * 100.0)
            .round()
    }
}

/// Aggregate root: one per student and placement, retained after the placement ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentComplianceRecord {
    pub id: RecordId,
    pub student_id: StudentId,
    pub placement_id: PlacementId,
    /// Version of the persisted state this copy was loaded from.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub areas: Vec<ComplianceArea>,
    #[serde(default)]
    pub issues: IssueTracker,
    #[serde(default)]
    pub audits: AuditSchedule,
    #[serde(default)]
    pub logbook: Logbook,
    #[serde(default)]
    pub assessment_progress: AssessmentProgress,
    pub overall_score: f32,
    pub compliance_status: ComplianceStatus,
    pub risk_level: RiskLevel,
    pub escalation_required: bool,
    /// Manual review flag; overrides the derived status while set.
    #[serde(default)]
    pub under_review: bool,
    #[serde(default)]
    pub next_review_date: Option<DateTime<Utc>>,
}

impl StudentComplianceRecord {
    /// Enroll a student on a placement with the areas their program tracks.
    pub fn enroll(
        student_id: StudentId,
        placement_id: PlacementId,
        areas: Vec<ComplianceArea>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(format!("{student_id}:{placement_id}")),
            student_id,
            placement_id,
            version: 0,
            created_at: at,
            updated_at: at,
            areas,
            issues: IssueTracker::default(),
            audits: AuditSchedule::default(),
            logbook: Logbook::default(),
            assessment_progress: AssessmentProgress::default(),
            overall_score: 0.0,
            compliance_status: ComplianceStatus::Compliant,
            risk_level: RiskLevel::Low,
            escalation_required: false,
            under_review: false,
            next_review_date: None,
        }
    }

    pub fn area(&self, category: ComplianceCategory) -> Result<&ComplianceArea, ComplianceError> {
        self.areas
            .iter()
            .find(|area| area.category == category)
            .ok_or_else(|| ComplianceError::not_found("area", category.key()))
    }

    pub fn area_mut(
        &mut self,
        category: ComplianceCategory,
    ) -> Result<&mut ComplianceArea, ComplianceError> {
        self.areas
            .iter_mut()
            .find(|area| area.category == category)
            .ok_or_else(|| ComplianceError::not_found("area", category.key()))
    }

    /// Put the record under manual review. Returns `false` when it already was.
    pub fn begin_manual_review(&mut self, next_review_date: Option<DateTime<Utc>>) -> bool {
        if next_review_date.is_some() {
            self.next_review_date = next_review_date;
        }
        !std::mem::replace(&mut self.under_review, true)
    }

    pub fn end_manual_review(&mut self) -> bool {
        std::mem::replace(&mut self.under_review, false)
    }

    /// Replace unit counts, clamping them so completed plus in-progress never exceeds the total.
    pub fn update_progress(&mut self, progress: AssessmentProgress) {
        let completed = progress.completed_units.min(progress.total_units);
        self.assessment_progress = AssessmentProgress {
            total_units: progress.total_units,
            completed_units: completed,
            in_progress_units: progress
                .in_progress_units
                .min(progress.total_units - completed),
        };
    }

    /// Refresh area caches and copy the engine's verdict onto the record.
    pub fn apply_assessment(&mut self, assessment: &ComplianceAssessment, threshold: f32) {
        for area in &mut self.areas {
            area.refresh(threshold);
        }
        self.overall_score = assessment.overall_score;
        self.risk_level = assessment.risk_level;
        self.compliance_status = assessment.compliance_status;
        self.escalation_required = assessment.escalation_required;
    }

    /// Whether the stored verdict differs from a fresh assessment.
    pub fn verdict_differs(&self, assessment: &ComplianceAssessment) -> bool {
        self.overall_score != assessment.overall_score
            || self.risk_level != assessment.risk_level
            || self.compliance_status != assessment.compliance_status
            || self.escalation_required != assessment.escalation_required
    }

    /// Clock-driven rules: issue auto-escalation, audit readiness, and overdue audits.
    ///
    /// Only state that actually changed produces an event, so running the rules
    /// repeatedly at the same instant is a no-op.
    pub fn apply_time_rules(
        &mut self,
        now: DateTime<Utc>,
        policy: &CompliancePolicy,
    ) -> Vec<ComplianceEvent> {
        let mut events = Vec::new();

        for issue_id in self.issues.escalate_overdue(now, policy.escalation_grace()) {
            tracing::info!(record = %self.id, issue = %issue_id, "issue auto-escalated");
            events.push(
                ComplianceEvent::new(EventKind::IssueEscalated, self.id.clone(), issue_id.as_str())
                    .detail("reason", "overdue"),
            );
        }

        let window = policy.readiness_window();
        for warning in self.audits.readiness_warnings(now, window) {
            let draft = IssueDraft::new(
                IssueType::Minor,
                ComplianceCategory::Competency,
                format!(
                    "audit {} is {:.0}% prepared with {} hours to go",
                    warning.audit_id,
                    warning.readiness * 100.0,
                    warning.hours_until
                ),
                ImpactLevel::Medium,
                now + policy.issue_due().min(window),
            )
            .from_source(IssueSource::AuditReadiness {
                audit: warning.audit_id.clone(),
            });

            if let Some(issue_id) = self.issues.raise_once(draft, now) {
                events.push(
                    ComplianceEvent::new(
                        EventKind::AuditReadinessWarning,
                        self.id.clone(),
                        warning.audit_id.as_str(),
                    )
                    .detail("issue", issue_id.as_str())
                    .detail("readiness", format!("{:.3}", warning.readiness))
                    .detail("at_risk", warning.at_risk.to_string()),
                );
            }
        }

        let overdue: Vec<_> = self
            .audits
            .overdue(now)
            .map(|audit| (audit.id.clone(), audit.scheduled_at))
            .collect();
        for (audit_id, scheduled_at) in overdue {
            let draft = IssueDraft::new(
                IssueType::Minor,
                ComplianceCategory::Competency,
                format!("audit {audit_id} scheduled for {scheduled_at} has not been completed"),
                ImpactLevel::Medium,
                now + policy.issue_due(),
            )
            .from_source(IssueSource::AuditOverdue {
                audit: audit_id.clone(),
            });

            if let Some(issue_id) = self.issues.raise_once(draft, now) {
                events.push(
                    ComplianceEvent::new(
                        EventKind::AuditReadinessWarning,
                        self.id.clone(),
                        audit_id.as_str(),
                    )
                    .detail("issue", issue_id.as_str())
                    .detail("reason", "overdue"),
                );
            }
        }

        events
    }

    /// Feed a logbook submission's flags into the issue tracker.
    pub fn absorb_submission(
        &mut self,
        submission: &Submission,
        now: DateTime<Utc>,
        policy: &CompliancePolicy,
    ) -> Vec<ComplianceEvent> {
        if submission.flags.is_empty() {
            return Vec::new();
        }

        let category = self
            .logbook
            .get(&submission.entry_id)
            .map(|entry| category_for(entry.entry_type))
            .unwrap_or(ComplianceCategory::Documentation);

        let mut raised = Vec::new();
        for flag in &submission.flags {
            let issue_type = match flag.severity {
                Severity::Critical => IssueType::Critical,
                Severity::High => IssueType::Major,
                Severity::Low | Severity::Medium => continue,
            };
            let impact = if issue_type == IssueType::Critical {
                ImpactLevel::High
            } else {
                ImpactLevel::Medium
            };
            let draft = IssueDraft::new(
                issue_type,
                category,
                format!("{}: {}", flag.flag_type.label(), flag.description),
                impact,
                now + policy.issue_due(),
            )
            .from_source(IssueSource::LogbookFlag {
                entry: submission.entry_id.clone(),
                flag: flag.id.clone(),
            });
            if let Some(issue_id) = self.issues.raise_once(draft, now) {
                raised.push(issue_id.to_string());
            }
        }

        let flag_types = submission
            .flags
            .iter()
            .map(|flag| flag.flag_type.label())
            .collect::<Vec<_>>()
            .join(", ");
        let mut event = ComplianceEvent::new(
            EventKind::LogbookFlagged,
            self.id.clone(),
            submission.entry_id.as_str(),
        )
        .detail("flags", flag_types)
        .detail("quality_score", submission.quality_score.to_string());
        if !raised.is_empty() {
            event = event.detail("issues", raised.join(", "));
        }
        vec![event]
    }
}

fn category_for(entry_type: LogbookEntryType) -> ComplianceCategory {
    match entry_type {
        LogbookEntryType::IncidentReport => ComplianceCategory::WorkplaceSafety,
        LogbookEntryType::CompetencyObservation
        | LogbookEntryType::AssessmentEvidence
        | LogbookEntryType::SkillPractice => ComplianceCategory::Competency,
        LogbookEntryType::DailyActivity | LogbookEntryType::Reflection => {
            ComplianceCategory::Documentation
        }
    }
}
