use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;

use super::areas::ComplianceArea;
use super::audits::{AuditDraft, ConfirmationStatus, PreparationStatus};
use super::domain::{
    AuditId, ComplianceCategory, ComplianceError, EntryId, EvidenceRef, FlagId, IssueId, ItemId,
    PlacementId, RecordId, RequirementId, Severity, StudentId, UserId,
};
use super::engine::{ComplianceAssessment, ComplianceEngine};
use super::flags::{FlagStatus, FlagType};
use super::issues::{IssueDraft, IssueStatus};
use super::logbook::{LogbookDraft, Submission};
use super::policy::CompliancePolicy;
use super::record::{AssessmentProgress, StudentComplianceRecord};
use super::repository::{
    Clock, ComplianceEvent, ComplianceRepository, EventKind, NotificationDispatcher,
    RepositoryError,
};
use super::requirements::RequirementStatus;

/// Service composing the repository, notifier, clock, and aggregate engine.
///
/// Every mutation runs the same pipeline: load, apply the change, apply the
/// clock-driven rules, recompute, save against the loaded version, then
/// dispatch whatever events the change produced.
pub struct ComplianceService<R, N, C> {
    repository: Arc<R>,
    notifier: Arc<N>,
    clock: Arc<C>,
    engine: Arc<ComplianceEngine>,
}

impl<R, N, C> ComplianceService<R, N, C>
where
    R: ComplianceRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, clock: Arc<C>, policy: CompliancePolicy) -> Self {
        Self {
            repository,
            notifier,
            clock,
            engine: Arc::new(ComplianceEngine::new(policy)),
        }
    }

    pub fn policy(&self) -> &CompliancePolicy {
        self.engine.policy()
    }

    /// Create and store a record for a student starting a placement.
    pub fn enroll(
        &self,
        student_id: StudentId,
        placement_id: PlacementId,
        areas: Vec<ComplianceArea>,
    ) -> Result<StudentComplianceRecord, ComplianceServiceError> {
        let now = self.clock.now();
        let mut record = StudentComplianceRecord::enroll(student_id, placement_id, areas, now);
        let assessment = self.engine.recompute(&record);
        self.store(&mut record, 0, now, &assessment)?;
        tracing::info!(record = %record.id, areas = record.areas.len(), "student enrolled");
        Ok(record)
    }

    pub fn load(&self, record_id: &RecordId) -> Result<StudentComplianceRecord, ComplianceServiceError> {
        Ok(self.repository.load(record_id)?)
    }

    /// Fresh assessment of the stored record. Reads only; no time rules run.
    pub fn assessment(
        &self,
        record_id: &RecordId,
    ) -> Result<ComplianceAssessment, ComplianceServiceError> {
        let record = self.repository.load(record_id)?;
        Ok(self.engine.recompute(&record))
    }

    pub fn record_evidence(
        &self,
        record_id: &RecordId,
        category: ComplianceCategory,
        requirement_id: &RequirementId,
        evidence: EvidenceRef,
        actor: UserId,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record
                .area_mut(category)?
                .record_evidence(requirement_id, evidence, Some(actor), now)
        })
    }

    pub fn set_requirement_status(
        &self,
        record_id: &RecordId,
        category: ComplianceCategory,
        requirement_id: &RequirementId,
        status: RequirementStatus,
        verifier: UserId,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record
                .area_mut(category)?
                .set_requirement_status(requirement_id, status, verifier, now)
        })
    }

    pub fn raise_area_flag(
        &self,
        record_id: &RecordId,
        category: ComplianceCategory,
        flag_type: FlagType,
        severity: Severity,
        description: &str,
    ) -> Result<FlagId, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            Ok(record
                .area_mut(category)?
                .raise_flag(flag_type, severity, description, now))
        })
    }

    pub fn set_area_flag_status(
        &self,
        record_id: &RecordId,
        category: ComplianceCategory,
        flag_id: &FlagId,
        status: FlagStatus,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.area_mut(category)?.set_flag_status(flag_id, status, now)
        })
    }

    pub fn raise_issue(
        &self,
        record_id: &RecordId,
        draft: IssueDraft,
    ) -> Result<IssueId, ComplianceServiceError> {
        let issue_id = self.mutate(record_id, |record, _, now, _| Ok(record.issues.raise(draft, now)))?;
        tracing::info!(record = %record_id, issue = %issue_id, "issue raised");
        Ok(issue_id)
    }

    /// Move an issue along its lifecycle. Manual escalation notifies like automatic escalation.
    pub fn transition_issue(
        &self,
        record_id: &RecordId,
        issue_id: &IssueId,
        next: IssueStatus,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, events, now, _| {
            let changed = record
                .issues
                .transition(issue_id, next, notes, Some(actor), now)?;
            if changed && next == IssueStatus::Escalated {
                events.push(
                    ComplianceEvent::new(EventKind::IssueEscalated, record.id.clone(), issue_id.as_str())
                        .detail("reason", "manual"),
                );
            }
            Ok(changed)
        })
    }

    pub fn resolve_issue(
        &self,
        record_id: &RecordId,
        issue_id: &IssueId,
        resolution_notes: &str,
        resolver: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.issues.resolve(issue_id, resolution_notes, resolver, now)
        })
    }

    pub fn assign_issue(
        &self,
        record_id: &RecordId,
        issue_id: &IssueId,
        assignee: UserId,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.issues.assign(issue_id, assignee, now)
        })
    }

    pub fn add_preventive_measure(
        &self,
        record_id: &RecordId,
        issue_id: &IssueId,
        measure: &str,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, _, _| {
            record.issues.add_preventive_measure(issue_id, measure)
        })
    }

    pub fn schedule_audit(
        &self,
        record_id: &RecordId,
        draft: AuditDraft,
    ) -> Result<AuditId, ComplianceServiceError> {
        let audit_id = self.mutate(record_id, |record, _, now, _| Ok(record.audits.schedule(draft, now)))?;
        tracing::info!(record = %record_id, audit = %audit_id, "audit scheduled");
        Ok(audit_id)
    }

    pub fn respond_to_audit(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        participant: &UserId,
        confirmation: ConfirmationStatus,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.audits.respond(audit_id, participant, confirmation, now)
        })
    }

    pub fn confirm_audit(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        actor: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        let changed = self.mutate(record_id, |record, _, now, _| {
            record.audits.confirm(audit_id, Some(actor), now)
        })?;
        if changed {
            tracing::info!(record = %record_id, audit = %audit_id, "audit confirmed");
        }
        Ok(changed)
    }

    pub fn start_audit(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        actor: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.audits.start(audit_id, Some(actor), now)
        })
    }

    pub fn complete_audit(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        notes: &str,
        actor: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.audits.complete(audit_id, notes, Some(actor), now)
        })
    }

    pub fn cancel_audit(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        reason: &str,
        actor: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.audits.cancel(audit_id, reason, Some(actor), now)
        })
    }

    pub fn reschedule_audit(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        new_date: DateTime<Utc>,
        actor: UserId,
    ) -> Result<AuditId, ComplianceServiceError> {
        let replacement = self.mutate(record_id, |record, _, now, _| {
            record.audits.reschedule(audit_id, new_date, Some(actor), now)
        })?;
        tracing::info!(
            record = %record_id,
            audit = %audit_id,
            replacement = %replacement,
            "audit rescheduled"
        );
        Ok(replacement)
    }

    pub fn update_preparation(
        &self,
        record_id: &RecordId,
        audit_id: &AuditId,
        item_id: &ItemId,
        status: PreparationStatus,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, _, _| {
            record.audits.update_preparation(audit_id, item_id, status)
        })
    }

    pub fn submit_logbook_entry(
        &self,
        record_id: &RecordId,
        draft: LogbookDraft,
        student: UserId,
    ) -> Result<Submission, ComplianceServiceError> {
        self.mutate(record_id, |record, events, now, policy| {
            let submission = record.logbook.submit(draft, Some(student), now, policy);
            events.extend(record.absorb_submission(&submission, now, policy));
            Ok(submission)
        })
        .map(log_submission(record_id))
    }

    pub fn resubmit_logbook_entry(
        &self,
        record_id: &RecordId,
        original: &EntryId,
        draft: LogbookDraft,
        student: UserId,
    ) -> Result<Submission, ComplianceServiceError> {
        self.mutate(record_id, |record, events, now, policy| {
            let submission = record
                .logbook
                .resubmit(original, draft, Some(student), now, policy)?;
            events.extend(record.absorb_submission(&submission, now, policy));
            Ok(submission)
        })
        .map(log_submission(record_id))
    }

    pub fn verify_logbook_entry(
        &self,
        record_id: &RecordId,
        entry_id: &EntryId,
        verifier: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        let changed = self.mutate(record_id, |record, _, now, _| {
            record.logbook.verify(entry_id, verifier, now)
        })?;
        if changed {
            tracing::info!(record = %record_id, entry = %entry_id, "logbook entry verified");
        }
        Ok(changed)
    }

    pub fn request_clarification(
        &self,
        record_id: &RecordId,
        entry_id: &EntryId,
        reason: &str,
        reviewer: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record
                .logbook
                .request_clarification(entry_id, reason, reviewer, now)
        })
    }

    pub fn reject_logbook_entry(
        &self,
        record_id: &RecordId,
        entry_id: &EntryId,
        reason: &str,
        reviewer: UserId,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.logbook.reject(entry_id, reason, reviewer, now)
        })
    }

    pub fn set_logbook_flag_status(
        &self,
        record_id: &RecordId,
        entry_id: &EntryId,
        flag_id: &FlagId,
        status: FlagStatus,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, now, _| {
            record.logbook.set_flag_status(entry_id, flag_id, status, now)
        })
    }

    pub fn begin_manual_review(
        &self,
        record_id: &RecordId,
        next_review_date: Option<DateTime<Utc>>,
    ) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, _, _| {
            Ok(record.begin_manual_review(next_review_date))
        })
    }

    pub fn end_manual_review(&self, record_id: &RecordId) -> Result<bool, ComplianceServiceError> {
        self.mutate(record_id, |record, _, _, _| Ok(record.end_manual_review()))
    }

    pub fn update_assessment_progress(
        &self,
        record_id: &RecordId,
        progress: AssessmentProgress,
    ) -> Result<(), ComplianceServiceError> {
        self.mutate(record_id, |record, _, _, _| {
            record.update_progress(progress);
            Ok(())
        })
    }

    /// Apply clock-driven rules to one record. Saves only when something changed.
    pub fn refresh(&self, record_id: &RecordId) -> Result<bool, ComplianceServiceError> {
        let now = self.clock.now();
        let mut record = self.repository.load(record_id)?;
        let expected = record.version;

        let events = record.apply_time_rules(now, self.engine.policy());
        let assessment = self.engine.recompute(&record);
        if events.is_empty() && !record.verdict_differs(&assessment) {
            return Ok(false);
        }

        self.store(&mut record, expected, now, &assessment)?;
        self.dispatch(&events);
        Ok(true)
    }

    /// Refresh many records concurrently, one blocking task per distinct record.
    pub async fn sweep(self: Arc<Self>, record_ids: Vec<RecordId>) -> SweepReport {
        let distinct: BTreeSet<RecordId> = record_ids.into_iter().collect();
        let mut set = JoinSet::new();

        for record_id in distinct {
            let service = Arc::clone(&self);
            set.spawn_blocking(move || {
                let outcome = service.refresh(&record_id);
                (record_id, outcome)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((record_id, Ok(true))) => report.updated.push(record_id),
                Ok((record_id, Ok(false))) => report.unchanged.push(record_id),
                Ok((record_id, Err(error))) if error.kind() == ErrorKind::VersionConflict => {
                    tracing::warn!(record = %record_id, %error, "sweep lost a version race");
                    report.conflicted.push(record_id);
                }
                Ok((record_id, Err(error))) => {
                    tracing::warn!(record = %record_id, %error, "sweep failed for record");
                    report.failed.push(record_id);
                }
                Err(error) => tracing::warn!(%error, "sweep task failed"),
            }
        }

        report.updated.sort();
        report.unchanged.sort();
        report.conflicted.sort();
        report.failed.sort();
        report
    }

    fn mutate<T, F>(&self, record_id: &RecordId, change: F) -> Result<T, ComplianceServiceError>
    where
        F: FnOnce(
            &mut StudentComplianceRecord,
            &mut Vec<ComplianceEvent>,
            DateTime<Utc>,
            &CompliancePolicy,
        ) -> Result<T, ComplianceError>,
    {
        let now = self.clock.now();
        let policy = self.engine.policy();
        let mut record = self.repository.load(record_id)?;
        let expected = record.version;

        let mut events = Vec::new();
        let value = change(&mut record, &mut events, now, policy)?;
        events.extend(record.apply_time_rules(now, policy));

        let assessment = self.engine.recompute(&record);
        self.store(&mut record, expected, now, &assessment)?;
        self.dispatch(&events);
        Ok(value)
    }

    fn store(
        &self,
        record: &mut StudentComplianceRecord,
        expected_version: u64,
        now: DateTime<Utc>,
        assessment: &ComplianceAssessment,
    ) -> Result<(), RepositoryError> {
        record.apply_assessment(assessment, self.engine.policy().warning_threshold());
        record.version = expected_version + 1;
        record.updated_at = now;

        match self.repository.save(record, expected_version) {
            Ok(()) => {
                tracing::debug!(
                    record = %record.id,
                    version = record.version,
                    risk = record.risk_level.label(),
                    score = record.overall_score,
                    "record saved"
                );
                Ok(())
            }
            Err(error) => {
                if matches!(error, RepositoryError::VersionConflict { .. }) {
                    tracing::warn!(record = %record.id, %error, "version conflict on save");
                }
                Err(error)
            }
        }
    }

    fn dispatch(&self, events: &[ComplianceEvent]) {
        for event in events {
            if let Err(error) = self.notifier.dispatch(event) {
                tracing::warn!(
                    topic = event.kind.topic(),
                    record = %event.record_id,
                    subject = %event.subject,
                    %error,
                    "notification delivery failed"
                );
            }
        }
    }
}

fn log_submission(record_id: &RecordId) -> impl Fn(Submission) -> Submission + '_ {
    move |submission| {
        if !submission.flags.is_empty() {
            tracing::info!(
                record = %record_id,
                entry = %submission.entry_id,
                flags = submission.flags.len(),
                quality = submission.quality_score,
                "logbook entry flagged"
            );
        }
        submission
    }
}

/// Outcome of a sweep, with ids sorted within each bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub updated: Vec<RecordId>,
    pub unchanged: Vec<RecordId>,
    pub conflicted: Vec<RecordId>,
    pub failed: Vec<RecordId>,
}

/// Error raised by the compliance service.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceServiceError {
    #[error(transparent)]
    Compliance(#[from] ComplianceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Caller-facing classification of service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EvidenceMissing,
    InvalidTransition,
    UnconfirmedParticipants,
    VersionConflict,
    NotFound,
    Unavailable,
}

impl ComplianceServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compliance(ComplianceError::EvidenceMissing { .. }) => ErrorKind::EvidenceMissing,
            Self::Compliance(ComplianceError::InvalidTransition { .. }) => {
                ErrorKind::InvalidTransition
            }
            Self::Compliance(ComplianceError::UnconfirmedParticipants { .. }) => {
                ErrorKind::UnconfirmedParticipants
            }
            Self::Compliance(ComplianceError::NotFound { .. })
            | Self::Repository(RepositoryError::NotFound(_)) => ErrorKind::NotFound,
            Self::Repository(RepositoryError::VersionConflict { .. }) => ErrorKind::VersionConflict,
            Self::Repository(RepositoryError::Unavailable(_)) => ErrorKind::Unavailable,
        }
    }
}
