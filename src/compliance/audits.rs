//! Audit scheduler: assessment events, their preparation, and readiness.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    sequence_id, AuditId, ComplianceError, ItemId, TrailAction, TrailEvent, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditType {
    Routine,
    CompetencyCheck,
    ProgressReview,
    Intervention,
    FinalAssessment,
}

impl AuditType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Routine => "Routine",
            Self::CompetencyCheck => "Competency Check",
            Self::ProgressReview => "Progress Review",
            Self::Intervention => "Intervention",
            Self::FinalAssessment => "Final Assessment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl AuditStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Confirmed => "Confirmed",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Rescheduled => "Rescheduled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rescheduled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl AuditPriority {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreparationStatus {
    Pending,
    InProgress,
    Completed,
}

impl PreparationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantRole {
    Student,
    Assessor,
    Supervisor,
    Trainer,
    Coordinator,
}

impl ParticipantRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Assessor => "Assessor",
            Self::Supervisor => "Supervisor",
            Self::Trainer => "Trainer",
            Self::Coordinator => "Coordinator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Declined,
}

impl ConfirmationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Declined => "Declined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationItem {
    pub id: ItemId,
    pub description: String,
    pub assigned_to: ParticipantRole,
    pub status: PreparationStatus,
    pub due_date: DateTime<Utc>,
}

impl PreparationItem {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        assigned_to: ParticipantRole,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(id),
            description: description.into(),
            assigned_to,
            status: PreparationStatus::Pending,
            due_date,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == PreparationStatus::Completed
    }
}

/// A person taking part in an audit, referenced by directory id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParticipant {
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub confirmation: ConfirmationStatus,
}

impl AuditParticipant {
    pub fn new(user_id: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
            confirmation: ConfirmationStatus::Pending,
        }
    }
}

/// Unit of competency an audit concentrates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentFocus {
    pub unit_code: String,
    pub unit_title: String,
    #[serde(default)]
    pub elements: Vec<String>,
    #[serde(default)]
    pub assessment_methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReminder {
    pub remind_at: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditScheduleItem {
    pub id: AuditId,
    pub audit_type: AuditType,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AuditStatus,
    pub priority: AuditPriority,
    pub location: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub preparation_items: Vec<PreparationItem>,
    #[serde(default)]
    pub participants: Vec<AuditParticipant>,
    #[serde(default)]
    pub assessment_focus: Vec<AssessmentFocus>,
    #[serde(default)]
    pub reminders: Vec<AuditReminder>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub previous_audit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rescheduled_from: Option<AuditId>,
    #[serde(default)]
    pub outcome_notes: Option<String>,
    #[serde(default)]
    pub history: Vec<TrailEvent>,
}

impl AuditScheduleItem {
    /// Completed preparation items over all items; `1.0` when there is nothing to prepare.
    pub fn readiness(&self) -> f32 {
        if self.preparation_items.is_empty() {
            return 1.0;
        }
        let completed = self
            .preparation_items
            .iter()
            .filter(|item| item.is_complete())
            .count();
        completed as f32 / self.preparation_items.len() as f32
    }

    /// Not started by its scheduled time, or still running past its planned end.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AuditStatus::Scheduled | AuditStatus::Confirmed => self.scheduled_at < now,
            AuditStatus::InProgress => self.ends_at() < now,
            AuditStatus::Completed | AuditStatus::Cancelled | AuditStatus::Rescheduled => false,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let until = self.scheduled_at - now;
        until >= Duration::zero() && until <= window
    }

    /// Within the window and some incomplete preparation item is already past its due date.
    pub fn is_at_risk(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.status.is_terminal()
            && self.is_within(now, window)
            && self
                .preparation_items
                .iter()
                .any(|item| !item.is_complete() && item.due_date < now)
    }

    pub fn readiness_view(&self, now: DateTime<Utc>, window: Duration) -> AuditReadiness {
        AuditReadiness {
            audit_id: self.id.clone(),
            readiness: self.readiness(),
            at_risk: self.is_at_risk(now, window),
            overdue: self.is_overdue(now),
            hours_until: (self.scheduled_at - now).num_hours(),
        }
    }

    fn unconfirmed(&self) -> Vec<UserId> {
        self.participants
            .iter()
            .filter(|participant| participant.confirmation != ConfirmationStatus::Confirmed)
            .map(|participant| participant.user_id.clone())
            .collect()
    }

    fn move_to(
        &mut self,
        next: AuditStatus,
        actor: Option<UserId>,
        at: DateTime<Utc>,
        detail: &str,
    ) {
        let previous = self.status;
        self.status = next;
        self.history.push(
            TrailEvent::new(
                at,
                actor,
                TrailAction::StatusChanged {
                    from: previous.label().to_string(),
                    to: next.label().to_string(),
                },
            )
            .with_detail(detail),
        );
    }

    fn guard(&self, allowed: &[AuditStatus], next: AuditStatus) -> Result<(), ComplianceError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ComplianceError::invalid(
                "audit",
                &self.id,
                self.status.label(),
                next.label(),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReadiness {
    pub audit_id: AuditId,
    pub readiness: f32,
    pub at_risk: bool,
    pub overdue: bool,
    pub hours_until: i64,
}

/// Input for scheduling an audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    pub audit_type: AuditType,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub priority: AuditPriority,
    pub location: String,
    pub requirements: Vec<String>,
    pub preparation_items: Vec<PreparationItem>,
    pub participants: Vec<AuditParticipant>,
    pub assessment_focus: Vec<AssessmentFocus>,
    pub reminders: Vec<AuditReminder>,
    pub attachments: Vec<Attachment>,
}

impl AuditDraft {
    pub fn new(
        audit_type: AuditType,
        scheduled_at: DateTime<Utc>,
        participants: Vec<AuditParticipant>,
        assessment_focus: Vec<AssessmentFocus>,
    ) -> Self {
        Self {
            audit_type,
            scheduled_at,
            duration_minutes: 60,
            priority: AuditPriority::Medium,
            location: String::new(),
            requirements: Vec::new(),
            preparation_items: Vec::new(),
            participants,
            assessment_focus,
            reminders: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_preparation(mut self, items: Vec<PreparationItem>) -> Self {
        self.preparation_items = items;
        self
    }

    pub fn with_priority(mut self, priority: AuditPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSchedule {
    #[serde(default)]
    items: Vec<AuditScheduleItem>,
    #[serde(default)]
    next_sequence: u64,
}

impl AuditSchedule {
    pub fn items(&self) -> &[AuditScheduleItem] {
        &self.items
    }

    pub fn get(&self, audit_id: &AuditId) -> Result<&AuditScheduleItem, ComplianceError> {
        self.items
            .iter()
            .find(|item| &item.id == audit_id)
            .ok_or_else(|| ComplianceError::not_found("audit", audit_id))
    }

    /// Create an audit in the `scheduled` state.
    pub fn schedule(&mut self, draft: AuditDraft, at: DateTime<Utc>) -> AuditId {
        let id = self.next_id();
        self.items.push(AuditScheduleItem {
            id: id.clone(),
            audit_type: draft.audit_type,
            scheduled_at: draft.scheduled_at,
            duration_minutes: draft.duration_minutes,
            status: AuditStatus::Scheduled,
            priority: draft.priority,
            location: draft.location,
            requirements: draft.requirements,
            preparation_items: draft.preparation_items,
            participants: draft.participants,
            assessment_focus: draft.assessment_focus,
            reminders: draft.reminders,
            attachments: draft.attachments,
            previous_audit_date: None,
            rescheduled_from: None,
            outcome_notes: None,
            history: vec![TrailEvent::new(at, None, TrailAction::Note).with_detail("scheduled")],
        });
        id
    }

    /// Record a participant's RSVP.
    pub fn respond(
        &mut self,
        audit_id: &AuditId,
        participant: &UserId,
        confirmation: ConfirmationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        let item = self.item_mut(audit_id)?;
        if item.status.is_terminal() {
            return Err(ComplianceError::invalid(
                "audit",
                audit_id,
                item.status.label(),
                confirmation.label(),
            ));
        }

        let entry = item
            .participants
            .iter_mut()
            .find(|candidate| &candidate.user_id == participant)
            .ok_or_else(|| ComplianceError::not_found("participant", participant))?;
        entry.confirmation = confirmation;

        // A decline invalidates an earlier confirmation.
        if confirmation == ConfirmationStatus::Declined && item.status == AuditStatus::Confirmed {
            item.move_to(
                AuditStatus::Scheduled,
                Some(participant.clone()),
                at,
                "participant declined",
            );
        }
        Ok(())
    }

    /// Requires every participant to have confirmed. Returns `false` when already confirmed.
    pub fn confirm(
        &mut self,
        audit_id: &AuditId,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let item = self.item_mut(audit_id)?;
        if item.status == AuditStatus::Confirmed {
            return Ok(false);
        }
        item.guard(&[AuditStatus::Scheduled], AuditStatus::Confirmed)?;

        let pending = item.unconfirmed();
        if !pending.is_empty() {
            return Err(ComplianceError::UnconfirmedParticipants {
                audit: audit_id.clone(),
                pending,
            });
        }

        item.move_to(AuditStatus::Confirmed, actor, at, "");
        Ok(true)
    }

    pub fn start(
        &mut self,
        audit_id: &AuditId,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let item = self.item_mut(audit_id)?;
        if item.status == AuditStatus::InProgress {
            return Ok(false);
        }
        item.guard(&[AuditStatus::Confirmed], AuditStatus::InProgress)?;
        item.move_to(AuditStatus::InProgress, actor, at, "");
        Ok(true)
    }

    pub fn complete(
        &mut self,
        audit_id: &AuditId,
        notes: impl Into<String>,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let item = self.item_mut(audit_id)?;
        if item.status == AuditStatus::Completed {
            return Ok(false);
        }
        item.guard(&[AuditStatus::InProgress], AuditStatus::Completed)?;
        let notes = notes.into();
        item.move_to(AuditStatus::Completed, actor, at, &notes);
        item.outcome_notes = Some(notes).filter(|notes| !notes.is_empty());
        Ok(true)
    }

    pub fn cancel(
        &mut self,
        audit_id: &AuditId,
        reason: &str,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let item = self.item_mut(audit_id)?;
        if item.status == AuditStatus::Cancelled {
            return Ok(false);
        }
        item.guard(
            &[
                AuditStatus::Scheduled,
                AuditStatus::Confirmed,
                AuditStatus::InProgress,
            ],
            AuditStatus::Cancelled,
        )?;
        item.move_to(AuditStatus::Cancelled, actor, at, reason);
        Ok(true)
    }

    /// Close the original as `rescheduled` and append a fresh copy at the new date.
    ///
    /// The copy links back through `previous_audit_date` and `rescheduled_from`;
    /// participant confirmations start over.
    pub fn reschedule(
        &mut self,
        audit_id: &AuditId,
        new_date: DateTime<Utc>,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<AuditId, ComplianceError> {
        let new_id = AuditId::new(sequence_id("audit", self.next_sequence + 1));

        let item = self.item_mut(audit_id)?;
        item.guard(
            &[
                AuditStatus::Scheduled,
                AuditStatus::Confirmed,
                AuditStatus::InProgress,
            ],
            AuditStatus::Rescheduled,
        )?;

        let mut copy = item.clone();
        item.move_to(
            AuditStatus::Rescheduled,
            actor,
            at,
            &format!("replaced by {new_id}"),
        );

        copy.id = new_id.clone();
        copy.status = AuditStatus::Scheduled;
        copy.previous_audit_date = Some(copy.scheduled_at);
        copy.rescheduled_from = Some(audit_id.clone());
        copy.scheduled_at = new_date;
        copy.outcome_notes = None;
        for participant in &mut copy.participants {
            participant.confirmation = ConfirmationStatus::Pending;
        }
        for reminder in &mut copy.reminders {
            reminder.sent = false;
        }
        copy.history = vec![TrailEvent::new(at, None, TrailAction::Note)
            .with_detail(format!("rescheduled from {audit_id}"))];

        self.next_sequence += 1;
        self.items.push(copy);
        Ok(new_id)
    }

    pub fn update_preparation(
        &mut self,
        audit_id: &AuditId,
        item_id: &ItemId,
        status: PreparationStatus,
    ) -> Result<(), ComplianceError> {
        let audit = self.item_mut(audit_id)?;
        if audit.status.is_terminal() {
            return Err(ComplianceError::invalid(
                "audit",
                audit_id,
                audit.status.label(),
                status.label(),
            ));
        }
        let item = audit
            .preparation_items
            .iter_mut()
            .find(|item| &item.id == item_id)
            .ok_or_else(|| ComplianceError::not_found("preparation item", item_id))?;
        item.status = status;
        Ok(())
    }

    /// Non-terminal audits starting within `window` whose preparation is incomplete.
    pub fn readiness_warnings(&self, now: DateTime<Utc>, window: Duration) -> Vec<AuditReadiness> {
        self.items
            .iter()
            .filter(|item| !item.status.is_terminal())
            .filter(|item| item.is_within(now, window) && item.readiness() < 1.0)
            .map(|item| item.readiness_view(now, window))
            .collect()
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> impl Iterator<Item = &AuditScheduleItem> {
        self.items.iter().filter(move |item| item.is_overdue(now))
    }

    fn next_id(&mut self) -> AuditId {
        self.next_sequence += 1;
        AuditId::new(sequence_id("audit", self.next_sequence))
    }

    fn item_mut(&mut self, audit_id: &AuditId) -> Result<&mut AuditScheduleItem, ComplianceError> {
        self.items
            .iter_mut()
            .find(|item| &item.id == audit_id)
            .ok_or_else(|| ComplianceError::not_found("audit", audit_id))
    }
}
