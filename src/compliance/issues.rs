//! Issue tracker: raises, assigns, resolves, and escalates compliance issues.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    sequence_id, AuditId, ComplianceCategory, ComplianceError, EntryId, FlagId, IssueId,
    TrailAction, TrailEvent, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Minor,
    Major,
    Critical,
}

impl IssueType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Minor => "Minor",
            Self::Major => "Major",
            Self::Critical => "Critical",
        }
    }

    pub const fn auto_escalates(self) -> bool {
        matches!(self, Self::Major | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
    Escalated,
}

impl IssueStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Escalated => "Escalated",
        }
    }

    /// Anything not yet resolved still counts against the student.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Resolved)
    }

    /// Forward moves of the open → in-progress → {resolved, escalated} lattice.
    pub const fn can_transition_to(self, next: IssueStatus) -> bool {
        use IssueStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Resolved)
                | (Open, Escalated)
                | (InProgress, Resolved)
                | (InProgress, Escalated)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Where an issue came from. Automatic sources are raised at most once while active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum IssueSource {
    Manual,
    AuditReadiness { audit: AuditId },
    AuditOverdue { audit: AuditId },
    LogbookFlag { entry: EntryId, flag: FlagId },
}

impl IssueSource {
    pub const fn is_automatic(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResolution {
    pub notes: String,
    #[serde(default)]
    pub resolved_by: Option<UserId>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub id: IssueId,
    pub issue_type: IssueType,
    pub category: ComplianceCategory,
    pub description: String,
    pub identified_at: DateTime<Utc>,
    pub status: IssueStatus,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    pub due_date: DateTime<Utc>,
    pub impact_level: ImpactLevel,
    #[serde(default)]
    pub preventive_measures: Vec<String>,
    #[serde(default)]
    pub resolution: Option<IssueResolution>,
    pub source: IssueSource,
    #[serde(default)]
    pub history: Vec<TrailEvent>,
}

impl ComplianceIssue {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.due_date < now
    }
}

/// Input for raising a new issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDraft {
    pub issue_type: IssueType,
    pub category: ComplianceCategory,
    pub description: String,
    pub impact_level: ImpactLevel,
    pub due_date: DateTime<Utc>,
    pub assigned_to: Option<UserId>,
    pub source: IssueSource,
}

impl IssueDraft {
    pub fn new(
        issue_type: IssueType,
        category: ComplianceCategory,
        description: impl Into<String>,
        impact_level: ImpactLevel,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            issue_type,
            category,
            description: description.into(),
            impact_level,
            due_date,
            assigned_to: None,
            source: IssueSource::Manual,
        }
    }

    pub fn assigned_to(mut self, assignee: UserId) -> Self {
        self.assigned_to = Some(assignee);
        self
    }

    pub fn from_source(mut self, source: IssueSource) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTracker {
    #[serde(default)]
    issues: Vec<ComplianceIssue>,
    #[serde(default)]
    next_sequence: u64,
}

impl IssueTracker {
    pub fn issues(&self) -> &[ComplianceIssue] {
        &self.issues
    }

    pub fn get(&self, issue_id: &IssueId) -> Result<&ComplianceIssue, ComplianceError> {
        self.issues
            .iter()
            .find(|issue| &issue.id == issue_id)
            .ok_or_else(|| ComplianceError::not_found("issue", issue_id))
    }

    pub fn active(&self) -> impl Iterator<Item = &ComplianceIssue> {
        self.issues.iter().filter(|issue| issue.status.is_active())
    }

    /// Open a new issue in the `open` state.
    pub fn raise(&mut self, draft: IssueDraft, at: DateTime<Utc>) -> IssueId {
        self.next_sequence += 1;
        let id = IssueId::new(sequence_id("issue", self.next_sequence));

        self.issues.push(ComplianceIssue {
            id: id.clone(),
            issue_type: draft.issue_type,
            category: draft.category,
            description: draft.description,
            identified_at: at,
            status: IssueStatus::Open,
            assigned_to: draft.assigned_to,
            due_date: draft.due_date,
            impact_level: draft.impact_level,
            preventive_measures: Vec::new(),
            resolution: None,
            source: draft.source,
            history: vec![TrailEvent::new(at, None, TrailAction::Note).with_detail("raised")],
        });

        id
    }

    /// Raise an automatically sourced issue unless one is already active for that source.
    pub fn raise_once(&mut self, draft: IssueDraft, at: DateTime<Utc>) -> Option<IssueId> {
        let duplicate = draft.source.is_automatic()
            && self
                .issues
                .iter()
                .any(|issue| issue.status.is_active() && issue.source == draft.source);

        if duplicate {
            None
        } else {
            Some(self.raise(draft, at))
        }
    }

    /// Move an issue along the lattice. Returns `false` when it was already in `next`.
    pub fn transition(
        &mut self,
        issue_id: &IssueId,
        next: IssueStatus,
        notes: Option<String>,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let issue = self.issue_mut(issue_id)?;
        if issue.status == next {
            return Ok(false);
        }
        if !issue.status.can_transition_to(next) {
            return Err(ComplianceError::invalid(
                "issue",
                issue_id,
                issue.status.label(),
                next.label(),
            ));
        }

        apply_status(issue, next, notes, actor, at);
        Ok(true)
    }

    /// Close an issue with mandatory resolution notes. This is the only way out of `escalated`.
    pub fn resolve(
        &mut self,
        issue_id: &IssueId,
        resolution_notes: &str,
        resolver: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let issue = self.issue_mut(issue_id)?;
        if issue.status == IssueStatus::Resolved {
            return Ok(false);
        }
        if resolution_notes.trim().is_empty() {
            return Err(ComplianceError::invalid(
                "issue",
                issue_id,
                issue.status.label(),
                IssueStatus::Resolved.label(),
            ));
        }

        apply_status(
            issue,
            IssueStatus::Resolved,
            Some(resolution_notes.trim().to_string()),
            Some(resolver),
            at,
        );
        Ok(true)
    }

    pub fn assign(
        &mut self,
        issue_id: &IssueId,
        assignee: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        let issue = self.issue_mut(issue_id)?;
        if issue.status == IssueStatus::Resolved {
            return Err(ComplianceError::invalid(
                "issue",
                issue_id,
                issue.status.label(),
                "assigned",
            ));
        }
        issue.assigned_to = Some(assignee.clone());
        issue.history.push(TrailEvent::new(
            at,
            None,
            TrailAction::Assigned { assignee },
        ));
        Ok(())
    }

    pub fn add_preventive_measure(
        &mut self,
        issue_id: &IssueId,
        measure: impl Into<String>,
    ) -> Result<(), ComplianceError> {
        let measure = measure.into();
        let issue = self.issue_mut(issue_id)?;
        if !issue.preventive_measures.contains(&measure) {
            issue.preventive_measures.push(measure);
        }
        Ok(())
    }

    /// Escalate major and critical issues still `open` past `due + grace`.
    pub fn escalate_overdue(&mut self, now: DateTime<Utc>, grace: Duration) -> Vec<IssueId> {
        let mut escalated = Vec::new();
        for issue in &mut self.issues {
            if issue.issue_type.auto_escalates()
                && issue.status == IssueStatus::Open
                && now - issue.due_date >= grace
            {
                apply_status(
                    issue,
                    IssueStatus::Escalated,
                    Some(format!(
                        "auto-escalated {} hours past due",
                        (now - issue.due_date).num_hours()
                    )),
                    None,
                    now,
                );
                escalated.push(issue.id.clone());
            }
        }
        escalated
    }

    fn issue_mut(&mut self, issue_id: &IssueId) -> Result<&mut ComplianceIssue, ComplianceError> {
        self.issues
            .iter_mut()
            .find(|issue| &issue.id == issue_id)
            .ok_or_else(|| ComplianceError::not_found("issue", issue_id))
    }
}

fn apply_status(
    issue: &mut ComplianceIssue,
    next: IssueStatus,
    notes: Option<String>,
    actor: Option<UserId>,
    at: DateTime<Utc>,
) {
    let previous = issue.status;
    issue.status = next;

    if next == IssueStatus::Resolved {
        issue.resolution = Some(IssueResolution {
            notes: notes.clone().unwrap_or_default(),
            resolved_by: actor.clone(),
            resolved_at: at,
        });
    }

    issue.history.push(
        TrailEvent::new(
            at,
            actor,
            TrailAction::StatusChanged {
                from: previous.label().to_string(),
                to: next.label().to_string(),
            },
        )
        .with_detail(notes.unwrap_or_default()),
    );
}
