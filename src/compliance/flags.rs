use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ComplianceError, FlagId, Severity, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagType {
    MissingEvidence,
    InsufficientDetail,
    SafetyConcern,
    QualityIssue,
    TimingDiscrepancy,
}

impl FlagType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::MissingEvidence => "Missing Evidence",
            Self::InsufficientDetail => "Insufficient Detail",
            Self::SafetyConcern => "Safety Concern",
            Self::QualityIssue => "Quality Issue",
            Self::TimingDiscrepancy => "Timing Discrepancy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagStatus {
    Open,
    Acknowledged,
    Resolved,
    Escalated,
}

impl FlagStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Acknowledged => "Acknowledged",
            Self::Resolved => "Resolved",
            Self::Escalated => "Escalated",
        }
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Acknowledged | Self::Escalated)
    }

    fn can_move_to(self, next: FlagStatus) -> bool {
        use FlagStatus::*;
        matches!(
            (self, next),
            (Open, Acknowledged)
                | (Open, Resolved)
                | (Open, Escalated)
                | (Acknowledged, Resolved)
                | (Acknowledged, Escalated)
                | (Escalated, Resolved)
        )
    }
}

/// A concern attached to a logbook entry or a compliance area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFlag {
    pub id: FlagId,
    pub flag_type: FlagType,
    pub severity: Severity,
    pub status: FlagStatus,
    pub description: String,
    pub raised_at: DateTime<Utc>,
    #[serde(default)]
    pub raised_by: Option<UserId>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ComplianceFlag {
    pub fn new(
        id: FlagId,
        flag_type: FlagType,
        severity: Severity,
        description: impl Into<String>,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            flag_type,
            severity,
            status: FlagStatus::Open,
            description: description.into(),
            raised_at,
            raised_by: None,
            resolved_at: None,
        }
    }

    /// Move the flag forward. Repeating the current status is a no-op.
    pub fn set_status(&mut self, next: FlagStatus, at: DateTime<Utc>) -> Result<(), ComplianceError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_move_to(next) {
            return Err(ComplianceError::invalid(
                "flag",
                &self.id,
                self.status.label(),
                next.label(),
            ));
        }
        self.status = next;
        if next == FlagStatus::Resolved {
            self.resolved_at = Some(at);
        }
        Ok(())
    }
}

pub(crate) fn find_flag_mut<'a>(
    flags: &'a mut [ComplianceFlag],
    flag_id: &FlagId,
) -> Result<&'a mut ComplianceFlag, ComplianceError> {
    flags
        .iter_mut()
        .find(|flag| &flag.id == flag_id)
        .ok_or_else(|| ComplianceError::not_found("flag", flag_id))
}
