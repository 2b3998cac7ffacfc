use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a student compliance record (one per student and placement).
    RecordId
);
string_id!(StudentId);
string_id!(PlacementId);
string_id!(
    /// Reference into the external user directory. The engine never stores profile data.
    UserId
);
string_id!(RequirementId);
string_id!(IssueId);
string_id!(AuditId);
string_id!(EntryId);
string_id!(FlagId);
string_id!(ItemId);

/// Reference to a stored evidence artifact (document, photo, work sample).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceRef(pub String);

pub(crate) fn sequence_id(prefix: &str, sequence: u64) -> String {
    format!("{prefix}-{sequence:04}")
}

/// Compliance areas tracked for every placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceCategory {
    Academic,
    WorkplaceSafety,
    Attendance,
    Documentation,
    Competency,
    Conduct,
}

impl ComplianceCategory {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Academic,
            Self::WorkplaceSafety,
            Self::Attendance,
            Self::Documentation,
            Self::Competency,
            Self::Conduct,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Academic => "Academic",
            Self::WorkplaceSafety => "Workplace Safety",
            Self::Attendance => "Attendance",
            Self::Documentation => "Documentation",
            Self::Competency => "Competency",
            Self::Conduct => "Conduct",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::WorkplaceSafety => "workplace-safety",
            Self::Attendance => "attendance",
            Self::Documentation => "documentation",
            Self::Competency => "competency",
            Self::Conduct => "conduct",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ordered()
            .into_iter()
            .find(|category| category.key() == normalized)
    }
}

/// Severity scale shared by compliance flags and risk levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

/// What happened to an owned entity. Trails are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum TrailAction {
    EvidenceRecorded { requirement: RequirementId },
    RequirementStatusChanged { requirement: RequirementId, from: String, to: String },
    Submitted,
    Resubmitted { original: EntryId },
    Verified,
    ClarificationRequested,
    Rejected,
    Superseded { replacement: EntryId },
    StatusChanged { from: String, to: String },
    Assigned { assignee: UserId },
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEvent {
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<UserId>,
    #[serde(flatten)]
    pub action: TrailAction,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl TrailEvent {
    pub fn new(at: DateTime<Utc>, actor: Option<UserId>, action: TrailAction) -> Self {
        Self {
            at,
            actor,
            action,
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Domain failures raised by pure aggregate operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComplianceError {
    #[error("requirement {requirement} requires evidence before it can be met")]
    EvidenceMissing { requirement: RequirementId },
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("audit {audit} has participants who have not confirmed: {}", join_ids(.pending))]
    UnconfirmedParticipants { audit: AuditId, pending: Vec<UserId> },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl ComplianceError {
    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(
        entity: &'static str,
        id: impl fmt::Display,
        from: &'static str,
        to: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.to_string(),
            from,
            to,
        }
    }
}

fn join_ids(ids: &[UserId]) -> String {
    ids.iter()
        .map(UserId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
