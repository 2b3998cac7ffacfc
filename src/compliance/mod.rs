//! Compliance and audit lifecycle for students on work placements.
//!
//! A [`StudentComplianceRecord`] owns every compliance area, issue, audit, and
//! logbook entry for one student on one placement. [`ComplianceEngine`] folds
//! those into a score and risk level, and [`ComplianceService`] runs each
//! mutation through the repository, clock, and notifier collaborators.

pub mod areas;
pub mod audits;
pub mod domain;
pub mod engine;
pub mod flags;
pub mod issues;
pub mod logbook;
pub mod policy;
pub mod record;
pub mod report;
pub mod repository;
pub mod requirements;
pub mod service;

#[cfg(test)]
mod tests;

pub use areas::{score_requirements, AreaScore, AreaStatus, ComplianceArea};
pub use audits::{
    AssessmentFocus, Attachment, AuditDraft, AuditParticipant, AuditPriority, AuditReadiness,
    AuditReminder, AuditSchedule, AuditScheduleItem, AuditStatus, AuditType, ConfirmationStatus,
    ParticipantRole, PreparationItem, PreparationStatus,
};
pub use domain::{
    AuditId, ComplianceCategory, ComplianceError, EntryId, EvidenceRef, FlagId, IssueId, ItemId,
    PlacementId, RecordId, RequirementId, Severity, StudentId, TrailAction, TrailEvent, UserId,
};
pub use engine::{
    derive_risk, derive_status, AreaSummary, ComplianceAssessment, ComplianceEngine,
    ComplianceStatus, RiskLevel, RiskSignals,
};
pub use flags::{ComplianceFlag, FlagStatus, FlagType};
pub use issues::{
    ComplianceIssue, ImpactLevel, IssueDraft, IssueResolution, IssueSource, IssueStatus,
    IssueTracker, IssueType,
};
pub use logbook::{
    assess_quality, detect_flags, DigitalLogbookEntry, EvidenceType, Logbook, LogbookAttachment,
    LogbookDraft, LogbookEntryType, QualityBreakdown, ReflectionResponse, Submission,
    VerificationStatus,
};
pub use policy::CompliancePolicy;
pub use record::{AssessmentProgress, StudentComplianceRecord};
pub use report::ComplianceReport;
pub use repository::{
    Clock, ComplianceEvent, ComplianceRepository, EventKind, FixedClock, IdentityDirectory,
    InMemoryComplianceRepository, NotificationDispatcher, NotificationError, RepositoryError,
    StaticDirectory, SystemClock, TracingNotifier,
};
pub use requirements::{ComplianceRequirement, RequirementStatus};
pub use service::{ComplianceService, ComplianceServiceError, ErrorKind, SweepReport};
