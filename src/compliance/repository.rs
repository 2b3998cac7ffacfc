//! Collaborator seams: persistence, notifications, identity lookups, and time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{RecordId, UserId};
use super::record::StudentComplianceRecord;

/// Storage abstraction with optimistic concurrency.
///
/// `save` succeeds only when the stored version equals `expected_version`
/// (zero for a record that has never been stored). The record passed in
/// already carries its next version.
pub trait ComplianceRepository: Send + Sync {
    fn load(&self, id: &RecordId) -> Result<StudentComplianceRecord, RepositoryError>;
    fn save(
        &self,
        record: &StudentComplianceRecord,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<RecordId>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record {id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        id: RecordId,
        expected: u64,
        found: u64,
    },
    #[error("record {0} not found")]
    NotFound(RecordId),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook for engine events. Delivery is at-least-once and fire-and-forget.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: &ComplianceEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "issue.escalated")]
    IssueEscalated,
    #[serde(rename = "audit.readiness-warning")]
    AuditReadinessWarning,
    #[serde(rename = "logbook.flagged")]
    LogbookFlagged,
}

impl EventKind {
    pub const fn topic(self) -> &'static str {
        match self {
            Self::IssueEscalated => "issue.escalated",
            Self::AuditReadinessWarning => "audit.readiness-warning",
            Self::LogbookFlagged => "logbook.flagged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub kind: EventKind,
    pub record_id: RecordId,
    /// Id of the issue, audit, or entry the event is about.
    pub subject: String,
    pub details: BTreeMap<String, String>,
}

impl ComplianceEvent {
    pub fn new(kind: EventKind, record_id: RecordId, subject: impl Into<String>) -> Self {
        Self {
            kind,
            record_id,
            subject: subject.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Resolves directory ids to display metadata. Nothing is copied into records.
pub trait IdentityDirectory: Send + Sync {
    fn display_name(&self, user: &UserId) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: BTreeMap<UserId, String>,
}

impl StaticDirectory {
    pub fn with(mut self, user: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(UserId::new(user), name.into());
        self
    }
}

impl IdentityDirectory for StaticDirectory {
    fn display_name(&self, user: &UserId) -> Option<String> {
        self.names.get(user).cloned()
    }
}

/// Source of "now" for every overdue and escalation computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryComplianceRepository {
    records: Arc<Mutex<HashMap<RecordId, StudentComplianceRecord>>>,
}

impl InMemoryComplianceRepository {
    fn records(&self) -> MutexGuard<'_, HashMap<RecordId, StudentComplianceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ComplianceRepository for InMemoryComplianceRepository {
    fn load(&self, id: &RecordId) -> Result<StudentComplianceRecord, RepositoryError> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    fn save(
        &self,
        record: &StudentComplianceRecord,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records();
        let found = guard.get(&record.id).map_or(0, |stored| stored.version);
        if found != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: record.id.clone(),
                expected: expected_version,
                found,
            });
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<RecordId>, RepositoryError> {
        let mut ids: Vec<RecordId> = self.records().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Dispatcher that only logs. Useful where no transport is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationDispatcher for TracingNotifier {
    fn dispatch(&self, event: &ComplianceEvent) -> Result<(), NotificationError> {
        tracing::info!(
            topic = event.kind.topic(),
            record = %event.record_id,
            subject = %event.subject,
            "compliance event"
        );
        Ok(())
    }
}
