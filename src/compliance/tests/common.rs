use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::compliance::{
    AuditDraft, AuditParticipant, AuditType, ComplianceArea, ComplianceCategory, ComplianceEvent,
    CompliancePolicy, ComplianceRepository, ComplianceRequirement, ComplianceService,
    EvidenceType, FixedClock, InMemoryComplianceRepository, LogbookAttachment, LogbookDraft,
    LogbookEntryType, NotificationDispatcher, NotificationError, ParticipantRole,
    PlacementId, PreparationItem, PreparationStatus, RecordId, RepositoryError,
    StudentComplianceRecord, StudentId, UserId,
};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub(super) fn academic_area() -> ComplianceArea {
    ComplianceArea::new(
        ComplianceCategory::Academic,
        true,
        vec![
            ComplianceRequirement::new("acad-enrolment", "Enrolment confirmed"),
            ComplianceRequirement::new("acad-training-plan", "Training plan signed"),
        ],
    )
}

pub(super) fn safety_area() -> ComplianceArea {
    ComplianceArea::new(
        ComplianceCategory::WorkplaceSafety,
        false,
        vec![
            ComplianceRequirement::new("ws-induction", "Site induction completed").critical(),
            ComplianceRequirement::new("ws-ppe", "PPE issued"),
        ],
    )
}

pub(super) fn record() -> StudentComplianceRecord {
    StudentComplianceRecord::enroll(
        StudentId::new("stu-0042"),
        PlacementId::new("pl-aged-care"),
        vec![academic_area(), safety_area()],
        now(),
    )
}

/// Three preparation items with one still pending, starting 12 hours after `now()`.
pub(super) fn audit_draft() -> AuditDraft {
    let mut items = vec![
        PreparationItem::new("prep-logbook", "Logbook up to date", ParticipantRole::Student, now()),
        PreparationItem::new(
            "prep-observation",
            "Observation checklist printed",
            ParticipantRole::Assessor,
            now(),
        ),
        PreparationItem::new(
            "prep-roster",
            "Supervisor rostered on",
            ParticipantRole::Supervisor,
            now() + Duration::hours(6),
        ),
    ];
    items[0].status = PreparationStatus::Completed;
    items[1].status = PreparationStatus::Completed;

    AuditDraft::new(
        AuditType::CompetencyCheck,
        now() + Duration::hours(12),
        vec![
            AuditParticipant::new("stu-0042", ParticipantRole::Student),
            AuditParticipant::new("assessor-jo", ParticipantRole::Assessor),
        ],
        Vec::new(),
    )
    .with_preparation(items)
    .at_location("Ward 3")
}

pub(super) fn words(count: usize) -> String {
    vec!["practice"; count].join(" ")
}

/// Observation entry with enough reflection and indirect-only evidence.
pub(super) fn observation_without_direct_evidence() -> LogbookDraft {
    LogbookDraft::new(
        LogbookEntryType::CompetencyObservation,
        "Assisted resident with mobility transfer",
        now() - Duration::days(1),
    )
    .for_unit("CHCCCS031", vec!["1.1".to_string()])
    .reflect("What went well?", words(80))
    .attach(LogbookAttachment::new("notes.pdf", EvidenceType::Indirect, "ev/notes.pdf"))
    .attach(LogbookAttachment::new("roster.pdf", EvidenceType::Supplementary, "ev/roster.pdf"))
    .attach(LogbookAttachment::new("summary.pdf", EvidenceType::Indirect, "ev/summary.pdf"))
}

pub(super) fn complete_daily_entry() -> LogbookDraft {
    LogbookDraft::new(
        LogbookEntryType::DailyActivity,
        "Morning handover and medication round",
        now() - Duration::hours(4),
    )
    .reflect("What did you learn?", words(60))
    .attach(LogbookAttachment::new("handover.jpg", EvidenceType::Direct, "ev/handover.jpg"))
    .attach(LogbookAttachment::new("chart.jpg", EvidenceType::Direct, "ev/chart.jpg"))
    .attach(LogbookAttachment::new("sign-off.pdf", EvidenceType::Direct, "ev/sign-off.pdf"))
}

pub(super) type TestService =
    ComplianceService<InMemoryComplianceRepository, RecordingNotifier, FixedClock>;

pub(super) fn build_service_at(
    at: DateTime<Utc>,
) -> (TestService, Arc<InMemoryComplianceRepository>, Arc<RecordingNotifier>) {
    build_service_with(Arc::new(InMemoryComplianceRepository::default()), at)
}

pub(super) fn build_service_with(
    repository: Arc<InMemoryComplianceRepository>,
    at: DateTime<Utc>,
) -> (TestService, Arc<InMemoryComplianceRepository>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ComplianceService::new(
        repository.clone(),
        notifier.clone(),
        Arc::new(FixedClock(at)),
        CompliancePolicy::default(),
    );
    (service, repository, notifier)
}

pub(super) fn enrolled(service: &TestService) -> RecordId {
    service
        .enroll(
            StudentId::new("stu-0042"),
            PlacementId::new("pl-aged-care"),
            vec![academic_area(), safety_area()],
        )
        .expect("enrolment succeeds")
        .id
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    events: Arc<Mutex<Vec<ComplianceEvent>>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<ComplianceEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.kind.topic()).collect()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn dispatch(&self, event: &ComplianceEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationDispatcher for FailingNotifier {
    fn dispatch(&self, _event: &ComplianceEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("broker offline".to_string()))
    }
}

pub(super) struct UnavailableRepository;

impl ComplianceRepository for UnavailableRepository {
    fn load(&self, _id: &RecordId) -> Result<StudentComplianceRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(
        &self,
        _record: &StudentComplianceRecord,
        _expected_version: u64,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<RecordId>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Serves reads one version behind the store, as if another writer got in first.
#[derive(Default)]
pub(super) struct StaleReadRepository {
    pub(super) inner: InMemoryComplianceRepository,
}

impl ComplianceRepository for StaleReadRepository {
    fn load(&self, id: &RecordId) -> Result<StudentComplianceRecord, RepositoryError> {
        let mut record = self.inner.load(id)?;
        record.version = record.version.saturating_sub(1);
        Ok(record)
    }

    fn save(
        &self,
        record: &StudentComplianceRecord,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        self.inner.save(record, expected_version)
    }

    fn list(&self) -> Result<Vec<RecordId>, RepositoryError> {
        self.inner.list()
    }
}
