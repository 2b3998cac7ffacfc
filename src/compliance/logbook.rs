//! Evidence verifier: logbook submissions, quality scoring, and the verification workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    sequence_id, ComplianceError, EntryId, FlagId, Severity, TrailAction, TrailEvent, UserId,
};
use super::flags::{find_flag_mut, ComplianceFlag, FlagStatus, FlagType};
use super::policy::CompliancePolicy;

const EVIDENCE_WEIGHT: f32 = 30.0;
const REFLECTION_WEIGHT: f32 = 30.0;
const FLAG_WEIGHT: f32 = 40.0;
const EVIDENCE_TARGET: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogbookEntryType {
    DailyActivity,
    SkillPractice,
    CompetencyObservation,
    AssessmentEvidence,
    Reflection,
    IncidentReport,
}

impl LogbookEntryType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DailyActivity => "Daily Activity",
            Self::SkillPractice => "Skill Practice",
            Self::CompetencyObservation => "Competency Observation",
            Self::AssessmentEvidence => "Assessment Evidence",
            Self::Reflection => "Reflection",
            Self::IncidentReport => "Incident Report",
        }
    }

    /// Reflection length below which an entry is considered thin.
    pub const fn minimum_reflection_words(self) -> usize {
        match self {
            Self::DailyActivity | Self::SkillPractice => 50,
            Self::CompetencyObservation | Self::AssessmentEvidence => 75,
            Self::IncidentReport => 100,
            Self::Reflection => 150,
        }
    }

    pub const fn requires_direct_evidence(self) -> bool {
        matches!(self, Self::CompetencyObservation | Self::AssessmentEvidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceType {
    Direct,
    Indirect,
    Supplementary,
}

impl EvidenceType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Direct => "Direct",
            Self::Indirect => "Indirect",
            Self::Supplementary => "Supplementary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    RequiresClarification,
    Rejected,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Verified => "Verified",
            Self::RequiresClarification => "Requires Clarification",
            Self::Rejected => "Rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogbookAttachment {
    pub name: String,
    pub evidence_type: EvidenceType,
    pub storage_key: String,
}

impl LogbookAttachment {
    pub fn new(
        name: impl Into<String>,
        evidence_type: EvidenceType,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            evidence_type,
            storage_key: storage_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionResponse {
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub evidence: f32,
    pub reflection: f32,
    pub flags: f32,
    pub capped: bool,
    pub total: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalLogbookEntry {
    pub id: EntryId,
    pub entry_type: LogbookEntryType,
    #[serde(default)]
    pub unit_of_competency: Option<String>,
    #[serde(default)]
    pub competency_elements: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub reflection: Vec<ReflectionResponse>,
    pub occurred_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub evidence_attached: Vec<LogbookAttachment>,
    pub verification_status: VerificationStatus,
    pub quality_score: u8,
    pub quality: QualityBreakdown,
    #[serde(default)]
    pub compliance_flags: Vec<ComplianceFlag>,
    #[serde(default)]
    pub audit_trail: Vec<TrailEvent>,
    #[serde(default)]
    pub verified_by: Option<UserId>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clarification_reason: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub supersedes: Option<EntryId>,
    #[serde(default)]
    pub superseded_by: Option<EntryId>,
}

impl DigitalLogbookEntry {
    pub fn reflection_words(&self) -> usize {
        reflection_words(&self.reflection)
    }

    pub fn has_direct_evidence(&self) -> bool {
        self.evidence_attached
            .iter()
            .any(|attachment| attachment.evidence_type == EvidenceType::Direct)
    }

    /// Rejected and superseded entries do not count as audit evidence.
    pub fn is_countable(&self) -> bool {
        self.verification_status != VerificationStatus::Rejected && self.superseded_by.is_none()
    }

    pub fn active_flags(&self) -> impl Iterator<Item = &ComplianceFlag> {
        self.compliance_flags.iter().filter(|flag| flag.status.is_active())
    }
}

/// Student-supplied content of a logbook entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogbookDraft {
    pub entry_type: LogbookEntryType,
    pub unit_of_competency: Option<String>,
    pub competency_elements: Vec<String>,
    pub description: String,
    pub reflection: Vec<ReflectionResponse>,
    pub occurred_at: DateTime<Utc>,
    pub evidence_attached: Vec<LogbookAttachment>,
}

impl LogbookDraft {
    pub fn new(
        entry_type: LogbookEntryType,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_type,
            unit_of_competency: None,
            competency_elements: Vec::new(),
            description: description.into(),
            reflection: Vec::new(),
            occurred_at,
            evidence_attached: Vec::new(),
        }
    }

    pub fn for_unit(mut self, unit: impl Into<String>, elements: Vec<String>) -> Self {
        self.unit_of_competency = Some(unit.into());
        self.competency_elements = elements;
        self
    }

    pub fn reflect(mut self, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        self.reflection.push(ReflectionResponse {
            prompt: prompt.into(),
            response: response.into(),
        });
        self
    }

    pub fn attach(mut self, attachment: LogbookAttachment) -> Self {
        self.evidence_attached.push(attachment);
        self
    }
}

/// Result of a submission: the new entry and any flags detected on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub entry_id: EntryId,
    pub quality_score: u8,
    pub flags: Vec<ComplianceFlag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logbook {
    #[serde(default)]
    entries: Vec<DigitalLogbookEntry>,
    #[serde(default)]
    next_sequence: u64,
}

impl Logbook {
    pub fn entries(&self) -> &[DigitalLogbookEntry] {
        &self.entries
    }

    pub fn get(&self, entry_id: &EntryId) -> Result<&DigitalLogbookEntry, ComplianceError> {
        self.entries
            .iter()
            .find(|entry| &entry.id == entry_id)
            .ok_or_else(|| ComplianceError::not_found("logbook entry", entry_id))
    }

    pub fn countable_evidence(&self) -> impl Iterator<Item = &DigitalLogbookEntry> {
        self.entries.iter().filter(|entry| entry.is_countable())
    }

    /// Accept a new entry as `pending`, detect flags, and score it.
    pub fn submit(
        &mut self,
        draft: LogbookDraft,
        student: Option<UserId>,
        at: DateTime<Utc>,
        policy: &CompliancePolicy,
    ) -> Submission {
        let entry = self.build_entry(draft, student, at, policy, None);
        self.push(entry)
    }

    /// Student response to a clarification request: a new pending entry linked to the original.
    pub fn resubmit(
        &mut self,
        original_id: &EntryId,
        draft: LogbookDraft,
        student: Option<UserId>,
        at: DateTime<Utc>,
        policy: &CompliancePolicy,
    ) -> Result<Submission, ComplianceError> {
        let original = self.get(original_id)?;
        if original.verification_status != VerificationStatus::RequiresClarification
            || original.superseded_by.is_some()
        {
            return Err(ComplianceError::invalid(
                "logbook entry",
                original_id,
                original.verification_status.label(),
                "resubmitted",
            ));
        }

        let entry = self.build_entry(draft, student.clone(), at, policy, Some(original_id.clone()));
        let replacement = entry.id.clone();
        let submission = self.push(entry);

        let original = self.entry_mut(original_id)?;
        original.superseded_by = Some(replacement.clone());
        original.audit_trail.push(TrailEvent::new(
            at,
            student,
            TrailAction::Superseded { replacement },
        ));
        Ok(submission)
    }

    /// Pending → verified. Verifying a verified entry is a no-op success.
    pub fn verify(
        &mut self,
        entry_id: &EntryId,
        verifier: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let entry = self.entry_mut(entry_id)?;
        match entry.verification_status {
            VerificationStatus::Verified => Ok(false),
            VerificationStatus::Pending => {
                entry.verification_status = VerificationStatus::Verified;
                entry.verified_by = Some(verifier.clone());
                entry.verified_at = Some(at);
                entry
                    .audit_trail
                    .push(TrailEvent::new(at, Some(verifier), TrailAction::Verified));
                Ok(true)
            }
            other => Err(ComplianceError::invalid(
                "logbook entry",
                entry_id,
                other.label(),
                VerificationStatus::Verified.label(),
            )),
        }
    }

    pub fn request_clarification(
        &mut self,
        entry_id: &EntryId,
        reason: &str,
        reviewer: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let entry = self.entry_mut(entry_id)?;
        match entry.verification_status {
            VerificationStatus::RequiresClarification => Ok(false),
            VerificationStatus::Pending => {
                entry.verification_status = VerificationStatus::RequiresClarification;
                entry.clarification_reason = Some(reason.to_string());
                entry.audit_trail.push(
                    TrailEvent::new(at, Some(reviewer), TrailAction::ClarificationRequested)
                        .with_detail(reason),
                );
                Ok(true)
            }
            other => Err(ComplianceError::invalid(
                "logbook entry",
                entry_id,
                other.label(),
                VerificationStatus::RequiresClarification.label(),
            )),
        }
    }

    /// Terminal rejection from pending or requires-clarification.
    pub fn reject(
        &mut self,
        entry_id: &EntryId,
        reason: &str,
        reviewer: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, ComplianceError> {
        let entry = self.entry_mut(entry_id)?;
        match entry.verification_status {
            VerificationStatus::Rejected => Ok(false),
            VerificationStatus::Pending | VerificationStatus::RequiresClarification
                if entry.superseded_by.is_none() =>
            {
                entry.verification_status = VerificationStatus::Rejected;
                entry.rejection_reason = Some(reason.to_string());
                entry.audit_trail.push(
                    TrailEvent::new(at, Some(reviewer), TrailAction::Rejected).with_detail(reason),
                );
                Ok(true)
            }
            other => Err(ComplianceError::invalid(
                "logbook entry",
                entry_id,
                other.label(),
                VerificationStatus::Rejected.label(),
            )),
        }
    }

    pub fn set_flag_status(
        &mut self,
        entry_id: &EntryId,
        flag_id: &FlagId,
        status: FlagStatus,
        at: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        let entry = self.entry_mut(entry_id)?;
        find_flag_mut(&mut entry.compliance_flags, flag_id)?.set_status(status, at)
    }

    fn build_entry(
        &mut self,
        draft: LogbookDraft,
        student: Option<UserId>,
        at: DateTime<Utc>,
        policy: &CompliancePolicy,
        supersedes: Option<EntryId>,
    ) -> DigitalLogbookEntry {
        self.next_sequence += 1;
        let id = EntryId::new(sequence_id("entry", self.next_sequence));

        let flags: Vec<ComplianceFlag> = detect_flags(&draft, at, policy)
            .into_iter()
            .enumerate()
            .map(|(index, (flag_type, severity, description))| {
                ComplianceFlag::new(
                    FlagId::new(sequence_id(&format!("{id}-flag"), index as u64 + 1)),
                    flag_type,
                    severity,
                    description,
                    at,
                )
            })
            .collect();

        let quality = assess_quality(&draft, &flags, policy);

        let action = match &supersedes {
            Some(original) => TrailAction::Resubmitted {
                original: original.clone(),
            },
            None => TrailAction::Submitted,
        };

        DigitalLogbookEntry {
            id,
            entry_type: draft.entry_type,
            unit_of_competency: draft.unit_of_competency,
            competency_elements: draft.competency_elements,
            description: draft.description,
            reflection: draft.reflection,
            occurred_at: draft.occurred_at,
            submitted_at: at,
            evidence_attached: draft.evidence_attached,
            verification_status: VerificationStatus::Pending,
            quality_score: quality.total,
            quality,
            compliance_flags: flags,
            audit_trail: vec![TrailEvent::new(at, student, action)],
            verified_by: None,
            verified_at: None,
            clarification_reason: None,
            rejection_reason: None,
            supersedes,
            superseded_by: None,
        }
    }

    fn push(&mut self, entry: DigitalLogbookEntry) -> Submission {
        let submission = Submission {
            entry_id: entry.id.clone(),
            quality_score: entry.quality_score,
            flags: entry.compliance_flags.clone(),
        };
        self.entries.push(entry);
        submission
    }

    fn entry_mut(&mut self, entry_id: &EntryId) -> Result<&mut DigitalLogbookEntry, ComplianceError> {
        self.entries
            .iter_mut()
            .find(|entry| &entry.id == entry_id)
            .ok_or_else(|| ComplianceError::not_found("logbook entry", entry_id))
    }
}

fn reflection_words(reflection: &[ReflectionResponse]) -> usize {
    reflection
        .iter()
        .map(|response| response.response.split_whitespace().count())
        .sum()
}

/// Automatic checks run on every submission.
pub fn detect_flags(
    draft: &LogbookDraft,
    submitted_at: DateTime<Utc>,
    policy: &CompliancePolicy,
) -> Vec<(FlagType, Severity, String)> {
    let mut flags = Vec::new();
    let entry_type = draft.entry_type;

    if entry_type.requires_direct_evidence()
        && !draft
            .evidence_attached
            .iter()
            .any(|attachment| attachment.evidence_type == EvidenceType::Direct)
    {
        flags.push((
            FlagType::MissingEvidence,
            Severity::Medium,
            format!("{} entries need direct evidence", entry_type.label()),
        ));
    }

    let words = reflection_words(&draft.reflection);
    let minimum = entry_type.minimum_reflection_words();
    if words < minimum {
        flags.push((
            FlagType::InsufficientDetail,
            Severity::Low,
            format!("reflection has {words} words, expected at least {minimum}"),
        ));
    }

    if draft.occurred_at > submitted_at {
        flags.push((
            FlagType::TimingDiscrepancy,
            Severity::Medium,
            "activity is dated after its submission".to_string(),
        ));
    } else if submitted_at - draft.occurred_at > policy.submission_lag() {
        flags.push((
            FlagType::TimingDiscrepancy,
            Severity::Low,
            format!(
                "submitted {} days after the activity",
                (submitted_at - draft.occurred_at).num_days()
            ),
        ));
    }

    if entry_type == LogbookEntryType::IncidentReport {
        flags.push((
            FlagType::SafetyConcern,
            Severity::High,
            "incident reported during placement".to_string(),
        ));
    }

    flags
}

/// Evidence (30%), reflection depth (30%), and absence of flags (40%).
///
/// Missing direct evidence on observation or assessment entries caps the total.
pub fn assess_quality(
    draft: &LogbookDraft,
    flags: &[ComplianceFlag],
    policy: &CompliancePolicy,
) -> QualityBreakdown {
    let attachments = draft.evidence_attached.len().min(EVIDENCE_TARGET);
    let evidence = EVIDENCE_WEIGHT * attachments as f32 / EVIDENCE_TARGET as f32;

    let minimum = draft.entry_type.minimum_reflection_words().max(1);
    let words = reflection_words(&draft.reflection);
    let reflection = REFLECTION_WEIGHT * (words as f32 / minimum as f32).min(1.0);

    let penalty: f32 = flags.iter().map(|flag| flag_penalty(flag.severity)).sum();
    let flag_score = (FLAG_WEIGHT - penalty).max(0.0);

    let raw = (evidence + reflection + flag_score).round().clamp(0.0, 100.0) as u8;
    let missing_direct = flags
        .iter()
        .any(|flag| flag.flag_type == FlagType::MissingEvidence);
    let capped = missing_direct && raw > policy.quality_cap();

    QualityBreakdown {
        evidence,
        reflection,
        flags: flag_score,
        capped,
        total: if capped { policy.quality_cap() } else { raw },
    }
}

fn flag_penalty(severity: Severity) -> f32 {
    match severity {
        Severity::Low => 5.0,
        Severity::Medium => 15.0,
        Severity::High => 25.0,
        Severity::Critical => FLAG_WEIGHT,
    }
}
