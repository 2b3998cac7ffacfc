//! Requirement ledger: the atomic obligations owned by a compliance area.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::areas::ComplianceArea;
use super::domain::{
    ComplianceError, EvidenceRef, RequirementId, TrailAction, TrailEvent, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementStatus {
    Met,
    PartiallyMet,
    NotMet,
    Pending,
}

impl RequirementStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Met => "Met",
            Self::PartiallyMet => "Partially Met",
            Self::NotMet => "Not Met",
            Self::Pending => "Pending",
        }
    }

    /// Fraction of the requirement's weight credited toward the area score.
    pub const fn credit(self) -> Option<f32> {
        match self {
            Self::Met => Some(1.0),
            Self::PartiallyMet => Some(0.5),
            Self::NotMet => Some(0.0),
            Self::Pending => None,
        }
    }

    pub const fn allows_completion(self) -> bool {
        matches!(self, Self::Met | Self::PartiallyMet)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRequirement {
    pub id: RequirementId,
    pub description: String,
    pub status: RequirementStatus,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified_by: Option<UserId>,
    /// A critical requirement that is not met forces its area to non-compliant.
    #[serde(default)]
    pub critical: bool,
    /// Relative weight; `None` takes an equal share.
    #[serde(default)]
    pub weight: Option<f32>,
}

impl ComplianceRequirement {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: RequirementId::new(id),
            description: description.into(),
            status: RequirementStatus::Pending,
            evidence: Vec::new(),
            due_date: None,
            completed_on: None,
            verified_by: None,
            critical: false,
            weight: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn weighted(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn effective_weight(&self) -> f32 {
        match self.weight {
            Some(weight) if weight.is_finite() && weight > 0.0 => weight,
            _ => 1.0,
        }
    }

    pub fn is_assessed(&self) -> bool {
        self.status != RequirementStatus::Pending
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != RequirementStatus::Met && self.due_date.is_some_and(|due| due < now)
    }
}

impl ComplianceArea {
    /// Attach a piece of evidence to one of this area's requirements.
    pub fn record_evidence(
        &mut self,
        requirement_id: &RequirementId,
        evidence: EvidenceRef,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        let requirement = self.requirement_mut(requirement_id)?;
        requirement.evidence.push(evidence);

        self.evidence_submitted = true;
        self.audit_trail.push(TrailEvent::new(
            at,
            actor,
            TrailAction::EvidenceRecorded {
                requirement: requirement_id.clone(),
            },
        ));
        self.invalidate();
        Ok(())
    }

    /// Reviewer action changing a requirement's status.
    ///
    /// Moving to `met` fails with `EvidenceMissing` when the area demands evidence
    /// and none has been recorded for the requirement.
    pub fn set_requirement_status(
        &mut self,
        requirement_id: &RequirementId,
        status: RequirementStatus,
        verifier: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        let evidence_required = self.evidence_required;
        let requirement = self.requirement_mut(requirement_id)?;

        if status == RequirementStatus::Met && evidence_required && requirement.evidence.is_empty()
        {
            return Err(ComplianceError::EvidenceMissing {
                requirement: requirement_id.clone(),
            });
        }

        let previous = requirement.status;
        requirement.status = status;
        requirement.verified_by = Some(verifier.clone());
        requirement.completed_on = if status.allows_completion() {
            requirement.completed_on.or(Some(at))
        } else {
            None
        };

        self.last_assessed = Some(at);
        self.audit_trail.push(TrailEvent::new(
            at,
            Some(verifier),
            TrailAction::RequirementStatusChanged {
                requirement: requirement_id.clone(),
                from: previous.label().to_string(),
                to: status.label().to_string(),
            },
        ));
        self.invalidate();
        Ok(())
    }
}
