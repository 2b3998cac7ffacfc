//! Compliance area aggregation: rolls requirements up into a score and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    sequence_id, ComplianceCategory, ComplianceError, FlagId, RequirementId, Severity, TrailEvent,
};
use super::flags::{find_flag_mut, ComplianceFlag, FlagStatus, FlagType};
use super::requirements::{ComplianceRequirement, RequirementStatus};

const DEFAULT_MAX_SCORE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AreaStatus {
    Compliant,
    Warning,
    NonCompliant,
    NotAssessed,
}

impl AreaStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Compliant => "Compliant",
            Self::Warning => "Warning",
            Self::NonCompliant => "Non-Compliant",
            Self::NotAssessed => "Not Assessed",
        }
    }
}

/// Score of an area at a given warning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaScore {
    pub score: f32,
    pub max_score: f32,
    pub percentage: f32,
    pub status: AreaStatus,
    #[serde(skip)]
    threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceArea {
    pub category: ComplianceCategory,
    pub status: AreaStatus,
    pub score: f32,
    max_score: f32,
    pub evidence_required: bool,
    pub evidence_submitted: bool,
    #[serde(default)]
    pub last_assessed: Option<DateTime<Utc>>,
    requirements: Vec<ComplianceRequirement>,
    #[serde(default)]
    pub flags: Vec<ComplianceFlag>,
    #[serde(default)]
    pub audit_trail: Vec<TrailEvent>,
    #[serde(skip)]
    cached: Option<AreaScore>,
}

impl ComplianceArea {
    pub fn new(
        category: ComplianceCategory,
        evidence_required: bool,
        requirements: Vec<ComplianceRequirement>,
    ) -> Self {
        Self {
            category,
            status: AreaStatus::NotAssessed,
            score: 0.0,
            max_score: DEFAULT_MAX_SCORE,
            evidence_required,
            evidence_submitted: false,
            last_assessed: None,
            requirements,
            flags: Vec::new(),
            audit_trail: Vec::new(),
            cached: None,
        }
    }

    pub fn with_max_score(mut self, max_score: f32) -> Self {
        self.max_score = max_score;
        self.cached = None;
        self
    }

    pub fn max_score(&self) -> f32 {
        self.max_score
    }

    pub fn requirements(&self) -> &[ComplianceRequirement] {
        &self.requirements
    }

    pub fn requirement(&self, requirement_id: &RequirementId) -> Option<&ComplianceRequirement> {
        self.requirements
            .iter()
            .find(|requirement| &requirement.id == requirement_id)
    }

    /// Mutable access to one requirement. Drops the cached score, since the caller may change it.
    pub(crate) fn requirement_mut(
        &mut self,
        requirement_id: &RequirementId,
    ) -> Result<&mut ComplianceRequirement, ComplianceError> {
        self.cached = None;
        self.requirements
            .iter_mut()
            .find(|requirement| &requirement.id == requirement_id)
            .ok_or_else(|| ComplianceError::not_found("requirement", requirement_id))
    }

    /// Current score, served from the cache while no requirement has changed.
    pub fn assess(&self, warning_threshold: f32) -> AreaScore {
        match self.cached {
            Some(cached) if cached.threshold == warning_threshold => cached,
            _ => score_requirements(&self.requirements, self.max_score, warning_threshold),
        }
    }

    /// Recompute and materialize score and status onto the area.
    pub fn refresh(&mut self, warning_threshold: f32) -> AreaScore {
        let assessed = self.assess(warning_threshold);
        self.score = assessed.score;
        self.status = assessed.status;
        self.cached = Some(assessed);
        assessed
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    pub(crate) fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn raise_flag(
        &mut self,
        flag_type: FlagType,
        severity: Severity,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> FlagId {
        let id = FlagId::new(sequence_id(
            &format!("{}-flag", self.category.key()),
            self.flags.len() as u64 + 1,
        ));
        self.flags.push(ComplianceFlag::new(
            id.clone(),
            flag_type,
            severity,
            description,
            at,
        ));
        id
    }

    pub fn set_flag_status(
        &mut self,
        flag_id: &FlagId,
        status: FlagStatus,
        at: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        find_flag_mut(&mut self.flags, flag_id)?.set_status(status, at)
    }

    pub fn active_flags(&self) -> impl Iterator<Item = &ComplianceFlag> {
        self.flags.iter().filter(|flag| flag.status.is_active())
    }
}

/// Weighted score over assessed requirements plus the derived status.
///
/// Pending requirements carry no credit and are left out of the denominator.
/// A critical requirement that is `not-met` overrides the numeric result.
pub fn score_requirements(
    requirements: &[ComplianceRequirement],
    max_score: f32,
    warning_threshold: f32,
) -> AreaScore {
    let max_score = if max_score.is_finite() && max_score > 0.0 {
        max_score
    } else {
        DEFAULT_MAX_SCORE
    };

    let (earned, assessed_weight) = requirements
        .iter()
        .filter_map(|requirement| {
            requirement
                .status
                .credit()
                .map(|credit| (credit, requirement.effective_weight()))
        })
        .fold((0.0_f32, 0.0_f32), |(earned, total), (credit, weight)| {
            (earned + credit * weight, total + weight)
        });

    let fraction = if assessed_weight > 0.0 {
        (earned / assessed_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let percentage = round2(fraction * 100.0);
    let status = derive_status(requirements, percentage, warning_threshold);

    AreaScore {
        score: round2(fraction * max_score),
        max_score,
        percentage,
        status,
        threshold: warning_threshold,
    }
}

fn derive_status(
    requirements: &[ComplianceRequirement],
    percentage: f32,
    warning_threshold: f32,
) -> AreaStatus {
    if requirements.iter().all(|requirement| !requirement.is_assessed()) {
        return AreaStatus::NotAssessed;
    }

    if requirements
        .iter()
        .any(|requirement| requirement.critical && requirement.status == RequirementStatus::NotMet)
    {
        return AreaStatus::NonCompliant;
    }

    if requirements
        .iter()
        .all(|requirement| requirement.status == RequirementStatus::Met)
    {
        return AreaStatus::Compliant;
    }

    if percentage >= warning_threshold {
        AreaStatus::Warning
    } else {
        AreaStatus::NonCompliant
    }
}

pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
