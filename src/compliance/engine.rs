//! Aggregate engine: folds areas and issues into one risk signal per student.
//!
//! `recompute` is a pure function of the record's owned sub-entities and the
//! policy. It never reads the clock and never mutates its input.

use serde::{Deserialize, Serialize};

use super::areas::{round2, AreaStatus};
use super::domain::ComplianceCategory;
use super::issues::{IssueStatus, IssueType};
use super::policy::CompliancePolicy;
use super::record::StudentComplianceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceStatus {
    Compliant,
    MinorIssues,
    MajorIssues,
    NonCompliant,
    UnderReview,
}

impl ComplianceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Compliant => "Compliant",
            Self::MinorIssues => "Minor Issues",
            Self::MajorIssues => "Major Issues",
            Self::NonCompliant => "Non-Compliant",
            Self::UnderReview => "Under Review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub const fn requires_escalation(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSummary {
    pub category: ComplianceCategory,
    pub status: AreaStatus,
    pub score: f32,
    pub max_score: f32,
    pub percentage: f32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub overall_score: f32,
    pub risk_level: RiskLevel,
    pub compliance_status: ComplianceStatus,
    pub escalation_required: bool,
    pub areas: Vec<AreaSummary>,
    pub active_issues: usize,
    pub active_major_issues: usize,
    pub escalated_issues: usize,
}

/// Inputs to the risk rule, kept separate so the thresholds read in one place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskSignals {
    pub active_critical_issues: usize,
    pub active_major_issues: usize,
    pub non_compliant_areas: usize,
    pub warning_areas: usize,
}

pub fn derive_risk(signals: RiskSignals) -> RiskLevel {
    if signals.active_critical_issues > 0 {
        RiskLevel::Critical
    } else if signals.non_compliant_areas > 0 || signals.active_major_issues >= 2 {
        RiskLevel::High
    } else if signals.warning_areas > 0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn derive_status(risk: RiskLevel, under_review: bool) -> ComplianceStatus {
    if under_review {
        return ComplianceStatus::UnderReview;
    }
    match risk {
        RiskLevel::Critical => ComplianceStatus::NonCompliant,
        RiskLevel::High => ComplianceStatus::MajorIssues,
        RiskLevel::Medium => ComplianceStatus::MinorIssues,
        RiskLevel::Low => ComplianceStatus::Compliant,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceEngine {
    policy: CompliancePolicy,
}

impl ComplianceEngine {
    pub fn new(policy: CompliancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CompliancePolicy {
        &self.policy
    }

    pub fn recompute(&self, record: &StudentComplianceRecord) -> ComplianceAssessment {
        let threshold = self.policy.warning_threshold();

        let areas: Vec<AreaSummary> = record
            .areas
            .iter()
            .map(|area| {
                let scored = area.assess(threshold);
                AreaSummary {
                    category: area.category,
                    status: scored.status,
                    score: scored.score,
                    max_score: scored.max_score,
                    percentage: scored.percentage,
                    weight: self.policy.area_weight(area.category),
                }
            })
            .collect();

        let (weighted, total_weight) = areas
            .iter()
            .filter(|area| area.status != AreaStatus::NotAssessed)
            .fold((0.0_f32, 0.0_f32), |(sum, weights), area| {
                (sum + area.percentage * area.weight, weights + area.weight)
            });
        let overall_score = if total_weight > 0.0 {
            round2(weighted / total_weight)
        } else {
            0.0
        };

        let mut signals = RiskSignals::default();
        let mut active_issues = 0;
        let mut escalated_issues = 0;
        for issue in record.issues.active() {
            active_issues += 1;
            if issue.status == IssueStatus::Escalated {
                escalated_issues += 1;
            }
            match issue.issue_type {
                IssueType::Critical => signals.active_critical_issues += 1,
                IssueType::Major => signals.active_major_issues += 1,
                IssueType::Minor => {}
            }
        }
        for area in &areas {
            match area.status {
                AreaStatus::NonCompliant => signals.non_compliant_areas += 1,
                AreaStatus::Warning => signals.warning_areas += 1,
                AreaStatus::Compliant | AreaStatus::NotAssessed => {}
            }
        }

        let risk_level = derive_risk(signals);
        let compliance_status = derive_status(risk_level, record.under_review);
        let escalation_required = risk_level.requires_escalation() || escalated_issues > 0;

        ComplianceAssessment {
            overall_score,
            risk_level,
            compliance_status,
            escalation_required,
            areas,
            active_issues,
            active_major_issues: signals.active_major_issues,
            escalated_issues,
        }
    }
}
