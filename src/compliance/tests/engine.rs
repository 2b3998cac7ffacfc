use chrono::Duration;

use super::common::*;
use crate::compliance::{
    derive_risk, AreaStatus, ComplianceCategory, ComplianceEngine, CompliancePolicy,
    ComplianceStatus, EvidenceRef, ImpactLevel, IssueDraft, IssueStatus, IssueType,
    RequirementId, RequirementStatus, RiskLevel, RiskSignals, StudentComplianceRecord,
};

fn meet(record: &mut StudentComplianceRecord, category: ComplianceCategory, requirement: &str) {
    let area = record.area_mut(category).expect("area exists");
    let id = RequirementId::new(requirement);
    area.record_evidence(&id, EvidenceRef(format!("ev/{requirement}")), None, now())
        .expect("evidence");
    area.set_requirement_status(&id, RequirementStatus::Met, user("assessor-jo"), now())
        .expect("met");
}

fn fully_met_record() -> StudentComplianceRecord {
    let mut record = record();
    meet(&mut record, ComplianceCategory::Academic, "acad-enrolment");
    meet(&mut record, ComplianceCategory::Academic, "acad-training-plan");
    meet(&mut record, ComplianceCategory::WorkplaceSafety, "ws-induction");
    meet(&mut record, ComplianceCategory::WorkplaceSafety, "ws-ppe");
    record
}

#[test]
fn risk_rule_ordering() {
    assert_eq!(derive_risk(RiskSignals::default()), RiskLevel::Low);
    assert_eq!(
        derive_risk(RiskSignals {
            warning_areas: 1,
            active_major_issues: 1,
            ..RiskSignals::default()
        }),
        RiskLevel::Medium
    );
    assert_eq!(
        derive_risk(RiskSignals {
            active_major_issues: 2,
            ..RiskSignals::default()
        }),
        RiskLevel::High
    );
    assert_eq!(
        derive_risk(RiskSignals {
            non_compliant_areas: 1,
            ..RiskSignals::default()
        }),
        RiskLevel::High
    );
    assert_eq!(
        derive_risk(RiskSignals {
            active_critical_issues: 1,
            ..RiskSignals::default()
        }),
        RiskLevel::Critical
    );
}

#[test]
fn fresh_record_has_no_assessed_areas() {
    let assessment = ComplianceEngine::default().recompute(&record());

    assert_eq!(assessment.overall_score, 0.0);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(assessment.compliance_status, ComplianceStatus::Compliant);
    assert!(!assessment.escalation_required);
}

#[test]
fn fully_met_record_is_compliant() {
    let assessment = ComplianceEngine::default().recompute(&fully_met_record());

    assert_eq!(assessment.overall_score, 100.0);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(assessment.compliance_status, ComplianceStatus::Compliant);
    assert_eq!(assessment.areas.len(), 2);
}

#[test]
fn area_weights_shape_the_overall_score() {
    let mut record = fully_met_record();
    record
        .area_mut(ComplianceCategory::WorkplaceSafety)
        .expect("area")
        .set_requirement_status(
            &RequirementId::new("ws-ppe"),
            RequirementStatus::NotMet,
            user("sup-ana"),
            now(),
        )
        .expect("not met");

    let even = ComplianceEngine::default().recompute(&record);
    assert_eq!(even.overall_score, 75.0);
    assert_eq!(even.risk_level, RiskLevel::High);
    assert_eq!(even.compliance_status, ComplianceStatus::MajorIssues);

    let weighted = ComplianceEngine::new(
        CompliancePolicy::default().with_area_weight(ComplianceCategory::Academic, 3.0),
    )
    .recompute(&record);
    assert_eq!(weighted.overall_score, 87.5);
}

#[test]
fn critical_not_met_overrides_an_earlier_cached_score() {
    let mut record = fully_met_record();
    let threshold = CompliancePolicy::default().warning_threshold();
    for area in &mut record.areas {
        area.refresh(threshold);
    }

    let safety = record
        .area_mut(ComplianceCategory::WorkplaceSafety)
        .expect("area");
    assert!(safety.is_cached());
    safety
        .requirement_mut(&RequirementId::new("ws-induction"))
        .expect("requirement")
        .status = RequirementStatus::NotMet;
    assert!(!safety.is_cached());

    let assessment = ComplianceEngine::default().recompute(&record);
    let summary = assessment
        .areas
        .iter()
        .find(|area| area.category == ComplianceCategory::WorkplaceSafety)
        .expect("safety summary");
    assert_eq!(summary.status, AreaStatus::NonCompliant);
    assert_eq!(assessment.risk_level, RiskLevel::High);
}

#[test]
fn critical_issue_drives_non_compliance() {
    let mut record = fully_met_record();
    record.issues.raise(
        IssueDraft::new(
            IssueType::Critical,
            ComplianceCategory::Conduct,
            "Breach of resident privacy",
            ImpactLevel::High,
            now() + Duration::days(2),
        ),
        now(),
    );

    let assessment = ComplianceEngine::default().recompute(&record);
    assert_eq!(assessment.risk_level, RiskLevel::Critical);
    assert_eq!(assessment.compliance_status, ComplianceStatus::NonCompliant);
    assert!(assessment.escalation_required);
    assert_eq!(assessment.active_issues, 1);
}

#[test]
fn escalated_issue_requires_escalation_even_at_low_risk() {
    let mut record = fully_met_record();
    let id = record.issues.raise(
        IssueDraft::new(
            IssueType::Minor,
            ComplianceCategory::Attendance,
            "Late sign-in",
            ImpactLevel::Low,
            now() + Duration::days(2),
        ),
        now(),
    );
    record
        .issues
        .transition(&id, IssueStatus::Escalated, None, None, now())
        .expect("escalate");

    let assessment = ComplianceEngine::default().recompute(&record);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(assessment.escalated_issues, 1);
    assert!(assessment.escalation_required);
}

#[test]
fn manual_review_overrides_status_but_not_risk() {
    let mut record = fully_met_record();
    assert!(record.begin_manual_review(Some(now() + Duration::days(14))));
    assert!(!record.begin_manual_review(None));

    let assessment = ComplianceEngine::default().recompute(&record);
    assert_eq!(assessment.compliance_status, ComplianceStatus::UnderReview);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(record.next_review_date, Some(now() + Duration::days(14)));

    assert!(record.end_manual_review());
    let assessment = ComplianceEngine::default().recompute(&record);
    assert_eq!(assessment.compliance_status, ComplianceStatus::Compliant);
}

#[test]
fn recompute_is_deterministic() {
    let record = fully_met_record();
    let engine = ComplianceEngine::default();

    let first = serde_json::to_string(&engine.recompute(&record)).expect("serializes");
    let second = serde_json::to_string(&engine.recompute(&record)).expect("serializes");
    assert_eq!(first, second);
}
