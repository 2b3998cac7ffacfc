use chrono::Duration;

use super::common::*;
use crate::compliance::{
    AuditSchedule, AuditStatus, ComplianceError, ConfirmationStatus, ItemId, PreparationStatus,
};

#[test]
fn readiness_counts_completed_preparation() {
    let mut schedule = AuditSchedule::default();
    let id = schedule.schedule(audit_draft(), now());
    let audit = schedule.get(&id).expect("audit exists");

    assert_eq!(id.as_str(), "audit-0001");
    assert_eq!(audit.status, AuditStatus::Scheduled);
    assert!((audit.readiness() - 0.667).abs() < 0.001);

    let view = audit.readiness_view(now(), Duration::hours(24));
    assert_eq!(view.hours_until, 12);
    assert!(!view.at_risk);
    assert!(!view.overdue);

    let warnings = schedule.readiness_warnings(now(), Duration::hours(24));
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].audit_id, id);
    assert!(schedule
        .readiness_warnings(now() - Duration::hours(13), Duration::hours(24))
        .is_empty());
}

#[test]
fn at_risk_once_an_incomplete_item_is_past_due() {
    let mut schedule = AuditSchedule::default();
    let id = schedule.schedule(audit_draft(), now());

    let later = now() + Duration::hours(7);
    let view = schedule
        .get(&id)
        .expect("audit exists")
        .readiness_view(later, Duration::hours(24));
    assert!(view.at_risk);

    schedule
        .update_preparation(&id, &ItemId::new("prep-roster"), PreparationStatus::Completed)
        .expect("prep done");
    assert_eq!(schedule.get(&id).expect("audit").readiness(), 1.0);
    assert!(schedule
        .readiness_warnings(later, Duration::hours(24))
        .is_empty());
}

#[test]
fn confirm_requires_every_participant() {
    let mut schedule = AuditSchedule::default();
    let id = schedule.schedule(audit_draft(), now());

    schedule
        .respond(&id, &user("stu-0042"), ConfirmationStatus::Confirmed, now())
        .expect("student confirms");
    let error = schedule
        .confirm(&id, Some(user("coord-li")), now())
        .expect_err("assessor has not confirmed");
    assert_eq!(
        error,
        ComplianceError::UnconfirmedParticipants {
            audit: id.clone(),
            pending: vec![user("assessor-jo")],
        }
    );
    assert_eq!(schedule.get(&id).expect("audit").status, AuditStatus::Scheduled);

    schedule
        .respond(&id, &user("assessor-jo"), ConfirmationStatus::Confirmed, now())
        .expect("assessor confirms");
    assert!(schedule
        .confirm(&id, Some(user("coord-li")), now())
        .expect("all confirmed"));
    assert!(!schedule
        .confirm(&id, Some(user("coord-li")), now())
        .expect("repeat is a no-op"));

    schedule
        .respond(&id, &user("assessor-jo"), ConfirmationStatus::Declined, now())
        .expect("assessor declines");
    assert_eq!(schedule.get(&id).expect("audit").status, AuditStatus::Scheduled);
}

#[test]
fn unknown_participant_cannot_respond() {
    let mut schedule = AuditSchedule::default();
    let id = schedule.schedule(audit_draft(), now());

    let error = schedule
        .respond(&id, &user("stranger"), ConfirmationStatus::Confirmed, now())
        .expect_err("not a participant");
    assert!(matches!(error, ComplianceError::NotFound { entity: "participant", .. }));
}

#[test]
fn runs_through_to_completion() {
    let mut schedule = AuditSchedule::default();
    let id = schedule.schedule(audit_draft(), now());
    for participant in ["stu-0042", "assessor-jo"] {
        schedule
            .respond(&id, &user(participant), ConfirmationStatus::Confirmed, now())
            .expect("confirm");
    }

    let error = schedule
        .complete(&id, "skipped ahead", None, now())
        .expect_err("must start first");
    assert!(matches!(error, ComplianceError::InvalidTransition { .. }));

    schedule.confirm(&id, None, now()).expect("confirm");
    schedule.start(&id, Some(user("assessor-jo")), now()).expect("start");
    schedule
        .complete(&id, "Competent in all elements", Some(user("assessor-jo")), now())
        .expect("complete");

    let audit = schedule.get(&id).expect("audit");
    assert_eq!(audit.status, AuditStatus::Completed);
    assert_eq!(audit.outcome_notes.as_deref(), Some("Competent in all elements"));
    assert!(!audit.is_overdue(now() + Duration::days(2)));

    let error = schedule
        .cancel(&id, "too late", None, now())
        .expect_err("completed audits stay completed");
    assert!(matches!(error, ComplianceError::InvalidTransition { .. }));
}

#[test]
fn reschedule_links_the_replacement_to_the_original() {
    let mut schedule = AuditSchedule::default();
    let original = schedule.schedule(audit_draft(), now());
    schedule
        .respond(&original, &user("stu-0042"), ConfirmationStatus::Confirmed, now())
        .expect("confirm");

    let new_date = now() + Duration::days(3);
    let replacement = schedule
        .reschedule(&original, new_date, Some(user("coord-li")), now())
        .expect("reschedule");

    assert_eq!(replacement.as_str(), "audit-0002");
    let old = schedule.get(&original).expect("original kept");
    assert_eq!(old.status, AuditStatus::Rescheduled);

    let new = schedule.get(&replacement).expect("replacement");
    assert_eq!(new.status, AuditStatus::Scheduled);
    assert_eq!(new.scheduled_at, new_date);
    assert_eq!(new.previous_audit_date, Some(now() + Duration::hours(12)));
    assert_eq!(new.rescheduled_from, Some(original.clone()));
    assert!(new
        .participants
        .iter()
        .all(|participant| participant.confirmation == ConfirmationStatus::Pending));

    let error = schedule
        .reschedule(&original, new_date, None, now())
        .expect_err("already rescheduled");
    assert!(matches!(error, ComplianceError::InvalidTransition { .. }));
    assert_eq!(schedule.items().len(), 2);
}

#[test]
fn overdue_lists_past_non_terminal_audits() {
    let mut schedule = AuditSchedule::default();
    let id = schedule.schedule(audit_draft(), now());
    let later = now() + Duration::hours(13);

    let overdue: Vec<_> = schedule.overdue(later).map(|audit| audit.id.clone()).collect();
    assert_eq!(overdue, vec![id.clone()]);

    schedule.cancel(&id, "placement paused", None, later).expect("cancel");
    assert_eq!(schedule.overdue(later).count(), 0);
}
