use chrono::Duration;

use super::common::*;
use crate::compliance::{
    AuditId, ComplianceCategory, ComplianceError, ImpactLevel, IssueDraft, IssueSource,
    IssueStatus, IssueTracker, IssueType,
};

fn draft(issue_type: IssueType, due_in_hours: i64) -> IssueDraft {
    IssueDraft::new(
        issue_type,
        ComplianceCategory::Attendance,
        "Missed two rostered shifts",
        ImpactLevel::Medium,
        now() + Duration::hours(due_in_hours),
    )
}

#[test]
fn raise_assigns_sequential_ids_in_open_state() {
    let mut tracker = IssueTracker::default();
    let first = tracker.raise(draft(IssueType::Minor, 24), now());
    let second = tracker.raise(draft(IssueType::Major, 24), now());

    assert_eq!(first.as_str(), "issue-0001");
    assert_eq!(second.as_str(), "issue-0002");
    let issue = tracker.get(&first).expect("issue exists");
    assert_eq!(issue.status, IssueStatus::Open);
    assert_eq!(issue.identified_at, now());
    assert_eq!(issue.history.len(), 1);
}

#[test]
fn lifecycle_moves_forward_only() {
    let mut tracker = IssueTracker::default();
    let id = tracker.raise(draft(IssueType::Major, 24), now());

    assert!(tracker
        .transition(&id, IssueStatus::InProgress, None, Some(user("coord-li")), now())
        .expect("open to in-progress"));
    assert!(!tracker
        .transition(&id, IssueStatus::InProgress, None, Some(user("coord-li")), now())
        .expect("repeat is a no-op"));

    let error = tracker
        .transition(&id, IssueStatus::Open, None, None, now())
        .expect_err("cannot reopen");
    assert_eq!(
        error,
        ComplianceError::InvalidTransition {
            entity: "issue",
            id: "issue-0001".to_string(),
            from: "In Progress",
            to: "Open",
        }
    );

    tracker
        .transition(&id, IssueStatus::Escalated, None, None, now())
        .expect("escalate");
    let error = tracker
        .transition(&id, IssueStatus::InProgress, None, None, now())
        .expect_err("escalated only resolves");
    assert!(matches!(error, ComplianceError::InvalidTransition { .. }));

    assert!(tracker
        .resolve(&id, "Attendance plan agreed", user("coord-li"), now())
        .expect("resolve escalated"));
    let issue = tracker.get(&id).expect("issue exists");
    assert_eq!(issue.status, IssueStatus::Resolved);
    let resolution = issue.resolution.as_ref().expect("resolution recorded");
    assert_eq!(resolution.notes, "Attendance plan agreed");
    assert_eq!(resolution.resolved_by, Some(user("coord-li")));
    assert_eq!(issue.history.len(), 4);
}

#[test]
fn resolve_needs_notes_and_is_idempotent() {
    let mut tracker = IssueTracker::default();
    let id = tracker.raise(draft(IssueType::Minor, 24), now());

    let error = tracker
        .resolve(&id, "   ", user("coord-li"), now())
        .expect_err("blank notes rejected");
    assert!(matches!(error, ComplianceError::InvalidTransition { .. }));

    assert!(tracker
        .resolve(&id, "Rostered correctly", user("coord-li"), now())
        .expect("resolve"));
    assert!(!tracker
        .resolve(&id, "Again", user("coord-li"), now())
        .expect("second resolve is a no-op"));
    assert_eq!(tracker.active().count(), 0);

    let error = tracker
        .assign(&id, user("coord-li"), now())
        .expect_err("resolved issues are closed");
    assert!(matches!(error, ComplianceError::InvalidTransition { .. }));
}

#[test]
fn assignment_and_preventive_measures_are_recorded() {
    let mut tracker = IssueTracker::default();
    let id = tracker.raise(draft(IssueType::Minor, 24), now());

    tracker
        .assign(&id, user("sup-ana"), now())
        .expect("assign");
    tracker
        .add_preventive_measure(&id, "Weekly roster check")
        .expect("measure");
    tracker
        .add_preventive_measure(&id, "Weekly roster check")
        .expect("duplicate measure ignored");

    let issue = tracker.get(&id).expect("issue exists");
    assert_eq!(issue.assigned_to, Some(user("sup-ana")));
    assert_eq!(issue.preventive_measures, vec!["Weekly roster check".to_string()]);
}

#[test]
fn overdue_major_issue_escalates_after_grace() {
    let mut tracker = IssueTracker::default();
    let major = tracker.raise(draft(IssueType::Major, -49), now() - Duration::days(5));
    let minor = tracker.raise(draft(IssueType::Minor, -49), now() - Duration::days(5));
    let recent = tracker.raise(draft(IssueType::Critical, -47), now() - Duration::days(5));

    let escalated = tracker.escalate_overdue(now(), Duration::hours(48));

    assert_eq!(escalated, vec![major.clone()]);
    assert_eq!(tracker.get(&major).expect("major").status, IssueStatus::Escalated);
    assert_eq!(tracker.get(&minor).expect("minor").status, IssueStatus::Open);
    assert_eq!(tracker.get(&recent).expect("recent").status, IssueStatus::Open);
    assert!(tracker
        .escalate_overdue(now(), Duration::hours(48))
        .is_empty());
}

#[test]
fn in_progress_issues_are_not_auto_escalated() {
    let mut tracker = IssueTracker::default();
    let id = tracker.raise(draft(IssueType::Critical, -72), now() - Duration::days(5));
    tracker
        .transition(&id, IssueStatus::InProgress, None, None, now())
        .expect("start work");

    assert!(tracker
        .escalate_overdue(now(), Duration::hours(48))
        .is_empty());
}

#[test]
fn automatic_sources_raise_once_while_active() {
    let mut tracker = IssueTracker::default();
    let source = IssueSource::AuditReadiness {
        audit: AuditId::new("audit-0001"),
    };

    let first = tracker
        .raise_once(draft(IssueType::Minor, 24).from_source(source.clone()), now())
        .expect("first raise");
    assert!(tracker
        .raise_once(draft(IssueType::Minor, 24).from_source(source.clone()), now())
        .is_none());

    tracker
        .resolve(&first, "Prep finished", user("coord-li"), now())
        .expect("resolve");
    assert!(tracker
        .raise_once(draft(IssueType::Minor, 24).from_source(source), now())
        .is_some());

    assert!(tracker.raise_once(draft(IssueType::Minor, 24), now()).is_some());
    assert!(tracker.raise_once(draft(IssueType::Minor, 24), now()).is_some());
}
