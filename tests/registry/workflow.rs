//! Report and verification state machines: the happy path, the off-table
//! edges, and the credit-copy invariant.

use bluemrv::core::model::{Report, ReportStatus, Role, VerificationStatus};
use bluemrv::registry::{profile, project, report, verification};
use bluemrv::{RegistryError, Store};
use tempfile::TempDir;

fn new_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    bluemrv::core::db::initialize_registry_db(dir.path()).expect("init registry");
    let store = Store::new(dir.path());
    (dir, store)
}

fn profile_input(user: &str, role: Option<Role>) -> profile::ProfileInput {
    profile::ProfileInput {
        user_id: user.to_string(),
        full_name: format!("{} person", user),
        organization: "Coastal Works".to_string(),
        email: format!("{}@coastalworks.org", user),
        phone: String::new(),
        role,
    }
}

fn seed_team(store: &Store) {
    profile::create_profile(store, None, profile_input("admin", Some(Role::Admin)))
        .expect("bootstrap admin");
    for (user, role) in [
        ("mara", Role::ProjectManager),
        ("finn", Role::FieldResearcher),
        ("juno", Role::FieldResearcher),
        ("vera", Role::Verifier),
    ] {
        profile::create_profile(store, Some("admin"), profile_input(user, Some(role)))
            .expect("seed profile");
    }
}

fn draft_report(store: &Store, author: &str, estimated: Option<f64>) -> Report {
    let p = project::create_project(
        store,
        "mara",
        project::ProjectInput {
            name: "Tidal Flats Restoration".to_string(),
            location: "Wadden Sea".to_string(),
            ..Default::default()
        },
    )
    .expect("project");
    report::create_report(
        store,
        author,
        report::ReportInput {
            project_id: p.id,
            title: "Q2 monitoring summary".to_string(),
            report_type: "monitoring_summary".to_string(),
            reporting_period_start: Some("2026-04-01".to_string()),
            reporting_period_end: Some("2026-06-30".to_string()),
            content: None,
            file_url: None,
            carbon_credits_estimated: estimated,
        },
    )
    .expect("report")
}

/// Walk a report to `under_review` and hand back the open verification record.
fn into_review(store: &Store, r: &Report) -> bluemrv::core::model::VerificationRecord {
    report::transition_report(store, "finn", &r.id, ReportStatus::Submitted).expect("submit");
    report::transition_report(store, "vera", &r.id, ReportStatus::UnderReview).expect("review");
    let records =
        verification::list_records(store, Some(&r.id), None).expect("list verifications");
    assert_eq!(records.len(), 1, "review opens exactly one record");
    records.into_iter().next().unwrap()
}

#[test]
fn full_cycle_to_verified_copies_approved_credits() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", Some(20.0));
    assert_eq!(r.status, ReportStatus::Draft);
    assert!(r.carbon_credits_verified.is_none());

    let vr = into_review(&store, &r);
    assert_eq!(vr.verification_status, VerificationStatus::Pending);

    let after_submit = report::get_report(&store, &r.id).unwrap().unwrap();
    assert!(after_submit.submitted_at.is_some());

    verification::begin_review(&store, "vera", &vr.id).expect("begin");
    let outcome =
        verification::approve(&store, "vera", &vr.id, 18.0, None, None).expect("approve");

    assert_eq!(outcome.report.status, ReportStatus::Verified);
    assert_eq!(outcome.report.carbon_credits_verified, Some(18.0));
    assert_eq!(outcome.record.carbon_credits_approved, Some(18.0));
    assert_eq!(
        outcome.record.verification_status,
        VerificationStatus::Verified
    );
    assert!(outcome.report.verified_by.is_some());
    assert!(outcome.report.verification_date.is_some());

    let total = bluemrv::registry::dashboard::verified_credit_total(&store).expect("total");
    assert_eq!(total, 18.0);
}

#[test]
fn off_table_edges_rejected() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", Some(10.0));

    // draft -> verified and draft -> under_review skip the table.
    for to in [ReportStatus::Verified, ReportStatus::UnderReview] {
        let err = report::transition_report(&store, "admin", &r.id, to)
            .expect_err("shortcut transition");
        assert!(matches!(err, RegistryError::InvalidTransition { .. }), "{err}");
    }

    // verified is terminal for the cycle.
    let vr = into_review(&store, &r);
    verification::begin_review(&store, "vera", &vr.id).expect("begin");
    verification::approve(&store, "vera", &vr.id, 10.0, None, None).expect("approve");
    for to in [ReportStatus::Draft, ReportStatus::Submitted, ReportStatus::Rejected] {
        let err = report::transition_report(&store, "admin", &r.id, to)
            .expect_err("leaving verified");
        assert!(matches!(err, RegistryError::InvalidTransition { .. }), "{err}");
    }
}

#[test]
fn verify_without_verified_record_rejected() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", Some(10.0));
    into_review(&store, &r);

    // The verification record is still pending, so the report may not close.
    let err = report::transition_report(&store, "vera", &r.id, ReportStatus::Verified)
        .expect_err("no verified record");
    assert!(matches!(err, RegistryError::InvalidTransition { .. }), "{err}");
}

#[test]
fn approval_cannot_exceed_estimate() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", Some(20.0));
    let vr = into_review(&store, &r);
    verification::begin_review(&store, "vera", &vr.id).expect("begin");

    let err = verification::approve(&store, "vera", &vr.id, 25.0, None, None)
        .expect_err("over-approval");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");

    // Nothing moved: report still under review, record still open.
    let r = report::get_report(&store, &r.id).unwrap().unwrap();
    assert_eq!(r.status, ReportStatus::UnderReview);
    assert!(r.carbon_credits_verified.is_none());
    let vr = verification::get_record(&store, &vr.id).unwrap().unwrap();
    assert_eq!(vr.verification_status, VerificationStatus::InProgress);
}

#[test]
fn negative_approval_rejected() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", None);
    let vr = into_review(&store, &r);
    verification::begin_review(&store, "vera", &vr.id).expect("begin");

    let err = verification::approve(&store, "vera", &vr.id, -3.0, None, None)
        .expect_err("negative credits");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn rejection_clears_credits_and_reopen_restarts_cycle() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", Some(15.0));
    let vr = into_review(&store, &r);
    verification::begin_review(&store, "vera", &vr.id).expect("begin");

    let outcome = verification::reject(
        &store,
        "vera",
        &vr.id,
        Some("biomass sampling too sparse".to_string()),
    )
    .expect("reject");
    assert_eq!(outcome.report.status, ReportStatus::Rejected);
    assert!(outcome.report.carbon_credits_verified.is_none());

    // Creator re-opens, edits, and resubmits.
    let reopened =
        report::transition_report(&store, "finn", &r.id, ReportStatus::Draft).expect("reopen");
    assert_eq!(reopened.status, ReportStatus::Draft);
    report::transition_report(&store, "finn", &r.id, ReportStatus::Submitted)
        .expect("resubmit");
    report::transition_report(&store, "vera", &r.id, ReportStatus::UnderReview)
        .expect("second review");

    // A second review cycle stacks a second verification record.
    let records = verification::list_records(&store, Some(&r.id), None).expect("list");
    assert_eq!(records.len(), 2);
}

#[test]
fn submit_restricted_to_creator_or_manager() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", None);

    // A different field researcher did not author it.
    let err = report::transition_report(&store, "juno", &r.id, ReportStatus::Submitted)
        .expect_err("non-author researcher");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    // A verifier has no business submitting drafts either.
    let err = report::transition_report(&store, "vera", &r.id, ReportStatus::Submitted)
        .expect_err("verifier submitting");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    report::transition_report(&store, "finn", &r.id, ReportStatus::Submitted)
        .expect("author submits");
}

#[test]
fn review_entry_requires_verifier() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", None);
    report::transition_report(&store, "finn", &r.id, ReportStatus::Submitted).expect("submit");

    let err = report::transition_report(&store, "mara", &r.id, ReportStatus::UnderReview)
        .expect_err("manager reviewing");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");
}

#[test]
fn edits_locked_outside_draft_and_rejected() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", None);
    report::transition_report(&store, "finn", &r.id, ReportStatus::Submitted).expect("submit");

    let current = report::get_report(&store, &r.id).unwrap().unwrap();
    let err = report::update_report(
        &store,
        "finn",
        &r.id,
        report::ReportPatch {
            title: Some("Sneaky edit".to_string()),
            expected_version: current.version,
            ..Default::default()
        },
    )
    .expect_err("editing a submitted report");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn pending_record_cannot_be_closed_directly() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let r = draft_report(&store, "finn", Some(5.0));
    let vr = into_review(&store, &r);

    let err = verification::approve(&store, "vera", &vr.id, 5.0, None, None)
        .expect_err("approve without begin");
    assert!(matches!(err, RegistryError::InvalidTransition { .. }), "{err}");
}
