//! Dashboard rollups: counts, windows, and the verified credit total.

use bluemrv::core::model::{
    Geometry, ProjectStatus, ReportStatus, Role, SiteType,
};
use bluemrv::registry::{dashboard, profile, project, report, site, verification};
use bluemrv::Store;
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
        ("vera", Role::Verifier),
    ] {
        profile::create_profile(store, Some("admin"), profile_input(user, Some(role)))
            .expect("seed profile");
    }
}

fn make_project(store: &Store, name: &str, status: ProjectStatus) -> String {
    project::create_project(
        store,
        "mara",
        project::ProjectInput {
            name: name.to_string(),
            location: "coast".to_string(),
            status: Some(status),
            ..Default::default()
        },
    )
    .expect("project")
    .id
}

fn make_site(store: &Store, project_id: &str, name: &str, site_type: SiteType) {
    site::create_site(
        store,
        "mara",
        site::SiteInput {
            project_id: project_id.to_string(),
            name: name.to_string(),
            site_type,
            geometry: Geometry::Point {
                coordinates: [3.1, 51.3],
            },
            area_hectares: Some(2.0),
            depth_range: String::new(),
            salinity_range: String::new(),
            accessibility_notes: String::new(),
        },
    )
    .expect("site");
}

#[test]
fn counts_filter_by_status_type_and_project() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p1 = make_project(&store, "Active one", ProjectStatus::Active);
    let p2 = make_project(&store, "Planning one", ProjectStatus::Planning);
    make_project(&store, "Suspended one", ProjectStatus::Suspended);

    make_site(&store, &p1, "A", SiteType::Mangrove);
    make_site(&store, &p1, "B", SiteType::Seagrass);
    make_site(&store, &p2, "C", SiteType::Mangrove);

    assert_eq!(dashboard::project_count(&store, None).unwrap(), 3);
    assert_eq!(
        dashboard::project_count(&store, Some(ProjectStatus::Active)).unwrap(),
        1
    );
    assert_eq!(dashboard::site_count(&store, None, None).unwrap(), 3);
    assert_eq!(
        dashboard::site_count(&store, Some(SiteType::Mangrove), None).unwrap(),
        2
    );
    assert_eq!(dashboard::site_count(&store, None, Some(&p1)).unwrap(), 2);
    assert_eq!(
        dashboard::site_count(&store, Some(SiteType::Seagrass), Some(&p2)).unwrap(),
        0
    );
}

fn verified_report(store: &Store, project_id: &str, title: &str, credits: f64) {
    let r = report::create_report(
        store,
        "finn",
        report::ReportInput {
            project_id: project_id.to_string(),
            title: title.to_string(),
            report_type: "monitoring_summary".to_string(),
            reporting_period_start: None,
            reporting_period_end: None,
            content: None,
            file_url: None,
            carbon_credits_estimated: Some(credits + 10.0),
        },
    )
    .expect("report");
    report::transition_report(store, "finn", &r.id, ReportStatus::Submitted).expect("submit");
    report::transition_report(store, "vera", &r.id, ReportStatus::UnderReview).expect("review");
    let vr = verification::list_records(store, Some(&r.id), None).expect("list")[0].clone();
    verification::begin_review(store, "vera", &vr.id).expect("begin");
    verification::approve(store, "vera", &vr.id, credits, None, None).expect("approve");
}

#[test]
fn credit_total_tracks_verified_reports_only() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = make_project(&store, "Credit farm", ProjectStatus::Active);

    assert_eq!(dashboard::verified_credit_total(&store).unwrap(), 0.0);

    // A draft report with an estimate contributes nothing.
    report::create_report(
        &store,
        "finn",
        report::ReportInput {
            project_id: p.clone(),
            title: "Draft only".to_string(),
            report_type: "monitoring_summary".to_string(),
            reporting_period_start: None,
            reporting_period_end: None,
            content: None,
            file_url: None,
            carbon_credits_estimated: Some(99.0),
        },
    )
    .expect("draft");
    assert_eq!(dashboard::verified_credit_total(&store).unwrap(), 0.0);

    verified_report(&store, &p, "First verified", 12.5);
    let total = dashboard::verified_credit_total(&store).unwrap();
    assert_eq!(total, 12.5);

    // Recomputing without intervening writes is idempotent.
    assert_eq!(dashboard::verified_credit_total(&store).unwrap(), total);

    verified_report(&store, &p, "Second verified", 7.25);
    assert_eq!(dashboard::verified_credit_total(&store).unwrap(), 19.75);
}

#[test]
fn summary_counts_everything_in_window() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = make_project(&store, "Summary project", ProjectStatus::Active);
    make_site(&store, &p, "S", SiteType::SaltMarsh);
    verified_report(&store, &p, "Window report", 3.0);

    let s = dashboard::summary(&store, 30).expect("summary");
    assert_eq!(s.project_count, 1);
    assert_eq!(s.active_project_count, 1);
    assert_eq!(s.site_count, 1);
    assert_eq!(s.recent_report_count, 1);
    assert_eq!(s.verified_credit_total, 3.0);
    assert_eq!(s.report_window_days, 30);

    let wide = dashboard::summary(&store, 3650).expect("wide window");
    assert_eq!(wide.recent_report_count, 1);
}
