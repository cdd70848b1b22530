//! Event log: every mutation is journaled, and the database can be rebuilt
//! from the journal alone.

use bluemrv::core::model::{Geometry, MonitoringType, ReportStatus, Role, SiteType};
use bluemrv::registry::{document, events, monitoring, profile, project, report, site, verification};
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

#[test]
fn mutations_append_to_the_journal() {
    let (dir, store) = new_store();
    seed_team(&store);
    project::create_project(
        &store,
        "mara",
        project::ProjectInput {
            name: "Journaled".to_string(),
            location: "delta".to_string(),
            ..Default::default()
        },
    )
    .expect("project");

    let journal = std::fs::read_to_string(dir.path().join("registry.events.jsonl"))
        .expect("journal exists");
    // 4 profiles + 1 project.
    assert_eq!(journal.lines().count(), 5);

    let listed = events::list_events(&store, Some("project"), None, 10).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].event_type, "project.create");
    assert_eq!(listed[0].actor, "mara");
}

#[test]
fn rebuild_reproduces_entity_state() {
    let (_dir, store) = new_store();
    seed_team(&store);

    let p = project::create_project(
        &store,
        "mara",
        project::ProjectInput {
            name: "Replayable".to_string(),
            location: "bay".to_string(),
            area_hectares: Some(40.0),
            ..Default::default()
        },
    )
    .expect("project");
    let s = site::create_site(
        &store,
        "mara",
        site::SiteInput {
            project_id: p.id.clone(),
            name: "Mudflat".to_string(),
            site_type: SiteType::SaltMarsh,
            geometry: Geometry::Polygon {
                coordinates: vec![[4.0, 51.0], [4.1, 51.0], [4.1, 51.1], [4.0, 51.0]],
            },
            area_hectares: Some(3.5),
            depth_range: String::new(),
            salinity_range: String::new(),
            accessibility_notes: "boat access only".to_string(),
        },
    )
    .expect("site");
    let rec = monitoring::create_record(
        &store,
        "finn",
        monitoring::MonitoringInput {
            site_id: s.id.clone(),
            monitoring_type: MonitoringType::SoilAnalysis,
            measured_at: None,
            data_values: serde_json::json!({ "organic_matter_pct": 9.4, "nitrogen_pct": 0.6 }),
            methodology: "core sampling".to_string(),
            equipment_used: "soil corer".to_string(),
            weather_conditions: String::new(),
        },
    )
    .expect("record");

    // Run a full report cycle so the rebuild covers transitions too.
    let r = report::create_report(
        &store,
        "finn",
        report::ReportInput {
            project_id: p.id.clone(),
            title: "Replayed report".to_string(),
            report_type: "annual".to_string(),
            reporting_period_start: None,
            reporting_period_end: None,
            content: Some(serde_json::json!({ "summary": "strong season" })),
            file_url: None,
            carbon_credits_estimated: Some(8.0),
        },
    )
    .expect("report");
    report::transition_report(&store, "finn", &r.id, ReportStatus::Submitted).expect("submit");
    report::transition_report(&store, "vera", &r.id, ReportStatus::UnderReview).expect("review");
    let vr = verification::list_records(&store, Some(&r.id), None).expect("list")[0].clone();
    verification::begin_review(&store, "vera", &vr.id).expect("begin");
    verification::approve(&store, "vera", &vr.id, 6.5, None, None).expect("approve");

    let before_project = project::get_project(&store, &p.id).unwrap().unwrap();
    let before_report = report::get_report(&store, &r.id).unwrap().unwrap();
    let before_record = monitoring::get_record(&store, &rec.id).unwrap().unwrap();

    let applied = events::rebuild_from_events(&store).expect("rebuild");
    assert!(applied >= 10, "expected a full journal, applied {applied}");

    let after_project = project::get_project(&store, &p.id).unwrap().unwrap();
    assert_eq!(after_project.name, before_project.name);
    assert_eq!(after_project.area_hectares, before_project.area_hectares);
    assert_eq!(after_project.version, before_project.version);

    let after_report = report::get_report(&store, &r.id).unwrap().unwrap();
    assert_eq!(after_report.status, ReportStatus::Verified);
    assert_eq!(
        after_report.carbon_credits_verified,
        before_report.carbon_credits_verified
    );
    assert_eq!(after_report.version, before_report.version);

    let after_record = monitoring::get_record(&store, &rec.id).unwrap().unwrap();
    assert_eq!(after_record.data_values, before_record.data_values);

    let after_vr = verification::get_record(&store, &vr.id).unwrap().unwrap();
    assert_eq!(after_vr.carbon_credits_approved, Some(6.5));
}

#[test]
fn rebuild_replays_deletes() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = project::create_project(
        &store,
        "mara",
        project::ProjectInput {
            name: "With attachment".to_string(),
            location: "inlet".to_string(),
            ..Default::default()
        },
    )
    .expect("project");
    let doc = document::add_document(
        &store,
        "mara",
        document::DocumentInput {
            name: "temp.pdf".to_string(),
            file_path: None,
            file_url: Some("https://example.org/temp.pdf".to_string()),
            file_type: "application/pdf".to_string(),
            project_id: Some(p.id.clone()),
            site_id: None,
            report_id: None,
        },
    )
    .expect("document");
    document::delete_document(&store, "mara", &doc.id).expect("delete");

    events::rebuild_from_events(&store).expect("rebuild");

    assert!(document::get_document(&store, &doc.id).unwrap().is_none());
    assert!(project::get_project(&store, &p.id).unwrap().is_some());
}
