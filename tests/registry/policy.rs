//! Role enforcement across mutations: who may create, update, and delete what.

use bluemrv::core::model::{Geometry, MonitoringType, Role, SiteType};
use bluemrv::registry::{monitoring, profile, project, site, verification};
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
        ("pete", Role::ProjectManager),
        ("finn", Role::FieldResearcher),
        ("juno", Role::FieldResearcher),
        ("vera", Role::Verifier),
        ("vito", Role::Viewer),
    ] {
        profile::create_profile(store, Some("admin"), profile_input(user, Some(role)))
            .expect("seed profile");
    }
    profile::create_profile(store, Some("admin"), profile_input("norole", None))
        .expect("roleless profile");
}

fn project_input(name: &str) -> project::ProjectInput {
    project::ProjectInput {
        name: name.to_string(),
        location: "estuary".to_string(),
        ..Default::default()
    }
}

fn monitoring_input(site_id: &str) -> monitoring::MonitoringInput {
    monitoring::MonitoringInput {
        site_id: site_id.to_string(),
        monitoring_type: MonitoringType::Biodiversity,
        measured_at: None,
        data_values: serde_json::json!({ "species_richness": 17 }),
        methodology: String::new(),
        equipment_used: String::new(),
        weather_conditions: String::new(),
    }
}

#[test]
fn viewer_blocked_admin_allowed() {
    let (_dir, store) = new_store();
    seed_team(&store);

    let err = project::create_project(&store, "vito", project_input("Viewer project"))
        .expect_err("viewer creating");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    let p = project::create_project(&store, "admin", project_input("Admin project"))
        .expect("admin creating");

    let err = project::delete_project(&store, "vito", &p.id).expect_err("viewer deleting");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    project::delete_project(&store, "admin", &p.id).expect("admin deleting");
}

#[test]
fn profiles_without_role_are_read_only() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = project::create_project(&store, "mara", project_input("Readable")).expect("project");

    // Reads are universal.
    assert!(project::get_project(&store, &p.id).expect("read").is_some());
    assert_eq!(project::list_projects(&store, None).expect("list").len(), 1);

    let err = project::create_project(&store, "norole", project_input("Nope"))
        .expect_err("roleless create");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");
}

#[test]
fn unknown_actor_is_not_found() {
    let (_dir, store) = new_store();
    seed_team(&store);

    let err = project::create_project(&store, "ghost", project_input("Haunted"))
        .expect_err("unregistered actor");
    assert!(matches!(err, RegistryError::NotFound { .. }), "{err}");
}

#[test]
fn manager_ownership_scopes_project_writes() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = project::create_project(&store, "mara", project_input("Mara's estuary"))
        .expect("project");

    // A different manager neither created nor manages it.
    let err = project::update_project(
        &store,
        "pete",
        &p.id,
        project::ProjectPatch {
            location: Some("moved".to_string()),
            expected_version: p.version,
            ..Default::default()
        },
    )
    .expect_err("foreign manager");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    project::update_project(
        &store,
        "mara",
        &p.id,
        project::ProjectPatch {
            location: Some("moved".to_string()),
            expected_version: p.version,
            ..Default::default()
        },
    )
    .expect("owning manager");
}

#[test]
fn researcher_monitoring_scope() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = project::create_project(&store, "mara", project_input("Field project"))
        .expect("project");
    let s = site::create_site(
        &store,
        "mara",
        site::SiteInput {
            project_id: p.id.clone(),
            name: "Kelp bed 7".to_string(),
            site_type: SiteType::KelpForest,
            geometry: Geometry::Point {
                coordinates: [-122.5, 36.6],
            },
            area_hectares: None,
            depth_range: "4-12m".to_string(),
            salinity_range: String::new(),
            accessibility_notes: String::new(),
        },
    )
    .expect("site");

    let rec = monitoring::create_record(&store, "finn", monitoring_input(&s.id))
        .expect("researcher records");

    // Another researcher may not rewrite finn's observation.
    let err = monitoring::update_record(
        &store,
        "juno",
        &rec.id,
        monitoring::MonitoringPatch {
            methodology: Some("revised".to_string()),
            expected_version: rec.version,
            ..Default::default()
        },
    )
    .expect_err("foreign researcher");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    monitoring::update_record(
        &store,
        "finn",
        &rec.id,
        monitoring::MonitoringPatch {
            methodology: Some("transect count".to_string()),
            expected_version: rec.version,
            ..Default::default()
        },
    )
    .expect("own record");

    // Researchers cannot create projects or sites.
    let err = project::create_project(&store, "finn", project_input("Researcher project"))
        .expect_err("researcher creating project");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");
}

#[test]
fn monitoring_verify_reserved_for_verifiers() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = project::create_project(&store, "mara", project_input("QA project"))
        .expect("project");
    let s = site::create_site(
        &store,
        "mara",
        site::SiteInput {
            project_id: p.id,
            name: "Marsh edge".to_string(),
            site_type: SiteType::SaltMarsh,
            geometry: Geometry::Point {
                coordinates: [1.5, 51.0],
            },
            area_hectares: None,
            depth_range: String::new(),
            salinity_range: String::new(),
            accessibility_notes: String::new(),
        },
    )
    .expect("site");
    let rec = monitoring::create_record(&store, "finn", monitoring_input(&s.id))
        .expect("record");

    let err = monitoring::verify_record(&store, "finn", &rec.id, "looks fine")
        .expect_err("researcher self-verifying");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    let err = monitoring::verify_record(&store, "vera", &rec.id, "   ")
        .expect_err("blank notes");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");

    let verified = monitoring::verify_record(&store, "vera", &rec.id, "cross-checked transects")
        .expect("verifier with notes");
    assert!(verified.verified);
    assert_eq!(verified.verification_notes, "cross-checked transects");
}

#[test]
fn verifier_record_edits_gated_by_role() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = project::create_project(&store, "mara", project_input("Review project"))
        .expect("project");
    let r = bluemrv::registry::report::create_report(
        &store,
        "finn",
        bluemrv::registry::report::ReportInput {
            project_id: p.id,
            title: "Annual".to_string(),
            report_type: "annual".to_string(),
            reporting_period_start: None,
            reporting_period_end: None,
            content: None,
            file_url: None,
            carbon_credits_estimated: None,
        },
    )
    .expect("report");
    bluemrv::registry::report::transition_report(
        &store,
        "finn",
        &r.id,
        bluemrv::core::model::ReportStatus::Submitted,
    )
    .expect("submit");
    bluemrv::registry::report::transition_report(
        &store,
        "vera",
        &r.id,
        bluemrv::core::model::ReportStatus::UnderReview,
    )
    .expect("review");
    let vr = verification::list_records(&store, Some(&r.id), None).expect("list")[0].clone();

    let err = verification::update_record(
        &store,
        "finn",
        &vr.id,
        verification::VerificationPatch {
            recommendations: Some("self-review".to_string()),
            expected_version: vr.version,
            ..Default::default()
        },
    )
    .expect_err("researcher editing a review");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    verification::update_record(
        &store,
        "vera",
        &vr.id,
        verification::VerificationPatch {
            recommendations: Some("densify plots next season".to_string()),
            expected_version: vr.version,
            ..Default::default()
        },
    )
    .expect("verifier editing");
}
