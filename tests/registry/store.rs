//! Entity store behavior: field validation, parent references, guarded
//! deletes, and optimistic concurrency.

use bluemrv::core::model::{Geometry, MonitoringType, Role, SiteType};
use bluemrv::registry::{document, monitoring, profile, project, site};
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
        ("vera", Role::Verifier),
        ("vito", Role::Viewer),
    ] {
        profile::create_profile(store, Some("admin"), profile_input(user, Some(role)))
            .expect("seed profile");
    }
}

fn sample_project(store: &Store, actor: &str) -> bluemrv::core::model::Project {
    project::create_project(
        store,
        actor,
        project::ProjectInput {
            name: "Baja Mangrove Recovery".to_string(),
            location: "Baja California Sur".to_string(),
            area_hectares: Some(120.0),
            manager_user: Some("mara".to_string()),
            ..Default::default()
        },
    )
    .expect("create project")
}

fn sample_site(store: &Store, actor: &str, project_id: &str) -> bluemrv::core::model::Site {
    site::create_site(
        store,
        actor,
        site::SiteInput {
            project_id: project_id.to_string(),
            name: "North lagoon".to_string(),
            site_type: SiteType::Mangrove,
            geometry: Geometry::Point {
                coordinates: [-110.31, 24.18],
            },
            area_hectares: Some(12.5),
            depth_range: "0-2m".to_string(),
            salinity_range: "30-36 ppt".to_string(),
            accessibility_notes: String::new(),
        },
    )
    .expect("create site")
}

#[test]
fn bootstrap_admin_then_duplicate_user_rejected() {
    let (_dir, store) = new_store();
    let admin =
        profile::create_profile(&store, None, profile_input("admin", Some(Role::Admin)))
            .expect("bootstrap");
    assert_eq!(admin.role, Some(Role::Admin));

    let err = profile::create_profile(&store, Some("admin"), profile_input("admin", None))
        .expect_err("duplicate user_id");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn role_grant_requires_admin() {
    let (_dir, store) = new_store();
    seed_team(&store);
    profile::create_profile(&store, None, profile_input("nora", None)).expect("self sign-up");

    let err =
        profile::set_role(&store, "mara", "nora", Role::Viewer).expect_err("pm granting role");
    assert!(matches!(err, RegistryError::Forbidden { .. }), "{err}");

    let granted = profile::set_role(&store, "admin", "nora", Role::Viewer).expect("admin grant");
    assert_eq!(granted.role, Some(Role::Viewer));
}

#[test]
fn project_requires_name_and_valid_dates() {
    let (_dir, store) = new_store();
    seed_team(&store);

    let err = project::create_project(
        &store,
        "mara",
        project::ProjectInput {
            name: String::new(),
            location: "somewhere".to_string(),
            ..Default::default()
        },
    )
    .expect_err("empty name");
    assert!(matches!(
        err,
        RegistryError::Validation { field: "name", .. }
    ));

    let err = project::create_project(
        &store,
        "mara",
        project::ProjectInput {
            name: "Backwards".to_string(),
            location: "somewhere".to_string(),
            start_date: Some("2026-06-01".to_string()),
            end_date: Some("2025-01-01".to_string()),
            ..Default::default()
        },
    )
    .expect_err("end before start");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn negative_area_rejected() {
    let (_dir, store) = new_store();
    seed_team(&store);

    let err = project::create_project(
        &store,
        "mara",
        project::ProjectInput {
            name: "Bad area".to_string(),
            location: "somewhere".to_string(),
            area_hectares: Some(-4.0),
            ..Default::default()
        },
    )
    .expect_err("negative hectares");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn site_requires_existing_project() {
    let (_dir, store) = new_store();
    seed_team(&store);

    let err = site::create_site(
        &store,
        "mara",
        site::SiteInput {
            project_id: "no-such-project".to_string(),
            name: "Orphan".to_string(),
            site_type: SiteType::Seagrass,
            geometry: Geometry::Point {
                coordinates: [5.0, 43.0],
            },
            area_hectares: None,
            depth_range: String::new(),
            salinity_range: String::new(),
            accessibility_notes: String::new(),
        },
    )
    .expect_err("missing parent");
    assert!(matches!(err, RegistryError::NotFound { .. }), "{err}");
}

#[test]
fn stale_version_update_conflicts() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = sample_project(&store, "mara");

    let updated = project::update_project(
        &store,
        "mara",
        &p.id,
        project::ProjectPatch {
            location: Some("La Paz".to_string()),
            expected_version: p.version,
            ..Default::default()
        },
    )
    .expect("first writer wins");
    assert_eq!(updated.version, p.version + 1);

    // Second writer still holds the original version token.
    let err = project::update_project(
        &store,
        "mara",
        &p.id,
        project::ProjectPatch {
            location: Some("Loreto".to_string()),
            expected_version: p.version,
            ..Default::default()
        },
    )
    .expect_err("stale token");
    assert!(matches!(err, RegistryError::Conflict { .. }), "{err}");

    // Re-read and retry succeeds.
    let fresh = project::get_project(&store, &p.id)
        .expect("read")
        .expect("exists");
    project::update_project(
        &store,
        "mara",
        &p.id,
        project::ProjectPatch {
            location: Some("Loreto".to_string()),
            expected_version: fresh.version,
            ..Default::default()
        },
    )
    .expect("retry after re-read");
}

#[test]
fn monitoring_payload_must_match_type_schema() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = sample_project(&store, "mara");
    let s = sample_site(&store, "mara", &p.id);

    let err = monitoring::create_record(
        &store,
        "finn",
        monitoring::MonitoringInput {
            site_id: s.id.clone(),
            monitoring_type: MonitoringType::Biomass,
            measured_at: None,
            data_values: serde_json::json!({ "species_richness": 12 }),
            methodology: String::new(),
            equipment_used: String::new(),
            weather_conditions: String::new(),
        },
    )
    .expect_err("biodiversity payload on a biomass record");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");

    let record = monitoring::create_record(
        &store,
        "finn",
        monitoring::MonitoringInput {
            site_id: s.id.clone(),
            monitoring_type: MonitoringType::Biomass,
            measured_at: None,
            data_values: serde_json::json!({
                "above_ground_kg_m2": 4.2,
                "below_ground_kg_m2": 1.1,
                "plot_count": 6
            }),
            methodology: "quadrat sampling".to_string(),
            equipment_used: String::new(),
            weather_conditions: "clear".to_string(),
        },
    )
    .expect("valid payload");
    assert!(!record.verified);
    assert!(record.collected_by.is_some());
}

#[test]
fn monitoring_measurement_date_must_not_be_future() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = sample_project(&store, "mara");
    let s = sample_site(&store, "mara", &p.id);

    let future = bluemrv::core::time::now_unix_secs() + 86_400;
    let err = monitoring::create_record(
        &store,
        "finn",
        monitoring::MonitoringInput {
            site_id: s.id,
            monitoring_type: MonitoringType::WaterQuality,
            measured_at: Some(format!("{}Z", future)),
            data_values: serde_json::json!({ "temperature_c": 24.5, "salinity_psu": 34.0 }),
            methodology: String::new(),
            equipment_used: String::new(),
            weather_conditions: String::new(),
        },
    )
    .expect_err("future measurement");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn site_delete_guarded_by_monitoring_history() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = sample_project(&store, "mara");
    let s = sample_site(&store, "mara", &p.id);

    monitoring::create_record(
        &store,
        "finn",
        monitoring::MonitoringInput {
            site_id: s.id.clone(),
            monitoring_type: MonitoringType::Biomass,
            measured_at: None,
            data_values: serde_json::json!({ "above_ground_kg_m2": 2.0 }),
            methodology: String::new(),
            equipment_used: String::new(),
            weather_conditions: String::new(),
        },
    )
    .expect("record");

    let err = site::delete_site(&store, "admin", &s.id).expect_err("guarded delete");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");
}

#[test]
fn document_allows_at_most_one_parent() {
    let (_dir, store) = new_store();
    seed_team(&store);
    let p = sample_project(&store, "mara");
    let s = sample_site(&store, "mara", &p.id);

    let err = document::add_document(
        &store,
        "mara",
        document::DocumentInput {
            name: "survey.pdf".to_string(),
            file_path: None,
            file_url: Some("https://example.org/survey.pdf".to_string()),
            file_type: "application/pdf".to_string(),
            project_id: Some(p.id.clone()),
            site_id: Some(s.id.clone()),
            report_id: None,
        },
    )
    .expect_err("two parents");
    assert!(matches!(err, RegistryError::Validation { .. }), "{err}");

    let doc = document::add_document(
        &store,
        "mara",
        document::DocumentInput {
            name: "survey.pdf".to_string(),
            file_path: None,
            file_url: Some("https://example.org/survey.pdf".to_string()),
            file_type: "application/pdf".to_string(),
            project_id: Some(p.id.clone()),
            site_id: None,
            report_id: None,
        },
    )
    .expect("single parent");
    assert_eq!(doc.project_id.as_deref(), Some(p.id.as_str()));
}

#[test]
fn document_blob_ingest_and_verify() {
    let (dir, store) = new_store();
    seed_team(&store);
    let p = sample_project(&store, "mara");

    let file = dir.path().join("field-notes.txt");
    std::fs::write(&file, b"transect 3, 14 seedlings").expect("write file");

    let doc = document::add_document(
        &store,
        "mara",
        document::DocumentInput {
            name: "field notes".to_string(),
            file_path: Some(file.to_string_lossy().to_string()),
            file_url: None,
            file_type: "text/plain".to_string(),
            project_id: Some(p.id),
            site_id: None,
            report_id: None,
        },
    )
    .expect("ingest");
    assert!(doc.file_url.starts_with("blob://"), "{}", doc.file_url);
    assert_eq!(doc.file_size, Some(24));

    assert!(document::verify_document(&store, &doc.id).expect("verify"));
}
