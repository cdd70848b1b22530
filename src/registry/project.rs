//! Projects: restoration initiatives that own sites, reports, and (through
//! sites) monitoring records.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{
    EntityKind, Geometry, Project, ProjectStatus, validate_date_order, validate_iso_date,
    validate_non_negative, validate_required,
};
use crate::core::policy::{self, Action, PolicyCtx};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, profile, require_actor_id};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};

#[derive(Parser, Debug)]
#[clap(name = "project", about = "Manage restoration projects.")]
pub struct ProjectCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Register a new project.
    Create {
        #[clap(value_name = "NAME")]
        name: String,
        #[clap(long)]
        location: String,
        /// GeoJSON-style geometry, e.g. '{"type":"Point","coordinates":[120.5,-8.2]}'.
        #[clap(long)]
        geometry: Option<String>,
        #[clap(long)]
        area_hectares: Option<f64>,
        #[clap(long, default_value = "")]
        certification_standard: String,
        #[clap(long, default_value = "")]
        methodology: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long, value_enum)]
        status: Option<ProjectStatus>,
        #[clap(long)]
        start_date: Option<String>,
        #[clap(long)]
        end_date: Option<String>,
        /// User id of the managing profile.
        #[clap(long)]
        manager: Option<String>,
    },
    /// Show a project by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List projects, optionally filtered by status.
    List {
        #[clap(long, value_enum)]
        status: Option<ProjectStatus>,
    },
    /// Update project fields.
    Edit {
        #[clap(long)]
        id: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        location: Option<String>,
        #[clap(long)]
        area_hectares: Option<f64>,
        #[clap(long, value_enum)]
        status: Option<ProjectStatus>,
        #[clap(long)]
        start_date: Option<String>,
        #[clap(long)]
        end_date: Option<String>,
        /// Version token from the last read, for conflict detection.
        #[clap(long)]
        expected_version: i64,
    },
    /// Delete a project (guarded: refuses while sites or reports exist).
    Delete {
        #[clap(long)]
        id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ProjectInput {
    pub name: String,
    pub location: String,
    pub geometry: Option<Geometry>,
    pub area_hectares: Option<f64>,
    pub certification_standard: String,
    pub methodology: String,
    pub description: String,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub manager_user: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub area_hectares: Option<f64>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub expected_version: i64,
}

const SELECT_COLUMNS: &str = "id, name, location, geometry, area_hectares, certification_standard, \
     methodology, description, status, start_date, end_date, created_by, project_manager_id, \
     created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        geometry: row.get(3)?,
        area_hectares: row.get(4)?,
        certification_standard: row.get(5)?,
        methodology: row.get(6)?,
        description: row.get(7)?,
        status: row.get(8)?,
        start_date: row.get(9)?,
        end_date: row.get(10)?,
        created_by: row.get(11)?,
        project_manager_id: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        version: row.get(15)?,
    })
}

pub(crate) fn upsert_row(conn: &Connection, p: &Project) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO projects
         (id, name, location, geometry, area_hectares, certification_standard, methodology,
          description, status, start_date, end_date, created_by, project_manager_id,
          created_at, updated_at, version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            p.id,
            p.name,
            p.location,
            p.geometry,
            p.area_hectares,
            p.certification_standard,
            p.methodology,
            p.description,
            p.status,
            p.start_date,
            p.end_date,
            p.created_by,
            p.project_manager_id,
            p.created_at,
            p.updated_at,
            p.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_row(conn: &Connection, id: &str) -> Result<Option<Project>, RegistryError> {
    conn.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", SELECT_COLUMNS),
        [id],
        map_row,
    )
    .optional()
    .map_err(RegistryError::Sqlite)
}

pub(crate) fn require_row(conn: &Connection, id: &str) -> Result<Project, RegistryError> {
    get_row(conn, id)?.ok_or_else(|| RegistryError::not_found("project", id))
}

pub(crate) fn ownership_ctx(project: &Project) -> PolicyCtx {
    PolicyCtx {
        created_by: project.created_by.clone(),
        project_manager_id: project.project_manager_id.clone(),
        ..Default::default()
    }
}

fn validate_fields(p: &Project) -> Result<(), RegistryError> {
    validate_required("project", "name", &p.name)?;
    validate_required("project", "location", &p.location)?;
    validate_non_negative("project", "area_hectares", p.area_hectares)?;
    if let Some(geometry) = &p.geometry {
        geometry.validate("project")?;
    }
    if let Some(d) = p.start_date.as_deref() {
        validate_iso_date("project", "start_date", d)?;
    }
    if let Some(d) = p.end_date.as_deref() {
        validate_iso_date("project", "end_date", d)?;
    }
    validate_date_order(
        "project",
        "end_date",
        p.start_date.as_deref(),
        p.end_date.as_deref(),
    )
}

pub fn create_project(
    store: &Store,
    actor_user: &str,
    input: ProjectInput,
) -> Result<Project, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "project.create",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::authorize(&actor, Action::Create, EntityKind::Project, &PolicyCtx::default())?;

            let manager_id = match input.manager_user.as_deref() {
                Some(user) => Some(
                    profile::get_by_user(conn, user)?
                        .ok_or_else(|| RegistryError::not_found("profile", user))?
                        .id,
                ),
                None => None,
            };

            let now = time::now_epoch_z();
            let project = Project {
                id: time::new_record_id(),
                name: input.name,
                location: input.location,
                geometry: input.geometry,
                area_hectares: input.area_hectares,
                certification_standard: input.certification_standard,
                methodology: input.methodology,
                description: input.description,
                status: input.status.unwrap_or(ProjectStatus::Planning),
                start_date: input.start_date,
                end_date: input.end_date,
                created_by: Some(actor.id.clone()),
                project_manager_id: manager_id,
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };
            validate_fields(&project)?;

            let tx = conn.unchecked_transaction()?;
            upsert_row(conn, &project)?;
            events::record(
                conn,
                &store.root,
                "project.create",
                EntityKind::Project,
                Some(&project.id),
                serde_json::to_value(&project)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(project)
        },
    )
}

pub fn get_project(store: &Store, id: &str) -> Result<Option<Project>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "project.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_row(conn, id)
        },
    )
}

pub fn list_projects(
    store: &Store,
    status: Option<ProjectStatus>,
) -> Result<Vec<Project>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "project.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!("SELECT {} FROM projects", SELECT_COLUMNS);
            let mut params: Vec<String> = Vec::new();
            if let Some(status) = status {
                query.push_str(" WHERE status = ?");
                params.push(status.as_str().to_string());
            }
            query.push_str(" ORDER BY created_at");

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(RegistryError::Sqlite)?);
            }
            Ok(out)
        },
    )
}

pub fn update_project(
    store: &Store,
    actor_user: &str,
    id: &str,
    patch: ProjectPatch,
) -> Result<Project, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "project.update",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let mut project = require_row(conn, id)?;
            policy::authorize(
                &actor,
                Action::Update,
                EntityKind::Project,
                &ownership_ctx(&project),
            )?;

            if project.version != patch.expected_version {
                return Err(RegistryError::Conflict {
                    entity: "project",
                    id: project.id,
                });
            }

            if let Some(v) = patch.name {
                project.name = v;
            }
            if let Some(v) = patch.location {
                project.location = v;
            }
            if let Some(v) = patch.area_hectares {
                project.area_hectares = Some(v);
            }
            if let Some(v) = patch.status {
                // Project status has no enforced state machine, only the enum.
                project.status = v;
            }
            if let Some(v) = patch.start_date {
                project.start_date = Some(v);
            }
            if let Some(v) = patch.end_date {
                project.end_date = Some(v);
            }
            validate_fields(&project)?;

            project.updated_at = time::now_epoch_z();
            project.version += 1;
            upsert_row(conn, &project)?;
            events::record(
                conn,
                &store.root,
                "project.update",
                EntityKind::Project,
                Some(&project.id),
                serde_json::to_value(&project)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(project)
        },
    )
}

/// Guarded delete: refuses while child sites or reports exist, so
/// carbon-credit history is never orphaned silently.
pub fn delete_project(store: &Store, actor_user: &str, id: &str) -> Result<(), RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "project.delete",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let project = require_row(conn, id)?;
            policy::authorize(
                &actor,
                Action::Delete,
                EntityKind::Project,
                &ownership_ctx(&project),
            )?;

            let sites: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sites WHERE project_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            let reports: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE project_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if sites > 0 || reports > 0 {
                return Err(RegistryError::validation(
                    "project",
                    "id",
                    format!("{} sites and {} reports still reference it", sites, reports),
                ));
            }

            conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
            events::record(
                conn,
                &store.root,
                "project.delete",
                EntityKind::Project,
                Some(id),
                serde_json::json!({ "id": id }),
                actor_user,
            )?;
            tx.commit()?;
            Ok(())
        },
    )
}

fn print_project(p: &Project, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("project.get", "ok", serde_json::to_value(p)?)
        ),
        OutputFormat::Text => {
            println!(
                "{}  {}  [{}]  {}  v{}",
                p.id.dimmed(),
                p.name.bold(),
                p.status.as_str().cyan(),
                p.location,
                p.version
            );
        }
    }
    Ok(())
}

pub fn run_project_cli(
    store: &Store,
    actor: Option<&str>,
    cli: ProjectCli,
) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        ProjectCommand::Create {
            name,
            location,
            geometry,
            area_hectares,
            certification_standard,
            methodology,
            description,
            status,
            start_date,
            end_date,
            manager,
        } => {
            let geometry = geometry
                .as_deref()
                .map(|raw| Geometry::parse("project", raw))
                .transpose()?;
            let project = create_project(
                store,
                require_actor_id(actor)?,
                ProjectInput {
                    name,
                    location,
                    geometry,
                    area_hectares,
                    certification_standard,
                    methodology,
                    description,
                    status,
                    start_date,
                    end_date,
                    manager_user: manager,
                },
            )?;
            print_project(&project, format)?;
        }
        ProjectCommand::Get { id } => {
            let project =
                get_project(store, &id)?.ok_or_else(|| RegistryError::not_found("project", &id))?;
            print_project(&project, format)?;
        }
        ProjectCommand::List { status } => {
            for project in list_projects(store, status)? {
                print_project(&project, format)?;
            }
        }
        ProjectCommand::Edit {
            id,
            name,
            location,
            area_hectares,
            status,
            start_date,
            end_date,
            expected_version,
        } => {
            let project = update_project(
                store,
                require_actor_id(actor)?,
                &id,
                ProjectPatch {
                    name,
                    location,
                    area_hectares,
                    status,
                    start_date,
                    end_date,
                    expected_version,
                },
            )?;
            print_project(&project, format)?;
        }
        ProjectCommand::Delete { id } => {
            delete_project(store, require_actor_id(actor)?, &id)?;
            println!("Deleted project {}", id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "project",
        "version": "1.0.0",
        "description": "Restoration project registry",
        "commands": [
            { "name": "create", "description": "Register a project" },
            { "name": "get", "description": "Show a project" },
            { "name": "list", "description": "List projects" },
            { "name": "edit", "description": "Update project fields" },
            { "name": "delete", "description": "Guarded project delete" }
        ],
        "storage": ["projects"]
    })
}
