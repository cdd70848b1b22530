//! Sites: physical monitoring locations, each belonging to exactly one
//! project.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{
    EntityKind, Geometry, Site, SiteType, validate_non_negative, validate_required,
};
use crate::core::policy::{self, Action};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, profile, project, require_actor_id};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};

#[derive(Parser, Debug)]
#[clap(name = "site", about = "Manage monitoring sites.")]
pub struct SiteCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: SiteCommand,
}

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// Register a site under a project.
    Create {
        #[clap(value_name = "NAME")]
        name: String,
        #[clap(long)]
        project: String,
        #[clap(long, value_enum)]
        site_type: SiteType,
        /// GeoJSON-style geometry (required for sites).
        #[clap(long)]
        geometry: String,
        #[clap(long)]
        area_hectares: Option<f64>,
        #[clap(long, default_value = "")]
        depth_range: String,
        #[clap(long, default_value = "")]
        salinity_range: String,
        #[clap(long, default_value = "")]
        accessibility_notes: String,
    },
    /// Show a site by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List sites filtered by project and/or site type.
    List {
        #[clap(long)]
        project: Option<String>,
        #[clap(long, value_enum)]
        site_type: Option<SiteType>,
    },
    /// Update site fields.
    Edit {
        #[clap(long)]
        id: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        area_hectares: Option<f64>,
        #[clap(long)]
        depth_range: Option<String>,
        #[clap(long)]
        salinity_range: Option<String>,
        #[clap(long)]
        accessibility_notes: Option<String>,
        /// Version token from the last read, for conflict detection.
        #[clap(long)]
        expected_version: i64,
    },
    /// Delete a site (guarded: refuses while monitoring records exist).
    Delete {
        #[clap(long)]
        id: String,
    },
}

#[derive(Debug, Clone)]
pub struct SiteInput {
    pub project_id: String,
    pub name: String,
    pub site_type: SiteType,
    pub geometry: Geometry,
    pub area_hectares: Option<f64>,
    pub depth_range: String,
    pub salinity_range: String,
    pub accessibility_notes: String,
}

#[derive(Debug, Clone, Default)]
pub struct SitePatch {
    pub name: Option<String>,
    pub area_hectares: Option<f64>,
    pub depth_range: Option<String>,
    pub salinity_range: Option<String>,
    pub accessibility_notes: Option<String>,
    pub expected_version: i64,
}

const SELECT_COLUMNS: &str = "id, project_id, name, site_type, geometry, area_hectares, \
     depth_range, salinity_range, accessibility_notes, created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        site_type: row.get(3)?,
        geometry: row.get(4)?,
        area_hectares: row.get(5)?,
        depth_range: row.get(6)?,
        salinity_range: row.get(7)?,
        accessibility_notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        version: row.get(11)?,
    })
}

pub(crate) fn upsert_row(conn: &Connection, s: &Site) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO sites
         (id, project_id, name, site_type, geometry, area_hectares, depth_range,
          salinity_range, accessibility_notes, created_at, updated_at, version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            s.id,
            s.project_id,
            s.name,
            s.site_type,
            s.geometry,
            s.area_hectares,
            s.depth_range,
            s.salinity_range,
            s.accessibility_notes,
            s.created_at,
            s.updated_at,
            s.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_row(conn: &Connection, id: &str) -> Result<Option<Site>, RegistryError> {
    conn.query_row(
        &format!("SELECT {} FROM sites WHERE id = ?1", SELECT_COLUMNS),
        [id],
        map_row,
    )
    .optional()
    .map_err(RegistryError::Sqlite)
}

pub(crate) fn require_row(conn: &Connection, id: &str) -> Result<Site, RegistryError> {
    get_row(conn, id)?.ok_or_else(|| RegistryError::not_found("site", id))
}

fn validate_fields(s: &Site) -> Result<(), RegistryError> {
    validate_required("site", "name", &s.name)?;
    validate_non_negative("site", "area_hectares", s.area_hectares)?;
    s.geometry.validate("site")
}

pub fn create_site(store: &Store, actor_user: &str, input: SiteInput) -> Result<Site, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "site.create",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let parent = project::require_row(conn, &input.project_id)?;
            policy::authorize(
                &actor,
                Action::Create,
                EntityKind::Site,
                &project::ownership_ctx(&parent),
            )?;

            let now = time::now_epoch_z();
            let site = Site {
                id: time::new_record_id(),
                project_id: parent.id,
                name: input.name,
                site_type: input.site_type,
                geometry: input.geometry,
                area_hectares: input.area_hectares,
                depth_range: input.depth_range,
                salinity_range: input.salinity_range,
                accessibility_notes: input.accessibility_notes,
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };
            validate_fields(&site)?;

            let tx = conn.unchecked_transaction()?;
            upsert_row(conn, &site)?;
            events::record(
                conn,
                &store.root,
                "site.create",
                EntityKind::Site,
                Some(&site.id),
                serde_json::to_value(&site)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(site)
        },
    )
}

pub fn get_site(store: &Store, id: &str) -> Result<Option<Site>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "site.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_row(conn, id)
        },
    )
}

pub fn list_sites(
    store: &Store,
    project_id: Option<&str>,
    site_type: Option<SiteType>,
) -> Result<Vec<Site>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "site.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!("SELECT {} FROM sites WHERE 1=1", SELECT_COLUMNS);
            let mut params: Vec<String> = Vec::new();
            if let Some(p) = project_id {
                query.push_str(" AND project_id = ?");
                params.push(p.to_string());
            }
            if let Some(t) = site_type {
                query.push_str(" AND site_type = ?");
                params.push(t.as_str().to_string());
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

pub fn update_site(
    store: &Store,
    actor_user: &str,
    id: &str,
    patch: SitePatch,
) -> Result<Site, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "site.update",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let mut site = require_row(conn, id)?;
            let parent = project::require_row(conn, &site.project_id)?;
            policy::authorize(
                &actor,
                Action::Update,
                EntityKind::Site,
                &project::ownership_ctx(&parent),
            )?;

            if site.version != patch.expected_version {
                return Err(RegistryError::Conflict {
                    entity: "site",
                    id: site.id,
                });
            }

            if let Some(v) = patch.name {
                site.name = v;
            }
            if let Some(v) = patch.area_hectares {
                site.area_hectares = Some(v);
            }
            if let Some(v) = patch.depth_range {
                site.depth_range = v;
            }
            if let Some(v) = patch.salinity_range {
                site.salinity_range = v;
            }
            if let Some(v) = patch.accessibility_notes {
                site.accessibility_notes = v;
            }
            validate_fields(&site)?;

            site.updated_at = time::now_epoch_z();
            site.version += 1;
            upsert_row(conn, &site)?;
            events::record(
                conn,
                &store.root,
                "site.update",
                EntityKind::Site,
                Some(&site.id),
                serde_json::to_value(&site)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(site)
        },
    )
}

/// Guarded delete: refuses while monitoring records reference the site.
pub fn delete_site(store: &Store, actor_user: &str, id: &str) -> Result<(), RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "site.delete",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let site = require_row(conn, id)?;
            let parent = project::require_row(conn, &site.project_id)?;
            policy::authorize(
                &actor,
                Action::Delete,
                EntityKind::Site,
                &project::ownership_ctx(&parent),
            )?;

            let records: i64 = conn.query_row(
                "SELECT COUNT(*) FROM monitoring_records WHERE site_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if records > 0 {
                return Err(RegistryError::validation(
                    "site",
                    "id",
                    format!("{} monitoring records still reference it", records),
                ));
            }

            conn.execute("DELETE FROM sites WHERE id = ?1", [id])?;
            events::record(
                conn,
                &store.root,
                "site.delete",
                EntityKind::Site,
                Some(id),
                serde_json::json!({ "id": id }),
                actor_user,
            )?;
            tx.commit()?;
            Ok(())
        },
    )
}

fn print_site(s: &Site, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("site.get", "ok", serde_json::to_value(s)?)
        ),
        OutputFormat::Text => {
            println!(
                "{}  {}  [{}]  project={}  v{}",
                s.id.dimmed(),
                s.name.bold(),
                s.site_type.as_str().cyan(),
                s.project_id,
                s.version
            );
        }
    }
    Ok(())
}

pub fn run_site_cli(store: &Store, actor: Option<&str>, cli: SiteCli) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        SiteCommand::Create {
            name,
            project,
            site_type,
            geometry,
            area_hectares,
            depth_range,
            salinity_range,
            accessibility_notes,
        } => {
            let geometry = Geometry::parse("site", &geometry)?;
            let site = create_site(
                store,
                require_actor_id(actor)?,
                SiteInput {
                    project_id: project,
                    name,
                    site_type,
                    geometry,
                    area_hectares,
                    depth_range,
                    salinity_range,
                    accessibility_notes,
                },
            )?;
            print_site(&site, format)?;
        }
        SiteCommand::Get { id } => {
            let site = get_site(store, &id)?.ok_or_else(|| RegistryError::not_found("site", &id))?;
            print_site(&site, format)?;
        }
        SiteCommand::List { project, site_type } => {
            for site in list_sites(store, project.as_deref(), site_type)? {
                print_site(&site, format)?;
            }
        }
        SiteCommand::Edit {
            id,
            name,
            area_hectares,
            depth_range,
            salinity_range,
            accessibility_notes,
            expected_version,
        } => {
            let site = update_site(
                store,
                require_actor_id(actor)?,
                &id,
                SitePatch {
                    name,
                    area_hectares,
                    depth_range,
                    salinity_range,
                    accessibility_notes,
                    expected_version,
                },
            )?;
            print_site(&site, format)?;
        }
        SiteCommand::Delete { id } => {
            delete_site(store, require_actor_id(actor)?, &id)?;
            println!("Deleted site {}", id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "site",
        "version": "1.0.0",
        "description": "Monitoring site registry",
        "commands": [
            { "name": "create", "description": "Register a site" },
            { "name": "get", "description": "Show a site" },
            { "name": "list", "description": "List sites" },
            { "name": "edit", "description": "Update site fields" },
            { "name": "delete", "description": "Guarded site delete" }
        ],
        "storage": ["sites"]
    })
}
