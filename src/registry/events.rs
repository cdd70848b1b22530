//! Registry event log.
//!
//! Every mutation appends one event to `registry.events.jsonl` and mirrors it
//! into the `registry_events` table. Events carry the post-write row snapshot,
//! so the SQLite DB can be rebuilt deterministically from the log after loss
//! or corruption.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{
    Document, EntityKind, MonitoringRecord, Profile, Project, Report, Site, VerificationRecord,
};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{document, monitoring, profile, project, report, site, verification};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, Result as SqlResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(name = "events", about = "Inspect and replay the registry event log.")]
pub struct EventsCli {
    #[clap(subcommand)]
    pub command: EventsCommand,
}

#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    /// List events, optionally filtered by entity kind and id.
    List {
        #[clap(long)]
        entity: Option<String>,
        #[clap(long)]
        id: Option<String>,
        #[clap(long, default_value = "50")]
        limit: usize,
    },
    /// Rebuild the SQLite DB deterministically from the JSONL event log.
    Rebuild,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegistryEvent {
    pub ts: String,
    pub event_id: String,
    pub event_type: String,
    pub entity: String,
    pub entity_id: Option<String>,
    pub payload: JsonValue,
    pub actor: String,
}

pub fn events_path(root: &Path) -> PathBuf {
    root.join(schemas::REGISTRY_EVENTS_NAME)
}

fn append_event(root: &Path, ev: &RegistryEvent) -> Result<(), RegistryError> {
    let path = events_path(root);
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(RegistryError::Io)?;
    writeln!(f, "{}", serde_json::to_string(ev)?).map_err(RegistryError::Io)?;
    Ok(())
}

fn insert_event(conn: &Connection, ev: &RegistryEvent) -> SqlResult<()> {
    conn.execute(
        "INSERT INTO registry_events(event_id, ts, event_type, entity, entity_id, payload, actor)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            ev.event_id,
            ev.ts,
            ev.event_type,
            ev.entity,
            ev.entity_id,
            ev.payload.to_string(),
            ev.actor
        ],
    )?;
    Ok(())
}

/// Record one mutation event: JSONL append plus table mirror, called inside
/// the mutation's transaction.
pub(crate) fn record(
    conn: &Connection,
    root: &Path,
    event_type: &str,
    entity: EntityKind,
    entity_id: Option<&str>,
    payload: JsonValue,
    actor: &str,
) -> Result<(), RegistryError> {
    let ev = RegistryEvent {
        ts: time::now_epoch_z(),
        event_id: time::new_record_id(),
        event_type: event_type.to_string(),
        entity: entity.as_str().to_string(),
        entity_id: entity_id.map(|s| s.to_string()),
        payload,
        actor: actor.to_string(),
    };
    append_event(root, &ev)?;
    insert_event(conn, &ev).map_err(RegistryError::Sqlite)?;
    Ok(())
}

pub fn list_events(
    store: &Store,
    entity: Option<&str>,
    entity_id: Option<&str>,
    limit: usize,
) -> Result<Vec<RegistryEvent>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "events.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query =
                "SELECT event_id, ts, event_type, entity, entity_id, payload, actor
                 FROM registry_events WHERE 1=1"
                    .to_string();
            let mut params: Vec<String> = Vec::new();
            if let Some(e) = entity {
                query.push_str(" AND entity = ?");
                params.push(e.to_string());
            }
            if let Some(id) = entity_id {
                query.push_str(" AND entity_id = ?");
                params.push(id.to_string());
            }
            query.push_str(" ORDER BY ts DESC, event_id DESC LIMIT ?");
            params.push(limit.to_string());

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(params.iter()),
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )?;
            let mut out = Vec::new();
            for row in rows {
                let (event_id, ts, event_type, entity, entity_id, payload, actor) =
                    row.map_err(RegistryError::Sqlite)?;
                out.push(RegistryEvent {
                    ts,
                    event_id,
                    event_type,
                    entity,
                    entity_id,
                    payload: serde_json::from_str(&payload)?,
                    actor,
                });
            }
            Ok(out)
        },
    )
}

/// Entity tables in child-first order so a full wipe honors foreign keys.
const WIPE_ORDER: &[&str] = &[
    "registry_events",
    "documents",
    "verification_records",
    "reports",
    "monitoring_records",
    "sites",
    "projects",
    "profiles",
];

fn apply_event(conn: &Connection, ev: &RegistryEvent) -> Result<(), RegistryError> {
    let verb = ev.event_type.rsplit('.').next().unwrap_or("");
    match verb {
        "create" | "update" | "transition" => match ev.entity.as_str() {
            "profile" => {
                let row: Profile = serde_json::from_value(ev.payload.clone())?;
                profile::upsert_row(conn, &row)
            }
            "project" => {
                let row: Project = serde_json::from_value(ev.payload.clone())?;
                project::upsert_row(conn, &row)
            }
            "site" => {
                let row: Site = serde_json::from_value(ev.payload.clone())?;
                site::upsert_row(conn, &row)
            }
            "monitoring_record" => {
                let row: MonitoringRecord = serde_json::from_value(ev.payload.clone())?;
                monitoring::upsert_row(conn, &row)
            }
            "report" => {
                let row: Report = serde_json::from_value(ev.payload.clone())?;
                report::upsert_row(conn, &row)
            }
            "verification_record" => {
                let row: VerificationRecord = serde_json::from_value(ev.payload.clone())?;
                verification::upsert_row(conn, &row)
            }
            "document" => {
                let row: Document = serde_json::from_value(ev.payload.clone())?;
                document::upsert_row(conn, &row)
            }
            other => Err(RegistryError::Unavailable(format!(
                "event log names unknown entity '{}'",
                other
            ))),
        },
        "delete" => {
            let Some(id) = ev.entity_id.as_deref() else {
                return Ok(());
            };
            let table = match ev.entity.as_str() {
                "profile" => "profiles",
                "project" => "projects",
                "site" => "sites",
                "monitoring_record" => "monitoring_records",
                "report" => "reports",
                "verification_record" => "verification_records",
                "document" => "documents",
                _ => return Ok(()),
            };
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
            Ok(())
        }
        // Audit-only events replay as no-ops.
        _ => Ok(()),
    }
}

/// Rebuild all entity tables by replaying the JSONL event log in order.
/// Returns the number of events applied.
pub fn rebuild_from_events(store: &Store) -> Result<usize, RegistryError> {
    let path = events_path(&store.root);
    if !path.exists() {
        return Ok(0);
    }

    let mut events = Vec::new();
    let file = fs::File::open(&path).map_err(RegistryError::Io)?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(RegistryError::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        let ev: RegistryEvent = serde_json::from_str(&line)?;
        events.push(ev);
    }

    let broker = DbBroker::new(&store.root);
    let applied = broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "events.rebuild",
        |conn| {
            db::ensure_schema(conn)?;
            let tx = conn.unchecked_transaction()?;
            for table in WIPE_ORDER {
                conn.execute(&format!("DELETE FROM {}", table), [])?;
            }
            let mut applied = 0usize;
            for ev in &events {
                insert_event(conn, ev).map_err(RegistryError::Sqlite)?;
                apply_event(conn, ev)?;
                applied += 1;
            }
            tx.commit()?;
            Ok(applied)
        },
    )?;

    Ok(applied)
}

pub fn run_events_cli(store: &Store, cli: EventsCli) -> Result<(), RegistryError> {
    match cli.command {
        EventsCommand::List { entity, id, limit } => {
            let events = list_events(store, entity.as_deref(), id.as_deref(), limit)?;
            for ev in events {
                println!(
                    "{}  {}  {}  {}",
                    ev.ts,
                    ev.event_type,
                    ev.entity_id.as_deref().unwrap_or("-"),
                    ev.actor
                );
            }
        }
        EventsCommand::Rebuild => {
            let applied = rebuild_from_events(store)?;
            println!("Rebuilt registry from {} events", applied);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "events",
        "version": "1.0.0",
        "description": "Append-only mutation log with deterministic rebuild",
        "commands": [
            { "name": "list", "description": "List recorded events" },
            { "name": "rebuild", "description": "Replay the event log into SQLite" }
        ],
        "storage": [schemas::REGISTRY_EVENTS_NAME, "registry_events"]
    })
}
