//! Monitoring records: field observations captured at a site.
//!
//! The `data_values` payload is validated against the schema selected by
//! `monitoring_type` before anything is written. The `verified` flag here is
//! independent of the report/verification workflow; see DESIGN.md.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{DataValues, EntityKind, MonitoringRecord, MonitoringType, Role};
use crate::core::policy::{self, Action, PolicyCtx};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, profile, site, require_actor_id};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;

#[derive(Parser, Debug)]
#[clap(name = "monitoring", about = "Capture and review field monitoring data.")]
pub struct MonitoringCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: MonitoringCommand,
}

#[derive(Subcommand, Debug)]
pub enum MonitoringCommand {
    /// Record a field observation at a site.
    Create {
        #[clap(long)]
        site: String,
        #[clap(long, value_enum)]
        monitoring_type: MonitoringType,
        /// Unix-epoch seconds of the measurement (defaults to now).
        #[clap(long)]
        measured_at: Option<String>,
        /// JSON payload matching the monitoring type's schema.
        #[clap(long)]
        data: String,
        #[clap(long, default_value = "")]
        methodology: String,
        #[clap(long, default_value = "")]
        equipment: String,
        #[clap(long, default_value = "")]
        weather: String,
    },
    /// Show a monitoring record by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List records filtered by site, type, and measurement window.
    List {
        #[clap(long)]
        site: Option<String>,
        #[clap(long, value_enum)]
        monitoring_type: Option<MonitoringType>,
        /// Earliest measurement (epoch seconds), inclusive.
        #[clap(long)]
        from: Option<String>,
        /// Latest measurement (epoch seconds), inclusive.
        #[clap(long)]
        to: Option<String>,
    },
    /// Update an unverified record's payload or context fields.
    Edit {
        #[clap(long)]
        id: String,
        /// Replacement JSON payload (validated against the record's type).
        #[clap(long)]
        data: Option<String>,
        #[clap(long)]
        methodology: Option<String>,
        #[clap(long)]
        equipment: Option<String>,
        #[clap(long)]
        weather: Option<String>,
        /// Version token from the last read, for conflict detection.
        #[clap(long)]
        expected_version: i64,
    },
    /// Mark a record as QA-verified (verifier or admin, notes required).
    Verify {
        #[clap(long)]
        id: String,
        #[clap(long)]
        notes: String,
    },
    /// Delete a monitoring record.
    Delete {
        #[clap(long)]
        id: String,
    },
}

#[derive(Debug, Clone)]
pub struct MonitoringInput {
    pub site_id: String,
    pub monitoring_type: MonitoringType,
    /// Epoch seconds; `None` means "now".
    pub measured_at: Option<String>,
    pub data_values: JsonValue,
    pub methodology: String,
    pub equipment_used: String,
    pub weather_conditions: String,
}

#[derive(Debug, Clone, Default)]
pub struct MonitoringPatch {
    pub data_values: Option<JsonValue>,
    pub methodology: Option<String>,
    pub equipment_used: Option<String>,
    pub weather_conditions: Option<String>,
    pub expected_version: i64,
}

const SELECT_COLUMNS: &str = "id, site_id, monitoring_type, measurement_date, data_values, \
     methodology, equipment_used, weather_conditions, collected_by, verified, \
     verification_notes, created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(MonitoringRecord, String)> {
    let record = MonitoringRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        monitoring_type: row.get(2)?,
        measurement_date: row.get(3)?,
        data_values: JsonValue::Null,
        methodology: row.get(5)?,
        equipment_used: row.get(6)?,
        weather_conditions: row.get(7)?,
        collected_by: row.get(8)?,
        verified: row.get::<_, i64>(9)? != 0,
        verification_notes: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        version: row.get(13)?,
    };
    let raw_values: String = row.get(4)?;
    Ok((record, raw_values))
}

fn finish_row((mut record, raw): (MonitoringRecord, String)) -> Result<MonitoringRecord, RegistryError> {
    record.data_values = serde_json::from_str(&raw)?;
    Ok(record)
}

pub(crate) fn upsert_row(conn: &Connection, m: &MonitoringRecord) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO monitoring_records
         (id, site_id, monitoring_type, measurement_date, data_values, methodology,
          equipment_used, weather_conditions, collected_by, verified, verification_notes,
          created_at, updated_at, version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            m.id,
            m.site_id,
            m.monitoring_type,
            m.measurement_date,
            m.data_values.to_string(),
            m.methodology,
            m.equipment_used,
            m.weather_conditions,
            m.collected_by,
            m.verified as i64,
            m.verification_notes,
            m.created_at,
            m.updated_at,
            m.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_row(
    conn: &Connection,
    id: &str,
) -> Result<Option<MonitoringRecord>, RegistryError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM monitoring_records WHERE id = ?1",
                SELECT_COLUMNS
            ),
            [id],
            map_row,
        )
        .optional()
        .map_err(RegistryError::Sqlite)?;
    raw.map(finish_row).transpose()
}

fn require_row(conn: &Connection, id: &str) -> Result<MonitoringRecord, RegistryError> {
    get_row(conn, id)?.ok_or_else(|| RegistryError::not_found("monitoring_record", id))
}

fn normalize_measured_at(value: Option<&str>) -> Result<String, RegistryError> {
    let Some(raw) = value else {
        return Ok(time::now_epoch_z());
    };
    let secs = time::parse_epoch_z(raw).ok_or_else(|| {
        RegistryError::validation(
            "monitoring_record",
            "measurement_date",
            format!("'{}' is not epoch seconds", raw),
        )
    })?;
    if secs > time::now_unix_secs() {
        return Err(RegistryError::validation(
            "monitoring_record",
            "measurement_date",
            "measurement date is in the future",
        ));
    }
    Ok(format!("{}Z", secs))
}

pub fn create_record(
    store: &Store,
    actor_user: &str,
    input: MonitoringInput,
) -> Result<MonitoringRecord, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "monitoring.create",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::authorize(
                &actor,
                Action::Create,
                EntityKind::MonitoringRecord,
                &PolicyCtx::default(),
            )?;
            let parent = site::require_row(conn, &input.site_id)?;

            DataValues::parse(input.monitoring_type, &input.data_values)?;
            let measurement_date = normalize_measured_at(input.measured_at.as_deref())?;

            let now = time::now_epoch_z();
            let record = MonitoringRecord {
                id: time::new_record_id(),
                site_id: parent.id,
                monitoring_type: input.monitoring_type,
                measurement_date,
                data_values: input.data_values,
                methodology: input.methodology,
                equipment_used: input.equipment_used,
                weather_conditions: input.weather_conditions,
                collected_by: Some(actor.id.clone()),
                verified: false,
                verification_notes: String::new(),
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };

            let tx = conn.unchecked_transaction()?;
            upsert_row(conn, &record)?;
            events::record(
                conn,
                &store.root,
                "monitoring_record.create",
                EntityKind::MonitoringRecord,
                Some(&record.id),
                serde_json::to_value(&record)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(record)
        },
    )
}

pub fn get_record(store: &Store, id: &str) -> Result<Option<MonitoringRecord>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "monitoring.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_row(conn, id)
        },
    )
}

pub fn list_records(
    store: &Store,
    site_id: Option<&str>,
    monitoring_type: Option<MonitoringType>,
    from_secs: Option<u64>,
    to_secs: Option<u64>,
) -> Result<Vec<MonitoringRecord>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "monitoring.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!(
                "SELECT {} FROM monitoring_records WHERE 1=1",
                SELECT_COLUMNS
            );
            let mut params: Vec<String> = Vec::new();
            if let Some(s) = site_id {
                query.push_str(" AND site_id = ?");
                params.push(s.to_string());
            }
            if let Some(t) = monitoring_type {
                query.push_str(" AND monitoring_type = ?");
                params.push(t.as_str().to_string());
            }
            query.push_str(" ORDER BY measurement_date");

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_row)?;
            let mut out = Vec::new();
            for row in rows {
                let record = finish_row(row.map_err(RegistryError::Sqlite)?)?;
                let secs = time::parse_epoch_z(&record.measurement_date).unwrap_or(0);
                if from_secs.is_some_and(|f| secs < f) || to_secs.is_some_and(|t| secs > t) {
                    continue;
                }
                out.push(record);
            }
            Ok(out)
        },
    )
}

pub fn update_record(
    store: &Store,
    actor_user: &str,
    id: &str,
    patch: MonitoringPatch,
) -> Result<MonitoringRecord, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "monitoring.update",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let mut record = require_row(conn, id)?;
            let ctx = PolicyCtx {
                collected_by: record.collected_by.clone(),
                ..Default::default()
            };
            policy::authorize(&actor, Action::Update, EntityKind::MonitoringRecord, &ctx)?;

            if record.version != patch.expected_version {
                return Err(RegistryError::Conflict {
                    entity: "monitoring_record",
                    id: record.id,
                });
            }

            if let Some(values) = patch.data_values {
                DataValues::parse(record.monitoring_type, &values)?;
                record.data_values = values;
            }
            if let Some(v) = patch.methodology {
                record.methodology = v;
            }
            if let Some(v) = patch.equipment_used {
                record.equipment_used = v;
            }
            if let Some(v) = patch.weather_conditions {
                record.weather_conditions = v;
            }

            record.updated_at = time::now_epoch_z();
            record.version += 1;
            upsert_row(conn, &record)?;
            events::record(
                conn,
                &store.root,
                "monitoring_record.update",
                EntityKind::MonitoringRecord,
                Some(&record.id),
                serde_json::to_value(&record)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(record)
        },
    )
}

/// QA-verify a monitoring record. Notes are mandatory so `verified = true`
/// always has an audit trail.
pub fn verify_record(
    store: &Store,
    actor_user: &str,
    id: &str,
    notes: &str,
) -> Result<MonitoringRecord, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "monitoring.verify",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::require_role(
                &actor,
                &[Role::Verifier, Role::Admin],
                Action::Update,
                EntityKind::MonitoringRecord,
            )?;
            if notes.trim().is_empty() {
                return Err(RegistryError::validation(
                    "monitoring_record",
                    "verification_notes",
                    "must not be empty when marking verified",
                ));
            }

            let tx = conn.unchecked_transaction()?;
            let mut record = require_row(conn, id)?;
            record.verified = true;
            record.verification_notes = notes.to_string();
            record.updated_at = time::now_epoch_z();
            record.version += 1;
            upsert_row(conn, &record)?;
            events::record(
                conn,
                &store.root,
                "monitoring_record.update",
                EntityKind::MonitoringRecord,
                Some(&record.id),
                serde_json::to_value(&record)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(record)
        },
    )
}

pub fn delete_record(store: &Store, actor_user: &str, id: &str) -> Result<(), RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "monitoring.delete",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let record = require_row(conn, id)?;
            let ctx = PolicyCtx {
                collected_by: record.collected_by.clone(),
                ..Default::default()
            };
            policy::authorize(&actor, Action::Delete, EntityKind::MonitoringRecord, &ctx)?;

            conn.execute("DELETE FROM monitoring_records WHERE id = ?1", [id])?;
            events::record(
                conn,
                &store.root,
                "monitoring_record.delete",
                EntityKind::MonitoringRecord,
                Some(id),
                serde_json::json!({ "id": id }),
                actor_user,
            )?;
            tx.commit()?;
            Ok(())
        },
    )
}

fn print_record(m: &MonitoringRecord, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("monitoring.get", "ok", serde_json::to_value(m)?)
        ),
        OutputFormat::Text => {
            let flag = if m.verified { "verified".green() } else { "unverified".yellow() };
            println!(
                "{}  {}  site={}  at={}  {}  v{}",
                m.id.dimmed(),
                m.monitoring_type.as_str().bold(),
                m.site_id,
                m.measurement_date,
                flag,
                m.version
            );
        }
    }
    Ok(())
}

pub fn run_monitoring_cli(
    store: &Store,
    actor: Option<&str>,
    cli: MonitoringCli,
) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        MonitoringCommand::Create {
            site,
            monitoring_type,
            measured_at,
            data,
            methodology,
            equipment,
            weather,
        } => {
            let data_values: JsonValue = serde_json::from_str(&data)?;
            let record = create_record(
                store,
                require_actor_id(actor)?,
                MonitoringInput {
                    site_id: site,
                    monitoring_type,
                    measured_at,
                    data_values,
                    methodology,
                    equipment_used: equipment,
                    weather_conditions: weather,
                },
            )?;
            print_record(&record, format)?;
        }
        MonitoringCommand::Get { id } => {
            let record = get_record(store, &id)?
                .ok_or_else(|| RegistryError::not_found("monitoring_record", &id))?;
            print_record(&record, format)?;
        }
        MonitoringCommand::List {
            site,
            monitoring_type,
            from,
            to,
        } => {
            let from_secs = from.as_deref().and_then(time::parse_epoch_z);
            let to_secs = to.as_deref().and_then(time::parse_epoch_z);
            for record in
                list_records(store, site.as_deref(), monitoring_type, from_secs, to_secs)?
            {
                print_record(&record, format)?;
            }
        }
        MonitoringCommand::Edit {
            id,
            data,
            methodology,
            equipment,
            weather,
            expected_version,
        } => {
            let data_values = data.as_deref().map(serde_json::from_str).transpose()?;
            let record = update_record(
                store,
                require_actor_id(actor)?,
                &id,
                MonitoringPatch {
                    data_values,
                    methodology,
                    equipment_used: equipment,
                    weather_conditions: weather,
                    expected_version,
                },
            )?;
            print_record(&record, format)?;
        }
        MonitoringCommand::Verify { id, notes } => {
            let record = verify_record(store, require_actor_id(actor)?, &id, &notes)?;
            print_record(&record, format)?;
        }
        MonitoringCommand::Delete { id } => {
            delete_record(store, require_actor_id(actor)?, &id)?;
            println!("Deleted monitoring record {}", id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "monitoring",
        "version": "1.0.0",
        "description": "Field monitoring data capture with typed payloads",
        "commands": [
            { "name": "create", "description": "Record an observation" },
            { "name": "get", "description": "Show a record" },
            { "name": "list", "description": "List records" },
            { "name": "edit", "description": "Update an unverified record" },
            { "name": "verify", "description": "QA-verify a record" },
            { "name": "delete", "description": "Delete a record" }
        ],
        "storage": ["monitoring_records"]
    })
}
