//! Verification records and the verifier-side workflow.
//!
//! A record is opened automatically when a report enters review, walks
//! `pending -> in_progress -> {verified, rejected}`, and its terminal
//! transition is applied together with the paired report transition inside a
//! single transaction, so the pair never diverges.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{
    self, EntityKind, Profile, Report, ReportStatus, Role, VerificationRecord,
    VerificationStatus,
};
use crate::core::policy::{self, Action};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, profile, report, require_actor_id};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;

#[derive(Parser, Debug)]
#[clap(name = "verification", about = "Review reports and rule on carbon credit claims.")]
pub struct VerificationCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: VerificationCommand,
}

#[derive(Subcommand, Debug)]
pub enum VerificationCommand {
    /// Show a verification record by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List verification records filtered by report or status.
    List {
        #[clap(long)]
        report: Option<String>,
        #[clap(long, value_enum)]
        status: Option<VerificationStatus>,
    },
    /// Update findings or recommendations on an open record.
    Edit {
        #[clap(long)]
        id: String,
        /// Structured findings as JSON.
        #[clap(long)]
        findings: Option<String>,
        #[clap(long)]
        recommendations: Option<String>,
        /// Version token from the last read, for conflict detection.
        #[clap(long)]
        expected_version: i64,
    },
    /// Start working on a pending record.
    Begin {
        #[clap(long)]
        id: String,
    },
    /// Approve the record and verify its report in one step.
    Approve {
        #[clap(long)]
        id: String,
        /// Approved carbon credits in tCO2e.
        #[clap(long)]
        credits: f64,
        #[clap(long)]
        findings: Option<String>,
        #[clap(long)]
        recommendations: Option<String>,
    },
    /// Reject the record and its report in one step.
    Reject {
        #[clap(long)]
        id: String,
        #[clap(long)]
        recommendations: Option<String>,
    },
}

const SELECT_COLUMNS: &str = "id, report_id, verifier_id, verification_status, \
     carbon_credits_approved, findings, recommendations, verification_date, \
     created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(VerificationRecord, Option<String>)> {
    let record = VerificationRecord {
        id: row.get(0)?,
        report_id: row.get(1)?,
        verifier_id: row.get(2)?,
        verification_status: row.get(3)?,
        carbon_credits_approved: row.get(4)?,
        findings: None,
        recommendations: row.get(6)?,
        verification_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        version: row.get(10)?,
    };
    let raw_findings: Option<String> = row.get(5)?;
    Ok((record, raw_findings))
}

fn finish_row(
    (mut record, raw): (VerificationRecord, Option<String>),
) -> Result<VerificationRecord, RegistryError> {
    record.findings = raw.as_deref().map(serde_json::from_str).transpose()?;
    Ok(record)
}

pub(crate) fn upsert_row(conn: &Connection, v: &VerificationRecord) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO verification_records
         (id, report_id, verifier_id, verification_status, carbon_credits_approved,
          findings, recommendations, verification_date, created_at, updated_at, version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            v.id,
            v.report_id,
            v.verifier_id,
            v.verification_status,
            v.carbon_credits_approved,
            v.findings.as_ref().map(|f| f.to_string()),
            v.recommendations,
            v.verification_date,
            v.created_at,
            v.updated_at,
            v.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_row(
    conn: &Connection,
    id: &str,
) -> Result<Option<VerificationRecord>, RegistryError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM verification_records WHERE id = ?1",
                SELECT_COLUMNS
            ),
            [id],
            map_row,
        )
        .optional()
        .map_err(RegistryError::Sqlite)?;
    raw.map(finish_row).transpose()
}

fn require_row(conn: &Connection, id: &str) -> Result<VerificationRecord, RegistryError> {
    get_row(conn, id)?.ok_or_else(|| RegistryError::not_found("verification_record", id))
}

/// Most recent verification record for a report; resubmissions stack up older
/// ones, only the newest drives the report workflow.
pub(crate) fn latest_for_report(
    conn: &Connection,
    report_id: &str,
) -> Result<Option<VerificationRecord>, RegistryError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM verification_records WHERE report_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                SELECT_COLUMNS
            ),
            [report_id],
            map_row,
        )
        .optional()
        .map_err(RegistryError::Sqlite)?;
    raw.map(finish_row).transpose()
}

/// Open a pending record for a report entering review. Runs inside the
/// report-transition transaction.
pub(crate) fn open_for_report_in_tx(
    conn: &Connection,
    root: &std::path::Path,
    actor: &Profile,
    actor_user: &str,
    parent: &Report,
) -> Result<VerificationRecord, RegistryError> {
    let now = time::now_epoch_z();
    let record = VerificationRecord {
        id: time::new_record_id(),
        report_id: parent.id.clone(),
        verifier_id: actor.id.clone(),
        verification_status: VerificationStatus::Pending,
        carbon_credits_approved: None,
        findings: None,
        recommendations: String::new(),
        verification_date: None,
        created_at: now.clone(),
        updated_at: now,
        version: 1,
    };
    upsert_row(conn, &record)?;
    events::record(
        conn,
        root,
        "verification_record.create",
        EntityKind::VerificationRecord,
        Some(&record.id),
        serde_json::to_value(&record)?,
        actor_user,
    )?;
    Ok(record)
}

pub fn get_record(store: &Store, id: &str) -> Result<Option<VerificationRecord>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "verification.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_row(conn, id)
        },
    )
}

pub fn list_records(
    store: &Store,
    report_id: Option<&str>,
    status: Option<VerificationStatus>,
) -> Result<Vec<VerificationRecord>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "verification.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!(
                "SELECT {} FROM verification_records WHERE 1=1",
                SELECT_COLUMNS
            );
            let mut params: Vec<String> = Vec::new();
            if let Some(r) = report_id {
                query.push_str(" AND report_id = ?");
                params.push(r.to_string());
            }
            if let Some(s) = status {
                query.push_str(" AND verification_status = ?");
                params.push(s.as_str().to_string());
            }
            query.push_str(" ORDER BY created_at");

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(finish_row(row.map_err(RegistryError::Sqlite)?)?);
            }
            Ok(out)
        },
    )
}

#[derive(Debug, Clone, Default)]
pub struct VerificationPatch {
    pub findings: Option<JsonValue>,
    pub recommendations: Option<String>,
    pub expected_version: i64,
}

pub fn update_record(
    store: &Store,
    actor_user: &str,
    id: &str,
    patch: VerificationPatch,
) -> Result<VerificationRecord, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "verification.update",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::require_role(
                &actor,
                &[Role::Verifier, Role::Admin],
                Action::Update,
                EntityKind::VerificationRecord,
            )?;
            let tx = conn.unchecked_transaction()?;
            let mut record = require_row(conn, id)?;
            if matches!(
                record.verification_status,
                VerificationStatus::Verified | VerificationStatus::Rejected
            ) {
                return Err(RegistryError::validation(
                    "verification_record",
                    "verification_status",
                    "closed records are read-only",
                ));
            }
            if record.version != patch.expected_version {
                return Err(RegistryError::Conflict {
                    entity: "verification_record",
                    id: record.id,
                });
            }

            if patch.findings.is_some() {
                record.findings = patch.findings;
            }
            if let Some(v) = patch.recommendations {
                record.recommendations = v;
            }
            record.updated_at = time::now_epoch_z();
            record.version += 1;
            upsert_row(conn, &record)?;
            events::record(
                conn,
                &store.root,
                "verification_record.update",
                EntityKind::VerificationRecord,
                Some(&record.id),
                serde_json::to_value(&record)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(record)
        },
    )
}

fn invalid_transition(
    from: VerificationStatus,
    to: VerificationStatus,
    reason: &str,
) -> RegistryError {
    RegistryError::InvalidTransition {
        entity: "verification_record",
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
        reason: reason.to_string(),
    }
}

/// `pending -> in_progress`. The verifier on record takes it over.
pub fn begin_review(
    store: &Store,
    actor_user: &str,
    id: &str,
) -> Result<VerificationRecord, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "verification.begin",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::require_role(
                &actor,
                &[Role::Verifier, Role::Admin],
                Action::Transition,
                EntityKind::VerificationRecord,
            )?;
            let tx = conn.unchecked_transaction()?;
            let mut record = require_row(conn, id)?;
            if record.verification_status != VerificationStatus::Pending {
                return Err(invalid_transition(
                    record.verification_status,
                    VerificationStatus::InProgress,
                    "only pending records can be started",
                ));
            }
            record.verification_status = VerificationStatus::InProgress;
            record.verifier_id = actor.id.clone();
            record.updated_at = time::now_epoch_z();
            record.version += 1;
            upsert_row(conn, &record)?;
            events::record(
                conn,
                &store.root,
                "verification_record.transition",
                EntityKind::VerificationRecord,
                Some(&record.id),
                serde_json::to_value(&record)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(record)
        },
    )
}

/// Outcome of a terminal review step: the closed record and the report it
/// moved, written in the same transaction.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub record: VerificationRecord,
    pub report: Report,
}

fn close_record(
    store: &Store,
    actor_user: &str,
    op_name: &'static str,
    id: &str,
    to: VerificationStatus,
    credits: Option<f64>,
    findings: Option<JsonValue>,
    recommendations: Option<String>,
) -> Result<ReviewOutcome, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        op_name,
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::require_role(
                &actor,
                &[Role::Verifier, Role::Admin],
                Action::Transition,
                EntityKind::VerificationRecord,
            )?;

            let tx = conn.unchecked_transaction()?;
            let mut record = require_row(conn, id)?;
            if record.verification_status != VerificationStatus::InProgress {
                return Err(invalid_transition(
                    record.verification_status,
                    to,
                    "only in-progress records can be closed",
                ));
            }

            let parent = report::require_row(conn, &record.report_id)?;
            if to == VerificationStatus::Verified {
                let approved = credits.ok_or_else(|| {
                    RegistryError::validation(
                        "verification_record",
                        "carbon_credits_approved",
                        "required when approving",
                    )
                })?;
                model::validate_non_negative(
                    "verification_record",
                    "carbon_credits_approved",
                    Some(approved),
                )?;
                if let Some(estimated) = parent.carbon_credits_estimated {
                    if approved > estimated {
                        return Err(RegistryError::validation(
                            "verification_record",
                            "carbon_credits_approved",
                            format!(
                                "approved {} exceeds the report's estimate {}",
                                approved, estimated
                            ),
                        ));
                    }
                }
                record.carbon_credits_approved = Some(approved);
            }

            let now = time::now_epoch_z();
            record.verification_status = to;
            record.verification_date = Some(now.clone());
            if findings.is_some() {
                record.findings = findings;
            }
            if let Some(r) = recommendations {
                record.recommendations = r;
            }
            record.updated_at = now;
            record.version += 1;
            upsert_row(conn, &record)?;
            events::record(
                conn,
                &store.root,
                "verification_record.transition",
                EntityKind::VerificationRecord,
                Some(&record.id),
                serde_json::to_value(&record)?,
                actor_user,
            )?;

            let report_to = match to {
                VerificationStatus::Verified => ReportStatus::Verified,
                _ => ReportStatus::Rejected,
            };
            let report = report::transition_in_tx(
                conn,
                &store.root,
                &actor,
                actor_user,
                &record.report_id,
                report_to,
            )?;
            tx.commit()?;
            Ok(ReviewOutcome { record, report })
        },
    )
}

/// Approve: closes the record as verified and moves the report to verified,
/// copying the approved credit figure, atomically.
pub fn approve(
    store: &Store,
    actor_user: &str,
    id: &str,
    credits: f64,
    findings: Option<JsonValue>,
    recommendations: Option<String>,
) -> Result<ReviewOutcome, RegistryError> {
    close_record(
        store,
        actor_user,
        "verification.approve",
        id,
        VerificationStatus::Verified,
        Some(credits),
        findings,
        recommendations,
    )
}

/// Reject: closes the record as rejected and moves the report to rejected,
/// atomically.
pub fn reject(
    store: &Store,
    actor_user: &str,
    id: &str,
    recommendations: Option<String>,
) -> Result<ReviewOutcome, RegistryError> {
    close_record(
        store,
        actor_user,
        "verification.reject",
        id,
        VerificationStatus::Rejected,
        None,
        None,
        recommendations,
    )
}

fn print_record(v: &VerificationRecord, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("verification.get", "ok", serde_json::to_value(v)?)
        ),
        OutputFormat::Text => {
            let status = match v.verification_status {
                VerificationStatus::Verified => v.verification_status.as_str().green(),
                VerificationStatus::Rejected => v.verification_status.as_str().red(),
                _ => v.verification_status.as_str().yellow(),
            };
            let credits = v
                .carbon_credits_approved
                .map(|c| format!("{:.1} tCO2e approved", c))
                .unwrap_or_else(|| "no ruling yet".to_string());
            println!(
                "{}  report={}  [{}]  {}  v{}",
                v.id.dimmed(),
                v.report_id,
                status,
                credits,
                v.version
            );
        }
    }
    Ok(())
}

pub fn run_verification_cli(
    store: &Store,
    actor: Option<&str>,
    cli: VerificationCli,
) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        VerificationCommand::Get { id } => {
            let record = get_record(store, &id)?
                .ok_or_else(|| RegistryError::not_found("verification_record", &id))?;
            print_record(&record, format)?;
        }
        VerificationCommand::List { report, status } => {
            for record in list_records(store, report.as_deref(), status)? {
                print_record(&record, format)?;
            }
        }
        VerificationCommand::Edit {
            id,
            findings,
            recommendations,
            expected_version,
        } => {
            let findings = findings.as_deref().map(serde_json::from_str).transpose()?;
            let record = update_record(
                store,
                require_actor_id(actor)?,
                &id,
                VerificationPatch {
                    findings,
                    recommendations,
                    expected_version,
                },
            )?;
            print_record(&record, format)?;
        }
        VerificationCommand::Begin { id } => {
            let record = begin_review(store, require_actor_id(actor)?, &id)?;
            print_record(&record, format)?;
        }
        VerificationCommand::Approve {
            id,
            credits,
            findings,
            recommendations,
        } => {
            let findings = findings.as_deref().map(serde_json::from_str).transpose()?;
            let outcome = approve(
                store,
                require_actor_id(actor)?,
                &id,
                credits,
                findings,
                recommendations,
            )?;
            print_record(&outcome.record, format)?;
        }
        VerificationCommand::Reject {
            id,
            recommendations,
        } => {
            let outcome = reject(store, require_actor_id(actor)?, &id, recommendations)?;
            print_record(&outcome.record, format)?;
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "verification",
        "version": "1.0.0",
        "description": "Verifier-side review workflow for reports",
        "commands": [
            { "name": "get", "description": "Show a verification record" },
            { "name": "list", "description": "List verification records" },
            { "name": "edit", "description": "Update findings on an open record" },
            { "name": "begin", "description": "Start a pending review" },
            { "name": "approve", "description": "Approve credits and verify the report" },
            { "name": "reject", "description": "Reject the record and its report" }
        ],
        "storage": ["verification_records"]
    })
}
