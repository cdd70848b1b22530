//! Reports and the report review workflow.
//!
//! The state machine is `draft -> submitted -> under_review -> {verified,
//! rejected}`, with `rejected -> draft` re-opening the cycle. Every edge has
//! its own role gate, and the `under_review` exits are driven by the latest
//! verification record for the report. `carbon_credits_verified` is only ever
//! written by the `under_review -> verified` edge.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{
    self, EntityKind, Profile, Report, ReportStatus, Role, VerificationStatus,
};
use crate::core::policy::{self, Action, PolicyCtx};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, profile, project, require_actor_id, verification};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;

#[derive(Parser, Debug)]
#[clap(name = "report", about = "Author reports and drive their review workflow.")]
pub struct ReportCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: ReportCommand,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Create a draft report for a project.
    Create {
        #[clap(long)]
        project: String,
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "monitoring_summary")]
        report_type: String,
        /// Reporting period start, YYYY-MM-DD.
        #[clap(long)]
        period_start: Option<String>,
        /// Reporting period end, YYYY-MM-DD.
        #[clap(long)]
        period_end: Option<String>,
        /// Structured report body as JSON.
        #[clap(long)]
        content: Option<String>,
        #[clap(long)]
        file_url: Option<String>,
        #[clap(long)]
        credits_estimated: Option<f64>,
    },
    /// Show a report by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List reports filtered by project or status.
    List {
        #[clap(long)]
        project: Option<String>,
        #[clap(long, value_enum)]
        status: Option<ReportStatus>,
    },
    /// Update a draft or rejected report.
    Edit {
        #[clap(long)]
        id: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        report_type: Option<String>,
        #[clap(long)]
        period_start: Option<String>,
        #[clap(long)]
        period_end: Option<String>,
        #[clap(long)]
        content: Option<String>,
        #[clap(long)]
        file_url: Option<String>,
        #[clap(long)]
        credits_estimated: Option<f64>,
        /// Version token from the last read, for conflict detection.
        #[clap(long)]
        expected_version: i64,
    },
    /// Submit a draft report for review.
    Submit {
        #[clap(long)]
        id: String,
    },
    /// Take a submitted report into review (creates a verification record).
    Review {
        #[clap(long)]
        id: String,
    },
    /// Re-open a rejected report as a draft.
    Reopen {
        #[clap(long)]
        id: String,
    },
    /// Delete a report.
    Delete {
        #[clap(long)]
        id: String,
    },
}

#[derive(Debug, Clone)]
pub struct ReportInput {
    pub project_id: String,
    pub title: String,
    pub report_type: String,
    pub reporting_period_start: Option<String>,
    pub reporting_period_end: Option<String>,
    pub content: Option<JsonValue>,
    pub file_url: Option<String>,
    pub carbon_credits_estimated: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub title: Option<String>,
    pub report_type: Option<String>,
    pub reporting_period_start: Option<String>,
    pub reporting_period_end: Option<String>,
    pub content: Option<JsonValue>,
    pub file_url: Option<String>,
    pub carbon_credits_estimated: Option<f64>,
    pub expected_version: i64,
}

const SELECT_COLUMNS: &str = "id, project_id, title, report_type, reporting_period_start, \
     reporting_period_end, content, file_url, carbon_credits_estimated, \
     carbon_credits_verified, status, created_by, submitted_at, verified_by, \
     verification_date, created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Report, Option<String>)> {
    let report = Report {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        report_type: row.get(3)?,
        reporting_period_start: row.get(4)?,
        reporting_period_end: row.get(5)?,
        content: None,
        file_url: row.get(7)?,
        carbon_credits_estimated: row.get(8)?,
        carbon_credits_verified: row.get(9)?,
        status: row.get(10)?,
        created_by: row.get(11)?,
        submitted_at: row.get(12)?,
        verified_by: row.get(13)?,
        verification_date: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        version: row.get(17)?,
    };
    let raw_content: Option<String> = row.get(6)?;
    Ok((report, raw_content))
}

fn finish_row((mut report, raw): (Report, Option<String>)) -> Result<Report, RegistryError> {
    report.content = raw.as_deref().map(serde_json::from_str).transpose()?;
    Ok(report)
}

pub(crate) fn upsert_row(conn: &Connection, r: &Report) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO reports
         (id, project_id, title, report_type, reporting_period_start, reporting_period_end,
          content, file_url, carbon_credits_estimated, carbon_credits_verified, status,
          created_by, submitted_at, verified_by, verification_date, created_at, updated_at,
          version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        rusqlite::params![
            r.id,
            r.project_id,
            r.title,
            r.report_type,
            r.reporting_period_start,
            r.reporting_period_end,
            r.content.as_ref().map(|c| c.to_string()),
            r.file_url,
            r.carbon_credits_estimated,
            r.carbon_credits_verified,
            r.status,
            r.created_by,
            r.submitted_at,
            r.verified_by,
            r.verification_date,
            r.created_at,
            r.updated_at,
            r.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_row(conn: &Connection, id: &str) -> Result<Option<Report>, RegistryError> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM reports WHERE id = ?1", SELECT_COLUMNS),
            [id],
            map_row,
        )
        .optional()
        .map_err(RegistryError::Sqlite)?;
    raw.map(finish_row).transpose()
}

pub(crate) fn require_row(conn: &Connection, id: &str) -> Result<Report, RegistryError> {
    get_row(conn, id)?.ok_or_else(|| RegistryError::not_found("report", id))
}

fn validate_fields(r: &Report) -> Result<(), RegistryError> {
    model::validate_required("report", "title", &r.title)?;
    model::validate_required("report", "report_type", &r.report_type)?;
    if let Some(d) = r.reporting_period_start.as_deref() {
        model::validate_iso_date("report", "reporting_period_start", d)?;
    }
    if let Some(d) = r.reporting_period_end.as_deref() {
        model::validate_iso_date("report", "reporting_period_end", d)?;
    }
    model::validate_date_order(
        "report",
        "reporting_period_end",
        r.reporting_period_start.as_deref(),
        r.reporting_period_end.as_deref(),
    )?;
    model::validate_non_negative(
        "report",
        "carbon_credits_estimated",
        r.carbon_credits_estimated,
    )?;
    Ok(())
}

pub fn create_report(
    store: &Store,
    actor_user: &str,
    input: ReportInput,
) -> Result<Report, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "report.create",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let parent = project::require_row(conn, &input.project_id)?;
            policy::authorize(
                &actor,
                Action::Create,
                EntityKind::Report,
                &project::ownership_ctx(&parent),
            )?;

            let now = time::now_epoch_z();
            let report = Report {
                id: time::new_record_id(),
                project_id: parent.id,
                title: input.title,
                report_type: input.report_type,
                reporting_period_start: input.reporting_period_start,
                reporting_period_end: input.reporting_period_end,
                content: input.content,
                file_url: input.file_url,
                carbon_credits_estimated: input.carbon_credits_estimated,
                carbon_credits_verified: None,
                status: ReportStatus::Draft,
                created_by: Some(actor.id.clone()),
                submitted_at: None,
                verified_by: None,
                verification_date: None,
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };
            validate_fields(&report)?;

            let tx = conn.unchecked_transaction()?;
            upsert_row(conn, &report)?;
            events::record(
                conn,
                &store.root,
                "report.create",
                EntityKind::Report,
                Some(&report.id),
                serde_json::to_value(&report)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(report)
        },
    )
}

pub fn get_report(store: &Store, id: &str) -> Result<Option<Report>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "report.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_row(conn, id)
        },
    )
}

pub fn list_reports(
    store: &Store,
    project_id: Option<&str>,
    status: Option<ReportStatus>,
) -> Result<Vec<Report>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "report.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!("SELECT {} FROM reports WHERE 1=1", SELECT_COLUMNS);
            let mut params: Vec<String> = Vec::new();
            if let Some(p) = project_id {
                query.push_str(" AND project_id = ?");
                params.push(p.to_string());
            }
            if let Some(s) = status {
                query.push_str(" AND status = ?");
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

pub fn update_report(
    store: &Store,
    actor_user: &str,
    id: &str,
    patch: ReportPatch,
) -> Result<Report, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "report.update",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let mut report = require_row(conn, id)?;
            let parent = project::require_row(conn, &report.project_id)?;
            let mut ctx = project::ownership_ctx(&parent);
            ctx.created_by = report.created_by.clone();
            policy::authorize(&actor, Action::Update, EntityKind::Report, &ctx)?;

            if !matches!(report.status, ReportStatus::Draft | ReportStatus::Rejected) {
                return Err(RegistryError::validation(
                    "report",
                    "status",
                    "only draft or rejected reports may be edited",
                ));
            }
            if report.version != patch.expected_version {
                return Err(RegistryError::Conflict {
                    entity: "report",
                    id: report.id,
                });
            }

            if let Some(v) = patch.title {
                report.title = v;
            }
            if let Some(v) = patch.report_type {
                report.report_type = v;
            }
            if patch.reporting_period_start.is_some() {
                report.reporting_period_start = patch.reporting_period_start;
            }
            if patch.reporting_period_end.is_some() {
                report.reporting_period_end = patch.reporting_period_end;
            }
            if patch.content.is_some() {
                report.content = patch.content;
            }
            if patch.file_url.is_some() {
                report.file_url = patch.file_url;
            }
            if patch.carbon_credits_estimated.is_some() {
                report.carbon_credits_estimated = patch.carbon_credits_estimated;
            }
            validate_fields(&report)?;

            report.updated_at = time::now_epoch_z();
            report.version += 1;
            upsert_row(conn, &report)?;
            events::record(
                conn,
                &store.root,
                "report.update",
                EntityKind::Report,
                Some(&report.id),
                serde_json::to_value(&report)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(report)
        },
    )
}

fn invalid_transition(
    from: ReportStatus,
    to: ReportStatus,
    reason: &str,
) -> RegistryError {
    RegistryError::InvalidTransition {
        entity: "report",
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
        reason: reason.to_string(),
    }
}

fn is_creator(actor: &Profile, report: &Report) -> bool {
    report.created_by.as_deref() == Some(actor.id.as_str())
}

/// Apply one workflow edge to a report. Must run inside the caller's
/// transaction; the `under_review` exits read the latest verification record
/// written in that same transaction.
pub(crate) fn transition_in_tx(
    conn: &Connection,
    root: &std::path::Path,
    actor: &Profile,
    actor_user: &str,
    report_id: &str,
    to: ReportStatus,
) -> Result<Report, RegistryError> {
    let mut report = require_row(conn, report_id)?;
    let from = report.status;
    let now = time::now_epoch_z();

    match (from, to) {
        (ReportStatus::Draft, ReportStatus::Submitted) => {
            let allowed = matches!(actor.role, Some(Role::Admin | Role::ProjectManager))
                || (actor.role == Some(Role::FieldResearcher) && is_creator(actor, &report));
            if !allowed {
                return Err(RegistryError::Forbidden {
                    role: actor
                        .role
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    action: Action::Transition.as_str(),
                    entity: EntityKind::Report.as_str(),
                });
            }
            report.submitted_at = Some(now.clone());
        }
        (ReportStatus::Submitted, ReportStatus::UnderReview) => {
            policy::require_role(
                actor,
                &[Role::Verifier, Role::Admin],
                Action::Transition,
                EntityKind::Report,
            )?;
            verification::open_for_report_in_tx(conn, root, actor, actor_user, &report)?;
        }
        (ReportStatus::UnderReview, ReportStatus::Verified) => {
            policy::require_role(
                actor,
                &[Role::Verifier, Role::Admin],
                Action::Transition,
                EntityKind::Report,
            )?;
            let record = verification::latest_for_report(conn, &report.id)?.ok_or_else(|| {
                invalid_transition(from, to, "no verification record exists for this report")
            })?;
            if record.verification_status != VerificationStatus::Verified {
                return Err(invalid_transition(
                    from,
                    to,
                    "latest verification record is not in the verified state",
                ));
            }
            let approved = record.carbon_credits_approved.ok_or_else(|| {
                invalid_transition(from, to, "verification record has no approved credit figure")
            })?;
            report.carbon_credits_verified = Some(approved);
            report.verified_by = Some(actor.id.clone());
            report.verification_date = Some(now.clone());
        }
        (ReportStatus::UnderReview, ReportStatus::Rejected) => {
            policy::require_role(
                actor,
                &[Role::Verifier, Role::Admin],
                Action::Transition,
                EntityKind::Report,
            )?;
            let record = verification::latest_for_report(conn, &report.id)?.ok_or_else(|| {
                invalid_transition(from, to, "no verification record exists for this report")
            })?;
            if record.verification_status != VerificationStatus::Rejected {
                return Err(invalid_transition(
                    from,
                    to,
                    "latest verification record is not in the rejected state",
                ));
            }
            report.carbon_credits_verified = None;
            report.verified_by = Some(actor.id.clone());
            report.verification_date = Some(now.clone());
        }
        (ReportStatus::Rejected, ReportStatus::Draft) => {
            let allowed = matches!(actor.role, Some(Role::Admin | Role::ProjectManager))
                || is_creator(actor, &report);
            if !allowed {
                return Err(RegistryError::Forbidden {
                    role: actor
                        .role
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    action: Action::Transition.as_str(),
                    entity: EntityKind::Report.as_str(),
                });
            }
        }
        _ => {
            return Err(invalid_transition(from, to, "edge not in the workflow table"));
        }
    }

    report.status = to;
    report.updated_at = now;
    report.version += 1;
    upsert_row(conn, &report)?;
    events::record(
        conn,
        root,
        "report.transition",
        EntityKind::Report,
        Some(&report.id),
        serde_json::to_value(&report)?,
        actor_user,
    )?;
    Ok(report)
}

pub fn transition_report(
    store: &Store,
    actor_user: &str,
    id: &str,
    to: ReportStatus,
) -> Result<Report, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "report.transition",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let report = transition_in_tx(conn, &store.root, &actor, actor_user, id, to)?;
            tx.commit()?;
            Ok(report)
        },
    )
}

pub fn delete_report(store: &Store, actor_user: &str, id: &str) -> Result<(), RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "report.delete",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let report = require_row(conn, id)?;
            let parent = project::require_row(conn, &report.project_id)?;
            let mut ctx = project::ownership_ctx(&parent);
            ctx.created_by = report.created_by.clone();
            policy::authorize(&actor, Action::Delete, EntityKind::Report, &ctx)?;

            let reviews: i64 = conn.query_row(
                "SELECT COUNT(*) FROM verification_records WHERE report_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if reviews > 0 {
                return Err(RegistryError::validation(
                    "report",
                    "id",
                    format!("report has {} verification record(s); delete is guarded", reviews),
                ));
            }

            conn.execute("DELETE FROM reports WHERE id = ?1", [id])?;
            events::record(
                conn,
                &store.root,
                "report.delete",
                EntityKind::Report,
                Some(id),
                serde_json::json!({ "id": id }),
                actor_user,
            )?;
            tx.commit()?;
            Ok(())
        },
    )
}

fn print_report(r: &Report, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("report.get", "ok", serde_json::to_value(r)?)
        ),
        OutputFormat::Text => {
            let status = match r.status {
                ReportStatus::Verified => r.status.as_str().green(),
                ReportStatus::Rejected => r.status.as_str().red(),
                _ => r.status.as_str().yellow(),
            };
            let credits = match (r.carbon_credits_verified, r.carbon_credits_estimated) {
                (Some(v), _) => format!("{:.1} tCO2e verified", v),
                (None, Some(e)) => format!("{:.1} tCO2e estimated", e),
                (None, None) => "no credit figure".to_string(),
            };
            println!(
                "{}  {}  [{}]  project={}  {}  v{}",
                r.id.dimmed(),
                r.title.bold(),
                status,
                r.project_id,
                credits,
                r.version
            );
        }
    }
    Ok(())
}

pub fn run_report_cli(
    store: &Store,
    actor: Option<&str>,
    cli: ReportCli,
) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        ReportCommand::Create {
            project,
            title,
            report_type,
            period_start,
            period_end,
            content,
            file_url,
            credits_estimated,
        } => {
            let content = content.as_deref().map(serde_json::from_str).transpose()?;
            let report = create_report(
                store,
                require_actor_id(actor)?,
                ReportInput {
                    project_id: project,
                    title,
                    report_type,
                    reporting_period_start: period_start,
                    reporting_period_end: period_end,
                    content,
                    file_url,
                    carbon_credits_estimated: credits_estimated,
                },
            )?;
            print_report(&report, format)?;
        }
        ReportCommand::Get { id } => {
            let report =
                get_report(store, &id)?.ok_or_else(|| RegistryError::not_found("report", &id))?;
            print_report(&report, format)?;
        }
        ReportCommand::List { project, status } => {
            for report in list_reports(store, project.as_deref(), status)? {
                print_report(&report, format)?;
            }
        }
        ReportCommand::Edit {
            id,
            title,
            report_type,
            period_start,
            period_end,
            content,
            file_url,
            credits_estimated,
            expected_version,
        } => {
            let content = content.as_deref().map(serde_json::from_str).transpose()?;
            let report = update_report(
                store,
                require_actor_id(actor)?,
                &id,
                ReportPatch {
                    title,
                    report_type,
                    reporting_period_start: period_start,
                    reporting_period_end: period_end,
                    content,
                    file_url,
                    carbon_credits_estimated: credits_estimated,
                    expected_version,
                },
            )?;
            print_report(&report, format)?;
        }
        ReportCommand::Submit { id } => {
            let report = transition_report(
                store,
                require_actor_id(actor)?,
                &id,
                ReportStatus::Submitted,
            )?;
            print_report(&report, format)?;
        }
        ReportCommand::Review { id } => {
            let report = transition_report(
                store,
                require_actor_id(actor)?,
                &id,
                ReportStatus::UnderReview,
            )?;
            print_report(&report, format)?;
        }
        ReportCommand::Reopen { id } => {
            let report =
                transition_report(store, require_actor_id(actor)?, &id, ReportStatus::Draft)?;
            print_report(&report, format)?;
        }
        ReportCommand::Delete { id } => {
            delete_report(store, require_actor_id(actor)?, &id)?;
            println!("Deleted report {}", id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "report",
        "version": "1.0.0",
        "description": "Report authoring and review workflow",
        "commands": [
            { "name": "create", "description": "Create a draft report" },
            { "name": "get", "description": "Show a report" },
            { "name": "list", "description": "List reports" },
            { "name": "edit", "description": "Update a draft or rejected report" },
            { "name": "submit", "description": "Submit a draft for review" },
            { "name": "review", "description": "Move a submitted report into review" },
            { "name": "reopen", "description": "Re-open a rejected report" },
            { "name": "delete", "description": "Delete a report" }
        ],
        "storage": ["reports"]
    })
}
