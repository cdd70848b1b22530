//! Read-side aggregation. Everything here recomputes from the store on
//! demand; nothing is cached or incrementally maintained. Queries tolerate a
//! malformed credit value by degrading that metric to zero with a warning
//! rather than failing the whole summary.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{ProjectStatus, SiteType};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::OutputFormat;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Parser, Debug)]
#[clap(name = "dashboard", about = "Registry-wide rollups and credit totals.")]
pub struct DashboardCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: DashboardCommand,
}

#[derive(Subcommand, Debug)]
pub enum DashboardCommand {
    /// One-screen summary of the whole registry.
    Summary {
        /// Window used for the recent-report count, in days.
        #[clap(long, default_value_t = 30)]
        window_days: u64,
    },
    /// Count projects, optionally by status.
    Projects {
        #[clap(long, value_enum)]
        status: Option<ProjectStatus>,
    },
    /// Count sites, optionally by type or project.
    Sites {
        #[clap(long, value_enum)]
        site_type: Option<SiteType>,
        #[clap(long)]
        project: Option<String>,
    },
    /// Total verified carbon credits across all verified reports.
    Credits,
}

#[derive(Serialize, Debug, Clone)]
pub struct DashboardSummary {
    pub project_count: i64,
    pub active_project_count: i64,
    pub site_count: i64,
    pub monitoring_record_count: i64,
    pub recent_report_count: i64,
    pub report_window_days: u64,
    pub verified_credit_total: f64,
}

fn count(conn: &Connection, query: &str, params: &[&str]) -> Result<i64, RegistryError> {
    conn.query_row(query, rusqlite::params_from_iter(params.iter()), |row| {
        row.get(0)
    })
    .map_err(RegistryError::Sqlite)
}

pub(crate) fn project_count_in(
    conn: &Connection,
    status: Option<ProjectStatus>,
) -> Result<i64, RegistryError> {
    match status {
        Some(s) => count(
            conn,
            "SELECT COUNT(*) FROM projects WHERE status = ?1",
            &[s.as_str()],
        ),
        None => count(conn, "SELECT COUNT(*) FROM projects", &[]),
    }
}

pub(crate) fn site_count_in(
    conn: &Connection,
    site_type: Option<SiteType>,
    project_id: Option<&str>,
) -> Result<i64, RegistryError> {
    let mut query = "SELECT COUNT(*) FROM sites WHERE 1=1".to_string();
    let mut params: Vec<&str> = Vec::new();
    if let Some(t) = site_type {
        query.push_str(" AND site_type = ?");
        params.push(t.as_str());
    }
    if let Some(p) = project_id {
        query.push_str(" AND project_id = ?");
        params.push(p);
    }
    count(conn, &query, &params)
}

/// Reports created within the last `window_days`. Timestamps are epoch
/// seconds so the cutoff is a plain numeric comparison.
pub(crate) fn recent_report_count_in(
    conn: &Connection,
    window_days: u64,
) -> Result<i64, RegistryError> {
    let cutoff = time::now_unix_secs().saturating_sub(window_days * 86_400);
    let mut stmt = conn.prepare("SELECT created_at FROM reports")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut n = 0;
    for row in rows {
        let ts = row.map_err(RegistryError::Sqlite)?;
        if time::parse_epoch_z(&ts).is_some_and(|secs| secs >= cutoff) {
            n += 1;
        }
    }
    Ok(n)
}

/// Sum of verified credits over verified reports. A row whose credit column
/// is not numeric contributes zero and logs a warning instead of poisoning
/// the total.
pub(crate) fn verified_credit_total_in(conn: &Connection) -> Result<f64, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT id, carbon_credits_verified FROM reports \
         WHERE status = 'verified' AND carbon_credits_verified IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, rusqlite::types::Value>(1)?,
        ))
    })?;
    let mut total = 0.0_f64;
    for row in rows {
        let (id, value) = row.map_err(RegistryError::Sqlite)?;
        match value {
            rusqlite::types::Value::Real(v) => total += v,
            rusqlite::types::Value::Integer(v) => total += v as f64,
            other => {
                eprintln!(
                    "warning: report {} has a non-numeric verified credit value ({:?}); \
                     counted as 0",
                    id, other
                );
            }
        }
    }
    Ok(total)
}

pub fn project_count(
    store: &Store,
    status: Option<ProjectStatus>,
) -> Result<i64, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "dashboard.projects",
        |conn| {
            db::ensure_schema(conn)?;
            project_count_in(conn, status)
        },
    )
}

pub fn site_count(
    store: &Store,
    site_type: Option<SiteType>,
    project_id: Option<&str>,
) -> Result<i64, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "dashboard.sites",
        |conn| {
            db::ensure_schema(conn)?;
            site_count_in(conn, site_type, project_id)
        },
    )
}

pub fn verified_credit_total(store: &Store) -> Result<f64, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "dashboard.credits",
        |conn| {
            db::ensure_schema(conn)?;
            verified_credit_total_in(conn)
        },
    )
}

pub fn summary(store: &Store, window_days: u64) -> Result<DashboardSummary, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "dashboard.summary",
        |conn| {
            db::ensure_schema(conn)?;
            Ok(DashboardSummary {
                project_count: project_count_in(conn, None)?,
                active_project_count: project_count_in(conn, Some(ProjectStatus::Active))?,
                site_count: site_count_in(conn, None, None)?,
                monitoring_record_count: count(
                    conn,
                    "SELECT COUNT(*) FROM monitoring_records",
                    &[],
                )?,
                recent_report_count: recent_report_count_in(conn, window_days)?,
                report_window_days: window_days,
                verified_credit_total: verified_credit_total_in(conn)?,
            })
        },
    )
}

pub fn run_dashboard_cli(store: &Store, cli: DashboardCli) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        DashboardCommand::Summary { window_days } => {
            let s = summary(store, window_days)?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope("dashboard.summary", "ok", serde_json::to_value(&s)?)
                ),
                OutputFormat::Text => {
                    println!("{}", "Registry summary".bold());
                    println!(
                        "  projects:            {} ({} active)",
                        s.project_count, s.active_project_count
                    );
                    println!("  sites:               {}", s.site_count);
                    println!("  monitoring records:  {}", s.monitoring_record_count);
                    println!(
                        "  reports (last {}d):  {}",
                        s.report_window_days, s.recent_report_count
                    );
                    println!(
                        "  verified credits:    {}",
                        format!("{:.1} tCO2e", s.verified_credit_total).green()
                    );
                }
            }
        }
        DashboardCommand::Projects { status } => {
            println!("{}", project_count(store, status)?);
        }
        DashboardCommand::Sites { site_type, project } => {
            println!("{}", site_count(store, site_type, project.as_deref())?);
        }
        DashboardCommand::Credits => {
            println!("{:.1}", verified_credit_total(store)?);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "dashboard",
        "version": "1.0.0",
        "description": "On-demand rollups over the registry",
        "commands": [
            { "name": "summary", "description": "One-screen registry summary" },
            { "name": "projects", "description": "Project counts" },
            { "name": "sites", "description": "Site counts" },
            { "name": "credits", "description": "Verified credit total" }
        ],
        "storage": []
    })
}
