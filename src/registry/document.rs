//! Document attachments. A document belongs to exactly one context, so at
//! most one of project/site/report may be set. Local files are pushed into the
//! content-addressed blob store; external URLs are kept as-is.

use crate::core::blob;
use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{self, Document, EntityKind};
use crate::core::policy::{self, Action, PolicyCtx};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, profile, project, report, require_actor_id, site};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

#[derive(Parser, Debug)]
#[clap(name = "document", about = "Attach files to projects, sites, and reports.")]
pub struct DocumentCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: DocumentCommand,
}

#[derive(Subcommand, Debug)]
pub enum DocumentCommand {
    /// Attach a file. Pass exactly one of --project/--site/--report.
    Add {
        #[clap(long)]
        name: String,
        /// Local file to ingest into the blob store.
        #[clap(long, conflicts_with = "url")]
        file: Option<String>,
        /// External URL to record verbatim.
        #[clap(long)]
        url: Option<String>,
        #[clap(long, default_value = "")]
        file_type: String,
        #[clap(long)]
        project: Option<String>,
        #[clap(long)]
        site: Option<String>,
        #[clap(long)]
        report: Option<String>,
    },
    /// Show a document by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List documents, optionally scoped to one parent.
    List {
        #[clap(long)]
        project: Option<String>,
        #[clap(long)]
        site: Option<String>,
        #[clap(long)]
        report: Option<String>,
    },
    /// Check that a blob-store document still matches its digest.
    Verify {
        #[clap(long)]
        id: String,
    },
    /// Delete a document.
    Delete {
        #[clap(long)]
        id: String,
    },
}

#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub name: String,
    /// Local path to ingest; mutually exclusive with `file_url`.
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    pub file_type: String,
    pub project_id: Option<String>,
    pub site_id: Option<String>,
    pub report_id: Option<String>,
}

const SELECT_COLUMNS: &str = "id, name, file_url, file_type, file_size, project_id, site_id, \
     report_id, uploaded_by, created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        name: row.get(1)?,
        file_url: row.get(2)?,
        file_type: row.get(3)?,
        file_size: row.get(4)?,
        project_id: row.get(5)?,
        site_id: row.get(6)?,
        report_id: row.get(7)?,
        uploaded_by: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        version: row.get(11)?,
    })
}

pub(crate) fn upsert_row(conn: &Connection, d: &Document) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO documents
         (id, name, file_url, file_type, file_size, project_id, site_id, report_id,
          uploaded_by, created_at, updated_at, version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            d.id,
            d.name,
            d.file_url,
            d.file_type,
            d.file_size,
            d.project_id,
            d.site_id,
            d.report_id,
            d.uploaded_by,
            d.created_at,
            d.updated_at,
            d.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_row(conn: &Connection, id: &str) -> Result<Option<Document>, RegistryError> {
    conn.query_row(
        &format!("SELECT {} FROM documents WHERE id = ?1", SELECT_COLUMNS),
        [id],
        map_row,
    )
    .optional()
    .map_err(RegistryError::Sqlite)
}

fn require_row(conn: &Connection, id: &str) -> Result<Document, RegistryError> {
    get_row(conn, id)?.ok_or_else(|| RegistryError::not_found("document", id))
}

fn check_single_parent(
    project_id: Option<&str>,
    site_id: Option<&str>,
    report_id: Option<&str>,
) -> Result<(), RegistryError> {
    let set = [project_id, site_id, report_id]
        .iter()
        .filter(|p| p.is_some())
        .count();
    if set > 1 {
        return Err(RegistryError::validation(
            "document",
            "parent",
            "a document may reference at most one of project, site, or report",
        ));
    }
    Ok(())
}

pub fn add_document(
    store: &Store,
    actor_user: &str,
    input: DocumentInput,
) -> Result<Document, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "document.add",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            policy::authorize(
                &actor,
                Action::Create,
                EntityKind::Document,
                &PolicyCtx::default(),
            )?;

            model::validate_required("document", "name", &input.name)?;
            check_single_parent(
                input.project_id.as_deref(),
                input.site_id.as_deref(),
                input.report_id.as_deref(),
            )?;
            if let Some(id) = input.project_id.as_deref() {
                project::require_row(conn, id)?;
            }
            if let Some(id) = input.site_id.as_deref() {
                site::require_row(conn, id)?;
            }
            if let Some(id) = input.report_id.as_deref() {
                report::require_row(conn, id)?;
            }

            let (file_url, file_size) = match (&input.file_path, &input.file_url) {
                (Some(path), _) => {
                    let (url, size) = blob::store_file(&store.root, Path::new(path))?;
                    (url, Some(size))
                }
                (None, Some(url)) => (url.clone(), None),
                (None, None) => {
                    return Err(RegistryError::validation(
                        "document",
                        "file_url",
                        "either a local file or a URL is required",
                    ));
                }
            };
            if file_size.is_some_and(|s| s < 0) {
                return Err(RegistryError::validation(
                    "document",
                    "file_size",
                    "must be >= 0",
                ));
            }

            let now = time::now_epoch_z();
            let doc = Document {
                id: time::new_record_id(),
                name: input.name,
                file_url,
                file_type: input.file_type,
                file_size,
                project_id: input.project_id,
                site_id: input.site_id,
                report_id: input.report_id,
                uploaded_by: Some(actor.id.clone()),
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };

            let tx = conn.unchecked_transaction()?;
            upsert_row(conn, &doc)?;
            events::record(
                conn,
                &store.root,
                "document.create",
                EntityKind::Document,
                Some(&doc.id),
                serde_json::to_value(&doc)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(doc)
        },
    )
}

pub fn get_document(store: &Store, id: &str) -> Result<Option<Document>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "document.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_row(conn, id)
        },
    )
}

pub fn list_documents(
    store: &Store,
    project_id: Option<&str>,
    site_id: Option<&str>,
    report_id: Option<&str>,
) -> Result<Vec<Document>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "document.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!("SELECT {} FROM documents WHERE 1=1", SELECT_COLUMNS);
            let mut params: Vec<String> = Vec::new();
            if let Some(p) = project_id {
                query.push_str(" AND project_id = ?");
                params.push(p.to_string());
            }
            if let Some(s) = site_id {
                query.push_str(" AND site_id = ?");
                params.push(s.to_string());
            }
            if let Some(r) = report_id {
                query.push_str(" AND report_id = ?");
                params.push(r.to_string());
            }
            query.push_str(" ORDER BY created_at");

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(RegistryError::Sqlite)
        },
    )
}

/// True when the stored blob still hashes to the digest in its URL. External
/// URLs always pass.
pub fn verify_document(store: &Store, id: &str) -> Result<bool, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "document.verify",
        |conn| {
            db::ensure_schema(conn)?;
            let doc = require_row(conn, id)?;
            blob::verify_blob(&store.root, &doc.file_url)
        },
    )
}

pub fn delete_document(store: &Store, actor_user: &str, id: &str) -> Result<(), RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "document.delete",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = profile::require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let doc = require_row(conn, id)?;
            let ctx = PolicyCtx {
                created_by: doc.uploaded_by.clone(),
                ..Default::default()
            };
            policy::authorize(&actor, Action::Delete, EntityKind::Document, &ctx)?;

            conn.execute("DELETE FROM documents WHERE id = ?1", [id])?;
            events::record(
                conn,
                &store.root,
                "document.delete",
                EntityKind::Document,
                Some(id),
                serde_json::json!({ "id": id }),
                actor_user,
            )?;
            tx.commit()?;
            Ok(())
        },
    )
}

fn print_document(d: &Document, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("document.get", "ok", serde_json::to_value(d)?)
        ),
        OutputFormat::Text => {
            let parent = d
                .project_id
                .as_deref()
                .map(|p| format!("project={}", p))
                .or_else(|| d.site_id.as_deref().map(|s| format!("site={}", s)))
                .or_else(|| d.report_id.as_deref().map(|r| format!("report={}", r)))
                .unwrap_or_else(|| "unattached".to_string());
            println!(
                "{}  {}  {}  {}  v{}",
                d.id.dimmed(),
                d.name.bold(),
                d.file_url,
                parent,
                d.version
            );
        }
    }
    Ok(())
}

pub fn run_document_cli(
    store: &Store,
    actor: Option<&str>,
    cli: DocumentCli,
) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        DocumentCommand::Add {
            name,
            file,
            url,
            file_type,
            project,
            site,
            report,
        } => {
            let doc = add_document(
                store,
                require_actor_id(actor)?,
                DocumentInput {
                    name,
                    file_path: file,
                    file_url: url,
                    file_type,
                    project_id: project,
                    site_id: site,
                    report_id: report,
                },
            )?;
            print_document(&doc, format)?;
        }
        DocumentCommand::Get { id } => {
            let doc = get_document(store, &id)?
                .ok_or_else(|| RegistryError::not_found("document", &id))?;
            print_document(&doc, format)?;
        }
        DocumentCommand::List {
            project,
            site,
            report,
        } => {
            for doc in list_documents(
                store,
                project.as_deref(),
                site.as_deref(),
                report.as_deref(),
            )? {
                print_document(&doc, format)?;
            }
        }
        DocumentCommand::Verify { id } => {
            let ok = verify_document(store, &id)?;
            if ok {
                println!("{} {}", "ok".green(), id);
            } else {
                println!("{} {}", "corrupt".red(), id);
            }
        }
        DocumentCommand::Delete { id } => {
            delete_document(store, require_actor_id(actor)?, &id)?;
            println!("Deleted document {}", id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "document",
        "version": "1.0.0",
        "description": "File attachments with a content-addressed blob store",
        "commands": [
            { "name": "add", "description": "Attach a file or URL" },
            { "name": "get", "description": "Show a document" },
            { "name": "list", "description": "List documents" },
            { "name": "verify", "description": "Check a blob against its digest" },
            { "name": "delete", "description": "Delete a document" }
        ],
        "storage": ["documents"]
    })
}
