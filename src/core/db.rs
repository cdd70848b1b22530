use crate::core::broker::DbBroker;
use crate::core::error::RegistryError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, RegistryError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(RegistryError::Sqlite)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(RegistryError::Sqlite)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(RegistryError::Sqlite)?;
    Ok(conn)
}

pub fn registry_db_path(root: &Path) -> PathBuf {
    root.join(schemas::REGISTRY_DB_NAME)
}

pub fn ensure_schema(conn: &Connection) -> Result<(), RegistryError> {
    conn.execute(schemas::REGISTRY_DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(RegistryError::Sqlite)?;

    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::REGISTRY_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute(schemas::REGISTRY_DB_SCHEMA_PROFILES, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_PROJECTS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_SITES, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_MONITORING, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_REPORTS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_VERIFICATIONS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_DOCUMENTS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_EVENTS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_SITES_PROJECT, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_MONITORING_SITE, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_REPORTS_PROJECT, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_REPORTS_STATUS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_VERIFICATIONS_REPORT, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_EVENTS_ENTITY, [])?;

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::REGISTRY_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn initialize_registry_db(root: &Path) -> Result<(), RegistryError> {
    fs::create_dir_all(root).map_err(RegistryError::Io)?;

    let broker = DbBroker::new(root);
    broker.with_conn(&registry_db_path(root), "bluemrv", "registry.init", |conn| {
        ensure_schema(conn)?;
        Ok(())
    })?;

    Ok(())
}
