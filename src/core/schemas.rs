//! Centralized database schema definitions for the registry store.
//!
//! The registry keeps all entity state in a single SQLite database
//! (`registry.db`) plus an append-only JSONL event log
//! (`registry.events.jsonl`) that allows deterministic rebuild of the DB.
//!
//! Every table carries `created_at`/`updated_at` epoch-Z strings maintained by
//! the store on write and an integer `version` used as the optimistic
//! concurrency token.

pub const REGISTRY_DB_NAME: &str = "registry.db";
pub const REGISTRY_EVENTS_NAME: &str = "registry.events.jsonl";
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

pub const REGISTRY_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const REGISTRY_DB_SCHEMA_PROFILES: &str = "
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL DEFAULT '',
        organization TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL DEFAULT '',
        role TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1
    )
";

pub const REGISTRY_DB_SCHEMA_PROJECTS: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        location TEXT NOT NULL,
        geometry TEXT,
        area_hectares REAL,
        certification_standard TEXT NOT NULL DEFAULT '',
        methodology TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'planning',
        start_date TEXT,
        end_date TEXT,
        created_by TEXT,
        project_manager_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1
    )
";

pub const REGISTRY_DB_SCHEMA_SITES: &str = "
    CREATE TABLE IF NOT EXISTS sites (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        site_type TEXT NOT NULL,
        geometry TEXT NOT NULL,
        area_hectares REAL,
        depth_range TEXT NOT NULL DEFAULT '',
        salinity_range TEXT NOT NULL DEFAULT '',
        accessibility_notes TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(project_id) REFERENCES projects(id)
    )
";

pub const REGISTRY_DB_SCHEMA_MONITORING: &str = "
    CREATE TABLE IF NOT EXISTS monitoring_records (
        id TEXT PRIMARY KEY,
        site_id TEXT NOT NULL,
        monitoring_type TEXT NOT NULL,
        measurement_date TEXT NOT NULL,
        data_values TEXT NOT NULL,
        methodology TEXT NOT NULL DEFAULT '',
        equipment_used TEXT NOT NULL DEFAULT '',
        weather_conditions TEXT NOT NULL DEFAULT '',
        collected_by TEXT,
        verified INTEGER NOT NULL DEFAULT 0,
        verification_notes TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(site_id) REFERENCES sites(id)
    )
";

pub const REGISTRY_DB_SCHEMA_REPORTS: &str = "
    CREATE TABLE IF NOT EXISTS reports (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        title TEXT NOT NULL,
        report_type TEXT NOT NULL,
        reporting_period_start TEXT,
        reporting_period_end TEXT,
        content TEXT,
        file_url TEXT,
        carbon_credits_estimated REAL,
        carbon_credits_verified REAL,
        status TEXT NOT NULL DEFAULT 'draft',
        created_by TEXT,
        submitted_at TEXT,
        verified_by TEXT,
        verification_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(project_id) REFERENCES projects(id)
    )
";

pub const REGISTRY_DB_SCHEMA_VERIFICATIONS: &str = "
    CREATE TABLE IF NOT EXISTS verification_records (
        id TEXT PRIMARY KEY,
        report_id TEXT NOT NULL,
        verifier_id TEXT NOT NULL,
        verification_status TEXT NOT NULL DEFAULT 'pending',
        carbon_credits_approved REAL,
        findings TEXT,
        recommendations TEXT NOT NULL DEFAULT '',
        verification_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(report_id) REFERENCES reports(id)
    )
";

pub const REGISTRY_DB_SCHEMA_DOCUMENTS: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        file_url TEXT NOT NULL,
        file_type TEXT NOT NULL DEFAULT '',
        file_size INTEGER,
        project_id TEXT,
        site_id TEXT,
        report_id TEXT,
        uploaded_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(project_id) REFERENCES projects(id),
        FOREIGN KEY(site_id) REFERENCES sites(id),
        FOREIGN KEY(report_id) REFERENCES reports(id)
    )
";

pub const REGISTRY_DB_SCHEMA_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS registry_events (
        event_id TEXT PRIMARY KEY,
        ts TEXT NOT NULL,
        event_type TEXT NOT NULL,
        entity TEXT NOT NULL,
        entity_id TEXT,
        payload TEXT NOT NULL,
        actor TEXT NOT NULL
    )
";

pub const REGISTRY_DB_SCHEMA_INDEX_SITES_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_sites_project ON sites(project_id)";
pub const REGISTRY_DB_SCHEMA_INDEX_MONITORING_SITE: &str =
    "CREATE INDEX IF NOT EXISTS idx_monitoring_site ON monitoring_records(site_id)";
pub const REGISTRY_DB_SCHEMA_INDEX_REPORTS_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_reports_project ON reports(project_id)";
pub const REGISTRY_DB_SCHEMA_INDEX_REPORTS_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status)";
pub const REGISTRY_DB_SCHEMA_INDEX_VERIFICATIONS_REPORT: &str =
    "CREATE INDEX IF NOT EXISTS idx_verifications_report ON verification_records(report_id)";
pub const REGISTRY_DB_SCHEMA_INDEX_EVENTS_ENTITY: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_entity ON registry_events(entity, entity_id)";
