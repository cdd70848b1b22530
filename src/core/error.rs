use rusqlite;
use std::io;
use thiserror::Error;

/// Error taxonomy for the registry.
///
/// Every variant carries enough context (entity, id, field, transition) for the
/// CLI to render an actionable message without re-querying the store.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation failed on {entity}.{field}: {rule}")]
    Validation {
        entity: &'static str,
        field: &'static str,
        rule: String,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("role '{role}' may not {action} {entity}")]
    Forbidden {
        role: String,
        action: &'static str,
        entity: &'static str,
    },
    #[error("invalid {entity} transition {from} -> {to}: {reason}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
        reason: String,
    },
    #[error("concurrent update conflict on {entity} {id}: stale version, re-read and retry")]
    Conflict { entity: &'static str, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    pub fn validation(entity: &'static str, field: &'static str, rule: impl Into<String>) -> Self {
        RegistryError::Validation {
            entity,
            field,
            rule: rule.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        RegistryError::NotFound {
            entity,
            id: id.into(),
        }
    }
}
