//! Workspace configuration (`bluemrv.toml`).
//!
//! Resolution order for the store root and the acting identity:
//! CLI flag > environment variable > `bluemrv.toml` in the working directory >
//! built-in default.

use crate::core::error::RegistryError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "bluemrv.toml";
pub const DEFAULT_STORE_DIR: &str = ".bluemrv/data";
pub const ACTOR_ENV_VAR: &str = "BLUEMRV_ACTOR";
pub const ROOT_ENV_VAR: &str = "BLUEMRV_ROOT";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub store_root: Option<PathBuf>,
    pub actor: Option<String>,
}

pub fn load_config(dir: &Path) -> Result<Config, RegistryError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(&path).map_err(RegistryError::Io)?;
    toml::from_str(&content).map_err(|e| RegistryError::Unavailable(format!(
        "unreadable {}: {}",
        path.display(),
        e
    )))
}

pub fn resolve_store_root(flag: Option<PathBuf>, cwd: &Path) -> Result<PathBuf, RegistryError> {
    if let Some(root) = flag {
        return Ok(root);
    }
    if let Ok(root) = std::env::var(ROOT_ENV_VAR) {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }
    let config = load_config(cwd)?;
    if let Some(root) = config.store_root {
        return Ok(root);
    }
    Ok(cwd.join(DEFAULT_STORE_DIR))
}

pub fn resolve_actor(flag: Option<String>, cwd: &Path) -> Result<Option<String>, RegistryError> {
    if flag.is_some() {
        return Ok(flag);
    }
    if let Ok(actor) = std::env::var(ACTOR_ENV_VAR) {
        if !actor.is_empty() {
            return Ok(Some(actor));
        }
    }
    Ok(load_config(cwd)?.actor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert!(config.store_root.is_none());
        assert!(config.actor.is_none());
    }

    #[test]
    fn test_config_file_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "store_root = \"/srv/mrv\"\nactor = \"kai\"\n",
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.store_root, Some(PathBuf::from("/srv/mrv")));
        assert_eq!(config.actor.as_deref(), Some("kai"));
    }

    #[test]
    fn test_flag_wins_over_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "store_root = \"/srv/mrv\"\n",
        )
        .unwrap();
        let root = resolve_store_root(Some(PathBuf::from("/tmp/explicit")), tmp.path()).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/explicit"));
    }
}
