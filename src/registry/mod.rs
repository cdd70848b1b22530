//! Registry subsystems: one module per entity family, each owning its CLI
//! surface and public library functions, plus the dashboard aggregates and the
//! event log.

pub mod dashboard;
pub mod document;
pub mod events;
pub mod monitoring;
pub mod profile;
pub mod project;
pub mod report;
pub mod site;
pub mod verification;

use crate::core::error::RegistryError;
use clap::ValueEnum;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Actor id a CLI mutation runs as. Mutations without a configured actor fail
/// up front rather than deep inside a subsystem.
pub(crate) fn require_actor_id(actor: Option<&str>) -> Result<&str, RegistryError> {
    actor.ok_or_else(|| {
        RegistryError::validation(
            "cli",
            "actor",
            "no actor configured (use --actor, BLUEMRV_ACTOR, or bluemrv.toml)",
        )
    })
}
