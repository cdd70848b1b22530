//! bluemrv: a local-first registry for blue carbon restoration work.
//!
//! The registry tracks restoration projects, their monitoring sites, field
//! observations, and the report/verification workflow that turns estimated
//! carbon sequestration into verified carbon credits.
//!
//! # Architecture
//!
//! ## Single durable store
//!
//! Everything lives in one SQLite database under the store root (resolved
//! from `--root`, `BLUEMRV_ROOT`, or `bluemrv.toml`). All mutations route
//! through `DbBroker` for in-process serialization and audit logging
//! (`broker.events.jsonl`), and every write appends to an event journal
//! (`registry.events.jsonl`) from which the database can be rebuilt.
//!
//! ## Subsystems
//!
//! - `profile`: users and their roles
//! - `project`: restoration initiatives
//! - `site`: physical monitoring locations
//! - `monitoring`: typed field observations
//! - `report`: report authoring and the review state machine
//! - `verification`: verifier-side rulings on carbon credit claims
//! - `document`: file attachments backed by a content-addressed blob store
//! - `dashboard`: on-demand rollups, including the verified credit total
//! - `events`: event journal inspection and replay
//!
//! ## Workflow invariant
//!
//! A report's `carbon_credits_verified` is written exclusively by the
//! `under_review -> verified` edge, copying the approving verification
//! record's figure. No other code path touches it.

pub mod cli;
pub mod core;
pub mod registry;
mod subsystems;

pub use crate::core::error::RegistryError;
pub use crate::core::store::Store;

use clap::Parser;
use cli::{Cli, Command};
use std::fs;

/// Parse arguments and dispatch to the selected subsystem.
pub fn run() -> Result<(), RegistryError> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().map_err(RegistryError::Io)?;
    let root = crate::core::config::resolve_store_root(cli.root, &cwd)?;
    let actor = crate::core::config::resolve_actor(cli.actor, &cwd)?;

    if !matches!(cli.command, Command::Init) {
        fs::create_dir_all(&root).map_err(RegistryError::Io)?;
    }
    let store = Store::new(&root);

    match cli.command {
        Command::Init => {
            crate::core::db::initialize_registry_db(&root)?;
            println!("Initialized registry store at {}", root.display());
            Ok(())
        }
        Command::Profile(sub) => registry::profile::run_profile_cli(&store, actor.as_deref(), sub),
        Command::Project(sub) => registry::project::run_project_cli(&store, actor.as_deref(), sub),
        Command::Site(sub) => registry::site::run_site_cli(&store, actor.as_deref(), sub),
        Command::Monitoring(sub) => {
            registry::monitoring::run_monitoring_cli(&store, actor.as_deref(), sub)
        }
        Command::Report(sub) => registry::report::run_report_cli(&store, actor.as_deref(), sub),
        Command::Verification(sub) => {
            registry::verification::run_verification_cli(&store, actor.as_deref(), sub)
        }
        Command::Document(sub) => {
            registry::document::run_document_cli(&store, actor.as_deref(), sub)
        }
        Command::Dashboard(sub) => registry::dashboard::run_dashboard_cli(&store, sub),
        Command::Events(sub) => registry::events::run_events_cli(&store, sub),
        Command::Subsystems => {
            println!("{}", serde_json::to_string_pretty(&subsystems::describe_all())?);
            Ok(())
        }
    }
}
