//! CLI struct definitions for the bluemrv command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::registry::{
    dashboard, document, events, monitoring, profile, project, report, site, verification,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "bluemrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first registry for blue carbon restoration: projects, field monitoring, and verified carbon credit reporting. 🌊"
)]
pub(crate) struct Cli {
    /// Store root directory (overrides BLUEMRV_ROOT and bluemrv.toml).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Actor user id mutations run as (overrides BLUEMRV_ACTOR and bluemrv.toml).
    #[clap(long, global = true)]
    pub actor: Option<String>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Initialize the registry store in the resolved root
    Init,
    /// Manage user profiles and roles
    Profile(profile::ProfileCli),
    /// Manage restoration projects
    Project(project::ProjectCli),
    /// Manage monitoring sites
    Site(site::SiteCli),
    /// Capture and review field monitoring data
    Monitoring(monitoring::MonitoringCli),
    /// Author reports and drive their review workflow
    Report(report::ReportCli),
    /// Review reports and rule on carbon credit claims
    Verification(verification::VerificationCli),
    /// Attach files to projects, sites, and reports
    Document(document::DocumentCli),
    /// Registry-wide rollups and credit totals
    Dashboard(dashboard::DashboardCli),
    /// Inspect or replay the event log
    Events(events::EventsCli),
    /// Print the machine-readable subsystem descriptors
    Subsystems,
}
