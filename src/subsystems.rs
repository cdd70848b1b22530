//! Subsystem registration — centralizes subsystem descriptors.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::registry::{
    dashboard, document, events, monitoring, profile, project, report, site, verification,
};

pub(crate) struct Subsystem {
    pub name: &'static str,
    pub schema: fn() -> serde_json::Value,
}

/// All registry subsystems, in the order they appear in `bluemrv --help`.
pub(crate) const SUBSYSTEMS: &[Subsystem] = &[
    Subsystem { name: "profile", schema: profile::schema },
    Subsystem { name: "project", schema: project::schema },
    Subsystem { name: "site", schema: site::schema },
    Subsystem { name: "monitoring", schema: monitoring::schema },
    Subsystem { name: "report", schema: report::schema },
    Subsystem { name: "verification", schema: verification::schema },
    Subsystem { name: "document", schema: document::schema },
    Subsystem { name: "dashboard", schema: dashboard::schema },
    Subsystem { name: "events", schema: events::schema },
];

/// Aggregate descriptor for every subsystem, used by `bluemrv subsystems`.
pub(crate) fn describe_all() -> serde_json::Value {
    let order: Vec<&str> = SUBSYSTEMS.iter().map(|s| s.name).collect();
    let subsystems: Vec<serde_json::Value> = SUBSYSTEMS.iter().map(|s| (s.schema)()).collect();
    serde_json::json!({
        "name": "bluemrv",
        "version": env!("CARGO_PKG_VERSION"),
        "order": order,
        "subsystems": subsystems,
    })
}
