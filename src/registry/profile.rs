//! Profiles: one row per authenticated identity, with the registry role that
//! drives the access policy. Role assignment is admin-only; the first profile
//! in an empty store bootstraps without an actor.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::RegistryError;
use crate::core::model::{EntityKind, Profile, Role, validate_required};
use crate::core::policy::{self, Action, PolicyCtx};
use crate::core::store::Store;
use crate::core::time;
use crate::registry::{OutputFormat, events, require_actor_id};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension};

#[derive(Parser, Debug)]
#[clap(name = "profile", about = "Manage registry profiles and roles.")]
pub struct ProfileCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: ProfileCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Register a profile for an authenticated identity.
    Create {
        #[clap(long)]
        user: String,
        #[clap(long, default_value = "")]
        name: String,
        #[clap(long, default_value = "")]
        organization: String,
        #[clap(long, default_value = "")]
        email: String,
        #[clap(long, default_value = "")]
        phone: String,
        /// Initial role; requires an admin actor unless the store is empty.
        #[clap(long, value_enum)]
        role: Option<Role>,
    },
    /// Show a profile by user id.
    Get {
        #[clap(long)]
        user: String,
    },
    /// List profiles, optionally filtered by role.
    List {
        #[clap(long, value_enum)]
        role: Option<Role>,
    },
    /// Assign or change a profile's role (admin only).
    SetRole {
        #[clap(long)]
        user: String,
        #[clap(long, value_enum)]
        role: Role,
    },
    /// Update contact fields on a profile.
    Edit {
        #[clap(long)]
        user: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        organization: Option<String>,
        #[clap(long)]
        email: Option<String>,
        #[clap(long)]
        phone: Option<String>,
        /// Version token from the last read, for conflict detection.
        #[clap(long)]
        expected_version: i64,
    },
}

#[derive(Debug, Clone)]
pub struct ProfileInput {
    pub user_id: String,
    pub full_name: String,
    pub organization: String,
    pub email: String,
    pub phone: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub organization: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub expected_version: i64,
}

const SELECT_COLUMNS: &str =
    "id, user_id, full_name, organization, email, phone, role, created_at, updated_at, version";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        full_name: row.get(2)?,
        organization: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        role: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        version: row.get(9)?,
    })
}

pub(crate) fn upsert_row(conn: &Connection, p: &Profile) -> Result<(), RegistryError> {
    conn.execute(
        "INSERT OR REPLACE INTO profiles
         (id, user_id, full_name, organization, email, phone, role, created_at, updated_at, version)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            p.id,
            p.user_id,
            p.full_name,
            p.organization,
            p.email,
            p.phone,
            p.role,
            p.created_at,
            p.updated_at,
            p.version
        ],
    )?;
    Ok(())
}

pub(crate) fn get_by_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<Profile>, RegistryError> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE user_id = ?1", SELECT_COLUMNS),
        [user_id],
        map_row,
    )
    .optional()
    .map_err(RegistryError::Sqlite)
}

pub(crate) fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Profile>, RegistryError> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE id = ?1", SELECT_COLUMNS),
        [id],
        map_row,
    )
    .optional()
    .map_err(RegistryError::Sqlite)
}

/// Resolve the acting identity to its profile row, or fail with `NotFound`.
pub(crate) fn require_actor(conn: &Connection, user_id: &str) -> Result<Profile, RegistryError> {
    get_by_user(conn, user_id)?.ok_or_else(|| RegistryError::not_found("profile", user_id))
}

pub fn create_profile(
    store: &Store,
    actor_user: Option<&str>,
    input: ProfileInput,
) -> Result<Profile, RegistryError> {
    validate_required("profile", "user_id", &input.user_id)?;

    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user.unwrap_or("bluemrv"),
        "profile.create",
        |conn| {
            db::ensure_schema(conn)?;
            let tx = conn.unchecked_transaction()?;

            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
            let bootstrap = count == 0;

            if get_by_user(conn, &input.user_id)?.is_some() {
                return Err(RegistryError::validation(
                    "profile",
                    "user_id",
                    format!("'{}' is already registered", input.user_id),
                ));
            }

            // Role at creation is an admin grant; self sign-up carries no role.
            if input.role.is_some() && !bootstrap {
                let actor = require_actor(conn, require_actor_id(actor_user)?)?;
                if actor.role != Some(Role::Admin) {
                    return Err(RegistryError::Forbidden {
                        role: actor
                            .role
                            .map(|r| r.as_str().to_string())
                            .unwrap_or_else(|| "none".to_string()),
                        action: "create",
                        entity: "profile",
                    });
                }
            }

            let now = time::now_epoch_z();
            let profile = Profile {
                id: time::new_record_id(),
                user_id: input.user_id.clone(),
                full_name: input.full_name.clone(),
                organization: input.organization.clone(),
                email: input.email.clone(),
                phone: input.phone.clone(),
                role: input.role,
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };
            upsert_row(conn, &profile)?;
            events::record(
                conn,
                &store.root,
                "profile.create",
                EntityKind::Profile,
                Some(&profile.id),
                serde_json::to_value(&profile)?,
                actor_user.unwrap_or(&profile.user_id),
            )?;
            tx.commit()?;
            Ok(profile)
        },
    )
}

pub fn get_profile(store: &Store, user_id: &str) -> Result<Option<Profile>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "profile.get",
        |conn| {
            db::ensure_schema(conn)?;
            get_by_user(conn, user_id)
        },
    )
}

pub fn list_profiles(store: &Store, role: Option<Role>) -> Result<Vec<Profile>, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        "bluemrv",
        "profile.list",
        |conn| {
            db::ensure_schema(conn)?;
            let mut query = format!("SELECT {} FROM profiles", SELECT_COLUMNS);
            let mut params: Vec<String> = Vec::new();
            if let Some(role) = role {
                query.push_str(" WHERE role = ?");
                params.push(role.as_str().to_string());
            }
            query.push_str(" ORDER BY created_at");

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(RegistryError::Sqlite)?);
            }
            Ok(out)
        },
    )
}

/// Assign or change a role. Admin-only, regardless of target.
pub fn set_role(
    store: &Store,
    actor_user: &str,
    user_id: &str,
    role: Role,
) -> Result<Profile, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "profile.set_role",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = require_actor(conn, actor_user)?;
            if actor.role != Some(Role::Admin) {
                return Err(RegistryError::Forbidden {
                    role: actor
                        .role
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    action: "update",
                    entity: "profile",
                });
            }

            let tx = conn.unchecked_transaction()?;
            let mut target = get_by_user(conn, user_id)?
                .ok_or_else(|| RegistryError::not_found("profile", user_id))?;
            target.role = Some(role);
            target.updated_at = time::now_epoch_z();
            target.version += 1;
            upsert_row(conn, &target)?;
            events::record(
                conn,
                &store.root,
                "profile.update",
                EntityKind::Profile,
                Some(&target.id),
                serde_json::to_value(&target)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(target)
        },
    )
}

pub fn update_profile(
    store: &Store,
    actor_user: &str,
    user_id: &str,
    patch: ProfilePatch,
) -> Result<Profile, RegistryError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(
        &db::registry_db_path(&store.root),
        actor_user,
        "profile.update",
        |conn| {
            db::ensure_schema(conn)?;
            let actor = require_actor(conn, actor_user)?;
            let tx = conn.unchecked_transaction()?;
            let mut target = get_by_user(conn, user_id)?
                .ok_or_else(|| RegistryError::not_found("profile", user_id))?;

            // Contact updates are self-service; anything else is admin turf.
            if actor.id != target.id {
                let ctx = PolicyCtx {
                    created_by: Some(target.id.clone()),
                    ..Default::default()
                };
                policy::authorize(&actor, Action::Update, EntityKind::Profile, &ctx)?;
            }

            if target.version != patch.expected_version {
                return Err(RegistryError::Conflict {
                    entity: "profile",
                    id: target.id,
                });
            }

            if let Some(v) = patch.full_name {
                target.full_name = v;
            }
            if let Some(v) = patch.organization {
                target.organization = v;
            }
            if let Some(v) = patch.email {
                target.email = v;
            }
            if let Some(v) = patch.phone {
                target.phone = v;
            }
            target.updated_at = time::now_epoch_z();
            target.version += 1;
            upsert_row(conn, &target)?;
            events::record(
                conn,
                &store.root,
                "profile.update",
                EntityKind::Profile,
                Some(&target.id),
                serde_json::to_value(&target)?,
                actor_user,
            )?;
            tx.commit()?;
            Ok(target)
        },
    )
}

fn print_profile(p: &Profile, format: OutputFormat) -> Result<(), RegistryError> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope("profile.get", "ok", serde_json::to_value(p)?)
        ),
        OutputFormat::Text => {
            let role = p.role.map(|r| r.as_str()).unwrap_or("(none)");
            println!(
                "{}  {}  role={}  v{}",
                p.user_id.bold(),
                p.full_name,
                role.cyan(),
                p.version
            );
        }
    }
    Ok(())
}

pub fn run_profile_cli(
    store: &Store,
    actor: Option<&str>,
    cli: ProfileCli,
) -> Result<(), RegistryError> {
    let format = cli.format;
    match cli.command {
        ProfileCommand::Create {
            user,
            name,
            organization,
            email,
            phone,
            role,
        } => {
            let profile = create_profile(
                store,
                actor,
                ProfileInput {
                    user_id: user,
                    full_name: name,
                    organization,
                    email,
                    phone,
                    role,
                },
            )?;
            print_profile(&profile, format)?;
        }
        ProfileCommand::Get { user } => {
            let profile =
                get_profile(store, &user)?.ok_or_else(|| RegistryError::not_found("profile", &user))?;
            print_profile(&profile, format)?;
        }
        ProfileCommand::List { role } => {
            for profile in list_profiles(store, role)? {
                print_profile(&profile, format)?;
            }
        }
        ProfileCommand::SetRole { user, role } => {
            let profile = set_role(store, require_actor_id(actor)?, &user, role)?;
            print_profile(&profile, format)?;
        }
        ProfileCommand::Edit {
            user,
            name,
            organization,
            email,
            phone,
            expected_version,
        } => {
            let profile = update_profile(
                store,
                require_actor_id(actor)?,
                &user,
                ProfilePatch {
                    full_name: name,
                    organization,
                    email,
                    phone,
                    expected_version,
                },
            )?;
            print_profile(&profile, format)?;
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "profile",
        "version": "1.0.0",
        "description": "Identity profiles and registry roles",
        "commands": [
            { "name": "create", "description": "Register a profile" },
            { "name": "get", "description": "Show a profile" },
            { "name": "list", "description": "List profiles" },
            { "name": "set-role", "description": "Assign a role (admin only)" },
            { "name": "edit", "description": "Update contact fields" }
        ],
        "storage": ["profiles"]
    })
}
