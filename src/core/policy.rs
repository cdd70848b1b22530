//! Row-level access policy.
//!
//! One evaluation function runs before every store mutation instead of ad hoc
//! checks per call site. Workflow modules additionally enforce the per-edge
//! role lists of the state machines; this layer answers the coarser question
//! "may this role perform this action on this entity at all, given ownership".
//!
//! Reads are granted to every resolved profile (viewer-grade access is
//! universal), so only create/update/delete/transition are gated here.

use crate::core::error::RegistryError;
use crate::core::model::{EntityKind, Profile, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Transition,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Transition => "transition",
        }
    }
}

/// Ownership context for the row being touched. Fields are filled in by the
/// subsystem before the check; absent fields simply never match the actor.
#[derive(Debug, Default, Clone)]
pub struct PolicyCtx {
    /// Profile id recorded as creator of the row (or its parent project).
    pub created_by: Option<String>,
    /// Profile id managing the owning project.
    pub project_manager_id: Option<String>,
    /// Profile id that collected the row (monitoring records).
    pub collected_by: Option<String>,
}

impl PolicyCtx {
    fn owned_by(&self, profile_id: &str) -> bool {
        self.created_by.as_deref() == Some(profile_id)
            || self.project_manager_id.as_deref() == Some(profile_id)
    }
}

fn forbidden(actor: &Profile, action: Action, entity: EntityKind) -> RegistryError {
    RegistryError::Forbidden {
        role: actor
            .role
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| "none".to_string()),
        action: action.as_str(),
        entity: entity.as_str(),
    }
}

/// Decide whether `actor` may perform `action` on `entity` in context `ctx`.
pub fn authorize(
    actor: &Profile,
    action: Action,
    entity: EntityKind,
    ctx: &PolicyCtx,
) -> Result<(), RegistryError> {
    if action == Action::Read {
        return Ok(());
    }

    let Some(role) = actor.role else {
        return Err(forbidden(actor, action, entity));
    };

    let allowed = match role {
        Role::Admin => true,
        Role::ProjectManager => match entity {
            EntityKind::Project => {
                action == Action::Create || ctx.owned_by(&actor.id)
            }
            EntityKind::Site
            | EntityKind::Report
            | EntityKind::MonitoringRecord
            | EntityKind::Document => {
                // Children inherit ownership from the parent project.
                action == Action::Create || ctx.owned_by(&actor.id)
            }
            EntityKind::Profile => {
                action == Action::Update && ctx.created_by.as_deref() == Some(actor.id.as_str())
            }
            EntityKind::VerificationRecord => false,
        },
        Role::FieldResearcher => match entity {
            EntityKind::MonitoringRecord => match action {
                Action::Create => true,
                Action::Update => {
                    ctx.collected_by.is_none()
                        || ctx.collected_by.as_deref() == Some(actor.id.as_str())
                }
                _ => false,
            },
            // Field researchers author reports but only the draft-stage
            // transition is theirs; the workflow tables enforce that edge.
            EntityKind::Report => match action {
                Action::Create | Action::Transition => true,
                Action::Update => ctx.created_by.as_deref() == Some(actor.id.as_str()),
                _ => false,
            },
            EntityKind::Document => action == Action::Create,
            _ => false,
        },
        Role::Verifier => match entity {
            EntityKind::VerificationRecord => {
                matches!(action, Action::Create | Action::Update | Action::Transition)
            }
            EntityKind::Report => action == Action::Transition,
            _ => false,
        },
        Role::Viewer => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(forbidden(actor, action, entity))
    }
}

/// Per-edge role gate used by the workflow engines. `Forbidden` names the
/// attempted action and entity so the CLI message is actionable.
pub fn require_role(
    actor: &Profile,
    allowed: &[Role],
    action: Action,
    entity: EntityKind,
) -> Result<(), RegistryError> {
    match actor.role {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => Err(forbidden(actor, action, entity)),
    }
}
