//! Role hierarchies.
//!
//! Three independent, strictly ordered enumerations: platform, workspace and
//! project. Ordering is carried by the enum discriminants, so `has_min` is a
//! plain `>=` comparison. Pure and stateless.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Platform-wide role attached to a user account.
///
/// `SuperAdmin` is the top tier: it grants unconditional access to every
/// active workspace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    User = 0,
    Admin = 1,
    SuperAdmin = 2,
}

impl PlatformRole {
    pub fn has_min(&self, min: PlatformRole) -> bool {
        *self >= min
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl Default for PlatformRole {
    fn default() -> Self {
        Self::User
    }
}

/// Role within a workspace, the root tenant boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Viewer = 0,
    Member = 1,
    Admin = 2,
    Owner = 3,
}

impl WorkspaceRole {
    pub fn has_min(&self, min: WorkspaceRole) -> bool {
        *self >= min
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

/// Role within a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Viewer = 0,
    Member = 1,
    Manager = 2,
    Owner = 3,
}

impl ProjectRole {
    pub fn has_min(&self, min: ProjectRole) -> bool {
        *self >= min
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "member" => Some(Self::Member),
            "manager" => Some(Self::Manager),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Member => "member",
            Self::Manager => "manager",
            Self::Owner => "owner",
        }
    }
}

pub fn is_super_admin(role: PlatformRole) -> bool {
    role == PlatformRole::SuperAdmin
}

pub fn require_super_admin(role: PlatformRole) -> Result<(), AppError> {
    if is_super_admin(role) {
        Ok(())
    } else {
        Err(AppError::forbidden("super admin required"))
    }
}
