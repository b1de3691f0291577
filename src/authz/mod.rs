//! Authorization module - permission engine and ACL resolution
//!
//! This module implements the decision side of access control:
//! - three ordered role hierarchies (platform / workspace / project)
//! - principal expansion (user + active group memberships)
//! - bitmask ACL entries with deny-over-allow resolution
//! - cross-level inheritance (task <- project <- workspace)
//! - the `PermissionEngine` facade the rest of the service consults
//!
//! The engine is a plain value constructed with an injected `AuthzStore`;
//! there is no process-wide instance.

pub mod derive;
pub mod engine;
pub mod legacy;
pub mod principal;
pub mod resolver;
pub mod roles;
pub mod store;

pub use engine::{
    PermissionEngine, ProjectAccess, ProjectSummary, TaskAccess, WorkspaceAccess, WorkspaceSummary,
};
pub use principal::{Principal, PrincipalSet};
pub use resolver::{AclDecision, AclResolver};
pub use roles::{PlatformRole, ProjectRole, WorkspaceRole};
pub use store::{AuthzStore, MemoryAuthzStore, SqlAuthzStore};
