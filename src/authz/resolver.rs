//! ACL entry resolution.
//!
//! Evaluation order for a single resource:
//! 1. any matching deny entry carrying the required bit -> Deny
//! 2. OR of matching allow masks carries the bit -> Allow
//! 3. otherwise -> NoMatch (caller falls back to inheritance)
//!
//! Explicit denial overrides any allow, NTFS-style. Role lookups go through
//! `effective_mask`, which subtracts denied bits before the mask is mapped,
//! so a deny entry also demotes or erases an ACL-derived role.

use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::acl::{AccessMask, ResourceRef};

use super::derive;
use super::principal::PrincipalSet;
use super::roles::{ProjectRole, WorkspaceRole};
use super::store::AuthzStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    Allow,
    Deny,
    NoMatch,
}

#[derive(Clone)]
pub struct AclResolver {
    store: Arc<dyn AuthzStore>,
}

impl AclResolver {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    /// Decide whether the principal set holds `required` on the resource.
    pub async fn evaluate(
        &self,
        principals: &PrincipalSet,
        resource: ResourceRef,
        required: AccessMask,
    ) -> Result<AclDecision, AppError> {
        let (allow, deny) = self.matching_masks(principals, resource).await?;

        if deny.intersects(required) {
            tracing::debug!(
                user_id = %principals.user_id,
                resource_type = resource.resource_type.as_str(),
                resource_id = ?resource.resource_id,
                required = required.bits(),
                "acl deny"
            );
            return Ok(AclDecision::Deny);
        }

        if allow.contains(required) {
            tracing::debug!(
                user_id = %principals.user_id,
                resource_type = resource.resource_type.as_str(),
                resource_id = ?resource.resource_id,
                required = required.bits(),
                "acl allow"
            );
            return Ok(AclDecision::Allow);
        }

        Ok(AclDecision::NoMatch)
    }

    /// OR of matching allow masks with every denied bit removed.
    pub async fn effective_mask(
        &self,
        principals: &PrincipalSet,
        resource: ResourceRef,
    ) -> Result<AccessMask, AppError> {
        let (allow, deny) = self.matching_masks(principals, resource).await?;
        Ok(allow.difference(deny))
    }

    /// Workspace role granted directly by ACL entries on the workspace.
    pub async fn workspace_role(
        &self,
        principals: &PrincipalSet,
        workspace_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, AppError> {
        let mask = self
            .effective_mask(principals, ResourceRef::workspace(workspace_id))
            .await?;
        Ok(derive::workspace_role_from_mask(mask))
    }

    /// Project role granted directly by ACL entries on the project.
    pub async fn project_role(
        &self,
        principals: &PrincipalSet,
        project_id: Uuid,
    ) -> Result<Option<ProjectRole>, AppError> {
        let mask = self
            .effective_mask(principals, ResourceRef::project(project_id))
            .await?;
        Ok(derive::project_role_from_mask(mask))
    }

    async fn matching_masks(
        &self,
        principals: &PrincipalSet,
        resource: ResourceRef,
    ) -> Result<(AccessMask, AccessMask), AppError> {
        let entries = self
            .store
            .acl_entries(resource.resource_type, resource.resource_id)
            .await?;

        let mut allow = AccessMask::empty();
        let mut deny = AccessMask::empty();
        for entry in entries {
            if !principals.contains(entry.principal_kind, entry.principal_id) {
                continue;
            }
            if entry.deny {
                deny |= entry.access;
            } else {
                allow |= entry.access;
            }
        }

        Ok((allow, deny))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::acl::PrincipalKind;
    use crate::authz::store::MemoryAuthzStore;

    fn setup() -> (Arc<MemoryAuthzStore>, AclResolver) {
        let store = Arc::new(MemoryAuthzStore::new());
        let resolver = AclResolver::new(store.clone());
        (store, resolver)
    }

    #[tokio::test]
    async fn allow_entry_grants_the_bit() {
        let (store, resolver) = setup();
        let user = Uuid::new_v4();
        let ws = Uuid::new_v4();
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );

        let set = PrincipalSet::user_only(user);
        let decision = resolver
            .evaluate(&set, ResourceRef::workspace(ws), AccessMask::READ)
            .await
            .unwrap();
        assert_eq!(decision, AclDecision::Allow);

        let decision = resolver
            .evaluate(&set, ResourceRef::workspace(ws), AccessMask::DELETE)
            .await
            .unwrap();
        assert_eq!(decision, AclDecision::NoMatch);
    }

    #[tokio::test]
    async fn deny_overrides_any_allow() {
        let (store, resolver) = setup();
        let user = Uuid::new_v4();
        let ws = Uuid::new_v4();
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::WRITE,
            true,
        );

        let set = PrincipalSet::user_only(user);
        let decision = resolver
            .evaluate(&set, ResourceRef::workspace(ws), AccessMask::WRITE)
            .await
            .unwrap();
        assert_eq!(decision, AclDecision::Deny);

        // Undenied bits still resolve.
        let decision = resolver
            .evaluate(&set, ResourceRef::workspace(ws), AccessMask::READ)
            .await
            .unwrap();
        assert_eq!(decision, AclDecision::Allow);
    }

    #[tokio::test]
    async fn denied_bits_demote_the_derived_role() {
        let (store, resolver) = setup();
        let user = Uuid::new_v4();
        let ws = Uuid::new_v4();
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::WRITE,
            true,
        );

        let set = PrincipalSet::user_only(user);
        let role = resolver.workspace_role(&set, ws).await.unwrap();
        assert_eq!(role, Some(WorkspaceRole::Viewer));
    }

    #[tokio::test]
    async fn allow_masks_are_ored_across_entries() {
        let (store, resolver) = setup();
        let user = Uuid::new_v4();
        let group = store.add_group(None, "ops", true);
        store.add_group_member(group, user);
        let project = Uuid::new_v4();
        store.add_acl_entry(
            ResourceRef::project(project),
            PrincipalKind::User,
            user,
            AccessMask::READ,
            false,
        );
        store.add_acl_entry(
            ResourceRef::project(project),
            PrincipalKind::Group,
            group,
            AccessMask::WRITE,
            false,
        );

        let set = PrincipalSet::expand(store.as_ref(), user).await.unwrap();
        let role = resolver.project_role(&set, project).await.unwrap();
        assert_eq!(role, Some(ProjectRole::Member));
    }

    #[tokio::test]
    async fn foreign_principals_never_match() {
        let (store, resolver) = setup();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ws = Uuid::new_v4();
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            other,
            AccessMask::FULL,
            false,
        );

        let set = PrincipalSet::user_only(user);
        let decision = resolver
            .evaluate(&set, ResourceRef::workspace(ws), AccessMask::READ)
            .await
            .unwrap();
        assert_eq!(decision, AclDecision::NoMatch);
    }
}
