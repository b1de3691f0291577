//! Role derivation tables.
//!
//! The single place where ACL bitmasks become coarse roles and where a
//! workspace role relaxes into the project role it implies. Every API path
//! maps through these tables; nothing re-derives them inline.

use crate::models::acl::AccessMask;

use super::roles::{ProjectRole, WorkspaceRole};

/// Map an effective workspace ACL mask to a workspace role.
///
/// PERMISSIONS is the highest tier. DELETE carries no tier of its own at the
/// workspace level; the manager-tier mapping exists only for projects.
pub fn workspace_role_from_mask(mask: AccessMask) -> Option<WorkspaceRole> {
    if mask.contains(AccessMask::PERMISSIONS) {
        Some(WorkspaceRole::Owner)
    } else if mask.contains(AccessMask::WRITE) {
        Some(WorkspaceRole::Member)
    } else if mask.contains(AccessMask::READ) {
        Some(WorkspaceRole::Viewer)
    } else {
        None
    }
}

/// Map an effective project ACL mask to a project role.
pub fn project_role_from_mask(mask: AccessMask) -> Option<ProjectRole> {
    if mask.contains(AccessMask::PERMISSIONS) {
        Some(ProjectRole::Owner)
    } else if mask.contains(AccessMask::DELETE) {
        Some(ProjectRole::Manager)
    } else if mask.contains(AccessMask::WRITE) {
        Some(ProjectRole::Member)
    } else if mask.contains(AccessMask::READ) {
        Some(ProjectRole::Viewer)
    } else {
        None
    }
}

/// The project role a workspace role confers on every project beneath it.
///
/// An explicit lookup, not an ordinal cast: the two enumerations are not
/// isomorphic (workspace Admin relaxes to project Manager).
pub fn derive_project_role(workspace_role: WorkspaceRole) -> ProjectRole {
    match workspace_role {
        WorkspaceRole::Owner => ProjectRole::Owner,
        WorkspaceRole::Admin => ProjectRole::Manager,
        WorkspaceRole::Member => ProjectRole::Member,
        WorkspaceRole::Viewer => ProjectRole::Viewer,
    }
}

/// Effective role: the higher-ranked of the directly granted role and the
/// role inherited from the containing resource.
pub fn reduce_effective_role<R: Ord + Copy>(direct: Option<R>, derived: R) -> R {
    match direct {
        Some(d) if d > derived => d,
        _ => derived,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bits_map_to_expected_tiers() {
        assert_eq!(workspace_role_from_mask(AccessMask::READ), Some(WorkspaceRole::Viewer));
        assert_eq!(workspace_role_from_mask(AccessMask::WRITE), Some(WorkspaceRole::Member));
        assert_eq!(workspace_role_from_mask(AccessMask::PERMISSIONS), Some(WorkspaceRole::Owner));

        assert_eq!(project_role_from_mask(AccessMask::READ), Some(ProjectRole::Viewer));
        assert_eq!(project_role_from_mask(AccessMask::WRITE), Some(ProjectRole::Member));
        assert_eq!(project_role_from_mask(AccessMask::DELETE), Some(ProjectRole::Manager));
        assert_eq!(project_role_from_mask(AccessMask::PERMISSIONS), Some(ProjectRole::Owner));
    }

    #[test]
    fn composed_masks_take_the_highest_tier() {
        assert_eq!(
            project_role_from_mask(AccessMask::READ | AccessMask::WRITE),
            Some(ProjectRole::Member)
        );
        assert_eq!(
            project_role_from_mask(AccessMask::WRITE | AccessMask::DELETE),
            Some(ProjectRole::Manager)
        );
        assert_eq!(
            project_role_from_mask(AccessMask::READ | AccessMask::PERMISSIONS),
            Some(ProjectRole::Owner)
        );
        assert_eq!(
            workspace_role_from_mask(AccessMask::READ | AccessMask::WRITE),
            Some(WorkspaceRole::Member)
        );
    }

    #[test]
    fn delete_alone_confers_no_workspace_tier() {
        assert_eq!(workspace_role_from_mask(AccessMask::DELETE), None);
        // EXECUTE is reserved and never participates.
        assert_eq!(workspace_role_from_mask(AccessMask::EXECUTE), None);
        assert_eq!(workspace_role_from_mask(AccessMask::empty()), None);
    }

    #[test]
    fn derivation_table_is_the_fixed_relaxation() {
        assert_eq!(derive_project_role(WorkspaceRole::Owner), ProjectRole::Owner);
        assert_eq!(derive_project_role(WorkspaceRole::Admin), ProjectRole::Manager);
        assert_eq!(derive_project_role(WorkspaceRole::Member), ProjectRole::Member);
        assert_eq!(derive_project_role(WorkspaceRole::Viewer), ProjectRole::Viewer);
    }

    #[test]
    fn effective_role_is_the_max() {
        assert_eq!(
            reduce_effective_role(Some(ProjectRole::Viewer), ProjectRole::Owner),
            ProjectRole::Owner
        );
        assert_eq!(
            reduce_effective_role(Some(ProjectRole::Owner), ProjectRole::Viewer),
            ProjectRole::Owner
        );
        assert_eq!(reduce_effective_role(None, ProjectRole::Member), ProjectRole::Member);
    }
}
