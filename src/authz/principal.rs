use std::collections::HashSet;

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::acl::PrincipalKind;

use super::store::AuthzStore;

/// One grantee an ACL entry can name: a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principal {
    User(Uuid),
    Group(Uuid),
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::Group(_) => PrincipalKind::Group,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) | Self::Group(id) => *id,
        }
    }
}

/// The full principal set a request is evaluated against: the user itself
/// plus every ACTIVE group it belongs to. Inactive groups are excluded at
/// the membership query, so their entries never match.
#[derive(Debug, Clone)]
pub struct PrincipalSet {
    pub user_id: Uuid,
    group_ids: HashSet<Uuid>,
}

impl PrincipalSet {
    /// Resolve the principal set for a user. A datastore failure propagates;
    /// it is never treated as "no groups".
    pub async fn expand(store: &dyn AuthzStore, user_id: Uuid) -> Result<Self, AppError> {
        let group_ids = store.active_group_ids(user_id).await?;
        Ok(Self {
            user_id,
            group_ids: group_ids.into_iter().collect(),
        })
    }

    /// A set containing only the user principal. Used where group context is
    /// already known to be irrelevant (tests, seeding).
    pub fn user_only(user_id: Uuid) -> Self {
        Self {
            user_id,
            group_ids: HashSet::new(),
        }
    }

    pub fn contains(&self, kind: PrincipalKind, id: Uuid) -> bool {
        match kind {
            PrincipalKind::User => id == self.user_id,
            PrincipalKind::Group => self.group_ids.contains(&id),
        }
    }

    pub fn group_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.group_ids.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Principal> + '_ {
        std::iter::once(Principal::User(self.user_id))
            .chain(self.group_ids.iter().map(|id| Principal::Group(*id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::store::MemoryAuthzStore;

    #[tokio::test]
    async fn expand_includes_user_and_active_groups_only() {
        let store = MemoryAuthzStore::new();
        let user = Uuid::new_v4();
        let active = store.add_group(None, "active", true);
        let inactive = store.add_group(None, "inactive", false);
        store.add_group_member(active, user);
        store.add_group_member(inactive, user);

        let set = PrincipalSet::expand(&store, user).await.unwrap();

        assert!(set.contains(PrincipalKind::User, user));
        assert!(set.contains(PrincipalKind::Group, active));
        assert!(!set.contains(PrincipalKind::Group, inactive));
        assert_eq!(set.iter().count(), 2);
    }
}
