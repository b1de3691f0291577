use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

bitflags! {
    /// Permission bits carried by an ACL entry.
    ///
    /// PERMISSIONS is the highest tier: it grants the right to manage the
    /// resource's other ACL entries. EXECUTE is reserved and unused by the
    /// current policy.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessMask: i64 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;
        const DELETE = 8;
        const PERMISSIONS = 16;
    }
}

impl AccessMask {
    /// Everything a workspace/project creator receives on the new resource.
    pub const FULL: AccessMask = AccessMask::READ
        .union(AccessMask::WRITE)
        .union(AccessMask::DELETE)
        .union(AccessMask::PERMISSIONS);
}

impl Serialize for AccessMask {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AccessMask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        AccessMask::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid access bits: {}", bits)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Global pseudo-resource granting platform-wide administrative capability.
    Admin,
    Workspace,
    Project,
    Task,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Workspace => "workspace",
            Self::Project => "project",
            Self::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "workspace" => Some(Self::Workspace),
            "project" => Some(Self::Project),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// A reference to one protected resource.
///
/// `resource_id` is `None` exactly when `resource_type` is `Admin`; the
/// constructors are the only way these are built, so the pairing holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub resource_id: Option<Uuid>,
}

impl ResourceRef {
    pub fn admin() -> Self {
        Self {
            resource_type: ResourceType::Admin,
            resource_id: None,
        }
    }

    pub fn workspace(id: Uuid) -> Self {
        Self {
            resource_type: ResourceType::Workspace,
            resource_id: Some(id),
        }
    }

    pub fn project(id: Uuid) -> Self {
        Self {
            resource_type: ResourceType::Project,
            resource_id: Some(id),
        }
    }

    pub fn task(id: Uuid) -> Self {
        Self {
            resource_type: ResourceType::Task,
            resource_id: Some(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AclEntry {
    pub id: Uuid,
    pub resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    pub principal_kind: PrincipalKind,
    pub principal_id: Uuid,
    #[schema(value_type = i64, example = 3)]
    pub access: AccessMask,
    pub deny: bool,
    pub created_at: DateTime<Utc>,
}

impl AclEntry {
    /// True when this entry names one of the given principals.
    pub fn matches_principal(&self, kind: PrincipalKind, id: Uuid) -> bool {
        self.principal_kind == kind && self.principal_id == id
    }
}

impl Loggable for AclEntry {
    fn entity_type() -> &'static str { "acl_entry" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAclEntry {
    pub id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub principal_kind: String,
    pub principal_id: Uuid,
    pub access: i64,
    pub deny: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAclEntry> for AclEntry {
    type Error = AppError;

    fn try_from(value: DbAclEntry) -> Result<Self, Self::Error> {
        let resource_type = ResourceType::parse(&value.resource_type)
            .ok_or_else(|| AppError::internal(format!("unknown resource type: {}", value.resource_type)))?;
        let principal_kind = PrincipalKind::parse(&value.principal_kind)
            .ok_or_else(|| AppError::internal(format!("unknown principal kind: {}", value.principal_kind)))?;

        Ok(AclEntry {
            id: value.id,
            resource_type,
            resource_id: value.resource_id,
            principal_kind,
            principal_id: value.principal_id,
            // Bits outside the defined set never participate in evaluation.
            access: AccessMask::from_bits_truncate(value.access),
            deny: value.deny,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AclGrantRequest {
    pub resource_type: ResourceType,
    pub resource_id: Option<Uuid>,
    pub principal_kind: PrincipalKind,
    pub principal_id: Uuid,
    /// Bitmask: READ=1, WRITE=2, DELETE=8, PERMISSIONS=16.
    #[schema(value_type = i64, example = 3)]
    pub access: AccessMask,
    #[serde(default)]
    pub deny: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AclListQuery {
    pub resource_type: ResourceType,
    pub resource_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_bits_are_truncated_out() {
        let mask = AccessMask::from_bits_truncate(0b1110_0011);
        assert_eq!(mask, AccessMask::READ | AccessMask::WRITE);
    }

    #[test]
    fn undefined_bits_are_rejected_on_deserialize() {
        let err = serde_json::from_str::<AccessMask>("64");
        assert!(err.is_err());

        let ok: AccessMask = serde_json::from_str("17").unwrap();
        assert_eq!(ok, AccessMask::READ | AccessMask::PERMISSIONS);
    }

    #[test]
    fn resource_type_round_trip() {
        for rt in [ResourceType::Admin, ResourceType::Workspace, ResourceType::Project, ResourceType::Task] {
            assert_eq!(ResourceType::parse(rt.as_str()), Some(rt));
        }
        assert_eq!(ResourceType::parse("document"), None);
    }

    #[test]
    fn admin_ref_has_no_id() {
        assert_eq!(ResourceRef::admin().resource_id, None);
        assert!(ResourceRef::workspace(Uuid::new_v4()).resource_id.is_some());
    }
}
