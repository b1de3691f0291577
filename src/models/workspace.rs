use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Workspace {
    fn entity_type() -> &'static str { "workspace" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbWorkspace {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbWorkspace> for Workspace {
    type Error = AppError;

    fn try_from(value: DbWorkspace) -> Result<Self, Self::Error> {
        Ok(Workspace {
            id: value.id,
            name: value.name,
            slug: value.slug,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkspaceCreateRequest {
    #[schema(example = "Acme Inc")]
    pub name: String,
    #[schema(example = "acme")]
    pub slug: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkspaceUpdateRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}
