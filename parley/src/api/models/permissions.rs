//! API request/response models for permissions. Groups share the request shapes.

use super::pagination::Pagination;
use crate::db::models::permissions::{PermissionCreateDBRequest, PermissionDBResponse, PermissionUpdateDBRequest};
use crate::types::PermissionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Request body for creating a permission, or replacing one with PUT.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionCreate {
    #[schema(example = "read_reports")]
    pub name: String,
    #[schema(example = "Read reports")]
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[schema(example = "reports")]
    pub target_table: Option<String>,
}

impl From<PermissionCreate> for PermissionCreateDBRequest {
    fn from(api: PermissionCreate) -> Self {
        Self {
            name: api.name,
            display_name: api.display_name,
            description: api.description,
            target_table: api.target_table,
        }
    }
}

/// Partial update (PATCH). Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PermissionUpdate {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub target_table: Option<String>,
}

impl PermissionUpdate {
    pub fn sets_every_field(&self) -> bool {
        self.name.is_some() && self.display_name.is_some() && self.description.is_some() && self.target_table.is_some()
    }

    /// The row state after applying this update on top of the stored fields
    pub fn merge(
        self,
        name: &str,
        display_name: &Option<String>,
        description: &Option<String>,
        target_table: &Option<String>,
    ) -> PermissionUpdateDBRequest {
        PermissionUpdateDBRequest {
            name: self.name.unwrap_or_else(|| name.to_string()),
            display_name: self.display_name.or_else(|| display_name.clone()),
            description: self.description.or_else(|| description.clone()),
            target_table: self.target_table.or_else(|| target_table.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionResponse {
    pub id: PermissionId,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub target_table: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PermissionDBResponse> for PermissionResponse {
    fn from(db: PermissionDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            display_name: db.display_name,
            description: db.description,
            target_table: db.target_table,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Whether an update would leave the row untouched
pub fn is_unchanged(request: &PermissionUpdateDBRequest, stored: &PermissionDBResponse) -> bool {
    request.name == stored.name
        && request.display_name == stored.display_name
        && request.description == stored.description
        && request.target_table == stored.target_table
}

/// Query parameters for listing permissions
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListPermissionsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Exact permission name
    pub name: Option<String>,

    /// Exact target table
    pub target_table: Option<String>,
}

/// A list of permission names, as used by the grant endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionList {
    pub permissions: Vec<String>,
}
