//! API request/response models for groups.

use super::pagination::Pagination;
use crate::db::models::groups::{GroupDBResponse, GroupUpdateDBRequest};
use crate::types::GroupId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub use super::permissions::{PermissionCreate as GroupCreate, PermissionUpdate as GroupUpdate};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupResponse {
    pub id: GroupId,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub target_table: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupDBResponse> for GroupResponse {
    fn from(db: GroupDBResponse) -> Self {
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

pub fn is_unchanged(request: &GroupUpdateDBRequest, stored: &GroupDBResponse) -> bool {
    request.name == stored.name
        && request.display_name == stored.display_name
        && request.description == stored.description
        && request.target_table == stored.target_table
}

/// Query parameters for listing groups
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListGroupsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Group name prefix
    pub name: Option<String>,

    /// Exact target table
    pub target_table: Option<String>,
}
