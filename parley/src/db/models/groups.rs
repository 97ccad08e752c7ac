//! Database models for groups.

use crate::db::filter::{Field, Filterable};
use crate::types::{GroupId, tables};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Groups are created from the same shape as permissions
pub use super::permissions::PermissionCreateDBRequest as GroupCreateDBRequest;

/// Complete new state of a group row
pub type GroupUpdateDBRequest = GroupCreateDBRequest;

#[derive(Debug, Clone, FromRow)]
pub struct GroupDBResponse {
    pub id: GroupId,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub target_table: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Filterable for GroupDBResponse {
    const MODEL: &'static str = "Group";
    const TABLE: &'static str = tables::GROUPS;
    const FIELDS: &'static [Field] = &[
        Field::int("id"),
        Field::text("name"),
        Field::text("display_name"),
        Field::text("description"),
        Field::text("target_table"),
        Field::timestamp("created_at"),
        Field::timestamp("updated_at"),
    ];
}
