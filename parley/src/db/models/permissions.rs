//! Database models for permissions, and the CRUD entry generator shared with groups.

use crate::db::filter::{Field, Filterable};
use crate::types::{CrudMethod, PermissionId, tables};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a permission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCreateDBRequest {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub target_table: Option<String>,
}

/// Complete new state of a permission row
pub type PermissionUpdateDBRequest = PermissionCreateDBRequest;

#[derive(Debug, Clone, FromRow)]
pub struct PermissionDBResponse {
    pub id: PermissionId,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub target_table: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Filterable for PermissionDBResponse {
    const MODEL: &'static str = "Permission";
    const TABLE: &'static str = tables::PERMISSIONS;
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

/// Which registry a generated CRUD entry is for. Only changes the description wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudKind {
    Permission,
    Group,
}

impl CrudKind {
    fn noun(&self) -> &'static str {
        match self {
            CrudKind::Permission => "permission",
            CrudKind::Group => "group",
        }
    }
}

/// `update_users`, `read_chat_rooms`, ...
pub fn format_permission_name(method: CrudMethod, table: &str) -> String {
    format!("{}_{}", method.as_str(), table)
}

fn title_case(table: &str) -> String {
    table
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// The four create/read/update/delete entries for `table`.
pub fn crud_data_list(table: &str, kind: CrudKind) -> Vec<PermissionCreateDBRequest> {
    CrudMethod::ALL
        .iter()
        .map(|method| PermissionCreateDBRequest {
            name: format_permission_name(*method, table),
            display_name: Some(format!("{} {}", method.title(), table)),
            description: Some(format!(
                "This {} allows user to {} the {} model.",
                kind.noun(),
                method.as_str(),
                title_case(table)
            )),
            target_table: Some(table.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_name() {
        assert_eq!(format_permission_name(CrudMethod::Update, "users"), "update_users");
        assert_eq!(format_permission_name(CrudMethod::Read, "chat_rooms"), "read_chat_rooms");
    }

    #[test]
    fn test_crud_data_list() {
        let entries = crud_data_list("users", CrudKind::Permission);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["create_users", "read_users", "update_users", "delete_users"]);

        assert_eq!(entries[1].display_name.as_deref(), Some("Read users"));
        assert_eq!(
            entries[1].description.as_deref(),
            Some("This permission allows user to read the Users model.")
        );
        assert_eq!(entries[1].target_table.as_deref(), Some("users"));
    }

    #[test]
    fn test_group_descriptions() {
        let entries = crud_data_list("chat_messages", CrudKind::Group);
        assert_eq!(
            entries[3].description.as_deref(),
            Some("This group allows user to delete the Chat_Messages model.")
        );
    }
}
