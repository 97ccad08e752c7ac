//! Common type definitions.
//!
//! Entity IDs are `BIGSERIAL` keys wrapped in type aliases, and [`CrudMethod`] names the four
//! verbs the CRUD permission generator produces for every table.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

// Type aliases for IDs
pub type UserId = i64;
pub type PermissionId = i64;
pub type GroupId = i64;
pub type TokenId = i64;
pub type RoomId = i64;
pub type MessageId = i64;

/// Table names, as used for permission targets and filter error messages.
pub mod tables {
    pub const USERS: &str = "users";
    pub const PERMISSIONS: &str = "permissions";
    pub const GROUPS: &str = "groups";
    pub const CHAT_ROOMS: &str = "chat_rooms";
    pub const CHAT_MESSAGES: &str = "chat_messages";

    /// Tables whose CRUD permissions and groups are seeded at startup.
    pub const SEEDED: [&str; 5] = [USERS, PERMISSIONS, GROUPS, CHAT_ROOMS, CHAT_MESSAGES];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CrudMethod {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudMethod {
    pub const ALL: [CrudMethod; 4] = [CrudMethod::Create, CrudMethod::Read, CrudMethod::Update, CrudMethod::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrudMethod::Create => "create",
            CrudMethod::Read => "read",
            CrudMethod::Update => "update",
            CrudMethod::Delete => "delete",
        }
    }

    /// "Create", "Read", ...
    pub fn title(&self) -> &'static str {
        match self {
            CrudMethod::Create => "Create",
            CrudMethod::Read => "Read",
            CrudMethod::Update => "Update",
            CrudMethod::Delete => "Delete",
        }
    }
}

impl fmt::Display for CrudMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
