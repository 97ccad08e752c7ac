//! API request/response models for users.

use super::pagination::Pagination;
use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Account role. Stored as lowercase text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    #[default]
    Active,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Active => "active",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "active" => Ok(Role::Active),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl TryFrom<String> for UserStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// User request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    #[serde(default)]
    pub role: Role,
}

/// Full replacement of a user (PUT). A missing password keeps the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserReplace {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,
}

/// Partial update of a user (PATCH).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    pub role: Option<Role>,
}

impl UserUpdate {
    /// True when the body names every updatable field, which is what PUT is for
    pub fn sets_every_field(&self) -> bool {
        self.username.is_some()
            && self.first_name.is_some()
            && self.last_name.is_some()
            && self.password.is_some()
            && self.email.is_some()
            && self.address.is_some()
            && self.age.is_some()
            && self.role.is_some()
    }

    /// Reset the submitted role to the stored one when the author may not change roles
    pub fn role_guard(&mut self, stored: &UserDBResponse, author: &CurrentUser) {
        if !author.is_admin() && self.role.is_some_and(|role| role != stored.role) {
            self.role = Some(stored.role);
        }
    }
}

impl UserReplace {
    pub fn role_guard(&mut self, stored: &UserDBResponse, author: &CurrentUser) {
        if !author.is_admin() {
            self.role = stored.role;
            self.status = stored.status;
        }
    }
}

// User response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            first_name: db.first_name,
            last_name: db.last_name,
            email: db.email,
            address: db.address,
            age: db.age,
            role: db.role,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing users
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

/// A list of usernames, as used by the membership endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserList {
    pub users: Vec<String>,
}

/// The authenticated user, as resolved from a session cookie or bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub status: UserStatus,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            first_name: db.first_name,
            last_name: db.last_name,
            email: db.email,
            role: db.role,
            status: db.status,
        }
    }
}
