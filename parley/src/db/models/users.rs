//! Database models for users.

use crate::api::models::users::{Role, UserStatus};
use crate::db::filter::{Field, Filterable};
use crate::types::{UserId, tables};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: UserStatus,
}

/// Database request for updating a user.
///
/// Carries the complete new state of the row. `password_hash: None` keeps the stored hash.
#[derive(Debug, Clone)]
pub struct UserUpdateDBRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: UserStatus,
}

impl From<&UserDBResponse> for UserUpdateDBRequest {
    fn from(user: &UserDBResponse) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            address: user.address.clone(),
            age: user.age,
            password_hash: None,
            role: user.role,
            status: user.status,
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<i32>,
    pub password_hash: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserDBResponse {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Filterable for UserDBResponse {
    const MODEL: &'static str = "User";
    const TABLE: &'static str = tables::USERS;
    const FIELDS: &'static [Field] = &[
        Field::int("id"),
        Field::text("username"),
        Field::text("first_name"),
        Field::text("last_name"),
        Field::text("email"),
        Field::text("address"),
        Field::int("age"),
        Field::text("role"),
        Field::text("status"),
        Field::timestamp("created_at"),
        Field::timestamp("updated_at"),
    ];
}
