//! API request and response data models.
//!
//! These are the public API contract, kept separate from the database records in
//! [`crate::db::models`]. All models are annotated with `utoipa` for the generated docs.
//!
//! - [`users`]: accounts, roles and the authenticated user
//! - [`permissions`] and [`groups`]: the authorization registries
//! - [`chat`]: rooms, messages and the socket payload
//! - [`auth`]: token and session form payloads
//! - [`pagination`]: offset pagination

pub mod auth;
pub mod chat;
pub mod groups;
pub mod pagination;
pub mod permissions;
pub mod users;
