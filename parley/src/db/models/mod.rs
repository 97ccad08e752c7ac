//! Database record structures matching the table schemas.

pub mod chat;
pub mod groups;
pub mod permissions;
pub mod tokens;
pub mod users;
