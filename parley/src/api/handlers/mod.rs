//! HTTP request handlers, grouped by resource.
//!
//! - [`auth`]: bearer token login/refresh, session login, registration and logout
//! - [`chat`]: chat rooms, members and messages
//! - [`default`]: secret key helper and health check
//! - [`groups`]: group registry, members and attached permissions
//! - [`permissions`]: permission registry
//! - [`users`]: user CRUD and per-user permissions/groups
//! - [`web_chat`]: session-only chat page, room search and the chat socket
//!
//! Authorization is expressed through extractors: the role guards and
//! [`RequiresPermission`](crate::auth::permissions::RequiresPermission) in
//! [`crate::auth::permissions`], and the room/message guards in [`crate::chat::access`]. Handlers
//! return [`crate::errors::Error`], which renders as a status code with a `{"detail"}` body.

pub mod auth;
pub mod chat;
pub mod default;
pub mod groups;
pub mod permissions;
pub mod users;
pub mod web_chat;
