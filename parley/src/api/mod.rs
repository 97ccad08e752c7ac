//! REST API: route handlers and their request/response models.
//!
//! - **Default** (`/`, `/healthcheck`): secret key helper, health check
//! - **Auth** (`/auth/*`): bearer tokens, session login, registration, logout
//! - **Users** (`/users/*`): accounts and their permissions/groups
//! - **Authorizations** (`/authorizations/*`): permission and group registries
//! - **Chat** (`/chat/*`): rooms, members and messages
//! - **Web** (`/web/*`): session-only chat page and the chat socket
//!
//! The OpenAPI document is served at `/api-docs/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
