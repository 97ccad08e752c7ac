//! Authentication and authorization.
//!
//! # Authentication Methods
//!
//! ## 1. Bearer tokens
//!
//! `POST /auth/token` exchanges a username and password for a JWT. Tokens are persisted in
//! `jwt_tokens`, so they can be reused, refreshed within a grace window after expiry, and
//! revoked on logout.
//!
//! ## 2. Session cookies
//!
//! The `/auth/session` form login sets a signed session cookie. Forms are protected with a
//! double-submit CSRF token. Everything under the web prefix requires a session.
//!
//! # Authorization
//!
//! - **Roles**: admin, staff and active users, enforced by the role guards in [`permissions`]
//! - **Permissions**: named grants such as `update_users`, held directly or through groups
//!
//! # Modules
//!
//! - [`current_user`]: Extractors for the authenticated user
//! - [`middleware`]: Session-required route protection
//! - [`password`]: Argon2 hashing
//! - [`permissions`]: Permission resolution and role guards
//! - [`session`]: Session cookies
//! - [`tokens`]: Persisted bearer tokens
//! - [`csrf`]: CSRF tokens for the form endpoints

pub mod csrf;
pub mod current_user;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod session;
pub mod tokens;
