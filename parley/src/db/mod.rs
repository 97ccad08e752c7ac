//! Database layer for data persistence and access.
//!
//! Implemented with SQLx over PostgreSQL, following the Repository pattern:
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (api::handlers, chat, auth extractors)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries & transactions)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`filter`]: `field__operator` keyword filters translated into SQL predicates
//! - [`errors`]: Database-specific error types
//!
//! ## Example Usage
//!
//! ```ignore
//! use parley::db::handlers::{Users, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> anyhow::Result<()> {
//!     let mut conn = pool.acquire().await?;
//!     let mut users = Users::new(&mut conn);
//!
//!     if let Some(user) = users.get_by_username("alice").await? {
//!         println!("Found user: {}", user.id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod filter;
pub mod handlers;
pub mod models;
