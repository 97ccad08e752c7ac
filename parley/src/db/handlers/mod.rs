//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction) and
//! returns records from [`crate::db::models`]. Entity tables implement the [`Repository`] trait;
//! link-table operations and lookups are inherent methods.
//!
//! - [`Users`]: accounts, direct permissions, group memberships
//! - [`Permissions`]: permission registry and CRUD generation
//! - [`Groups`]: group registry, members and attached permissions
//! - [`Tokens`]: persisted bearer tokens
//! - [`ChatRooms`]: rooms and memberships
//! - [`ChatMessages`]: room messages
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let user = Users::new(&mut tx).create(&request).await?;
//! ChatRooms::new(&mut tx).subscribe(room_id, user.id).await?;
//! tx.commit().await?;
//! ```

pub mod chat_messages;
pub mod chat_rooms;
pub mod groups;
pub mod permissions;
pub mod repository;
pub mod tokens;
pub mod users;

pub use chat_messages::ChatMessages;
pub use chat_rooms::ChatRooms;
pub use groups::Groups;
pub use permissions::Permissions;
pub use repository::Repository;
pub use tokens::Tokens;
pub use users::Users;
