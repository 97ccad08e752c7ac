//! Chat rooms in real time.
//!
//! - [`hub`]: per-room broadcast channels
//! - [`manager`]: the chat socket protocol
//! - [`access`]: room and message access guards for the REST routes

pub mod access;
pub mod hub;
pub mod manager;

pub use hub::ChatHub;
