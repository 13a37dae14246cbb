//! # onechat-store
//!
//! Local message history for the onechat client, backed by SQLite.
//!
//! Each logged-in account gets its own database file. The crate exposes a
//! synchronous `Database` handle that wraps a `rusqlite::Connection` and
//! provides typed helpers for stored messages and friend/group requests.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod requests;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
