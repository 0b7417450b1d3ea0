//! Database module: models, schema and queries for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup and the `Storage` handle
//! - one module per entity group, each adding an `impl Storage` block

pub mod accounts;
pub mod currencies;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod sync;
pub mod transactions;
pub mod users;

pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage, connect};
