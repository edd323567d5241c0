//! SQLite backend for the feedrel relational output.
//!
//! Wraps a blocking [`rusqlite::Connection`]. Intended for single-host
//! deployments and tests; the unique constraints and conflict-aware statements
//! are the same as the PostgreSQL backend's.

mod encode;
mod schema;
mod session;

pub mod error;

pub use error::{Error, Result, classify};
pub use session::{SqliteConnector, SqliteSession};
