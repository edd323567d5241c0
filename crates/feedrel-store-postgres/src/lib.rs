//! PostgreSQL backend for the feedrel relational output.
//!
//! Uses the blocking [`postgres`] client: one event is resolved, written and
//! committed before the next is read, so there is nothing for an async
//! runtime to overlap. Several bot instances may share one database; the
//! natural-key unique constraints in [`schema::SCHEMA`] keep their
//! get-or-create calls convergent.

mod session;

pub mod error;
pub mod schema;

pub use error::{classify, classify_parts, classify_sqlstate};
pub use session::{PgConnector, PgSession};
