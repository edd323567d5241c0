//! Mapping of `rusqlite` errors onto the core error kinds.

use rusqlite::ErrorCode;

pub use feedrel_core::{Error, Result};

/// Classify a driver error raised while doing `context`.
///
/// Lock contention, I/O and resource exhaustion are transient: the session is
/// still usable after a rollback. Syntax, constraint, type and API misuse
/// errors are bugs and are reported as fatal.
pub fn classify(err: rusqlite::Error, context: &str) -> Error {
  let transient = match &err {
    rusqlite::Error::SqliteFailure(e, _) => matches!(
      e.code,
      ErrorCode::InternalMalfunction
        | ErrorCode::OperationAborted
        | ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::OutOfMemory
        | ErrorCode::OperationInterrupted
        | ErrorCode::SystemIoFailure
        | ErrorCode::DiskFull
        | ErrorCode::CannotOpen
        | ErrorCode::FileLockingProtocolFailed
        | ErrorCode::SchemaChanged
    ),
    _ => false,
  };

  if transient {
    Error::transient(context, err)
  } else {
    Error::fatal(context, err)
  }
}

/// Extension for attaching a context string while classifying.
pub(crate) trait ResultExt<T> {
  fn classify(self, context: &str) -> Result<T>;
}

impl<T> ResultExt<T> for rusqlite::Result<T> {
  fn classify(self, context: &str) -> Result<T> {
    self.map_err(|e| classify(e, context))
  }
}
