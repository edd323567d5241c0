//! Mapping of `postgres` errors onto the core error kinds.

use std::{error::Error as _, io};

use feedrel_core::{Error, ErrorKind};

/// Classify a driver error raised while doing `context`.
///
/// A closed client means the session is gone. The rest is decided by
/// [`classify_parts`].
pub fn classify(err: postgres::Error, context: &str) -> Error {
  let kind = if err.is_closed() {
    ErrorKind::SessionLost
  } else {
    let is_io = err.source().is_some_and(|source| source.is::<io::Error>());
    classify_parts(err.code().map(|state| state.code()), is_io)
  };
  match kind {
    ErrorKind::Transient => Error::transient(context, err),
    ErrorKind::SessionLost => Error::session_lost(context, err),
    ErrorKind::Fatal => Error::fatal(context, err),
  }
}

/// Classify by SQLSTATE, or by whether the failure came from the socket.
///
/// Errors without an SQLSTATE are transient only when they wrap an I/O
/// error. Conversion, parameter, column and row-count errors are bugs or a
/// schema mismatch and are fatal.
pub fn classify_parts(code: Option<&str>, is_io: bool) -> ErrorKind {
  match code {
    Some(state) => classify_sqlstate(state),
    None if is_io => ErrorKind::Transient,
    None => ErrorKind::Fatal,
  }
}

/// Classify a five-character SQLSTATE.
///
/// Connection exceptions (08), resource exhaustion (53), operator
/// intervention (57), system errors (58), internal errors (XX), serialization
/// failures, deadlocks and aborted transactions are transient. Syntax,
/// integrity and data errors are fatal.
pub fn classify_sqlstate(code: &str) -> ErrorKind {
  match code {
    // admin_shutdown, crash_shutdown: the server closed this backend.
    "57P01" | "57P02" => ErrorKind::SessionLost,
    "40001" | "40P01" | "25P02" => ErrorKind::Transient,
    _ => match code.get(..2) {
      Some("08" | "53" | "57" | "58" | "XX") => ErrorKind::Transient,
      _ => ErrorKind::Fatal,
    },
  }
}
