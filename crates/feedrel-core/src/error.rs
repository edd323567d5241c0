//! Error types for `feedrel-core`.
//!
//! Backends translate their driver errors into one of three kinds so that
//! callers branch on [`ErrorKind`] instead of inspecting driver-specific error
//! hierarchies.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error for wrapping backend-specific errors.
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// How a failure should be handled by the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The statement failed but the session is still usable after a rollback.
  Transient,
  /// The session is gone and must be replaced.
  SessionLost,
  /// A programming or schema error. Never masked.
  Fatal,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("transient database error: {message}")]
  Transient {
    message: String,
    #[source]
    source:  Option<BoxedError>,
  },

  #[error("database session lost: {message}")]
  SessionLost {
    message: String,
    #[source]
    source:  Option<BoxedError>,
  },

  #[error("fatal database error: {message}")]
  Fatal {
    message: String,
    #[source]
    source:  Option<BoxedError>,
  },

  #[error("configuration error: {0}")]
  Config(String),

  #[error("invalid event: {0}")]
  InvalidEvent(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn transient(
    message: impl Into<String>,
    source: impl StdError + Send + Sync + 'static,
  ) -> Self {
    Self::Transient { message: message.into(), source: Some(Box::new(source)) }
  }

  pub fn session_lost(
    message: impl Into<String>,
    source: impl StdError + Send + Sync + 'static,
  ) -> Self {
    Self::SessionLost { message: message.into(), source: Some(Box::new(source)) }
  }

  pub fn fatal(
    message: impl Into<String>,
    source: impl StdError + Send + Sync + 'static,
  ) -> Self {
    Self::Fatal { message: message.into(), source: Some(Box::new(source)) }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Transient { .. } => ErrorKind::Transient,
      Self::SessionLost { .. } => ErrorKind::SessionLost,
      Self::Fatal { .. }
      | Self::Config(_)
      | Self::InvalidEvent(_)
      | Self::Serialization(_) => ErrorKind::Fatal,
    }
  }

  /// Whether rollback/reconnect can bring the session back.
  pub fn is_recoverable(&self) -> bool { self.kind() != ErrorKind::Fatal }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
