//! Error type for the output bot.

use feedrel_core::error::BoxedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A non-recoverable store error, or a failed (re)connect.
  #[error("store error: {0}")]
  Store(#[from] feedrel_core::Error),

  #[error("transport error: {0}")]
  Transport(#[source] BoxedError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
