//! Connection settings shared by every backend.

use std::{fmt, time::Duration};

use serde::Deserialize;

/// TLS negotiation mode, using the libpq names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
  Disable,
  Allow,
  #[default]
  Prefer,
  Require,
  VerifyCa,
  VerifyFull,
}

impl SslMode {
  /// Whether a plaintext session is unacceptable in this mode.
  pub fn requires_tls(self) -> bool {
    matches!(self, Self::Require | Self::VerifyCa | Self::VerifyFull)
  }
}

/// Database connection parameters.
///
/// Backends that do not talk to a server (SQLite) interpret `database` as a
/// path and ignore the network settings.
#[derive(Clone, Deserialize)]
pub struct ConnectionConfig {
  pub database:        String,
  #[serde(default)]
  pub user:            Option<String>,
  #[serde(default)]
  pub password:        Option<String>,
  #[serde(default = "default_host")]
  pub host:            String,
  #[serde(default = "default_port")]
  pub port:            u16,
  #[serde(default)]
  pub sslmode:         SslMode,
  /// Seconds allowed for establishing a session.
  #[serde(default = "default_connect_timeout")]
  pub connect_timeout: u64,
  /// When true every statement commits on its own and the statements of one
  /// event are not atomic as a group.
  #[serde(default = "default_autocommit")]
  pub autocommit:      bool,
  /// Apply the bundled DDL on connect. Always done for SQLite.
  #[serde(default)]
  pub create_schema:   bool,
}

fn default_host() -> String { "localhost".to_owned() }

fn default_port() -> u16 { 5432 }

fn default_connect_timeout() -> u64 { 5 }

fn default_autocommit() -> bool { true }

impl ConnectionConfig {
  /// Settings for `database` with every other option at its default.
  pub fn new(database: impl Into<String>) -> Self {
    Self {
      database:        database.into(),
      user:            None,
      password:        None,
      host:            default_host(),
      port:            default_port(),
      sslmode:         SslMode::default(),
      connect_timeout: default_connect_timeout(),
      autocommit:      default_autocommit(),
      create_schema:   false,
    }
  }

  pub fn with_autocommit(mut self, autocommit: bool) -> Self {
    self.autocommit = autocommit;
    self
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout)
  }
}

impl fmt::Debug for ConnectionConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConnectionConfig")
      .field("database", &self.database)
      .field("user", &self.user)
      .field("password", &self.password.as_ref().map(|_| "<redacted>"))
      .field("host", &self.host)
      .field("port", &self.port)
      .field("sslmode", &self.sslmode)
      .field("connect_timeout", &self.connect_timeout)
      .field("autocommit", &self.autocommit)
      .field("create_schema", &self.create_schema)
      .finish()
  }
}
