//! Runtime configuration, read with the `config` crate.
//!
//! All options live at the top level of the TOML file (or `FEEDREL_*`
//! environment variables). The connection options and the bot options are
//! deserialized separately from the same settings.

use feedrel_core::config::ConnectionConfig;
use serde::Deserialize;

/// Which database the bot writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  #[default]
  Postgres,
  Sqlite,
}

/// Options that are not about the connection itself.
#[derive(Debug, Clone, Deserialize)]
pub struct BotSettings {
  /// Collapse `extra.*` fields into one JSON string before processing.
  #[serde(default = "default_jsondict_as_string")]
  pub jsondict_as_string: bool,
  #[serde(default)]
  pub backend:            Backend,
}

fn default_jsondict_as_string() -> bool { true }

#[derive(Debug, Clone)]
pub struct OutputConfig {
  pub connection: ConnectionConfig,
  pub bot:        BotSettings,
}

impl OutputConfig {
  pub fn from_settings(settings: config::Config) -> Result<Self, config::ConfigError> {
    Ok(Self {
      connection: settings.clone().try_deserialize()?,
      bot:        settings.try_deserialize()?,
    })
  }
}
