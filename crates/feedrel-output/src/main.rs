//! feedrel-output binary.
//!
//! Reads `feedrel.toml` (or the path given with `--config`) layered under
//! `FEEDREL_*` environment variables, connects to the configured database,
//! and writes each newline-delimited JSON event from stdin (or `--input`)
//! into the relational schema. Committed events are echoed to stdout.

use std::{
  fs::File,
  io::{self, BufReader},
  path::PathBuf,
};

use anyhow::Context as _;
use clap::Parser;
use feedrel_core::store::Connector;
use feedrel_output::{
  ConnectionManager, JsonLinesTransport, Stats, TransactionCoordinator, Transport,
  config::{Backend, OutputConfig},
};
use feedrel_store_postgres::PgConnector;
use feedrel_store_sqlite::SqliteConnector;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Relational output for threat-intelligence events")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "FEEDREL_CONFIG", default_value = "feedrel.toml")]
  config: PathBuf,

  /// Read events from this file instead of stdin.
  #[arg(short, long, value_name = "FILE")]
  input: Option<PathBuf>,

  /// Override the configured backend.
  #[arg(long, value_enum)]
  backend: Option<Backend>,
}

fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries acknowledged events.
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FEEDREL"))
    .build()
    .context("failed to read config file")?;

  let cfg = OutputConfig::from_settings(settings)
    .context("failed to deserialise OutputConfig")?;
  let backend = cli.backend.unwrap_or(cfg.bot.backend);

  let stdout = io::stdout().lock();
  let stats = match cli.input {
    Some(path) => {
      let file = File::open(&path)
        .with_context(|| format!("failed to open input {path:?}"))?;
      run(backend, &cfg, JsonLinesTransport::new(BufReader::new(file), stdout))?
    }
    None => run(backend, &cfg, JsonLinesTransport::new(io::stdin().lock(), stdout))?,
  };

  tracing::info!(
    received = stats.received,
    committed = stats.committed,
    no_content = stats.no_content,
    acknowledged = stats.acknowledged,
    dropped_unresolved = stats.dropped_unresolved,
    write_failures = stats.write_failures,
    invalid = stats.invalid,
    recovered_errors = stats.recovered_errors,
    reconnects = stats.reconnects,
    "input exhausted"
  );
  Ok(())
}

fn run<T: Transport>(
  backend: Backend,
  cfg: &OutputConfig,
  mut transport: T,
) -> anyhow::Result<Stats> {
  match backend {
    Backend::Postgres => drive(PgConnector, cfg, &mut transport),
    Backend::Sqlite => drive(SqliteConnector, cfg, &mut transport),
  }
}

fn drive<C: Connector, T: Transport>(
  connector: C,
  cfg: &OutputConfig,
  transport: &mut T,
) -> anyhow::Result<Stats> {
  let manager = ConnectionManager::connect(connector, cfg.connection.clone())
    .context("failed to connect to database")?;

  let mut coordinator = TransactionCoordinator::new(manager, cfg.bot.jsondict_as_string);
  coordinator.run(transport).context("output bot stopped")
}
