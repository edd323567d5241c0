//! [`PgSession`]: the PostgreSQL implementation of [`Session`].

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls, config::SslMode as PgSslMode, types::ToSql};
use tracing::{debug, info};

use feedrel_core::{
  Error, Result,
  config::{ConnectionConfig, SslMode},
  entity::{
    ClassificationId, ClassificationKey, DomainId, DomainName, FactStatus, FeedId, FeedProviderId,
  },
  store::{Connector, Session},
};

use crate::{classify, schema::SCHEMA};

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

// ─── Connector ───────────────────────────────────────────────────────────────

/// Opens [`PgSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl Connector for PgConnector {
  type Session = PgSession;

  fn connect(&self, config: &ConnectionConfig) -> Result<PgSession> {
    PgSession::connect(config)
  }
}

/// Translate connection settings into a driver config.
pub(crate) fn pg_config(config: &ConnectionConfig) -> postgres::Config {
  let mut pg = postgres::Config::new();
  pg.dbname(&config.database)
    .host(&config.host)
    .port(config.port)
    .connect_timeout(config.connect_timeout())
    .ssl_mode(match config.sslmode {
      SslMode::Disable => PgSslMode::Disable,
      SslMode::Allow | SslMode::Prefer => PgSslMode::Prefer,
      SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => PgSslMode::Require,
    });
  if let Some(user) = &config.user {
    pg.user(user);
  }
  if let Some(password) = &config.password {
    pg.password(password);
  }
  pg
}

#[cfg(feature = "tls")]
fn open_client(config: &ConnectionConfig, pg: &postgres::Config) -> Result<Client> {
  if config.sslmode == SslMode::Disable {
    return pg.connect(NoTls).map_err(|e| classify(e, "connect to postgres"));
  }
  // Only the verify modes check certificates, as with libpq.
  let verify = matches!(config.sslmode, SslMode::VerifyCa | SslMode::VerifyFull);
  let connector = native_tls::TlsConnector::builder()
    .danger_accept_invalid_certs(!verify)
    .danger_accept_invalid_hostnames(config.sslmode != SslMode::VerifyFull)
    .build()
    .map_err(|e| Error::Config(format!("tls setup failed: {e}")))?;
  pg.connect(postgres_native_tls::MakeTlsConnector::new(connector))
    .map_err(|e| classify(e, "connect to postgres"))
}

#[cfg(not(feature = "tls"))]
fn open_client(config: &ConnectionConfig, pg: &postgres::Config) -> Result<Client> {
  if config.sslmode.requires_tls() {
    return Err(Error::Config(format!(
      "sslmode {:?} needs the `tls` feature of feedrel-store-postgres",
      config.sslmode
    )));
  }
  pg.connect(NoTls).map_err(|e| classify(e, "connect to postgres"))
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// A session over a single PostgreSQL connection.
pub struct PgSession {
  client:         Client,
  autocommit:     bool,
  in_transaction: bool,
}

impl PgSession {
  pub fn connect(config: &ConnectionConfig) -> Result<Self> {
    let client = open_client(config, &pg_config(config))?;
    let mut session = Self { client, autocommit: config.autocommit, in_transaction: false };

    if config.create_schema {
      session
        .client
        .batch_execute(SCHEMA)
        .map_err(|e| classify(e, "apply schema"))?;
      info!("applied feedrel schema");
    }

    debug!(
      host = %config.host,
      port = config.port,
      database = %config.database,
      autocommit = config.autocommit,
      "opened postgres session"
    );
    Ok(session)
  }

  fn begin_if_needed(&mut self) -> Result<()> {
    if !self.autocommit && !self.in_transaction {
      self
        .client
        .batch_execute("BEGIN")
        .map_err(|e| classify(e, "begin transaction"))?;
      self.in_transaction = true;
    }
    Ok(())
  }

  /// Conflict-aware insert, then a separate select on the natural key.
  ///
  /// The select must be its own statement: under READ COMMITTED it takes a
  /// fresh snapshot and sees a row committed by a concurrent inserter that
  /// the insert's snapshot could not.
  fn get_or_create(
    &mut self,
    what: &str,
    insert_sql: &str,
    select_sql: &str,
    insert_params: Params<'_>,
    select_params: Params<'_>,
  ) -> Result<i64> {
    self.begin_if_needed()?;

    if let Some(row) = self
      .client
      .query_opt(insert_sql, insert_params)
      .map_err(|e| classify(e, what))?
    {
      return row.try_get(0).map_err(|e| classify(e, what));
    }

    match self
      .client
      .query_opt(select_sql, select_params)
      .map_err(|e| classify(e, what))?
    {
      Some(row) => row.try_get(0).map_err(|e| classify(e, what)),
      None => Err(Error::Transient {
        message: format!("{what}: row vanished between insert and select"),
        source:  None,
      }),
    }
  }
}

// ─── Session impl ────────────────────────────────────────────────────────────

impl Session for PgSession {
  fn classification_id(&mut self, key: &ClassificationKey) -> Result<ClassificationId> {
    let params: Params<'_> = &[&key.taxonomy, &key.kind];
    self
      .get_or_create(
        "get-or-create classification_type",
        r#"INSERT INTO classification_type (taxonomy, "type", official)
           VALUES ($1, $2, false)
           ON CONFLICT (taxonomy, "type") DO NOTHING
           RETURNING id"#,
        r#"SELECT id FROM classification_type WHERE taxonomy = $1 AND "type" = $2"#,
        params,
        params,
      )
      .map(ClassificationId)
  }

  fn feed_provider_id(&mut self, name: &str) -> Result<FeedProviderId> {
    let params: Params<'_> = &[&name];
    self
      .get_or_create(
        "get-or-create feed_provider",
        "INSERT INTO feed_provider (name) VALUES ($1)
         ON CONFLICT (name) DO NOTHING
         RETURNING id",
        "SELECT id FROM feed_provider WHERE name = $1",
        params,
        params,
      )
      .map(FeedProviderId)
  }

  fn feed_id(&mut self, name: &str, provider: FeedProviderId) -> Result<FeedId> {
    let params: Params<'_> = &[&name, &provider.0];
    self
      .get_or_create(
        "get-or-create feed",
        "INSERT INTO feed (name, feed_provider_id) VALUES ($1, $2)
         ON CONFLICT (name, feed_provider_id) DO NOTHING
         RETURNING id",
        "SELECT id FROM feed WHERE name = $1 AND feed_provider_id = $2",
        params,
        params,
      )
      .map(FeedId)
  }

  fn domain_id(&mut self, domain: &DomainName) -> Result<DomainId> {
    let name = domain.as_str();
    let hash = domain.content_hash();
    self
      .get_or_create(
        "get-or-create domain",
        "INSERT INTO domain (domain, content_hash) VALUES ($1, $2)
         ON CONFLICT (content_hash) DO NOTHING
         RETURNING id",
        "SELECT id FROM domain WHERE content_hash = $1",
        &[&name, &hash],
        &[&hash],
      )
      .map(DomainId)
  }

  fn upsert_feed_ip(
    &mut self,
    feed: FeedId,
    ip: &str,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> Result<()> {
    self.begin_if_needed()?;
    self
      .client
      .execute(
        "INSERT INTO feed_ip (feed_id, ip, status, classification_id, first_seen, last_seen)
         VALUES ($1, $2, $3, $4, $5, $5)
         ON CONFLICT (feed_id, ip) DO UPDATE SET last_seen = EXCLUDED.last_seen",
        &[&feed.0, &ip, &FactStatus::Active.as_str(), &classification.0, &seen_at],
      )
      .map_err(|e| classify(e, "upsert feed_ip"))?;
    Ok(())
  }

  fn upsert_feed_domain(
    &mut self,
    feed: FeedId,
    domain: DomainId,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> Result<()> {
    self.begin_if_needed()?;
    self
      .client
      .execute(
        "INSERT INTO feed_domain (feed_id, domain_id, status, classification_id, first_seen, last_seen)
         VALUES ($1, $2, $3, $4, $5, $5)
         ON CONFLICT (feed_id, domain_id) DO UPDATE SET last_seen = EXCLUDED.last_seen",
        &[&feed.0, &domain.0, &FactStatus::Active.as_str(), &classification.0, &seen_at],
      )
      .map_err(|e| classify(e, "upsert feed_domain"))?;
    Ok(())
  }

  fn commit(&mut self) -> Result<()> {
    if self.in_transaction {
      self.in_transaction = false;
      self.client.batch_execute("COMMIT").map_err(|e| classify(e, "commit"))?;
    }
    Ok(())
  }

  fn rollback(&mut self) -> Result<()> {
    if self.in_transaction {
      self.in_transaction = false;
      self
        .client
        .batch_execute("ROLLBACK")
        .map_err(|e| classify(e, "rollback"))?;
    }
    Ok(())
  }

  fn is_closed(&self) -> bool { self.client.is_closed() }
}
