//! [`SqliteSession`]: the SQLite implementation of [`Session`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, ToSql};
use tracing::debug;

use feedrel_core::{
  config::ConnectionConfig,
  entity::{
    ClassificationId, ClassificationKey, DomainId, DomainName, FactStatus, FeedDomainRecord, FeedId,
    FeedIpRecord, FeedProviderId, Table,
  },
  store::{Connector, Session},
};

use crate::{
  Error, Result,
  encode::{RawFeedDomain, RawFeedIp, encode_dt},
  error::ResultExt as _,
  schema::{PRAGMAS, SCHEMA, SCHEMA_VERSION},
};

// ─── Connector ───────────────────────────────────────────────────────────────

/// Opens [`SqliteSession`]s. `database` is a file path or `:memory:`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
  type Session = SqliteSession;

  fn connect(&self, config: &ConnectionConfig) -> Result<SqliteSession> {
    SqliteSession::open(config)
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// A session over a single SQLite connection.
pub struct SqliteSession {
  conn:       Connection,
  autocommit: bool,
}

impl SqliteSession {
  /// Open (or create) the database named by `config` and apply the schema.
  ///
  /// The connect timeout doubles as the busy timeout, so concurrent writers
  /// wait for each other instead of failing immediately.
  pub fn open(config: &ConnectionConfig) -> Result<Self> {
    let conn = if config.database == ":memory:" {
      Connection::open_in_memory()
    } else {
      Connection::open(&config.database)
    }
    .classify("open database")?;

    conn.busy_timeout(config.connect_timeout()).classify("set busy timeout")?;
    conn.execute_batch(PRAGMAS).classify("apply pragmas")?;

    let version: i64 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .classify("read schema version")?;
    if version < SCHEMA_VERSION {
      conn.execute_batch(SCHEMA).classify("apply schema")?;
    }

    debug!(database = %config.database, autocommit = config.autocommit, "opened sqlite session");
    Ok(Self { conn, autocommit: config.autocommit })
  }

  /// Open an in-memory session, mostly for tests.
  pub fn open_in_memory() -> Result<Self> {
    Self::open(&ConnectionConfig::new(":memory:"))
  }

  /// Open a transaction unless one is already open or autocommit is on.
  fn begin_if_needed(&mut self) -> Result<()> {
    if !self.autocommit && self.conn.is_autocommit() {
      self
        .conn
        .execute_batch("BEGIN IMMEDIATE")
        .classify("begin transaction")?;
    }
    Ok(())
  }

  /// Run the conflict-aware insert, falling back to a select on the key.
  ///
  /// Both statements are numbered identically so they share `params`.
  fn get_or_create(
    &mut self,
    what: &str,
    insert_sql: &str,
    select_sql: &str,
    params: &[&dyn ToSql],
  ) -> Result<i64> {
    self.begin_if_needed()?;

    let inserted: Option<i64> = self
      .conn
      .query_row(insert_sql, params, |row| row.get(0))
      .optional()
      .classify(what)?;
    if let Some(id) = inserted {
      return Ok(id);
    }

    self
      .conn
      .query_row(select_sql, params, |row| row.get(0))
      .optional()
      .classify(what)?
      .ok_or_else(|| Error::Transient {
        message: format!("{what}: row vanished between insert and select"),
        source:  None,
      })
  }

  // ── Read-back ─────────────────────────────────────────────────────────

  /// Number of rows in `table`.
  pub fn count(&self, table: Table) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    let n: i64 = self
      .conn
      .query_row(&sql, [], |row| row.get(0))
      .classify("count rows")?;
    Ok(n as u64)
  }

  /// Natural key and `official` flag of a classification type.
  pub fn classification(
    &self,
    id: ClassificationId,
  ) -> Result<Option<(ClassificationKey, bool)>> {
    self
      .conn
      .query_row(
        r#"SELECT taxonomy, "type", official FROM classification_type WHERE id = ?1"#,
        [id.0],
        |row| Ok((ClassificationKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?), row.get(2)?)),
      )
      .optional()
      .classify("read classification_type")
  }

  pub fn feed_provider_name(&self, id: FeedProviderId) -> Result<Option<String>> {
    self
      .conn
      .query_row("SELECT name FROM feed_provider WHERE id = ?1", [id.0], |row| row.get(0))
      .optional()
      .classify("read feed_provider")
  }

  /// Name and provider of a feed.
  pub fn feed(&self, id: FeedId) -> Result<Option<(String, FeedProviderId)>> {
    self
      .conn
      .query_row(
        "SELECT name, feed_provider_id FROM feed WHERE id = ?1",
        [id.0],
        |row| Ok((row.get(0)?, FeedProviderId(row.get(1)?))),
      )
      .optional()
      .classify("read feed")
  }

  /// Stored name and content hash of a domain.
  pub fn domain(&self, id: DomainId) -> Result<Option<(String, String)>> {
    self
      .conn
      .query_row(
        "SELECT domain, content_hash FROM domain WHERE id = ?1",
        [id.0],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .classify("read domain")
  }

  pub fn feed_ip(&self, feed: FeedId, ip: &str) -> Result<Option<FeedIpRecord>> {
    let raw: Option<RawFeedIp> = self
      .conn
      .query_row(
        "SELECT feed_id, ip, status, classification_id, first_seen, last_seen
         FROM feed_ip WHERE feed_id = ?1 AND ip = ?2",
        rusqlite::params![feed.0, ip],
        |row| {
          Ok(RawFeedIp {
            feed_id:           row.get(0)?,
            ip:                row.get(1)?,
            status:            row.get(2)?,
            classification_id: row.get(3)?,
            first_seen:        row.get(4)?,
            last_seen:         row.get(5)?,
          })
        },
      )
      .optional()
      .classify("read feed_ip")?;

    raw.map(RawFeedIp::into_record).transpose()
  }

  pub fn feed_domain(
    &self,
    feed: FeedId,
    domain: DomainId,
  ) -> Result<Option<FeedDomainRecord>> {
    let raw: Option<RawFeedDomain> = self
      .conn
      .query_row(
        "SELECT feed_id, domain_id, status, classification_id, first_seen, last_seen
         FROM feed_domain WHERE feed_id = ?1 AND domain_id = ?2",
        rusqlite::params![feed.0, domain.0],
        |row| {
          Ok(RawFeedDomain {
            feed_id:           row.get(0)?,
            domain_id:         row.get(1)?,
            status:            row.get(2)?,
            classification_id: row.get(3)?,
            first_seen:        row.get(4)?,
            last_seen:         row.get(5)?,
          })
        },
      )
      .optional()
      .classify("read feed_domain")?;

    raw.map(RawFeedDomain::into_record).transpose()
  }

  /// Whether a transaction is currently open on this connection.
  pub fn in_transaction(&self) -> bool { !self.conn.is_autocommit() }
}

// ─── Session impl ────────────────────────────────────────────────────────────

impl Session for SqliteSession {
  // ── Reference entities ────────────────────────────────────────────────

  fn classification_id(&mut self, key: &ClassificationKey) -> Result<ClassificationId> {
    self
      .get_or_create(
        "get-or-create classification_type",
        r#"INSERT INTO classification_type (taxonomy, "type", official)
           VALUES (?1, ?2, 0)
           ON CONFLICT (taxonomy, "type") DO NOTHING
           RETURNING id"#,
        r#"SELECT id FROM classification_type WHERE taxonomy = ?1 AND "type" = ?2"#,
        &[&key.taxonomy, &key.kind],
      )
      .map(ClassificationId)
  }

  fn feed_provider_id(&mut self, name: &str) -> Result<FeedProviderId> {
    self
      .get_or_create(
        "get-or-create feed_provider",
        "INSERT INTO feed_provider (name) VALUES (?1)
         ON CONFLICT (name) DO NOTHING
         RETURNING id",
        "SELECT id FROM feed_provider WHERE name = ?1",
        &[&name],
      )
      .map(FeedProviderId)
  }

  fn feed_id(&mut self, name: &str, provider: FeedProviderId) -> Result<FeedId> {
    self
      .get_or_create(
        "get-or-create feed",
        "INSERT INTO feed (name, feed_provider_id) VALUES (?1, ?2)
         ON CONFLICT (name, feed_provider_id) DO NOTHING
         RETURNING id",
        "SELECT id FROM feed WHERE name = ?1 AND feed_provider_id = ?2",
        &[&name, &provider.0],
      )
      .map(FeedId)
  }

  fn domain_id(&mut self, domain: &DomainName) -> Result<DomainId> {
    self
      .get_or_create(
        "get-or-create domain",
        "INSERT INTO domain (domain, content_hash) VALUES (?1, ?2)
         ON CONFLICT (content_hash) DO NOTHING
         RETURNING id",
        "SELECT id FROM domain WHERE content_hash = ?2",
        &[&domain.as_str(), &domain.content_hash()],
      )
      .map(DomainId)
  }

  // ── Facts ─────────────────────────────────────────────────────────────

  fn upsert_feed_ip(
    &mut self,
    feed: FeedId,
    ip: &str,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> Result<()> {
    self.begin_if_needed()?;
    self
      .conn
      .execute(
        "INSERT INTO feed_ip (feed_id, ip, status, classification_id, first_seen, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT (feed_id, ip) DO UPDATE SET last_seen = excluded.last_seen",
        rusqlite::params![
          feed.0,
          ip,
          FactStatus::Active.as_str(),
          classification.0,
          encode_dt(seen_at),
        ],
      )
      .classify("upsert feed_ip")?;
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
      .conn
      .execute(
        "INSERT INTO feed_domain (feed_id, domain_id, status, classification_id, first_seen, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT (feed_id, domain_id) DO UPDATE SET last_seen = excluded.last_seen",
        rusqlite::params![
          feed.0,
          domain.0,
          FactStatus::Active.as_str(),
          classification.0,
          encode_dt(seen_at),
        ],
      )
      .classify("upsert feed_domain")?;
    Ok(())
  }

  // ── Transaction control ───────────────────────────────────────────────

  fn commit(&mut self) -> Result<()> {
    if self.in_transaction() {
      self.conn.execute_batch("COMMIT").classify("commit")?;
    }
    Ok(())
  }

  fn rollback(&mut self) -> Result<()> {
    if self.in_transaction() {
      self.conn.execute_batch("ROLLBACK").classify("rollback")?;
    }
    Ok(())
  }

  fn is_closed(&self) -> bool { false }
}
