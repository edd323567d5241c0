//! The `Session` and `Connector` traits.
//!
//! A session is one live database connection. Backends (`feedrel-store-sqlite`,
//! `feedrel-store-postgres`) implement these traits; the output bot depends on
//! this abstraction, not on any concrete backend.
//!
//! Every get-or-create must be safe under concurrent execution from
//! independent sessions. Implementations rely on a unique constraint on each
//! natural key and issue `INSERT … ON CONFLICT DO NOTHING RETURNING id`
//! followed, when no row comes back, by a separate `SELECT` on the key.

use chrono::{DateTime, Utc};

use crate::{
  Result,
  config::ConnectionConfig,
  entity::{ClassificationId, ClassificationKey, DomainId, DomainName, FeedId, FeedProviderId},
};

/// One live database session.
///
/// Errors are classified by [`crate::ErrorKind`]; the session never recovers
/// on its own. The owner decides whether to roll back or reconnect.
pub trait Session {
  // ── Reference entities: get-or-create ─────────────────────────────────

  fn classification_id(&mut self, key: &ClassificationKey) -> Result<ClassificationId>;

  fn feed_provider_id(&mut self, name: &str) -> Result<FeedProviderId>;

  fn feed_id(&mut self, name: &str, provider: FeedProviderId) -> Result<FeedId>;

  fn domain_id(&mut self, domain: &DomainName) -> Result<DomainId>;

  // ── Facts: insert or refresh `last_seen` ──────────────────────────────

  /// Insert an `Active` row for `(feed, ip)`; on conflict only `last_seen`
  /// moves to `seen_at`.
  fn upsert_feed_ip(
    &mut self,
    feed: FeedId,
    ip: &str,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> Result<()>;

  /// Same contract as [`Session::upsert_feed_ip`], keyed on `(feed, domain)`.
  fn upsert_feed_domain(
    &mut self,
    feed: FeedId,
    domain: DomainId,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> Result<()>;

  // ── Transaction control ───────────────────────────────────────────────

  /// Commit the open transaction. A no-op when none is open.
  fn commit(&mut self) -> Result<()>;

  /// Roll back the open transaction. A no-op when none is open.
  fn rollback(&mut self) -> Result<()>;

  /// Whether the underlying connection is known to be unusable.
  fn is_closed(&self) -> bool;
}

/// Opens sessions for a backend.
pub trait Connector {
  type Session: Session;

  fn connect(&self, config: &ConnectionConfig) -> Result<Self::Session>;
}
