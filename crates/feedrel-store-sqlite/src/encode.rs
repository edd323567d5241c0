//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision so
//! that lexical and chronological order agree.

use chrono::{DateTime, SecondsFormat, Utc};
use feedrel_core::{
  Error, Result,
  entity::{ClassificationId, DomainId, FeedDomainRecord, FeedId, FeedIpRecord},
};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::fatal(format!("bad timestamp {s:?} in store"), e))
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Intermediate row struct before timestamp decoding.
pub struct RawFeedIp {
  pub feed_id:           i64,
  pub ip:                String,
  pub status:            String,
  pub classification_id: i64,
  pub first_seen:        String,
  pub last_seen:         String,
}

impl RawFeedIp {
  pub fn into_record(self) -> Result<FeedIpRecord> {
    Ok(FeedIpRecord {
      feed_id:           FeedId(self.feed_id),
      ip:                self.ip,
      status:            self.status,
      classification_id: ClassificationId(self.classification_id),
      first_seen:        decode_dt(&self.first_seen)?,
      last_seen:         decode_dt(&self.last_seen)?,
    })
  }
}

pub struct RawFeedDomain {
  pub feed_id:           i64,
  pub domain_id:         i64,
  pub status:            String,
  pub classification_id: i64,
  pub first_seen:        String,
  pub last_seen:         String,
}

impl RawFeedDomain {
  pub fn into_record(self) -> Result<FeedDomainRecord> {
    Ok(FeedDomainRecord {
      feed_id:           FeedId(self.feed_id),
      domain_id:         DomainId(self.domain_id),
      status:            self.status,
      classification_id: ClassificationId(self.classification_id),
      first_seen:        decode_dt(&self.first_seen)?,
      last_seen:         decode_dt(&self.last_seen)?,
    })
  }
}
