//! Reference entities, fact rows, and their natural keys.
//!
//! Reference entities (classification types, feed providers, feeds, domains)
//! are append-only: a natural key maps to exactly one surrogate id for the
//! lifetime of the database. Fact rows record a (feed, subject) observation
//! and are refreshed, never duplicated, on repeat sightings.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

// ─── Surrogate ids ───────────────────────────────────────────────────────────

/// Surrogate id of a `classification_type` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassificationId(pub i64);

/// Surrogate id of a `feed_provider` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedProviderId(pub i64);

/// Surrogate id of a `feed` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId(pub i64);

/// Surrogate id of a `domain` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(pub i64);

// ─── Natural keys ────────────────────────────────────────────────────────────

/// Taxonomy used for classification types outside the standard harmonization.
pub const OTHER_TAXONOMY: &str = "other";

/// Natural key of a classification type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassificationKey {
  pub taxonomy: String,
  pub kind:     String,
}

impl ClassificationKey {
  pub fn new(taxonomy: impl Into<String>, kind: impl Into<String>) -> Self {
    Self { taxonomy: taxonomy.into(), kind: kind.into() }
  }
}

/// A normalized domain name and the hash used as its dedup key.
///
/// The stored string and the hashed string are the same normalized value, so
/// lookups are insensitive to case, full-width forms, and a trailing root dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainName {
  name: String,
  hash: String,
}

impl DomainName {
  /// Normalize `raw`. Returns `None` when nothing is left.
  pub fn parse(raw: &str) -> Option<Self> {
    let folded: String = raw.trim().chars().map(fold_width).collect();
    let trimmed = folded.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
      return None;
    }
    let name = trimmed.to_lowercase();
    let hash = hex::encode(Sha256::digest(name.as_bytes()));
    Some(Self { name, hash })
  }

  pub fn as_str(&self) -> &str { &self.name }

  /// Lowercase hex SHA-256 of the normalized name.
  pub fn content_hash(&self) -> &str { &self.hash }
}

/// Fold full-width ASCII forms and the ideographic space to ASCII.
fn fold_width(c: char) -> char {
  match c {
    '\u{3000}' => ' ',
    '\u{FF01}'..='\u{FF5E}' => {
      char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
    }
    _ => c,
  }
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// Status written on every fact (re)insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactStatus {
  Active,
}

impl FactStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "Active",
    }
  }
}

/// A `feed_ip` row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedIpRecord {
  pub feed_id:           FeedId,
  pub ip:                String,
  pub status:            String,
  pub classification_id: ClassificationId,
  pub first_seen:        DateTime<Utc>,
  pub last_seen:         DateTime<Utc>,
}

/// A `feed_domain` row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDomainRecord {
  pub feed_id:           FeedId,
  pub domain_id:         DomainId,
  pub status:            String,
  pub classification_id: ClassificationId,
  pub first_seen:        DateTime<Utc>,
  pub last_seen:         DateTime<Utc>,
}

/// The tables of the relational schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
  ClassificationType,
  FeedProvider,
  Feed,
  Domain,
  FeedIp,
  FeedDomain,
}

impl Table {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ClassificationType => "classification_type",
      Self::FeedProvider => "feed_provider",
      Self::Feed => "feed",
      Self::Domain => "domain",
      Self::FeedIp => "feed_ip",
      Self::FeedDomain => "feed_domain",
    }
  }
}
