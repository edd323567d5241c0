//! SQL schema for the feedrel SQLite store.
//!
//! The pragmas run on every connect; the DDL runs only while `PRAGMA
//! user_version` is behind [`SCHEMA_VERSION`]. The natural-key `UNIQUE`
//! constraints are what make the conflict-aware get-or-create statements
//! correct.

/// Value of `PRAGMA user_version` once [`SCHEMA`] has been applied.
pub const SCHEMA_VERSION: i64 = 1;

/// Per-connection settings.
pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
"#;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = r#"
-- Reference tables are append-only; no UPDATE or DELETE is ever issued.
CREATE TABLE IF NOT EXISTS classification_type (
    id        INTEGER PRIMARY KEY,
    taxonomy  TEXT    NOT NULL,
    "type"    TEXT    NOT NULL,
    official  INTEGER NOT NULL DEFAULT 0,   -- curated (1) vs observed (0)
    UNIQUE (taxonomy, "type")
);

CREATE TABLE IF NOT EXISTS feed_provider (
    id    INTEGER PRIMARY KEY,
    name  TEXT    NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS feed (
    id                INTEGER PRIMARY KEY,
    name              TEXT    NOT NULL,
    feed_provider_id  INTEGER NOT NULL REFERENCES feed_provider(id),
    UNIQUE (name, feed_provider_id)
);

CREATE TABLE IF NOT EXISTS domain (
    id            INTEGER PRIMARY KEY,
    domain        TEXT    NOT NULL,
    content_hash  TEXT    NOT NULL UNIQUE   -- hex SHA-256 of the normalized name
);

-- Fact tables: one row per (feed, subject); only last_seen moves on conflict.
CREATE TABLE IF NOT EXISTS feed_ip (
    feed_id            INTEGER NOT NULL REFERENCES feed(id),
    ip                 TEXT    NOT NULL,
    status             TEXT    NOT NULL,
    classification_id  INTEGER NOT NULL REFERENCES classification_type(id),
    first_seen         TEXT    NOT NULL,   -- RFC 3339 UTC
    last_seen          TEXT    NOT NULL,
    PRIMARY KEY (feed_id, ip)
);

CREATE TABLE IF NOT EXISTS feed_domain (
    feed_id            INTEGER NOT NULL REFERENCES feed(id),
    domain_id          INTEGER NOT NULL REFERENCES domain(id),
    status             TEXT    NOT NULL,
    classification_id  INTEGER NOT NULL REFERENCES classification_type(id),
    first_seen         TEXT    NOT NULL,
    last_seen          TEXT    NOT NULL,
    PRIMARY KEY (feed_id, domain_id)
);

CREATE INDEX IF NOT EXISTS feed_ip_ip_idx         ON feed_ip(ip);
CREATE INDEX IF NOT EXISTS feed_domain_domain_idx ON feed_domain(domain_id);

PRAGMA user_version = 1;
"#;
