//! SQL schema for the feedrel PostgreSQL store.
//!
//! Applied only when `create_schema` is set; production databases are
//! expected to be provisioned out of band with at least these constraints.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS classification_type (
    id        BIGSERIAL PRIMARY KEY,
    taxonomy  TEXT      NOT NULL,
    "type"    TEXT      NOT NULL,
    official  BOOLEAN   NOT NULL DEFAULT false,
    UNIQUE (taxonomy, "type")
);

CREATE TABLE IF NOT EXISTS feed_provider (
    id    BIGSERIAL PRIMARY KEY,
    name  TEXT      NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS feed (
    id                BIGSERIAL PRIMARY KEY,
    name              TEXT      NOT NULL,
    feed_provider_id  BIGINT    NOT NULL REFERENCES feed_provider(id),
    UNIQUE (name, feed_provider_id)
);

CREATE TABLE IF NOT EXISTS domain (
    id            BIGSERIAL PRIMARY KEY,
    domain        TEXT      NOT NULL,
    content_hash  TEXT      NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS feed_ip (
    feed_id            BIGINT      NOT NULL REFERENCES feed(id),
    ip                 TEXT        NOT NULL,
    status             TEXT        NOT NULL,
    classification_id  BIGINT      NOT NULL REFERENCES classification_type(id),
    first_seen         TIMESTAMPTZ NOT NULL,
    last_seen          TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (feed_id, ip)
);

CREATE TABLE IF NOT EXISTS feed_domain (
    feed_id            BIGINT      NOT NULL REFERENCES feed(id),
    domain_id          BIGINT      NOT NULL REFERENCES domain(id),
    status             TEXT        NOT NULL,
    classification_id  BIGINT      NOT NULL REFERENCES classification_type(id),
    first_seen         TIMESTAMPTZ NOT NULL,
    last_seen          TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (feed_id, domain_id)
);

CREATE INDEX IF NOT EXISTS feed_ip_ip_idx         ON feed_ip(ip);
CREATE INDEX IF NOT EXISTS feed_domain_domain_idx ON feed_domain(domain_id);
"#;
