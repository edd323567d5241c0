//! End-to-end tests for the coordinator against a file-backed SQLite store,
//! with a fault-injecting session wrapper for the recovery paths.

use std::{
  collections::VecDeque,
  convert::Infallible,
  sync::{Arc, Mutex},
  thread,
  time::Duration,
};

use chrono::{DateTime, Utc};
use feedrel_core::{
  Error as StoreError, ErrorKind, Result as StoreResult,
  config::ConnectionConfig,
  entity::{
    ClassificationId, ClassificationKey, DomainId, DomainName, FeedId, FeedProviderId, Table,
  },
  event::{Event, Observable},
  store::{Connector, Session},
};
use feedrel_store_sqlite::SqliteSession;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::{
  AbortReason, ConnectionManager, Delivery, Error, Outcome, TransactionCoordinator, Transport,
};

// ─── Fault injection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Classification,
  FeedProvider,
  Feed,
  Domain,
  FeedIp,
  FeedDomain,
  Commit,
}

#[derive(Debug, Default)]
struct Faults {
  /// The next call to this operation fails with this kind.
  fail:          Option<(Op, ErrorKind)>,
  fail_rollback: bool,
  fail_connect:  bool,
  closed:        bool,
  connects:      u32,
  rollbacks:     u32,
  /// Every operation attempted, in order.
  calls:         Vec<Op>,
}

impl Faults {
  fn calls_to(&self, op: Op) -> usize { self.calls.iter().filter(|&&c| c == op).count() }
}

type SharedFaults = Arc<Mutex<Faults>>;

fn injected(kind: ErrorKind, message: String) -> StoreError {
  match kind {
    ErrorKind::Transient => StoreError::Transient { message, source: None },
    ErrorKind::SessionLost => StoreError::SessionLost { message, source: None },
    ErrorKind::Fatal => StoreError::Fatal { message, source: None },
  }
}

struct FaultySession {
  inner:  SqliteSession,
  faults: SharedFaults,
}

impl FaultySession {
  fn check(&self, op: Op) -> StoreResult<()> {
    let mut faults = self.faults.lock().unwrap();
    faults.calls.push(op);
    match faults.fail {
      Some((target, kind)) if target == op => {
        faults.fail = None;
        if kind == ErrorKind::SessionLost {
          faults.closed = true;
        }
        Err(injected(kind, format!("injected failure in {op:?}")))
      }
      _ => Ok(()),
    }
  }
}

impl Session for FaultySession {
  fn classification_id(&mut self, key: &ClassificationKey) -> StoreResult<ClassificationId> {
    self.check(Op::Classification)?;
    self.inner.classification_id(key)
  }

  fn feed_provider_id(&mut self, name: &str) -> StoreResult<FeedProviderId> {
    self.check(Op::FeedProvider)?;
    self.inner.feed_provider_id(name)
  }

  fn feed_id(&mut self, name: &str, provider: FeedProviderId) -> StoreResult<FeedId> {
    self.check(Op::Feed)?;
    self.inner.feed_id(name, provider)
  }

  fn domain_id(&mut self, domain: &DomainName) -> StoreResult<DomainId> {
    self.check(Op::Domain)?;
    self.inner.domain_id(domain)
  }

  fn upsert_feed_ip(
    &mut self,
    feed: FeedId,
    ip: &str,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> StoreResult<()> {
    self.check(Op::FeedIp)?;
    self.inner.upsert_feed_ip(feed, ip, classification, seen_at)
  }

  fn upsert_feed_domain(
    &mut self,
    feed: FeedId,
    domain: DomainId,
    classification: ClassificationId,
    seen_at: DateTime<Utc>,
  ) -> StoreResult<()> {
    self.check(Op::FeedDomain)?;
    self.inner.upsert_feed_domain(feed, domain, classification, seen_at)
  }

  fn commit(&mut self) -> StoreResult<()> {
    self.check(Op::Commit)?;
    self.inner.commit()
  }

  fn rollback(&mut self) -> StoreResult<()> {
    let mut faults = self.faults.lock().unwrap();
    faults.rollbacks += 1;
    if std::mem::take(&mut faults.fail_rollback) {
      return Err(injected(ErrorKind::Transient, "injected rollback failure".into()));
    }
    drop(faults);
    self.inner.rollback()
  }

  fn is_closed(&self) -> bool { self.faults.lock().unwrap().closed }
}

struct FaultyConnector {
  faults: SharedFaults,
}

impl Connector for FaultyConnector {
  type Session = FaultySession;

  fn connect(&self, config: &ConnectionConfig) -> StoreResult<FaultySession> {
    let mut faults = self.faults.lock().unwrap();
    faults.connects += 1;
    if faults.fail_connect {
      return Err(injected(ErrorKind::SessionLost, "injected connect failure".into()));
    }
    faults.closed = false;
    drop(faults);

    Ok(FaultySession { inner: SqliteSession::open(config)?, faults: self.faults.clone() })
  }
}

// ─── Transport ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryTransport {
  inbox: VecDeque<Delivery>,
  acked: Vec<u64>,
  next:  u64,
}

impl MemoryTransport {
  fn with(payloads: impl IntoIterator<Item = Value>) -> Self {
    let mut t = Self::default();
    for payload in payloads {
      t.next += 1;
      t.inbox.push_back(Delivery::new(t.next, payload));
    }
    t
  }
}

impl Transport for MemoryTransport {
  type Error = Infallible;

  fn receive(&mut self) -> Result<Option<Delivery>, Infallible> { Ok(self.inbox.pop_front()) }

  fn acknowledge(&mut self, delivery: &Delivery) -> Result<(), Infallible> {
    self.acked.push(delivery.tag);
    Ok(())
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
  _dir:        TempDir,
  config:      ConnectionConfig,
  faults:      SharedFaults,
  coordinator: TransactionCoordinator<FaultyConnector>,
}

impl Harness {
  fn new(autocommit: bool) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feedrel.db");
    let config = ConnectionConfig::new(path.to_string_lossy()).with_autocommit(autocommit);
    let faults = SharedFaults::default();

    let connector = FaultyConnector { faults: faults.clone() };
    let manager = ConnectionManager::connect(connector, config.clone()).unwrap();
    let coordinator = TransactionCoordinator::new(manager, true);

    Self { _dir: dir, config, faults, coordinator }
  }

  fn fail_next(&self, op: Op, kind: ErrorKind) {
    self.faults.lock().unwrap().fail = Some((op, kind));
  }

  fn faults(&self) -> std::sync::MutexGuard<'_, Faults> { self.faults.lock().unwrap() }

  fn process(&mut self, payload: Value) -> Result<Outcome, StoreError> {
    let event = Event::from_json(&payload, true).unwrap();
    self.coordinator.process(&event)
  }

  /// An independent session on the same database file.
  fn inspect(&self) -> SqliteSession {
    SqliteSession::open(&self.config.clone().with_autocommit(true)).unwrap()
  }

  fn count(&self, table: Table) -> u64 { self.inspect().count(table).unwrap() }
}

fn c2_event((field, value): (&str, &str)) -> Value {
  let mut event = json!({
    "feed": { "provider": "ProviderX", "name": "FeedY" },
    "classification": { "taxonomy": "malicious code", "type": "c2server" },
  });
  event[field] = json!(value);
  event
}

fn ip_event() -> Value { c2_event(("source.ip", "10.0.0.1")) }

/// Id of an existing feed. Only call once the feed is known to exist.
fn feed_of(s: &mut SqliteSession, provider: &str, name: &str) -> FeedId {
  let provider = s.feed_provider_id(provider).unwrap();
  s.feed_id(name, provider).unwrap()
}

// ─── Happy paths ─────────────────────────────────────────────────────────────

#[test]
fn ip_event_is_written_committed_and_acknowledged() {
  let mut h = Harness::new(false);
  let mut transport = MemoryTransport::with([ip_event()]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert_eq!(transport.acked, vec![1]);
  assert_eq!(stats.received, 1);
  assert_eq!(stats.committed, 1);
  assert_eq!(stats.acknowledged, 1);

  for table in [Table::ClassificationType, Table::FeedProvider, Table::Feed, Table::FeedIp] {
    assert_eq!(h.count(table), 1, "{}", table.as_str());
  }
  assert_eq!(h.count(Table::FeedDomain), 0);

  let mut s = h.inspect();
  let feed = feed_of(&mut s, "ProviderX", "FeedY");
  let record = s.feed_ip(feed, "10.0.0.1").unwrap().unwrap();
  assert_eq!(record.status, "Active");
  assert_eq!(record.first_seen, record.last_seen);

  let (key, official) = s.classification(record.classification_id).unwrap().unwrap();
  assert_eq!(key, ClassificationKey::new("malicious code", "c2server"));
  assert!(!official);
}

#[test]
fn fqdn_event_is_normalized_into_the_domain_table() {
  let mut h = Harness::new(true);

  let outcome = h.process(c2_event(("source.fqdn", " Evil.Example.COM. "))).unwrap();

  let expected = DomainName::parse("evil.example.com").unwrap();
  assert_eq!(outcome, Outcome::Committed(Observable::Fqdn(expected.clone())));
  assert_eq!(h.count(Table::Domain), 1);
  assert_eq!(h.count(Table::FeedDomain), 1);
  assert_eq!(h.count(Table::FeedIp), 0);

  let mut s = h.inspect();
  let domain = s.domain_id(&expected).unwrap();
  let (name, hash) = s.domain(domain).unwrap().unwrap();
  assert_eq!(name, "evil.example.com");
  assert_eq!(hash, expected.content_hash());

  let feed = feed_of(&mut s, "ProviderX", "FeedY");
  assert_eq!(s.feed_domain(feed, domain).unwrap().unwrap().status, "Active");
}

#[test]
fn network_is_stored_as_an_ip_fact_and_ip_wins_over_fqdn() {
  let mut h = Harness::new(true);

  h.process(c2_event(("source.network", "192.0.2.0/24"))).unwrap();
  let mut both = ip_event();
  both["source.fqdn"] = json!("c2.example.net");
  h.process(both).unwrap();

  assert_eq!(h.count(Table::FeedIp), 2);
  assert_eq!(h.count(Table::Domain), 0);

  let mut s = h.inspect();
  let feed = feed_of(&mut s, "ProviderX", "FeedY");
  assert!(s.feed_ip(feed, "192.0.2.0/24").unwrap().is_some());
}

#[test]
fn extra_classification_type_falls_back_to_other_taxonomy() {
  let mut h = Harness::new(true);

  h.process(json!({
    "feed.provider": "ProviderX",
    "feed.name": "FeedY",
    "extra": { "classification_type": "phishing" },
    "source.ip": "10.0.0.2",
  }))
  .unwrap();

  let mut s = h.inspect();
  let feed = feed_of(&mut s, "ProviderX", "FeedY");
  let record = s.feed_ip(feed, "10.0.0.2").unwrap().unwrap();
  let (key, _) = s.classification(record.classification_id).unwrap().unwrap();
  assert_eq!(key, ClassificationKey::new("other", "phishing"));
}

#[test]
fn event_without_observable_commits_and_is_acknowledged() {
  let mut h = Harness::new(false);
  let mut transport = MemoryTransport::with([json!({
    "feed.provider": "ProviderX",
    "feed.name": "FeedY",
    "classification.taxonomy": "malicious code",
    "classification.type": "c2server",
  })]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert_eq!(transport.acked, vec![1]);
  assert_eq!(stats.no_content, 1);
  assert_eq!(h.count(Table::ClassificationType), 1);
  assert_eq!(h.count(Table::FeedIp), 0);
  assert_eq!(h.count(Table::Feed), 0);
}

#[test]
fn repeated_observation_only_moves_last_seen() {
  let mut h = Harness::new(false);

  h.process(ip_event()).unwrap();
  let mut s = h.inspect();
  let feed = feed_of(&mut s, "ProviderX", "FeedY");
  let first = s.feed_ip(feed, "10.0.0.1").unwrap().unwrap();
  drop(s);

  thread::sleep(Duration::from_millis(5));
  h.process(ip_event()).unwrap();

  let second = h.inspect().feed_ip(feed, "10.0.0.1").unwrap().unwrap();
  assert_eq!(h.count(Table::FeedIp), 1);
  assert_eq!(second.first_seen, first.first_seen);
  assert!(second.last_seen > first.last_seen);
  assert_eq!(second.classification_id, first.classification_id);
}

// ─── Dropped events ──────────────────────────────────────────────────────────

#[test]
fn unclassified_event_writes_nothing_and_is_not_acknowledged() {
  let mut h = Harness::new(false);
  let mut transport = MemoryTransport::with([json!({
    "feed.provider": "ProviderX",
    "feed.name": "FeedY",
    "source.ip": "10.0.0.1",
  })]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert!(transport.acked.is_empty());
  assert_eq!(stats.dropped_unresolved, 1);
  for table in [Table::ClassificationType, Table::FeedProvider, Table::FeedIp] {
    assert_eq!(h.count(table), 0, "{}", table.as_str());
  }
}

#[test]
fn missing_feed_aborts_and_rolls_back_the_classification() {
  let mut h = Harness::new(false);
  let mut event = ip_event();
  event.as_object_mut().unwrap().remove("feed");

  let outcome = h.process(event).unwrap();

  assert_eq!(outcome, Outcome::Aborted(AbortReason::MissingFeed));
  assert_eq!(h.count(Table::ClassificationType), 0);
  assert_eq!(h.count(Table::FeedIp), 0);
}

#[test]
fn malformed_event_is_counted_and_skipped() {
  let mut h = Harness::new(true);
  let mut transport = MemoryTransport::with([json!(["not", "an", "object"]), ip_event()]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert_eq!(stats.invalid, 1);
  assert_eq!(stats.received, 1);
  assert_eq!(transport.acked, vec![2]);
}

// ─── Recovery ────────────────────────────────────────────────────────────────

#[test]
fn transient_failure_rolls_back_and_the_next_event_succeeds() {
  let mut h = Harness::new(false);
  h.fail_next(Op::Feed, ErrorKind::Transient);
  let mut transport = MemoryTransport::with([ip_event(), ip_event()]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert_eq!(transport.acked, vec![2]);
  assert_eq!(stats.dropped_unresolved, 1);
  assert_eq!(stats.committed, 1);
  assert_eq!(stats.recovered_errors, 1);
  assert_eq!(stats.reconnects, 0);
  assert_eq!(h.faults().connects, 1);
  assert!(h.faults().rollbacks >= 1);
  assert_eq!(h.count(Table::FeedIp), 1);
}

#[test]
fn failed_rollback_replaces_the_session() {
  let mut h = Harness::new(false);
  h.fail_next(Op::FeedIp, ErrorKind::Transient);
  h.faults().fail_rollback = true;

  let outcome = h.process(ip_event()).unwrap();

  assert_eq!(outcome, Outcome::Aborted(AbortReason::WriteFailed));
  assert_eq!(h.faults().connects, 2);
  assert_eq!(h.coordinator.stats().reconnects, 1);
  // The abandoned session took its open transaction with it.
  assert_eq!(h.count(Table::ClassificationType), 0);
  assert_eq!(h.count(Table::FeedIp), 0);

  assert!(h.process(ip_event()).unwrap().should_acknowledge());
  assert_eq!(h.count(Table::FeedIp), 1);
}

#[test]
fn lost_session_reconnects_without_rolling_back() {
  let mut h = Harness::new(true);
  h.fail_next(Op::Classification, ErrorKind::SessionLost);

  let outcome = h.process(ip_event()).unwrap();

  assert_eq!(outcome, Outcome::Aborted(AbortReason::ClassificationUnresolved));
  assert_eq!(h.faults().connects, 2);
  // Only the discard after the abort, on the replacement session.
  assert_eq!(h.faults().rollbacks, 1);
  assert!(!h.coordinator.manager().session().is_closed());
  assert!(h.process(ip_event()).unwrap().should_acknowledge());
}

#[test]
fn failed_provider_lookup_skips_the_feed_insert() {
  let mut h = Harness::new(true);
  h.fail_next(Op::FeedProvider, ErrorKind::Transient);

  let outcome = h.process(ip_event()).unwrap();

  assert_eq!(outcome, Outcome::Aborted(AbortReason::FeedUnresolved));
  assert_eq!(h.faults().calls_to(Op::FeedProvider), 1);
  assert_eq!(h.faults().calls_to(Op::Feed), 0);
  assert_eq!(h.faults().calls_to(Op::FeedIp), 0);
  assert_eq!(h.count(Table::Feed), 0);
  assert_eq!(h.count(Table::FeedIp), 0);
}

#[test]
fn domain_failure_drops_the_event() {
  let mut h = Harness::new(false);
  h.fail_next(Op::Domain, ErrorKind::Transient);

  let outcome = h.process(c2_event(("source.fqdn", "c2.example.net"))).unwrap();

  assert_eq!(outcome, Outcome::Aborted(AbortReason::DomainUnresolved));
  assert_eq!(h.coordinator.stats().dropped_unresolved, 1);
  assert_eq!(h.count(Table::FeedDomain), 0);
  assert_eq!(h.count(Table::Feed), 0);
}

#[test]
fn write_failure_leaves_no_partial_rows() {
  let mut h = Harness::new(false);
  h.fail_next(Op::FeedDomain, ErrorKind::Transient);
  let mut transport = MemoryTransport::with([c2_event(("source.fqdn", "c2.example.net"))]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert!(transport.acked.is_empty());
  assert_eq!(stats.write_failures, 1);
  for table in [Table::ClassificationType, Table::Feed, Table::Domain, Table::FeedDomain] {
    assert_eq!(h.count(table), 0, "{}", table.as_str());
  }
}

#[test]
fn commit_failure_is_not_acknowledged() {
  let mut h = Harness::new(false);
  h.fail_next(Op::Commit, ErrorKind::Transient);
  let mut transport = MemoryTransport::with([ip_event()]);

  let stats = h.coordinator.run(&mut transport).unwrap();

  assert!(transport.acked.is_empty());
  assert_eq!(stats.write_failures, 1);
  assert_eq!(stats.committed, 0);
  assert_eq!(h.count(Table::FeedIp), 0);
}

#[test]
fn fatal_error_stops_the_run() {
  let mut h = Harness::new(false);
  h.fail_next(Op::FeedProvider, ErrorKind::Fatal);
  let mut transport = MemoryTransport::with([ip_event(), ip_event()]);

  let err = h.coordinator.run(&mut transport).unwrap_err();

  assert!(matches!(err, Error::Store(ref e) if e.kind() == ErrorKind::Fatal));
  assert!(transport.acked.is_empty());
  assert_eq!(transport.inbox.len(), 1);
}

#[test]
fn failed_reconnect_is_fatal() {
  let mut h = Harness::new(true);
  h.fail_next(Op::FeedIp, ErrorKind::SessionLost);
  h.faults().fail_connect = true;

  let err = h.process(ip_event()).unwrap_err();

  assert_eq!(err.kind(), ErrorKind::SessionLost);
  assert_eq!(h.faults().connects, 2);
}
