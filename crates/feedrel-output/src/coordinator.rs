//! [`TransactionCoordinator`]: drives one event through resolution, the fact
//! write, and the commit/acknowledge contract.
//!
//! An event is acknowledged if and only if its transaction committed. Every
//! abort leaves the message unacknowledged and rolls back anything the event
//! had written in the open transaction.

use feedrel_core::{
  Error as StoreError,
  event::{Event, Observable},
  store::Connector,
};
use tracing::{debug, info, warn};

use crate::{
  Error, Result, manager::ConnectionManager, resolver::EntityResolver, stats::Stats,
  transport::Transport, writer::FactWriter,
};

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
  /// Neither an explicit classification nor the `extra` fallback is present.
  Unclassified,
  ClassificationUnresolved,
  /// An observable is present but the feed name or provider is missing.
  MissingFeed,
  FeedUnresolved,
  DomainUnresolved,
  WriteFailed,
  CommitFailed,
}

impl AbortReason {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Unclassified => "unclassified",
      Self::ClassificationUnresolved => "classification unresolved",
      Self::MissingFeed => "missing feed",
      Self::FeedUnresolved => "feed unresolved",
      Self::DomainUnresolved => "domain unresolved",
      Self::WriteFailed => "fact write failed",
      Self::CommitFailed => "commit failed",
    }
  }

  /// Whether the event was lost to a failed lookup rather than a failed write.
  pub fn is_resolution_failure(self) -> bool {
    !matches!(self, Self::WriteFailed | Self::CommitFailed)
  }
}

/// The fate of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// The fact row was written and committed.
  Committed(Observable),
  /// Nothing to persist; committed anyway.
  NoContent,
  Aborted(AbortReason),
}

impl Outcome {
  pub fn should_acknowledge(&self) -> bool {
    matches!(self, Self::Committed(_) | Self::NoContent)
  }
}

pub struct TransactionCoordinator<C: Connector> {
  manager:            ConnectionManager<C>,
  jsondict_as_string: bool,
  stats:              Stats,
}

impl<C: Connector> TransactionCoordinator<C> {
  pub fn new(manager: ConnectionManager<C>, jsondict_as_string: bool) -> Self {
    Self { manager, jsondict_as_string, stats: Stats::default() }
  }

  pub fn manager(&self) -> &ConnectionManager<C> { &self.manager }

  pub fn stats(&self) -> Stats {
    Stats {
      recovered_errors: self.manager.recovered(),
      reconnects: self.manager.reconnects(),
      ..self.stats
    }
  }

  /// Consume the transport until it is exhausted.
  ///
  /// Fatal store errors and transport errors end the loop.
  pub fn run<T: Transport>(&mut self, transport: &mut T) -> Result<Stats> {
    while let Some(delivery) = transport
      .receive()
      .map_err(|e| Error::Transport(Box::new(e)))?
    {
      let event = match Event::from_json(&delivery.payload, self.jsondict_as_string) {
        Ok(event) => event,
        Err(e) => {
          warn!(tag = delivery.tag, error = %e, "dropping malformed event");
          self.stats.invalid += 1;
          continue;
        }
      };

      if self.process(&event)?.should_acknowledge() {
        transport
          .acknowledge(&delivery)
          .map_err(|e| Error::Transport(Box::new(e)))?;
        self.stats.acknowledged += 1;
      }
    }
    Ok(self.stats())
  }

  /// Resolve, write and commit one event.
  pub fn process(&mut self, event: &Event) -> Result<Outcome, StoreError> {
    self.stats.received += 1;
    let outcome = self.drive(event)?;

    match &outcome {
      Outcome::Committed(subject) => {
        debug!(subject = subject.value(), "event committed");
        self.stats.committed += 1;
      }
      Outcome::NoContent => self.stats.no_content += 1,
      Outcome::Aborted(reason) => {
        debug!(reason = reason.as_str(), "event not acknowledged");
        if reason.is_resolution_failure() {
          self.stats.dropped_unresolved += 1;
        } else {
          self.stats.write_failures += 1;
        }
        self.manager.discard()?;
      }
    }
    Ok(outcome)
  }

  fn drive(&mut self, event: &Event) -> Result<Outcome, StoreError> {
    let feed = event.feed();
    if feed.provider.is_none() {
      info!("message has no feed provider");
    }

    // Classify.
    let Some(key) = event.classification() else {
      warn!(feed = ?feed.name, provider = ?feed.provider, "event has no classification");
      return Ok(Outcome::Aborted(AbortReason::Unclassified));
    };
    let Some(classification) = EntityResolver::new(&mut self.manager).classification(&key)?
    else {
      warn!(
        taxonomy = %key.taxonomy,
        kind = %key.kind,
        "could not resolve classification, dropping event"
      );
      return Ok(Outcome::Aborted(AbortReason::ClassificationUnresolved));
    };

    // Resolve the subject.
    let Some(subject) = event.observable() else {
      warn!(feed = ?feed.name, provider = ?feed.provider, "no threat content for event");
      return self.commit(Outcome::NoContent);
    };
    let (Some(feed_name), Some(provider)) = (feed.name, feed.provider) else {
      warn!(
        subject = subject.value(),
        feed = ?feed.name,
        provider = ?feed.provider,
        "event has no feed to attach the observation to"
      );
      return Ok(Outcome::Aborted(AbortReason::MissingFeed));
    };
    let Some(feed_id) = EntityResolver::new(&mut self.manager).feed(feed_name, provider)?
    else {
      warn!(subject = subject.value(), feed = feed_name, provider, "could not resolve feed");
      return Ok(Outcome::Aborted(AbortReason::FeedUnresolved));
    };

    // Write the fact.
    let written = match &subject {
      Observable::Ip(ip) | Observable::Network(ip) => {
        FactWriter::new(&mut self.manager).upsert_ip_fact(feed_id, ip, classification)?
      }
      Observable::Fqdn(domain) => {
        let Some(domain_id) = EntityResolver::new(&mut self.manager).domain(domain)? else {
          warn!(
            subject = domain.as_str(),
            feed = feed_name,
            provider,
            "could not resolve domain"
          );
          return Ok(Outcome::Aborted(AbortReason::DomainUnresolved));
        };
        FactWriter::new(&mut self.manager).upsert_domain_fact(
          feed_id,
          domain_id,
          classification,
        )?
      }
    };
    if !written {
      warn!(
        subject = subject.value(),
        feed = feed_name,
        provider,
        "there was an error processing the event"
      );
      return Ok(Outcome::Aborted(AbortReason::WriteFailed));
    }

    self.commit(Outcome::Committed(subject))
  }

  fn commit(&mut self, outcome: Outcome) -> Result<Outcome, StoreError> {
    if self.manager.commit()? {
      Ok(outcome)
    } else {
      Ok(Outcome::Aborted(AbortReason::CommitFailed))
    }
  }
}
