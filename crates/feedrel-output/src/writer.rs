//! [`FactWriter`]: insert-or-refresh of the feed fact tables.

use chrono::Utc;
use feedrel_core::{
  Result,
  entity::{ClassificationId, DomainId, FeedId},
  store::{Connector, Session as _},
};

use crate::manager::ConnectionManager;

pub struct FactWriter<'a, C: Connector> {
  manager: &'a mut ConnectionManager<C>,
}

impl<'a, C: Connector> FactWriter<'a, C> {
  pub fn new(manager: &'a mut ConnectionManager<C>) -> Self { Self { manager } }

  /// `true` if the row was written. A recovered failure yields `false`.
  pub fn upsert_ip_fact(
    &mut self,
    feed: FeedId,
    ip: &str,
    classification: ClassificationId,
  ) -> Result<bool> {
    let now = Utc::now();
    let written = self.manager.attempt("adding ip from feed", |s| {
      s.upsert_feed_ip(feed, ip, classification, now)
    })?;
    Ok(written.is_some())
  }

  pub fn upsert_domain_fact(
    &mut self,
    feed: FeedId,
    domain: DomainId,
    classification: ClassificationId,
  ) -> Result<bool> {
    let now = Utc::now();
    let written = self.manager.attempt("adding domain from feed", |s| {
      s.upsert_feed_domain(feed, domain, classification, now)
    })?;
    Ok(written.is_some())
  }
}
