//! [`EntityResolver`]: get-or-create for the reference entities.

use feedrel_core::{
  Result,
  entity::{ClassificationId, ClassificationKey, DomainId, DomainName, FeedId, FeedProviderId},
  store::{Connector, Session as _},
};

use crate::manager::ConnectionManager;

/// Maps natural keys to surrogate ids, creating rows on first sight.
///
/// Every method returns `Ok(None)` when the lookup failed and the session was
/// recovered. Callers abort the event on `None`.
pub struct EntityResolver<'a, C: Connector> {
  manager: &'a mut ConnectionManager<C>,
}

impl<'a, C: Connector> EntityResolver<'a, C> {
  pub fn new(manager: &'a mut ConnectionManager<C>) -> Self { Self { manager } }

  pub fn classification(
    &mut self,
    key: &ClassificationKey,
  ) -> Result<Option<ClassificationId>> {
    self
      .manager
      .attempt("adding classification", |s| s.classification_id(key))
  }

  pub fn feed_provider(&mut self, name: &str) -> Result<Option<FeedProviderId>> {
    self
      .manager
      .attempt("adding feed provider", |s| s.feed_provider_id(name))
  }

  /// Resolve the provider first; a failed provider short-circuits without
  /// touching the feed table.
  pub fn feed(&mut self, name: &str, provider: &str) -> Result<Option<FeedId>> {
    let Some(provider_id) = self.feed_provider(provider)? else {
      return Ok(None);
    };
    self
      .manager
      .attempt("adding feed", |s| s.feed_id(name, provider_id))
  }

  pub fn domain(&mut self, domain: &DomainName) -> Result<Option<DomainId>> {
    self.manager.attempt("adding domain", |s| s.domain_id(domain))
  }
}
