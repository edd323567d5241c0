//! Relational output for normalized threat-intelligence events.
//!
//! Each event is resolved against the reference tables (classification type,
//! feed provider, feed, domain), written as a feed-scoped fact row, committed,
//! and only then acknowledged to the transport. Backends are pluggable through
//! [`feedrel_core::store::Connector`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod writer;

pub use coordinator::{AbortReason, Outcome, TransactionCoordinator};
pub use error::{Error, Result};
pub use manager::ConnectionManager;
pub use resolver::EntityResolver;
pub use stats::Stats;
pub use transport::{Delivery, JsonLinesTransport, Transport};
pub use writer::FactWriter;

#[cfg(test)]
mod tests;
