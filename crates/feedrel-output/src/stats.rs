//! Per-process event counters.

/// Counters reported when the input is exhausted.
///
/// `dropped_unresolved` counts events discarded because a reference entity
/// could not be resolved; these are never acknowledged and never retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
  pub received:           u64,
  pub invalid:            u64,
  pub committed:          u64,
  pub no_content:         u64,
  pub acknowledged:       u64,
  pub dropped_unresolved: u64,
  pub write_failures:     u64,
  pub recovered_errors:   u64,
  pub reconnects:         u64,
}
