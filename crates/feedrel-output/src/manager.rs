//! [`ConnectionManager`]: owns the database session and its recovery policy.

use feedrel_core::{
  Error, ErrorKind, Result,
  config::ConnectionConfig,
  store::{Connector, Session},
};
use tracing::{debug, error, info, warn};

/// Owns exactly one live session and replaces it wholesale on reconnect.
///
/// All statement execution goes through [`ConnectionManager::attempt`], which
/// applies the recovery policy: a recoverable failure is logged and rolled
/// back, and if the rollback fails or the session is unusable the session is
/// replaced. The failed operation itself is not retried.
pub struct ConnectionManager<C: Connector> {
  connector:  C,
  config:     ConnectionConfig,
  session:    C::Session,
  recovered:  u64,
  reconnects: u64,
}

impl<C: Connector> ConnectionManager<C> {
  /// Open the initial session. Any failure is logged and returned; the
  /// caller must not continue without a session.
  pub fn connect(connector: C, config: ConnectionConfig) -> Result<Self> {
    debug!(host = %config.host, database = %config.database, "connecting to database");
    let session = connector.connect(&config).inspect_err(|e| {
      error!(error = %e, "failed to connect to database");
    })?;
    info!(database = %config.database, autocommit = config.autocommit, "connected to database");

    Ok(Self { connector, config, session, recovered: 0, reconnects: 0 })
  }

  /// Replace the session with a fresh one.
  ///
  /// A failure here is fatal in the same way as a failed initial connect.
  pub fn reconnect(&mut self) -> Result<()> {
    let session = self.connector.connect(&self.config).inspect_err(|e| {
      error!(error = %e, "failed to reconnect to database");
    })?;
    self.session = session;
    self.reconnects += 1;
    info!(database = %self.config.database, "reconnected to database");
    Ok(())
  }

  pub fn session(&self) -> &C::Session { &self.session }

  /// Number of recoverable failures handled so far.
  pub fn recovered(&self) -> u64 { self.recovered }

  pub fn reconnects(&self) -> u64 { self.reconnects }

  /// Run `op` against the session.
  ///
  /// Returns `Ok(None)` after recovering from a transient or session-lost
  /// failure. Fatal errors, and failures to reconnect, are returned as
  /// `Err`.
  pub fn attempt<T>(
    &mut self,
    what: &str,
    op: impl FnOnce(&mut C::Session) -> Result<T>,
  ) -> Result<Option<T>> {
    match op(&mut self.session) {
      Ok(value) => Ok(Some(value)),
      Err(err) => {
        self.recover(what, err)?;
        Ok(None)
      }
    }
  }

  fn recover(&mut self, what: &str, err: Error) -> Result<()> {
    if !err.is_recoverable() {
      return Err(err);
    }
    error!(error = %err, "failure in {what}");
    self.recovered += 1;

    if err.kind() == ErrorKind::SessionLost || self.session.is_closed() {
      warn!("session is unusable, connecting again");
      return self.reconnect();
    }

    match self.session.rollback() {
      Ok(()) => {
        info!("rolled back after failed {what}");
        Ok(())
      }
      Err(rollback_err) => {
        error!(error = %rollback_err, "rollback failed, connecting again");
        self.reconnect()
      }
    }
  }

  /// Commit the current transaction. `false` if a recoverable error
  /// prevented it.
  pub fn commit(&mut self) -> Result<bool> {
    Ok(self.attempt("commit", |s| s.commit())?.is_some())
  }

  /// Throw away whatever the current transaction holds.
  pub fn discard(&mut self) -> Result<()> {
    self.attempt("rollback", |s| s.rollback())?;
    Ok(())
  }
}
