//! Scoped sessions.
//!
//! A [`Session`] owns one connection for the length of a block of work.
//! Unless configured for autocommit, the first statement starts a
//! transaction at the configured isolation level and nothing is kept unless
//! [`Session::commit`] is called. Releasing the session, explicitly through
//! [`Session::close`] or implicitly on drop, rolls back whatever is still
//! open and closes the connection.

use sqlsession_core::error::ConnectionErrorKind;
use sqlsession_core::{Connection, Error, IsolationLevel, Params, Result, Value, bind_named};

use crate::result::ResultSet;

/// Configuration shared by the sessions of one factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Run every statement in its own implicit transaction instead of
    /// starting one on first use.
    pub autocommit: bool,
    /// Isolation level for transactions the session starts.
    pub isolation_level: IsolationLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autocommit: false,
            isolation_level: IsolationLevel::ReadCommitted,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }
}

/// A unit of work on one connection.
///
/// Sessions are opened by a [`crate::SessionFactory`]. Dropping a session
/// that still holds its connection rolls back and closes it; errors during
/// that release are logged, never raised.
#[derive(Debug)]
pub struct Session<C: Connection> {
    connection: Option<C>,
    config: SessionConfig,
}

impl<C: Connection> Session<C> {
    /// Wrap an open connection.
    pub fn new(connection: C, config: SessionConfig) -> Self {
        Self {
            connection: Some(connection),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying connection, or `None` once the session is closed.
    pub fn connection(&self) -> Option<&C> {
        self.connection.as_ref()
    }

    /// Mutable access to the underlying connection.
    pub fn connection_mut(&mut self) -> Result<&mut C> {
        self.connection.as_mut().ok_or_else(|| {
            Error::connection(ConnectionErrorKind::Disconnected, "session is closed")
        })
    }

    /// Whether the session's connection has an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.connection.as_ref().is_some_and(C::in_transaction)
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Execute a statement with `:name` placeholders.
    ///
    /// ```
    /// use sqlsession::prelude::*;
    ///
    /// let db = MemoryDatabase::builder()
    ///     .table(TableDef::new("table_1").auto_increment("id").column("some_field"))
    ///     .build()?;
    /// let sessions = SessionFactory::new(Engine::new(db), SessionConfig::default());
    /// let mut session = sessions.open()?;
    /// let inserted = session.execute(
    ///     "INSERT INTO table_1 (some_field) VALUES (:some_field);",
    ///     &Params::new().bind("some_field", "hello world"),
    /// )?;
    /// assert_eq!(inserted.last_insert_id(), Some(1));
    /// assert!(session.in_transaction());
    /// # Ok::<(), sqlsession::Error>(())
    /// ```
    #[tracing::instrument(level = "debug", skip(self, params), fields(params = params.len()))]
    pub fn execute(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        let (positional, values) = bind_named(sql, params).map_err(|e| e.with_sql(sql))?;
        self.run(&positional, &values)
    }

    /// Execute a statement that takes no parameters.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn execute_raw(&mut self, sql: &str) -> Result<ResultSet> {
        self.run(sql, &[])
    }

    fn run(&mut self, sql: &str, values: &[Value]) -> Result<ResultSet> {
        let config = self.config;
        let conn = self.connection_mut()?;
        if !config.autocommit && !conn.in_transaction() {
            conn.begin(config.isolation_level)?;
        }
        let result = ResultSet::from(conn.run(sql, values)?);
        tracing::debug!(
            rows = result.len(),
            rows_affected = result.rows_affected(),
            "statement executed"
        );
        Ok(result)
    }

    /// Commit the open transaction. Does nothing when none is open, for
    /// example after a statement that commits implicitly.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&mut self) -> Result<()> {
        let conn = self.connection_mut()?;
        if conn.in_transaction() {
            conn.commit()?;
        }
        Ok(())
    }

    /// Roll back the open transaction. Does nothing when none is open.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&mut self) -> Result<()> {
        let conn = self.connection_mut()?;
        if conn.in_transaction() {
            conn.rollback()?;
        }
        Ok(())
    }

    /// Release the session, reporting any error.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    /// Roll back, then close. The connection is closed even when the
    /// rollback fails; the first error wins.
    fn release(&mut self) -> Result<()> {
        let Some(mut conn) = self.connection.take() else {
            return Ok(());
        };
        let rolled_back = if conn.in_transaction() {
            tracing::debug!("rolling back uncommitted work on release");
            conn.rollback()
        } else {
            Ok(())
        };
        let closed = conn.close();
        tracing::debug!("session released");
        rolled_back.and(closed)
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release session");
        }
    }
}
