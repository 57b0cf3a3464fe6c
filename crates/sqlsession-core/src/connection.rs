//! Database connection traits.
//!
//! - [`Connection`] - one open, blocking connection to a database
//! - [`Connector`] - a recipe for opening new connections
//! - [`IsolationLevel`] - SQL transaction isolation levels
//!
//! Connections are synchronous and exclusively owned: every operation takes
//! `&mut self`, so a connection is used by one session at a time.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Transactions can see uncommitted changes from others.
    ReadUncommitted,

    /// Transactions only see committed changes from others.
    #[default]
    ReadCommitted,

    /// Reads inside a transaction see a consistent snapshot.
    RepeatableRead,

    /// Transactions appear to execute sequentially.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL syntax for this isolation level.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Outcome of running one statement.
///
/// Statements that produce a result set fill `rows`; DML statements report
/// `rows_affected` and, for inserts into an auto-increment table,
/// `last_insert_id`.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

impl ExecResult {
    /// A result that carries rows only.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

/// A database connection capable of executing statements.
///
/// Parameters are positional and written as `?` in the SQL text; named
/// parameters are resolved by [`crate::bind_named`] before they reach a
/// connection.
///
/// # Transactions
///
/// A connection starts outside any transaction. [`begin`](Connection::begin)
/// opens one; [`commit`](Connection::commit) and
/// [`rollback`](Connection::rollback) end it. Statements run outside a
/// transaction follow the backend's own autocommit behavior.
pub trait Connection {
    /// Run one statement and return its rows and counters.
    fn run(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult>;

    /// Run a statement and return only its rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run(sql, params).map(|r| r.rows)
    }

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(sql, params).map(|r| r.rows_affected)
    }

    /// Begin a transaction with the given isolation level.
    fn begin(&mut self, isolation: IsolationLevel) -> Result<()>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction is currently open on this connection.
    fn in_transaction(&self) -> bool;

    /// Check that the connection is still usable.
    fn ping(&mut self) -> Result<()>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Something that can open new connections.
///
/// Implemented by driver configurations (a MySQL target) and by in-memory
/// catalogs. The session layer holds one connector per engine and calls
/// [`connect`](Connector::connect) for every session it opens.
pub trait Connector {
    /// The connection type produced by this connector.
    type Conn: Connection;

    /// Open a new connection.
    fn connect(&self) -> Result<Self::Conn>;

    /// A short description of the target, for logs. Must not contain secrets.
    fn describe(&self) -> String;
}
