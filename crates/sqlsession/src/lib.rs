//! Scoped database sessions.
//!
//! `sqlsession` opens short-lived sessions against a database, runs
//! parameterized SQL through them and releases them deterministically:
//!
//! - [`Engine`] knows how to reach a database through a [`Connector`]
//! - [`SessionFactory`] opens [`Session`]s with a shared [`SessionConfig`]
//! - [`Session`] runs statements inside a lazily started transaction and
//!   rolls back and closes when dropped
//! - [`ResultSet`] holds the rows and counters of one statement
//! - [`TableFixture`] seeds a table for a test and truncates it afterwards
//!
//! Two backends are included: a blocking MySQL driver ([`MySqlConnector`])
//! and an in-memory engine ([`MemoryDatabase`]).
//!
//! # Example
//!
//! ```
//! use sqlsession::prelude::*;
//!
//! let db = MemoryDatabase::builder()
//!     .name("testdb")
//!     .table(TableDef::new("table_1").auto_increment("id").column("some_field"))
//!     .build()?;
//! let sessions = SessionFactory::new(Engine::new(db), SessionConfig::default());
//!
//! sessions.with_session(|s| {
//!     s.execute(
//!         "INSERT INTO table_1 (some_field) VALUES (:some_field);",
//!         &params! { "some_field" => "hello world" },
//!     )?;
//!     s.commit()
//! })?;
//!
//! let rows = sessions.with_session(|s| Ok(s.execute_raw("SELECT * FROM table_1;")?.fetch_all()))?;
//! assert_eq!(rows[0].get_named::<i64>("id")?, 1);
//! assert_eq!(rows[0].get_named::<String>("some_field")?, "hello world");
//! # Ok::<(), sqlsession::Error>(())
//! ```

pub mod engine;
pub mod fixture;
pub mod result;
pub mod session;

pub use engine::{Engine, SessionFactory};
pub use fixture::TableFixture;
pub use result::ResultSet;
pub use session::{Session, SessionConfig};

pub use sqlsession_core::error::{
    ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
    TransactionErrorKind,
};
pub use sqlsession_core::{
    ColumnInfo, Connection, Connector, Error, ExecResult, FromValue, IsolationLevel, Params,
    Result, Row, Value, bind_named, params,
};

pub use sqlsession_memory::{MemoryConnection, MemoryDatabase, TableDef};
pub use sqlsession_mysql::{MySqlConfig, MySqlConnection, MySqlConnector};

/// Backend crates, for their less common types.
pub mod backends {
    pub use sqlsession_memory as memory;
    pub use sqlsession_mysql as mysql;
}

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::{
        Connection, Connector, Engine, Error, IsolationLevel, MemoryDatabase, MySqlConfig,
        MySqlConnector, Params, Result, ResultSet, Row, Session, SessionConfig, SessionFactory,
        TableDef, TableFixture, Value, params,
    };
}
