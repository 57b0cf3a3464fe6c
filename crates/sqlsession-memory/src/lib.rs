//! In-memory engine for sqlsession.
//!
//! A [`MemoryDatabase`] holds a catalog of declared tables shared by every
//! [`MemoryConnection`] it opens. Connections implement
//! [`sqlsession_core::Connection`] for a small SQL surface (single-table
//! `INSERT`, `SELECT`, `TRUNCATE` and transaction control) with MySQL-like
//! transaction and auto-increment behavior, so session code can be tested
//! without a server.
//!
//! ```
//! use sqlsession_core::{Connection, Value};
//! use sqlsession_memory::{MemoryDatabase, TableDef};
//!
//! let db = MemoryDatabase::builder()
//!     .table(TableDef::new("table_1").auto_increment("id").column("some_field"))
//!     .build()
//!     .unwrap();
//! let mut conn = db.connect();
//! conn.execute("INSERT INTO table_1 (some_field) VALUES (?)", &[Value::from("hello world")])
//!     .unwrap();
//! let rows = conn.query("SELECT * FROM table_1", &[]).unwrap();
//! assert_eq!(rows[0].get_named::<i64>("id").unwrap(), 1);
//! ```

pub mod catalog;
pub mod connection;
pub mod database;
pub mod sql;

pub use catalog::TableDef;
pub use connection::MemoryConnection;
pub use database::{MemoryDatabase, MemoryDatabaseBuilder};
