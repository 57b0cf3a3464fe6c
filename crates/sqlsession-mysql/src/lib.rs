//! Blocking MySQL driver for sqlsession.
//!
//! This crate speaks the MySQL client/server protocol directly over a
//! `std::net::TcpStream`:
//!
//! - Packet framing with sequence numbers
//! - Authentication (`mysql_native_password`, `caching_sha2_password`
//!   including RSA full authentication)
//! - Text protocol queries with client-side parameter interpolation
//! - Explicit transactions with a chosen isolation level
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlsession_core::{Connection, Connector};
//! use sqlsession_mysql::{MySqlConfig, MySqlConnector};
//!
//! let config = MySqlConfig::from_url("mysql://127.0.0.1/testdb")?
//!     .user("user")
//!     .password("pass");
//!
//! let mut conn = MySqlConnector::new(config).connect()?;
//! let rows = conn.query("SELECT * FROM table_1", &[])?;
//! # Ok::<(), sqlsession_core::Error>(())
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod types;

pub use config::MySqlConfig;
pub use connection::{ConnectionState, MySqlConnection, MySqlConnector};
