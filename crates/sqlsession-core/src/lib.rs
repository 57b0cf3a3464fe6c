//! Core types and traits for sqlsession.
//!
//! Everything a backend needs to plug into the session layer lives here:
//!
//! - [`Value`] and [`Row`] for parameters and results
//! - [`Error`] shared by every crate in the workspace
//! - [`Connection`] and [`Connector`], the seam between sessions and drivers
//! - [`Params`] and [`bind_named`] for `:name` style parameters

pub mod connection;
pub mod error;
pub mod params;
pub mod row;
pub mod value;

pub use connection::{Connection, Connector, ExecResult, IsolationLevel};
pub use error::{Error, Result};
pub use params::{Params, bind_named};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
