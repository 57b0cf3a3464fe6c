//! The error type shared by every backend.

use std::fmt;

/// Everything that can go wrong while opening, using or releasing a session.
#[derive(Debug)]
pub enum Error {
    /// Opening, authenticating or using a dead connection
    Connection(ConnectionError),
    /// The database rejected a statement
    Query(QueryError),
    /// A column value did not convert to the requested type
    Type(TypeError),
    /// Transaction control issued in the wrong state
    Transaction(TransactionError),
    /// Malformed or unexpected packet
    Protocol(ProtocolError),
    Config(ConfigError),
    Io(std::io::Error),
    /// A row was required but the result set was empty
    NoRows,
    /// Exactly one row was required but the result set held more
    MultipleRows(usize),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: BoxedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// TCP connect or handshake failed
    Connect,
    Authentication,
    /// Connection lost, or used after release
    Disconnected,
    Refused,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: BoxedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Malformed or unsupported SQL, or bad parameters
    Syntax,
    /// Duplicate key or similar
    Constraint,
    /// Unknown table
    NotFound,
    Permission,
    /// Anything else the server reports
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// BEGIN while a transaction is already open
    AlreadyActive,
    /// COMMIT or ROLLBACK without an open transaction
    NotActive,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub source: BoxedSource,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl Error {
    /// Whether the connection that produced this error is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Protocol(_) | Error::Io(_)
        )
    }

    /// Server SQLSTATE, such as `23000` for a duplicate key.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// The statement that failed, when known.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Shorthand for a query error without server metadata.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            sql: None,
            sqlstate: None,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a connection error without a source.
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection(ConnectionError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(ProtocolError {
            message: message.into(),
            source: None,
        })
    }

    /// Attach the offending SQL to a query error. Other variants pass through.
    #[must_use]
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            Error::Query(mut q) => {
                if q.sql.is_none() {
                    q.sql = Some(sql.to_string());
                }
                Error::Query(q)
            }
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection failed: {}", e.message),
            Error::Query(e) => write!(f, "query failed: {e}"),
            Error::Type(e) => write!(f, "conversion failed: {e}"),
            Error::Transaction(e) => write!(f, "transaction misuse: {}", e.message),
            Error::Protocol(e) => write!(f, "protocol violation: {}", e.message),
            Error::Config(e) => write!(f, "invalid configuration: {}", e.message),
            Error::Io(e) => write!(f, "i/o failure: {e}"),
            Error::NoRows => f.write_str("no rows returned"),
            Error::MultipleRows(n) => write!(f, "{n} rows returned where one was required"),
        }
    }
}

/// Underlying cause carried by some error variants.
pub type BoxedSource = Option<Box<dyn std::error::Error + Send + Sync>>;

fn boxed(source: &BoxedSource) -> Option<&(dyn std::error::Error + 'static)> {
    source
        .as_deref()
        .map(|err| err as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(ConnectionError { source, .. })
            | Error::Query(QueryError { source, .. })
            | Error::Protocol(ProtocolError { source, .. }) => boxed(source),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(state) => write!(f, "[{state}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wanted {}", self.expected)?;
        if let Some(column) = &self.column {
            write!(f, " in column `{column}`")?;
        }
        write!(f, ", got {}", self.actual)
    }
}

macro_rules! wrap_error {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(err: $source) -> Self {
                    Error::$variant(err)
                }
            }
        )+
    };
}

wrap_error! {
    std::io::Error => Io,
    ConnectionError => Connection,
    QueryError => Query,
    TypeError => Type,
    TransactionError => Transaction,
    ProtocolError => Protocol,
    ConfigError => Config,
}

pub type Result<T> = std::result::Result<T, Error>;
