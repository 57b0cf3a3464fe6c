//! MySQL connection configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sqlsession_core::Error;
use sqlsession_core::error::ConfigError;

use crate::protocol::capabilities;
use crate::protocol::charset;

pub const DEFAULT_PORT: u16 = 3306;

/// MySQL connection configuration.
///
/// Build it with the fluent setters, or start from a URL with
/// [`MySqlConfig::from_url`] and add credentials separately.
#[derive(Clone)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Default database for the connection
    pub database: Option<String>,
    /// Character set code sent in the handshake (default: utf8mb4)
    pub charset: u8,
    /// Timeout for establishing the TCP connection
    pub connect_timeout: Duration,
    /// Read/write timeout once connected; `None` blocks indefinitely
    pub io_timeout: Option<Duration>,
    /// Connection attributes reported to the server
    pub attributes: BTreeMap<String, String>,
    /// Max allowed packet size announced to the server (default: 64MB)
    pub max_packet_size: u32,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: None,
            database: None,
            charset: charset::DEFAULT_CHARSET,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Some(Duration::from_secs(30)),
            attributes: BTreeMap::new(),
            max_packet_size: 64 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl MySqlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `mysql://[user[:password]@]host[:port][/database][?options]`.
    ///
    /// Query options are ignored. IPv6 hosts are written in brackets.
    /// Percent-encoding is not decoded; pass unusual credentials through
    /// [`user`](Self::user) and [`password`](Self::password) instead.
    pub fn from_url(url: &str) -> Result<Self, Error> {
        let url = url.trim();
        let rest = url
            .strip_prefix("mysql://")
            .ok_or_else(|| config_error(format!("unsupported URL scheme in '{}'", url)))?;

        let (auth, host_and_path) = match rest.rsplit_once('@') {
            Some((auth, hp)) => (Some(auth), hp),
            None => (None, rest),
        };

        let (host_port, path) = match host_and_path.split_once('/') {
            Some((hp, path)) => (hp, Some(path)),
            None => (host_and_path, None),
        };
        let database = path
            .map(|p| p.split_once('?').map_or(p, |(left, _)| left))
            .filter(|p| !p.is_empty());

        let (host, port) = parse_host_port(host_port)?;
        if host.is_empty() {
            return Err(config_error(format!("missing host in '{}'", url)));
        }

        let mut config = Self::new().host(host).port(port);
        if let Some(auth) = auth {
            let (user, password) = match auth.split_once(':') {
                Some((u, p)) => (u, Some(p)),
                None => (auth, None),
            };
            config = config.user(user);
            if let Some(pw) = password.filter(|p| !p.is_empty()) {
                config = config.password(pw);
            }
        }
        if let Some(db) = database {
            config = config.database(db);
        }
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set a connection attribute (shown in `performance_schema.session_connect_attrs`).
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Host and port in `host:port` form, bracketing IPv6 literals.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Capability flags requested by the client.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capabilities::DEFAULT_CLIENT_FLAGS;
        if self.database.is_some() {
            flags |= capabilities::CLIENT_CONNECT_WITH_DB;
        }
        if !self.attributes.is_empty() {
            flags |= capabilities::CLIENT_CONNECT_ATTRS;
        }
        flags
    }
}

fn parse_host_port(input: &str) -> Result<(&str, u16), Error> {
    if let Some(rest) = input.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| config_error(format!("unterminated IPv6 host '{}'", input)))?;
        let host = &rest[..end];
        let port = match rest[end + 1..].strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None => DEFAULT_PORT,
        };
        return Ok((host, port));
    }

    match input.rsplit_once(':') {
        Some((host, port)) => Ok((host, parse_port(port)?)),
        None => Ok((input, DEFAULT_PORT)),
    }
}

fn parse_port(s: &str) -> Result<u16, Error> {
    s.parse::<u16>()
        .map_err(|_| config_error(format!("invalid port '{}'", s)))
}

fn config_error(message: String) -> Error {
    Error::Config(ConfigError { message })
}
