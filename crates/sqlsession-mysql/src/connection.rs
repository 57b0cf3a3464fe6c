//! MySQL connection: handshake, authentication and the text query protocol.

#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use sqlsession_core::error::{
    ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
    TransactionErrorKind,
};
use sqlsession_core::row::ColumnInfo;
use sqlsession_core::{
    Connection, Connector, Error, ExecResult, IsolationLevel, Result, Row, Value,
};
use std::sync::Arc;

use crate::auth::{self, AuthPlugin};
use crate::config::MySqlConfig;
use crate::protocol::writer::frame;
use crate::protocol::{
    Command, ErrPacket, MAX_PAYLOAD, PacketHeader, PacketReader, PacketWriter, Response,
    capabilities, server_status,
};
use crate::types::{ColumnDef, interpolate_params};

/// Upper bound on auth round trips (switch, key request, key, result).
const MAX_AUTH_ROUNDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Idle, outside any transaction.
    Ready,
    /// The server reports an open transaction.
    InTransaction,
    /// An I/O or framing error left the stream in an unknown position.
    Broken,
    Closed,
}

/// What the server told us in its initial handshake.
#[derive(Debug, Clone)]
struct ServerHandshake {
    capabilities: u32,
    server_version: String,
    connection_id: u32,
    plugin: String,
    seed: Vec<u8>,
}

/// A blocking connection to a MySQL server.
///
/// Generic over the byte stream so the protocol can run over anything that
/// is `Read + Write`; [`MySqlConnection::connect`] opens a `TcpStream`.
pub struct MySqlConnection<S: Read + Write = TcpStream> {
    stream: S,
    state: ConnectionState,
    config: MySqlConfig,
    client_caps: u32,
    server_version: String,
    connection_id: u32,
    sequence_id: u8,
    status_flags: u16,
    warnings: u16,
}

impl<S: Read + Write> std::fmt::Debug for MySqlConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field("connection_id", &self.connection_id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection<TcpStream> {
    /// Open a TCP connection and authenticate.
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        let addr = config.socket_addr();
        let candidates = addr.to_socket_addrs().map_err(|e| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("failed to resolve {}: {}", addr, e),
                source: Some(Box::new(e)),
            })
        })?;

        let mut last_err = None;
        let mut stream = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        let stream = match (stream, last_err) {
            (Some(s), _) => s,
            (None, Some(e)) => {
                let kind = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    ConnectionErrorKind::Refused
                } else {
                    ConnectionErrorKind::Connect
                };
                return Err(Error::Connection(ConnectionError {
                    kind,
                    message: format!("failed to connect to {}: {}", addr, e),
                    source: Some(Box::new(e)),
                }));
            }
            (None, None) => {
                return Err(Error::connection(
                    ConnectionErrorKind::Connect,
                    format!("{} resolved to no addresses", addr),
                ));
            }
        };

        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.io_timeout)?;
        stream.set_write_timeout(config.io_timeout)?;

        Self::handshake(stream, config)
    }
}

impl<S: Read + Write> MySqlConnection<S> {
    /// Run the connection phase over an already-open stream.
    #[tracing::instrument(level = "debug", skip(stream, config), fields(host = %config.host, port = config.port))]
    pub fn handshake(stream: S, config: MySqlConfig) -> Result<Self> {
        let mut conn = Self {
            stream,
            state: ConnectionState::Connecting,
            config,
            client_caps: 0,
            server_version: String::new(),
            connection_id: 0,
            sequence_id: 0,
            status_flags: 0,
            warnings: 0,
        };

        let server = conn.read_handshake()?;
        conn.server_version.clone_from(&server.server_version);
        conn.connection_id = server.connection_id;
        conn.client_caps = conn.config.capability_flags() & server.capabilities;
        if conn.client_caps & capabilities::CLIENT_PROTOCOL_41 == 0 {
            return Err(Error::protocol(format!(
                "server {} does not speak protocol 4.1",
                server.server_version
            )));
        }

        let plugin = AuthPlugin::from_name(&server.plugin).unwrap_or(AuthPlugin::NativePassword);
        conn.send_handshake_response(plugin, &server.seed)?;
        conn.authenticate(plugin, server.seed)?;

        if conn.client_caps & capabilities::CLIENT_CONNECT_WITH_DB == 0 {
            if let Some(db) = conn.config.database.clone() {
                conn.send_command(Command::InitDb, db.as_bytes())?;
                conn.read_ok()?;
            }
        }

        conn.sync_transaction_state();
        tracing::debug!(
            connection_id = conn.connection_id,
            server_version = %conn.server_version,
            "MySQL connection established"
        );
        Ok(conn)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Warnings reported by the last statement.
    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    fn read_handshake(&mut self) -> Result<ServerHandshake> {
        let payload = self.read_packet()?;
        if Response::classify(&payload) == Response::Err {
            let err = parse_err(&payload)?;
            return Err(Error::connection(
                ConnectionErrorKind::Refused,
                format!("server refused connection: {} ({})", err.error_message, err.error_code),
            ));
        }

        let mut r = PacketReader::new(&payload);
        let truncated = || Error::protocol("truncated server handshake");

        let protocol_version = r.read_u8().ok_or_else(truncated)?;
        if protocol_version != 10 {
            return Err(Error::protocol(format!(
                "unsupported handshake protocol version {}",
                protocol_version
            )));
        }
        let server_version = r.read_null_string().ok_or_else(truncated)?;
        let connection_id = r.read_u32_le().ok_or_else(truncated)?;
        let mut seed = r.read_bytes(8).ok_or_else(truncated)?.to_vec();
        r.skip(1);
        let caps_low = r.read_u16_le().ok_or_else(truncated)?;
        let _charset = r.read_u8();
        let _status = r.read_u16_le();
        let caps_high = r.read_u16_le().unwrap_or_default();
        let capabilities = u32::from(caps_low) | (u32::from(caps_high) << 16);

        let seed_len = usize::from(r.read_u8().unwrap_or_default());
        r.skip(10);
        if capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let rest_len = seed_len.saturating_sub(8).max(13);
            if let Some(part2) = r.read_bytes(rest_len) {
                seed.extend_from_slice(part2.strip_suffix(&[0]).unwrap_or(part2));
            }
        }
        let plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            r.read_null_string().unwrap_or_default()
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(ServerHandshake {
            capabilities,
            server_version,
            connection_id,
            plugin,
            seed,
        })
    }

    fn send_handshake_response(&mut self, plugin: AuthPlugin, seed: &[u8]) -> Result<()> {
        let caps = self.client_caps;
        let auth_response = plugin.scramble(self.password(), seed);

        let mut w = PacketWriter::new();
        w.write_u32_le(caps);
        w.write_u32_le(self.config.max_packet_size);
        w.write_u8(self.config.charset);
        w.write_zeros(23);
        w.write_null_string(&self.config.user);

        if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            w.write_lenenc_bytes(&auth_response);
        } else {
            // Scrambles are at most 32 bytes.
            w.write_u8(auth_response.len() as u8);
            w.write_bytes(&auth_response);
        }

        if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            w.write_null_string(self.config.database.as_deref().unwrap_or_default());
        }
        if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.write_null_string(plugin.name());
        }
        if caps & capabilities::CLIENT_CONNECT_ATTRS != 0 {
            let mut attrs = PacketWriter::new();
            for (key, value) in &self.config.attributes {
                attrs.write_lenenc_string(key);
                attrs.write_lenenc_string(value);
            }
            w.write_lenenc_bytes(attrs.as_bytes());
        }

        self.write_packet(w.as_bytes())
    }

    /// Drive the auth exchange until the server accepts or rejects us.
    fn authenticate(&mut self, mut plugin: AuthPlugin, mut seed: Vec<u8>) -> Result<()> {
        for _ in 0..MAX_AUTH_ROUNDS {
            let payload = self.read_packet()?;
            match payload.first().copied() {
                Some(0x00) => {
                    let ok = PacketReader::new(&payload)
                        .parse_ok_packet()
                        .ok_or_else(|| Error::protocol("malformed OK packet"))?;
                    self.status_flags = ok.status_flags;
                    tracing::trace!(plugin = plugin.name(), "authentication accepted");
                    return Ok(());
                }
                Some(0xFF) => {
                    let err = parse_err(&payload)?;
                    return Err(Error::connection(
                        ConnectionErrorKind::Authentication,
                        format!(
                            "authentication failed for user '{}': {} ({})",
                            self.config.user, err.error_message, err.error_code
                        ),
                    ));
                }
                Some(0xFE) => {
                    let mut r = PacketReader::new(&payload[1..]);
                    let name = r.read_null_string().unwrap_or_default();
                    plugin = AuthPlugin::from_name(&name).ok_or_else(|| {
                        Error::connection(
                            ConnectionErrorKind::Authentication,
                            format!("server requested unsupported auth plugin '{}'", name),
                        )
                    })?;
                    seed = r.read_rest().to_vec();
                    tracing::debug!(plugin = %name, "auth switch requested");
                    let response = plugin.scramble(self.password(), &seed);
                    self.write_packet(&response)?;
                }
                Some(0x01) => self.continue_auth(&payload[1..], &seed)?,
                other => {
                    return Err(Error::protocol(format!(
                        "unexpected auth response byte {:?}",
                        other
                    )));
                }
            }
        }
        Err(Error::protocol("authentication did not finish"))
    }

    /// Handle an AuthMoreData packet.
    fn continue_auth(&mut self, data: &[u8], seed: &[u8]) -> Result<()> {
        match data {
            [auth::caching_sha2::FAST_AUTH_SUCCESS] => Ok(()),
            [auth::caching_sha2::PERFORM_FULL_AUTH] => {
                tracing::debug!("full authentication required, requesting server public key");
                self.write_packet(&[auth::caching_sha2::REQUEST_PUBLIC_KEY])
            }
            key if key.starts_with(b"-----BEGIN") => {
                let encrypted = auth::encrypt_password_rsa(self.password(), seed, key)
                    .map_err(|msg| {
                        Error::connection(ConnectionErrorKind::Authentication, msg)
                    })?;
                self.write_packet(&encrypted)
            }
            _ => Err(Error::protocol("unrecognized auth continuation packet")),
        }
    }

    fn password(&self) -> &str {
        self.config.password.as_deref().unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnectionState::Ready | ConnectionState::InTransaction => Ok(()),
            ConnectionState::Connecting => Err(Error::connection(
                ConnectionErrorKind::Connect,
                "connection handshake has not finished",
            )),
            ConnectionState::Broken => Err(Error::connection(
                ConnectionErrorKind::Disconnected,
                "connection is broken after an earlier I/O error",
            )),
            ConnectionState::Closed => Err(Error::connection(
                ConnectionErrorKind::Disconnected,
                "connection is closed",
            )),
        }
    }

    fn send_command(&mut self, command: Command, argument: &[u8]) -> Result<()> {
        self.sequence_id = 0;
        let mut payload = Vec::with_capacity(1 + argument.len());
        payload.push(command as u8);
        payload.extend_from_slice(argument);
        self.write_packet(&payload)
    }

    /// Read a response that must be OK.
    fn read_ok(&mut self) -> Result<()> {
        let payload = self.read_packet()?;
        match Response::classify(&payload) {
            Response::Ok => {
                self.absorb_ok(&payload);
                Ok(())
            }
            Response::Err => Err(query_error(&parse_err(&payload)?)),
            _ => Err(Error::protocol("expected OK packet")),
        }
    }

    /// Update status from an OK packet and sync the transaction state.
    fn absorb_ok(&mut self, payload: &[u8]) -> (u64, u64) {
        let ok = PacketReader::new(payload).parse_ok_packet().unwrap_or_default();
        self.status_flags = ok.status_flags;
        self.warnings = ok.warnings;
        self.sync_transaction_state();
        (ok.affected_rows, ok.last_insert_id)
    }

    fn sync_transaction_state(&mut self) {
        self.state = if self.status_flags & server_status::SERVER_STATUS_IN_TRANS != 0 {
            ConnectionState::InTransaction
        } else {
            ConnectionState::Ready
        };
    }

    fn read_response(&mut self) -> Result<ExecResult> {
        let payload = self.read_packet()?;
        let result = match Response::classify(&payload) {
            Response::Ok => {
                let (affected, last_id) = self.absorb_ok(&payload);
                ExecResult {
                    rows: Vec::new(),
                    rows_affected: affected,
                    last_insert_id: (last_id > 0).then_some(last_id),
                }
            }
            Response::Err => return Err(query_error(&parse_err(&payload)?)),
            Response::LocalInfile => {
                // Decline by sending an empty file, then consume the verdict.
                self.write_packet(&[])?;
                let _ = self.read_packet()?;
                return Err(Error::query(
                    QueryErrorKind::Syntax,
                    "LOAD DATA LOCAL INFILE is not supported",
                ));
            }
            Response::Eof | Response::Other => ExecResult::from_rows(self.read_result_set(&payload)?),
        };

        if self.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0 {
            let extra = self.read_response()?;
            tracing::debug!(rows = extra.rows.len(), "discarding additional result set");
        }
        Ok(result)
    }

    fn read_result_set(&mut self, first: &[u8]) -> Result<Vec<Row>> {
        let count = PacketReader::new(first)
            .read_lenenc_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::protocol("invalid column count"))?;

        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(ColumnDef::parse(&self.read_packet()?)?);
        }
        let deprecate_eof = self.client_caps & capabilities::CLIENT_DEPRECATE_EOF != 0;
        if !deprecate_eof {
            let _eof = self.read_packet()?;
        }

        let info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        let mut rows = Vec::new();
        loop {
            let payload = self.read_packet()?;
            match payload.first().copied() {
                Some(0xFE) if payload.len() < MAX_PAYLOAD && (deprecate_eof || payload.len() < 9) => {
                    let status = if deprecate_eof {
                        let ok = PacketReader::new(&payload).parse_ok_packet().unwrap_or_default();
                        (ok.status_flags, ok.warnings)
                    } else {
                        PacketReader::new(&payload)
                            .parse_eof_packet()
                            .map_or((0, 0), |eof| (eof.status_flags, eof.warnings))
                    };
                    self.status_flags = status.0;
                    self.warnings = status.1;
                    self.sync_transaction_state();
                    break;
                }
                Some(0xFF) => return Err(query_error(&parse_err(&payload)?)),
                _ => rows.push(parse_text_row(&payload, &columns, &info)?),
            }
        }

        tracing::trace!(columns = count, rows = rows.len(), "result set read");
        Ok(rows)
    }

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; PacketHeader::SIZE];
            self.read_exact(&mut header)?;
            let header = PacketHeader::from_bytes(header);
            if header.sequence_id != self.sequence_id {
                self.state = ConnectionState::Broken;
                return Err(Error::protocol(format!(
                    "packet out of order: expected sequence {}, got {}",
                    self.sequence_id, header.sequence_id
                )));
            }
            self.sequence_id = self.sequence_id.wrapping_add(1);

            let len = header.payload_length as usize;
            let start = payload.len();
            let limit = self.config.max_packet_size as usize;
            if start + len > limit {
                self.state = ConnectionState::Broken;
                return Err(Error::protocol(format!(
                    "packet of at least {} bytes exceeds max_packet_size {limit}",
                    start + len
                )));
            }
            payload.resize(start + len, 0);
            self.read_exact(&mut payload[start..])?;
            if len < MAX_PAYLOAD {
                return Ok(payload);
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Err(e) = self.stream.read_exact(buf) {
            return Err(self.io_failure("read from", e));
        }
        Ok(())
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let packet = frame(payload, self.sequence_id);
        let packets = payload.len() / MAX_PAYLOAD + 1;
        self.sequence_id = self.sequence_id.wrapping_add(packets as u8);

        if let Err(e) = self.stream.write_all(&packet).and_then(|()| self.stream.flush()) {
            return Err(self.io_failure("write to", e));
        }
        Ok(())
    }

    fn io_failure(&mut self, action: &str, e: std::io::Error) -> Error {
        self.state = ConnectionState::Broken;
        tracing::warn!(connection_id = self.connection_id, error = %e, "MySQL connection lost");
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: format!("failed to {} server: {}", action, e),
            source: Some(Box::new(e)),
        })
    }

    fn transaction_statement(&mut self, sql: &str) -> Result<()> {
        self.send_command(Command::Query, sql.as_bytes())?;
        self.read_ok().map_err(|e| e.with_sql(sql))
    }
}

impl<S: Read + Write> Connection for MySqlConnection<S> {
    #[tracing::instrument(level = "trace", skip(self, params))]
    fn run(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.ensure_open()?;
        let statement = interpolate_params(sql, params)?;
        self.send_command(Command::Query, statement.as_bytes())?;
        let result = self.read_response().map_err(|e| e.with_sql(sql))?;
        tracing::trace!(
            rows = result.rows.len(),
            rows_affected = result.rows_affected,
            "statement complete"
        );
        Ok(result)
    }

    fn begin(&mut self, isolation: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        if self.state == ConnectionState::InTransaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "a transaction is already open on this connection".to_string(),
            }));
        }
        self.transaction_statement(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_sql()
        ))?;
        self.transaction_statement("START TRANSACTION")?;
        tracing::debug!(isolation = isolation.as_sql(), "transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    fn ping(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.send_command(Command::Ping, &[])?;
        self.read_ok()
    }

    fn close(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Connecting | ConnectionState::Broken => {}
            ConnectionState::Ready | ConnectionState::InTransaction => {
                // The server rolls back any open transaction on COM_QUIT.
                if let Err(e) = self.send_command(Command::Quit, &[]) {
                    tracing::debug!(error = %e, "COM_QUIT failed");
                }
            }
        }
        self.state = ConnectionState::Closed;
        tracing::debug!(connection_id = self.connection_id, "MySQL connection closed");
        Ok(())
    }
}

impl<S: Read + Write> MySqlConnection<S> {
    fn end_transaction(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        if self.state != ConnectionState::InTransaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: format!("{} without an open transaction", sql),
            }));
        }
        self.transaction_statement(sql)?;
        tracing::debug!(statement = sql, "transaction finished");
        Ok(())
    }
}

impl<S: Read + Write> Drop for MySqlConnection<S> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn parse_err(payload: &[u8]) -> Result<ErrPacket> {
    PacketReader::new(payload)
        .parse_err_packet()
        .ok_or_else(|| Error::protocol("malformed ERR packet"))
}

fn query_error(err: &ErrPacket) -> Error {
    Error::Query(QueryError {
        kind: err.query_kind(),
        sql: None,
        sqlstate: (!err.sql_state.is_empty()).then(|| err.sql_state.clone()),
        message: format!("{} (MySQL error {})", err.error_message, err.error_code),
        source: None,
    })
}

fn parse_text_row(payload: &[u8], columns: &[ColumnDef], info: &Arc<ColumnInfo>) -> Result<Row> {
    let mut r = PacketReader::new(payload);
    let values = columns
        .iter()
        .map(|col| match r.read_text_cell() {
            Some(Some(data)) => Ok(col.decode(data)),
            Some(None) => Ok(Value::Null),
            None => Err(Error::protocol(format!(
                "row ended before column '{}'",
                col.name
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::with_columns(Arc::clone(info), values))
}

/// Opens [`MySqlConnection`]s from a fixed configuration.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: MySqlConfig,
}

impl MySqlConnector {
    pub fn new(config: MySqlConfig) -> Self {
        Self { config }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        MySqlConfig::from_url(url).map(Self::new)
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }
}

impl Connector for MySqlConnector {
    type Conn = MySqlConnection;

    fn connect(&self) -> Result<Self::Conn> {
        MySqlConnection::connect(self.config.clone())
    }

    fn describe(&self) -> String {
        format!(
            "mysql://{}/{}",
            self.config.socket_addr(),
            self.config.database.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::charset;
    use crate::types::column_flags;
    use std::io::Cursor;

    /// Replays canned server packets and records what the client sends.
    struct ScriptedServer {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl ScriptedServer {
        fn new(packets: &[Vec<u8>]) -> Self {
            Self {
                input: Cursor::new(packets.concat()),
                output: Vec::new(),
            }
        }
    }

    impl Read for ScriptedServer {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedServer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    const SERVER_CAPS: u32 = capabilities::DEFAULT_CLIENT_FLAGS | capabilities::CLIENT_CONNECT_WITH_DB;

    fn seed() -> Vec<u8> {
        (1..=20).collect()
    }

    fn handshake(plugin: &str) -> Vec<u8> {
        let seed = seed();
        let mut w = PacketWriter::new();
        w.write_u8(10);
        w.write_null_string("8.0.36");
        w.write_u32_le(42);
        w.write_bytes(&seed[..8]);
        w.write_u8(0);
        w.write_u16_le((SERVER_CAPS & 0xFFFF) as u16);
        w.write_u8(charset::UTF8MB4_0900_AI_CI);
        w.write_u16_le(server_status::SERVER_STATUS_AUTOCOMMIT);
        w.write_u16_le((SERVER_CAPS >> 16) as u16);
        w.write_u8(21);
        w.write_zeros(10);
        w.write_bytes(&seed[8..]);
        w.write_u8(0);
        w.write_null_string(plugin);
        frame(w.as_bytes(), 0)
    }

    fn ok(seq: u8, affected: u64, last_id: u64, status: u16) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        w.write_lenenc_int(affected);
        w.write_lenenc_int(last_id);
        w.write_u16_le(status);
        w.write_u16_le(0);
        frame(w.as_bytes(), seq)
    }

    fn err(seq: u8, code: u16, state: &str, message: &str) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(0xFF);
        w.write_u16_le(code);
        w.write_u8(b'#');
        w.write_bytes(state.as_bytes());
        w.write_bytes(message.as_bytes());
        frame(w.as_bytes(), seq)
    }

    fn column(seq: u8, name: &str, column_type: u8, charset: u16, flags: u16) -> Vec<u8> {
        let mut w = PacketWriter::new();
        for s in ["def", "testdb", "table_1", "table_1", name, name] {
            w.write_lenenc_string(s);
        }
        w.write_lenenc_int(0x0c);
        w.write_u16_le(charset);
        w.write_u32_le(11);
        w.write_u8(column_type);
        w.write_u16_le(flags);
        w.write_u8(0);
        w.write_zeros(2);
        frame(w.as_bytes(), seq)
    }

    fn text_row(seq: u8, cells: &[Option<&str>]) -> Vec<u8> {
        let mut w = PacketWriter::new();
        for cell in cells {
            match cell {
                Some(s) => w.write_lenenc_string(s),
                None => w.write_u8(0xFB),
            }
        }
        frame(w.as_bytes(), seq)
    }

    fn end_of_rows(seq: u8, status: u16) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(0xFE);
        w.write_lenenc_int(0);
        w.write_lenenc_int(0);
        w.write_u16_le(status);
        w.write_u16_le(0);
        frame(w.as_bytes(), seq)
    }

    fn config() -> MySqlConfig {
        MySqlConfig::from_url("mysql://127.0.0.1/testdb")
            .unwrap()
            .user("user")
            .password("pass")
    }

    fn connect(script: &[Vec<u8>]) -> MySqlConnection<ScriptedServer> {
        MySqlConnection::handshake(ScriptedServer::new(script), config()).unwrap()
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn handshake_response_carries_credentials() {
        let conn = connect(&[handshake("caching_sha2_password"), ok(2, 0, 0, 2)]);
        assert_eq!(conn.connection_id(), 42);
        assert_eq!(conn.server_version(), "8.0.36");
        assert_eq!(conn.state(), ConnectionState::Ready);

        let sent = &conn.get_ref().output;
        assert_eq!(sent[3], 1, "handshake response uses sequence 1");
        assert!(contains(sent, b"user\0"));
        assert!(contains(sent, b"testdb\0"));
        assert!(contains(sent, b"caching_sha2_password\0"));
        assert!(contains(sent, &auth::caching_sha2_password("pass", &seed())));
    }

    #[test]
    fn select_decodes_table_1_rows() {
        let mut conn = connect(&[
            handshake("mysql_native_password"),
            ok(2, 0, 0, 2),
            frame(&[2], 1),
            column(2, "id", 0x03, 63, column_flags::NOT_NULL | column_flags::PRIMARY_KEY),
            column(3, "some_field", 0xFD, 255, 0),
            text_row(4, &[Some("1"), Some("hello world")]),
            text_row(5, &[Some("2"), None]),
            end_of_rows(6, 2),
        ]);

        let rows = conn.query("SELECT * FROM table_1", &[]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_named::<i64>("id").unwrap(), 1);
        assert_eq!(
            rows[0].get_named::<String>("some_field").unwrap(),
            "hello world"
        );
        assert_eq!(rows[1].get_by_name("some_field"), Some(&Value::Null));

        let sent = &conn.get_ref().output;
        let query = crate::protocol::writer::command_packet(0x03, b"SELECT * FROM table_1");
        assert!(sent.ends_with(&query));
    }

    #[test]
    fn insert_reports_last_insert_id() {
        let mut conn = connect(&[
            handshake("mysql_native_password"),
            ok(2, 0, 0, 2),
            ok(1, 1, 1, server_status::SERVER_STATUS_IN_TRANS),
        ]);
        let result = conn
            .run(
                "INSERT INTO table_1 (some_field) VALUES (?)",
                &[Value::from("hello world")],
            )
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, Some(1));
        assert!(conn.in_transaction());
        assert!(contains(
            &conn.get_ref().output,
            b"INSERT INTO table_1 (some_field) VALUES ('hello world')"
        ));
    }

    #[test]
    fn server_error_maps_to_query_error() {
        let mut conn = connect(&[
            handshake("mysql_native_password"),
            ok(2, 0, 0, 2),
            err(1, 1146, "42S02", "Table 'testdb.table_2' doesn't exist"),
        ]);
        let e = conn.query("SELECT * FROM table_2", &[]).unwrap_err();
        match e {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::NotFound);
                assert_eq!(q.sqlstate.as_deref(), Some("42S02"));
                assert_eq!(q.sql.as_deref(), Some("SELECT * FROM table_2"));
                assert!(q.message.contains("1146"));
            }
            other => panic!("expected query error, got {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn rejected_credentials() {
        let script = [
            handshake("mysql_native_password"),
            err(2, 1045, "28000", "Access denied for user 'user'@'localhost'"),
        ];
        let e = MySqlConnection::handshake(ScriptedServer::new(&script), config()).unwrap_err();
        assert!(matches!(
            e,
            Error::Connection(ConnectionError { kind: ConnectionErrorKind::Authentication, .. })
        ));
    }

    #[test]
    fn auth_switch_to_native_password() {
        let mut switch = vec![0xFE];
        switch.extend_from_slice(b"mysql_native_password\0");
        switch.extend_from_slice(&seed());
        switch.push(0);

        let conn = connect(&[
            handshake("caching_sha2_password"),
            frame(&switch, 2),
            ok(4, 0, 0, 2),
        ]);
        let sent = &conn.get_ref().output;
        let expected = frame(&auth::mysql_native_password("pass", &seed()), 3);
        assert!(sent.ends_with(&expected));
    }

    #[test]
    fn caching_sha2_fast_path() {
        let conn = connect(&[
            handshake("caching_sha2_password"),
            frame(&[0x01, auth::caching_sha2::FAST_AUTH_SUCCESS], 2),
            ok(3, 0, 0, 2),
        ]);
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn caching_sha2_full_auth_over_rsa() {
        use rsa::pkcs8::{EncodePublicKey, LineEnding};
        use rsa::{RsaPrivateKey, RsaPublicKey};

        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        let pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let mut key_packet = vec![0x01];
        key_packet.extend_from_slice(pem.as_bytes());

        let conn = connect(&[
            handshake("caching_sha2_password"),
            frame(&[0x01, auth::caching_sha2::PERFORM_FULL_AUTH], 2),
            frame(&key_packet, 4),
            ok(6, 0, 0, 2),
        ]);

        let sent = &conn.get_ref().output;
        let request = frame(&[auth::caching_sha2::REQUEST_PUBLIC_KEY], 3);
        assert!(contains(sent, &request));

        // Last packet is the encrypted password at sequence 5.
        let cipher_len = 128;
        let packet = &sent[sent.len() - cipher_len - 4..];
        assert_eq!(&packet[..4], &[128, 0, 0, 5]);
        let plain = private
            .decrypt(rsa::Oaep::new::<sha1::Sha1>(), &packet[4..])
            .unwrap();
        let recovered: Vec<u8> = plain
            .iter()
            .zip(seed().iter().cycle())
            .map(|(b, s)| b ^ s)
            .collect();
        assert_eq!(recovered, b"pass\0");
    }

    #[test]
    fn transaction_lifecycle() {
        let mut conn = connect(&[
            handshake("mysql_native_password"),
            ok(2, 0, 0, 2),
            ok(1, 0, 0, 2),
            ok(1, 0, 0, server_status::SERVER_STATUS_IN_TRANS),
            ok(1, 0, 0, 2),
        ]);

        conn.begin(IsolationLevel::ReadCommitted).unwrap();
        assert!(conn.in_transaction());
        assert!(matches!(
            conn.begin(IsolationLevel::ReadCommitted),
            Err(Error::Transaction(TransactionError { kind: TransactionErrorKind::AlreadyActive, .. }))
        ));
        conn.commit().unwrap();
        assert!(!conn.in_transaction());
        assert!(matches!(
            conn.rollback(),
            Err(Error::Transaction(TransactionError { kind: TransactionErrorKind::NotActive, .. }))
        ));

        let sent = &conn.get_ref().output;
        assert!(contains(sent, b"SET TRANSACTION ISOLATION LEVEL READ COMMITTED"));
        assert!(contains(sent, b"START TRANSACTION"));
        assert!(sent.ends_with(b"COMMIT"));
    }

    #[test]
    fn lost_stream_breaks_connection() {
        let mut conn = connect(&[handshake("mysql_native_password"), ok(2, 0, 0, 2)]);
        let e = conn.query("SELECT 1", &[]).unwrap_err();
        assert!(e.is_connection_error());
        assert_eq!(conn.state(), ConnectionState::Broken);

        let e = conn.ping().unwrap_err();
        assert!(matches!(
            e,
            Error::Connection(ConnectionError { kind: ConnectionErrorKind::Disconnected, .. })
        ));
    }

    #[test]
    fn close_sends_quit_once() {
        let mut conn = connect(&[handshake("mysql_native_password"), ok(2, 0, 0, 2)]);
        let before = conn.get_ref().output.len();
        conn.close().unwrap();
        conn.close().unwrap();
        let sent = &conn.get_ref().output[before..];
        assert_eq!(sent, &[1, 0, 0, 0, Command::Quit as u8]);
        assert!(conn.query("SELECT 1", &[]).is_err());
    }

    /// A result set whose single row spans a full packet and a short tail.
    fn oversized_row_script(cell: &str) -> Vec<Vec<u8>> {
        vec![
            handshake("mysql_native_password"),
            ok(2, 0, 0, 2),
            frame(&[1], 1),
            column(2, "some_field", 0xFC, 255, 0),
            text_row(3, &[Some(cell)]),
            end_of_rows(5, 2),
        ]
    }

    #[test]
    fn row_split_across_packets_is_reassembled() {
        let cell = "x".repeat(MAX_PAYLOAD);
        let script = oversized_row_script(&cell);
        // 0xFD + 3 length bytes + the cell: one full packet and a 4-byte tail.
        assert_eq!(script[4].len(), 2 * PacketHeader::SIZE + MAX_PAYLOAD + 4);

        let mut conn = connect(&script);
        let rows = conn.query("SELECT some_field FROM table_1", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        let value = rows[0].get_named::<String>("some_field").unwrap();
        assert_eq!(value.len(), MAX_PAYLOAD);
        assert!(value.bytes().all(|b| b == b'x'));
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn continuation_packet_out_of_sequence_breaks_the_connection() {
        let cell = "x".repeat(MAX_PAYLOAD);
        let mut script = oversized_row_script(&cell);
        // Sequence byte of the tail packet's header.
        script[4][PacketHeader::SIZE + MAX_PAYLOAD + 3] = 9;

        let mut conn = connect(&script);
        let e = conn.query("SELECT some_field FROM table_1", &[]).unwrap_err();
        assert!(matches!(e, Error::Protocol(_)), "got {e:?}");
        assert!(e.to_string().contains("expected sequence 4, got 9"));
        assert_eq!(conn.state(), ConnectionState::Broken);
    }

    #[test]
    fn packets_beyond_max_packet_size_are_rejected() {
        let script = [
            handshake("mysql_native_password"),
            ok(2, 0, 0, 2),
            frame(&[1], 1),
            column(2, "some_field", 0xFD, 255, 0),
            text_row(3, &[Some(&"y".repeat(200))]),
            end_of_rows(4, 2),
        ];
        let server = ScriptedServer::new(&script);
        let mut conn =
            MySqlConnection::handshake(server, config().max_packet_size(128)).unwrap();

        let e = conn.query("SELECT some_field FROM table_1", &[]).unwrap_err();
        assert!(matches!(e, Error::Protocol(_)), "got {e:?}");
        assert!(e.to_string().contains("max_packet_size 128"));
        assert_eq!(conn.state(), ConnectionState::Broken);
    }

    #[test]
    fn connector_description_has_no_secrets() {
        let connector = MySqlConnector::new(config());
        let described = connector.describe();
        assert_eq!(described, "mysql://127.0.0.1:3306/testdb");
        assert!(!described.contains("pass"));
    }
}
