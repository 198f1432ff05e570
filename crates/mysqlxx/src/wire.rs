//! MySQL wire-protocol driver.
//!
//! Implements [`Driver`] directly over TCP or a Unix socket:
//! 1. Dial the selected transport (bounded by the connect timeout)
//! 2. Read the server handshake (protocol v10)
//! 3. Send the handshake response with the plugin's auth data
//! 4. Follow auth switches and caching_sha2_password continuations
//! 5. Switch socket timeouts to the read/write timeout

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::auth::{self, caching_sha2, plugins};
use crate::driver::{Driver, DriverError, DriverErrorKind};
use crate::params::{ConnectParams, Transport};
use crate::protocol::writer::frame_packets;
use crate::protocol::{
    Command, DEFAULT_CHARSET, ErrPacket, MAX_PACKET_SIZE, PROTOCOL_VERSION, PacketHeader,
    PacketReader, PacketType, PacketWriter, capabilities, status_flags,
};
use crate::query::QueryResult;
use crate::runtime::LibraryRuntime;

const CLIENT_NAME: &str = "mysqlxx";
const MAX_ALLOWED_PACKET: u32 = 64 * 1024 * 1024;
const AUTH_SWITCH_REQUEST: u8 = 0xFE;

static RUNTIME: LibraryRuntime = LibraryRuntime::new("mysqlxx-wire", library_init, library_end);
static CLIENT_ATTRIBUTES: OnceLock<Vec<(String, String)>> = OnceLock::new();
static READY: AtomicBool = AtomicBool::new(false);

/// Process-wide setup: verify the entropy source used by RSA auth and
/// capture the connection attributes sent with every handshake.
fn library_init() -> Result<(), String> {
    let mut sample = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut sample)
        .map_err(|e| format!("OS random source unavailable: {e}"))?;

    CLIENT_ATTRIBUTES.get_or_init(|| {
        vec![
            ("_client_name".to_string(), CLIENT_NAME.to_string()),
            (
                "_client_version".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
            ("_os".to_string(), std::env::consts::OS.to_string()),
            ("_platform".to_string(), std::env::consts::ARCH.to_string()),
            ("_pid".to_string(), std::process::id().to_string()),
        ]
    });
    READY.store(true, Ordering::Release);
    Ok(())
}

fn library_end() {
    READY.store(false, Ordering::Release);
}

fn client_attributes() -> &'static [(String, String)] {
    CLIENT_ATTRIBUTES.get().map_or(&[], Vec::as_slice)
}

/// Driver speaking the MySQL client/server protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireDriver;

impl Driver for WireDriver {
    type Handle = WireHandle;

    fn runtime() -> &'static LibraryRuntime {
        &RUNTIME
    }

    fn open(&self, params: &ConnectParams) -> Result<WireHandle, DriverError> {
        if !READY.load(Ordering::Acquire) {
            return Err(DriverError::new(
                DriverErrorKind::Connect,
                "client library is not initialized",
            ));
        }
        WireHandle::open(params)
    }

    fn close(&self, handle: WireHandle) {
        handle.close();
    }

    fn ping(&self, handle: &mut WireHandle) -> Result<(), DriverError> {
        handle.ping()
    }

    fn execute(&self, handle: &mut WireHandle, sql: &str) -> Result<QueryResult, DriverError> {
        handle.query(sql)
    }
}

#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Stream {
    fn connect(transport: &Transport, timeout: Duration) -> Result<Self, DriverError> {
        match transport {
            Transport::Tcp { host, port } => {
                let addrs = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|e| DriverError::io(&format!("cannot resolve {host}"), e))?;
                let mut last_err = None;
                for addr in addrs {
                    let attempt = if timeout.is_zero() {
                        TcpStream::connect(addr)
                    } else {
                        TcpStream::connect_timeout(&addr, timeout)
                    };
                    match attempt {
                        Ok(stream) => {
                            stream.set_nodelay(true).ok();
                            return Ok(Stream::Tcp(stream));
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(match last_err {
                    Some(e) => DriverError::io("connect failed", e),
                    None => DriverError::new(
                        DriverErrorKind::Connect,
                        format!("{host} resolved to no addresses"),
                    ),
                })
            }
            #[cfg(unix)]
            Transport::Socket(path) => std::os::unix::net::UnixStream::connect(path)
                .map(Stream::Unix)
                .map_err(|e| {
                    // A missing socket file means "cannot connect", not a broken session.
                    let err = DriverError::io("connect failed", e);
                    if err.kind == DriverErrorKind::Io {
                        err.with_kind(DriverErrorKind::Connect)
                    } else {
                        err
                    }
                }),
            #[cfg(not(unix))]
            Transport::Socket(path) => Err(DriverError::new(
                DriverErrorKind::Unsupported,
                format!(
                    "Unix socket {} is not supported on this platform",
                    path.display()
                ),
            )),
        }
    }

    fn set_timeouts(&self, timeout: Duration) -> io::Result<()> {
        // A zero duration is rejected by the OS; treat it as "no timeout".
        let timeout = (!timeout.is_zero()).then_some(timeout);
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Stream::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// What the server announced in its initial handshake.
#[derive(Debug, Clone)]
struct ServerHandshake {
    server_version: String,
    connection_id: u32,
    capabilities: u32,
    auth_plugin: String,
    auth_data: Vec<u8>,
}

/// An open session with a MySQL server.
#[derive(Debug)]
pub struct WireHandle {
    stream: Stream,
    sequence_id: u8,
    capabilities: u32,
    server_version: String,
    connection_id: u32,
    secure_transport: bool,
}

impl WireHandle {
    /// Dial, handshake and authenticate.
    pub fn open(params: &ConnectParams) -> Result<Self, DriverError> {
        let transport = params.transport();
        let stream = Stream::connect(&transport, params.connect_timeout)?;
        stream
            .set_timeouts(params.connect_timeout)
            .map_err(|e| DriverError::io("cannot set socket timeout", e))?;

        let mut handle = Self {
            stream,
            sequence_id: 0,
            capabilities: 0,
            server_version: String::new(),
            connection_id: 0,
            secure_transport: transport.is_socket(),
        };

        let handshake = handle.read_handshake()?;
        handle.capabilities = client_capabilities(params) & handshake.capabilities;
        handle.server_version.clone_from(&handshake.server_version);
        handle.connection_id = handshake.connection_id;

        handle.send_handshake_response(params, &handshake)?;
        handle.authenticate(params, handshake.auth_plugin, handshake.auth_data)?;

        handle
            .stream
            .set_timeouts(params.rw_timeout)
            .map_err(|e| DriverError::io("cannot set socket timeout", e))?;

        tracing::debug!(
            server_version = %handle.server_version,
            connection_id = handle.connection_id,
            "Handshake complete"
        );
        Ok(handle)
    }

    /// Server version string from the handshake.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Server-side connection (thread) id.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    fn read_handshake(&mut self) -> Result<ServerHandshake, DriverError> {
        let payload = self.read_packet()?;
        if PacketType::of(&payload) == PacketType::Error {
            // e.g. "Too many connections" or "Host is blocked", sent before any handshake
            return Err(server_error(DriverErrorKind::Connect, &parse_err(&payload)?));
        }

        let mut reader = PacketReader::new(&payload);
        let version = reader
            .read_u8()
            .ok_or_else(|| protocol_error("missing protocol version"))?;
        if version != PROTOCOL_VERSION {
            return Err(protocol_error(format!(
                "unsupported protocol version {version}"
            )));
        }

        let server_version = reader
            .read_null_string()
            .ok_or_else(|| protocol_error("missing server version"))?;
        let connection_id = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("missing connection id"))?;
        let mut auth_data = reader
            .read_bytes(8)
            .ok_or_else(|| protocol_error("missing auth data"))?
            .to_vec();
        reader.skip(1);
        let caps_lower = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("missing capability flags"))?;

        // Everything after the lower capability flags is optional.
        let _charset = reader.read_u8();
        let _status = reader.read_u16_le();
        let caps_upper = reader.read_u16_le().unwrap_or(0);
        let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        let auth_data_len = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            usize::from(reader.read_u8().unwrap_or(0))
        } else {
            reader.skip(1);
            0
        };
        reader.skip(10);

        if capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len = auth_data_len.saturating_sub(8).max(13);
            if let Some(rest) = reader.read_bytes(len) {
                let rest = rest.strip_suffix(&[0]).unwrap_or(rest);
                auth_data.extend_from_slice(rest);
            }
        }

        let auth_plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_null_string().unwrap_or_default()
        } else {
            plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(ServerHandshake {
            server_version,
            connection_id,
            capabilities,
            auth_plugin,
            auth_data,
        })
    }

    fn send_handshake_response(
        &mut self,
        params: &ConnectParams,
        handshake: &ServerHandshake,
    ) -> Result<(), DriverError> {
        let caps = self.capabilities;
        let auth_response = self.scramble(&handshake.auth_plugin, params, &handshake.auth_data)?;

        let mut writer = PacketWriter::new();
        writer
            .write_u32_le(caps)
            .write_u32_le(MAX_ALLOWED_PACKET)
            .write_u8(DEFAULT_CHARSET)
            .write_zeros(23)
            .write_null_string(&params.user);

        if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            writer.write_lenenc_bytes(&auth_response);
        } else {
            writer
                .write_u8(auth_response.len() as u8)
                .write_bytes(&auth_response);
        }

        if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            writer.write_null_string(&params.db);
        }
        if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            writer.write_null_string(&handshake.auth_plugin);
        }
        if caps & capabilities::CLIENT_CONNECT_ATTRS != 0 {
            let mut attrs = PacketWriter::new();
            for (key, value) in client_attributes() {
                attrs.write_lenenc_string(key).write_lenenc_string(value);
            }
            writer.write_lenenc_bytes(attrs.as_bytes());
        }

        self.write_packet(writer.as_bytes())
    }

    /// Drive the exchange until the server sends OK or ERR.
    fn authenticate(
        &mut self,
        params: &ConnectParams,
        mut plugin: String,
        mut auth_data: Vec<u8>,
    ) -> Result<(), DriverError> {
        loop {
            let payload = self.read_packet()?;
            // A switch request carries the plugin name and seed, so it is
            // longer than an EOF packet while sharing its header byte.
            if payload.first() == Some(&AUTH_SWITCH_REQUEST) {
                (plugin, auth_data) = self.switch_plugin(params, &payload[1..])?;
                continue;
            }
            match PacketType::of(&payload) {
                PacketType::Ok => return Ok(()),
                PacketType::Error => {
                    let err = parse_err(&payload)?;
                    let kind = if err.is_access_denied() {
                        DriverErrorKind::Auth
                    } else {
                        DriverErrorKind::Connect
                    };
                    return Err(server_error(kind, &err));
                }
                PacketType::Data if payload.first() == Some(&caching_sha2::MORE_DATA) => {
                    self.continue_caching_sha2(params, &plugin, &auth_data, &payload[1..])?;
                }
                _ => {
                    return Err(protocol_error(format!(
                        "unexpected packet 0x{:02X} during authentication",
                        payload.first().copied().unwrap_or(0)
                    )));
                }
            }
        }
    }

    /// Answer an auth switch request with a scramble for the new plugin.
    fn switch_plugin(
        &mut self,
        params: &ConnectParams,
        body: &[u8],
    ) -> Result<(String, Vec<u8>), DriverError> {
        let mut reader = PacketReader::new(body);
        let plugin = reader
            .read_null_string()
            .ok_or_else(|| protocol_error("missing plugin name in auth switch"))?;
        let data = reader.read_rest();
        let auth_data = data.strip_suffix(&[0]).unwrap_or(data).to_vec();
        tracing::trace!(plugin = %plugin, "Server requested auth switch");

        let response = self.scramble(&plugin, params, &auth_data)?;
        self.write_packet(&response)?;
        Ok((plugin, auth_data))
    }

    /// Auth response for `plugin`. The cleartext plugin is only answered
    /// over a Unix socket.
    fn scramble(
        &self,
        plugin: &str,
        params: &ConnectParams,
        auth_data: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        if plugin == plugins::MYSQL_CLEAR_PASSWORD && !self.secure_transport {
            return Err(DriverError::new(
                DriverErrorKind::Auth,
                "server requested mysql_clear_password over an unencrypted TCP link",
            ));
        }
        Ok(auth::scramble_for(plugin, &params.password, auth_data))
    }

    fn continue_caching_sha2(
        &mut self,
        params: &ConnectParams,
        plugin: &str,
        auth_data: &[u8],
        data: &[u8],
    ) -> Result<(), DriverError> {
        if plugin != plugins::CACHING_SHA2_PASSWORD {
            return Err(protocol_error(format!(
                "unexpected auth continuation for plugin {plugin}"
            )));
        }
        match data.first().copied() {
            Some(caching_sha2::FAST_AUTH_SUCCESS) => Ok(()),
            Some(caching_sha2::PERFORM_FULL_AUTH) if self.secure_transport => {
                tracing::trace!("Full auth over Unix socket");
                self.write_packet(&auth::clear_password(&params.password))
            }
            Some(caching_sha2::PERFORM_FULL_AUTH) => {
                tracing::trace!("Full auth via server public key");
                self.write_packet(&[caching_sha2::REQUEST_PUBLIC_KEY])?;
                let key_packet = self.read_packet()?;
                let pem = match key_packet.split_first() {
                    Some((&caching_sha2::MORE_DATA, pem)) => pem,
                    _ if PacketType::of(&key_packet) == PacketType::Error => {
                        return Err(server_error(
                            DriverErrorKind::Auth,
                            &parse_err(&key_packet)?,
                        ));
                    }
                    _ => return Err(protocol_error("expected server public key")),
                };
                let encrypted = auth::rsa_encrypt_password(&params.password, auth_data, pem)
                    .map_err(|message| DriverError::new(DriverErrorKind::Auth, message))?;
                self.write_packet(&encrypted)
            }
            // Public key data arriving here means we did not ask for it.
            _ => Err(protocol_error("unexpected caching_sha2_password response")),
        }
    }

    /// COM_PING round trip.
    pub fn ping(&mut self) -> Result<(), DriverError> {
        self.sequence_id = 0;
        self.write_packet(&[Command::Ping as u8])?;
        let payload = self.read_packet()?;
        match PacketType::of(&payload) {
            PacketType::Ok => Ok(()),
            PacketType::Error => Err(server_error(DriverErrorKind::Io, &parse_err(&payload)?)),
            _ => Err(protocol_error("unexpected response to COM_PING")),
        }
    }

    /// COM_QUERY with a text result set.
    ///
    /// Only the first result is returned; further results (e.g. from
    /// `CALL`) are read and discarded so the session stays in sync.
    pub fn query(&mut self, sql: &str) -> Result<QueryResult, DriverError> {
        self.sequence_id = 0;
        let mut writer = PacketWriter::new();
        writer.write_u8(Command::Query as u8).write_bytes(sql.as_bytes());
        self.write_packet(writer.as_bytes())?;

        let (result, mut status) = self.read_response()?;
        while status & status_flags::SERVER_MORE_RESULTS_EXISTS != 0 {
            let (_, next) = self.read_response()?;
            status = next;
        }
        Ok(result)
    }

    /// One result: an OK packet or a result set. Returns it with the
    /// server status flags that ended it.
    fn read_response(&mut self) -> Result<(QueryResult, u16), DriverError> {
        let payload = self.read_packet()?;
        match PacketType::of(&payload) {
            PacketType::Ok => {
                let ok = PacketReader::new(&payload)
                    .parse_ok_packet()
                    .ok_or_else(|| protocol_error("malformed OK packet"))?;
                let result = QueryResult {
                    affected_rows: ok.affected_rows,
                    last_insert_id: ok.last_insert_id,
                    warnings: ok.warnings,
                    ..QueryResult::default()
                };
                Ok((result, ok.status_flags))
            }
            PacketType::Error => Err(server_error(DriverErrorKind::Server, &parse_err(&payload)?)),
            PacketType::LocalInfile => {
                // Decline with an empty file, then consume the server's verdict.
                self.write_packet(&[])?;
                self.read_packet()?;
                Err(DriverError::new(
                    DriverErrorKind::Server,
                    "LOAD DATA LOCAL INFILE is not supported",
                ))
            }
            PacketType::Eof | PacketType::Data => self.read_result_set(&payload),
        }
    }

    fn read_result_set(&mut self, first: &[u8]) -> Result<(QueryResult, u16), DriverError> {
        let column_count = PacketReader::new(first)
            .read_lenenc_int()
            .ok_or_else(|| protocol_error("invalid column count"))?;

        let mut result = QueryResult::default();
        for _ in 0..column_count {
            let payload = self.read_packet()?;
            result.columns.push(column_name(&payload)?);
        }
        if self.capabilities & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            self.read_packet()?;
        }

        loop {
            let payload = self.read_packet()?;
            match PacketType::of(&payload) {
                PacketType::Error => {
                    return Err(server_error(DriverErrorKind::Server, &parse_err(&payload)?));
                }
                // End of rows: EOF, or OK with a 0xFE header under CLIENT_DEPRECATE_EOF.
                PacketType::Eof => {
                    let mut reader = PacketReader::new(&payload);
                    let (warnings, status) =
                        if self.capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0 {
                            reader.parse_ok_packet().map(|ok| (ok.warnings, ok.status_flags))
                        } else {
                            reader.parse_eof_packet().map(|eof| (eof.warnings, eof.status_flags))
                        }
                        .ok_or_else(|| protocol_error("malformed end of result set"))?;
                    result.warnings = warnings;
                    return Ok((result, status));
                }
                _ => result.rows.push(parse_text_row(&payload, result.columns.len())?),
            }
        }
    }

    /// Send COM_QUIT and drop the stream. Errors are ignored.
    pub fn close(mut self) {
        self.sequence_id = 0;
        if let Err(err) = self.write_packet(&[Command::Quit as u8]) {
            tracing::trace!(error = %err, "COM_QUIT not delivered");
        }
    }

    fn read_packet(&mut self) -> Result<Vec<u8>, DriverError> {
        let (payload, last_seq) = read_payload(&mut self.stream, MAX_ALLOWED_PACKET as usize)?;
        self.sequence_id = last_seq.wrapping_add(1);
        tracing::trace!(len = payload.len(), seq = self.sequence_id, "Read packet");
        Ok(payload)
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<(), DriverError> {
        let (framed, next) = frame_packets(payload, self.sequence_id);
        self.sequence_id = next;
        self.stream
            .write_all(&framed)
            .and_then(|()| self.stream.flush())
            .map_err(|e| DriverError::io("failed to write packet", e))
    }
}

/// Read one logical packet, joining continuation frames, and return it
/// with the sequence id of its last frame. Payloads longer than `limit`
/// are rejected before they are buffered.
fn read_payload<R: Read>(reader: &mut R, limit: usize) -> Result<(Vec<u8>, u8), DriverError> {
    let mut payload = Vec::new();
    loop {
        let mut header = [0u8; PacketHeader::SIZE];
        reader
            .read_exact(&mut header)
            .map_err(|e| DriverError::io("failed to read packet header", e))?;
        let header = PacketHeader::from_bytes(header);

        let len = header.payload_length as usize;
        let start = payload.len();
        if start + len > limit {
            return Err(protocol_error(format!(
                "packet exceeds max_allowed_packet ({limit} bytes)"
            )));
        }
        payload.resize(start + len, 0);
        reader
            .read_exact(&mut payload[start..])
            .map_err(|e| DriverError::io("failed to read packet payload", e))?;

        if len < MAX_PACKET_SIZE {
            return Ok((payload, header.sequence_id));
        }
    }
}

fn client_capabilities(params: &ConnectParams) -> u32 {
    let mut flags = capabilities::BASE_CLIENT_FLAGS;
    if !params.db.is_empty() {
        flags |= capabilities::CLIENT_CONNECT_WITH_DB;
    }
    flags
}

fn column_name(payload: &[u8]) -> Result<String, DriverError> {
    let mut reader = PacketReader::new(payload);
    // catalog, schema, table, org_table precede the name
    for field in ["catalog", "schema", "table", "org_table"] {
        reader
            .read_lenenc_bytes()
            .ok_or_else(|| protocol_error(format!("column definition missing {field}")))?;
    }
    reader
        .read_lenenc_string()
        .ok_or_else(|| protocol_error("column definition missing name"))
}

fn parse_text_row(payload: &[u8], columns: usize) -> Result<Vec<Option<String>>, DriverError> {
    let mut reader = PacketReader::new(payload);
    let mut values = Vec::with_capacity(columns);
    for _ in 0..columns {
        if reader.peek() == Some(0xFB) {
            reader.skip(1);
            values.push(None);
            continue;
        }
        let bytes = reader
            .read_lenenc_bytes()
            .ok_or_else(|| protocol_error("truncated row"))?;
        values.push(Some(String::from_utf8_lossy(bytes).into_owned()));
    }
    Ok(values)
}

fn parse_err(payload: &[u8]) -> Result<ErrPacket, DriverError> {
    PacketReader::new(payload)
        .parse_err_packet()
        .ok_or_else(|| protocol_error("malformed error packet"))
}

fn server_error(kind: DriverErrorKind, err: &ErrPacket) -> DriverError {
    DriverError::server(kind, err.error_code, err.sql_state(), err.error_message.clone())
}

fn protocol_error(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::Protocol, message)
}
