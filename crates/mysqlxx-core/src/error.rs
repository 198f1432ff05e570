//! Error types for mysqlxx operations.

use std::fmt;

/// Result alias used throughout mysqlxx.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for all connection operations.
#[derive(Debug)]
pub enum Error {
    /// Client library could not be initialized (or was already torn down)
    LibraryInit(LibraryInitError),
    /// A configuration key was missing or malformed
    Config(ConfigError),
    /// Opening or re-opening the connection failed
    Connection(ConnectionError),
    /// Operation attempted in the wrong connection state
    Usage(UsageError),
    /// Statement execution failed
    Query(QueryError),
    /// Malformed data on the wire
    Protocol(ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInitError {
    pub message: String,
}

#[derive(Debug)]
pub struct ConfigError {
    /// Dotted configuration key the error refers to
    pub key: String,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    /// `host:port` or the socket path that was dialed
    pub endpoint: String,
    /// Server or client error code, when the driver reported one
    pub code: Option<u16>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish the transport
    Connect,
    /// Server actively refused the connection
    Refused,
    /// Credentials rejected
    Authentication,
    /// Handshake did not follow the protocol
    Protocol,
    /// Link lost during an operation
    Disconnected,
    /// Connect or read/write timeout elapsed
    Timeout,
    /// Transport not available on this platform
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    /// Name of the operation that was rejected
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub code: Option<u16>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
}

impl Error {
    /// Create a library initialization error.
    pub fn library_init(message: impl Into<String>) -> Self {
        Error::LibraryInit(LibraryInitError {
            message: message.into(),
        })
    }

    /// Create a configuration error for `key`.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            key: key.into(),
            message: message.into(),
            source: None,
        })
    }

    /// Create a usage error for the named operation.
    pub fn usage(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Usage(UsageError {
            operation,
            message: message.into(),
        })
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(ProtocolError {
            message: message.into(),
        })
    }

    /// Is this an error that a reconnect might resolve?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }

    /// Driver-reported error code, if any.
    pub fn driver_code(&self) -> Option<u16> {
        match self {
            Error::Connection(c) => c.code,
            Error::Query(q) => q.code,
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "28000" for access denied).
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Connection(c) => c.sqlstate.as_deref(),
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LibraryInit(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "{}", e),
            Error::Connection(e) => write!(f, "{}", e),
            Error::Usage(e) => write!(f, "{}", e),
            Error::Query(e) => write!(f, "{}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
        }
    }
}

impl fmt::Display for LibraryInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client library initialization failed: {}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error at '{}': {}", self.key, self.message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection error ({}): {}", self.endpoint, self.message)?;
        match (self.code, &self.sqlstate) {
            (Some(code), Some(state)) => write!(f, " [{} / SQLSTATE {}]", code, state),
            (Some(code), None) => write!(f, " [{}]", code),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid use of {}: {}", self.operation, self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "Query error (SQLSTATE {}): {}", sqlstate, self.message)
        } else {
            write!(f, "Query error: {}", self.message)
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protocol error: {}", self.message)
    }
}

fn boxed_source<'a>(
    source: Option<&'a (dyn std::error::Error + Send + Sync + 'static)>,
) -> Option<&'a (dyn std::error::Error + 'static)> {
    source.map(|err| err as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => boxed_source(e.source.as_deref()),
            Error::Connection(e) => boxed_source(e.source.as_deref()),
            Error::Query(e) => boxed_source(e.source.as_deref()),
            _ => None,
        }
    }
}

impl std::error::Error for LibraryInitError {}
impl std::error::Error for UsageError {}
impl std::error::Error for ProtocolError {}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        boxed_source(self.source.as_deref())
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        boxed_source(self.source.as_deref())
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        boxed_source(self.source.as_deref())
    }
}

impl From<LibraryInitError> for Error {
    fn from(err: LibraryInitError) -> Self {
        Error::LibraryInit(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}
