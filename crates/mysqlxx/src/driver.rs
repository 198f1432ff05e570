//! The client capability a [`Connection`](crate::Connection) drives.
//!
//! A driver knows how to open, probe, use and close an opaque handle. It
//! reports failures as [`DriverError`]; the connection layer wraps those
//! into [`mysqlxx_core::Error`] values carrying the endpoint, so callers
//! never see driver-specific error types.

use std::fmt;

use mysqlxx_core::error::{ConnectionError, ConnectionErrorKind, Error, QueryError};

use crate::params::ConnectParams;
use crate::query::QueryResult;
use crate::runtime::LibraryRuntime;

/// An underlying database client library.
pub trait Driver {
    /// Live connection handle. Owned exclusively by one `Connection`.
    type Handle;

    /// The process-wide init/teardown state for this library.
    fn runtime() -> &'static LibraryRuntime;

    /// Open a handle using exactly one transport selected from `params`.
    fn open(&self, params: &ConnectParams) -> Result<Self::Handle, DriverError>;

    /// Release a handle. Best effort; never fails.
    fn close(&self, handle: Self::Handle);

    /// Lightweight round trip confirming the handle still talks to the server.
    fn ping(&self, handle: &mut Self::Handle) -> Result<(), DriverError>;

    /// Run a text statement.
    fn execute(&self, handle: &mut Self::Handle, sql: &str) -> Result<QueryResult, DriverError>;
}

/// What part of the exchange a [`DriverError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Could not reach the server
    Connect,
    /// Server refused the transport connection
    Refused,
    /// Credentials rejected
    Auth,
    /// Unexpected bytes on the wire
    Protocol,
    /// Transport failed after it was established
    Io,
    /// Timeout elapsed
    Timeout,
    /// Server rejected a statement
    Server,
    /// Transport not supported here
    Unsupported,
}

/// Error reported by a driver: a code/message pair plus context.
#[derive(Debug)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    /// Server error code (e.g. 1045), or 0 when the client produced the error
    pub code: u16,
    pub sql_state: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    /// Create an error without a server code.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: 0,
            sql_state: None,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error the server reported.
    pub fn server(
        kind: DriverErrorKind,
        code: u16,
        sql_state: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            sql_state,
            message: message.into(),
            source: None,
        }
    }

    /// Classify an I/O failure.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::ConnectionRefused => DriverErrorKind::Refused,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                DriverErrorKind::Timeout
            }
            _ => DriverErrorKind::Io,
        };
        Self {
            kind,
            code: 0,
            sql_state: None,
            message: format!("{}: {}", context, err),
            source: Some(Box::new(err)),
        }
    }

    /// Override the kind, keeping everything else.
    pub fn with_kind(mut self, kind: DriverErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Wrap as an error from opening (or re-opening) a connection.
    pub fn into_connection_error(self, endpoint: impl Into<String>) -> Error {
        let kind = match self.kind {
            DriverErrorKind::Refused => ConnectionErrorKind::Refused,
            DriverErrorKind::Auth => ConnectionErrorKind::Authentication,
            DriverErrorKind::Protocol => ConnectionErrorKind::Protocol,
            DriverErrorKind::Io => ConnectionErrorKind::Disconnected,
            DriverErrorKind::Timeout => ConnectionErrorKind::Timeout,
            DriverErrorKind::Unsupported => ConnectionErrorKind::Unsupported,
            DriverErrorKind::Connect | DriverErrorKind::Server => ConnectionErrorKind::Connect,
        };
        Error::Connection(ConnectionError {
            kind,
            endpoint: endpoint.into(),
            code: (self.code != 0).then_some(self.code),
            sqlstate: self.sql_state,
            message: self.message,
            source: self.source,
        })
    }

    /// Wrap as an error from running `sql`.
    ///
    /// Server-side rejections become query errors and malformed responses
    /// protocol errors; anything that broke the link is reported as a
    /// connection error.
    pub fn into_query_error(self, endpoint: impl Into<String>, sql: &str) -> Error {
        match self.kind {
            DriverErrorKind::Server => Error::Query(QueryError {
                code: (self.code != 0).then_some(self.code),
                sqlstate: self.sql_state,
                message: self.message,
                sql: Some(sql.to_string()),
                source: self.source,
            }),
            DriverErrorKind::Protocol => Error::protocol(self.message),
            _ => self.into_connection_error(endpoint),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}
