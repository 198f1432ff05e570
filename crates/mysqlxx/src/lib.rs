//! MySQL client connections.
//!
//! This crate manages the lifecycle of a single MySQL connection:
//!
//! - One-time, thread-safe initialization of the client library
//! - Connection parameters from code, a URL or a named config section
//! - Unix socket vs. TCP selection with connect and read/write timeouts
//! - Liveness probing, with one automatic reconnect from [`Connection::ping`]
//! - Query objects bound to the connection that created them
//!
//! The default driver speaks the MySQL wire protocol directly
//! (handshake v10, `mysql_native_password`, `caching_sha2_password`).
//! Other drivers plug in through the [`Driver`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use mysqlxx::{Connection, LayeredConfig};
//!
//! let config = LayeredConfig::from_json_file("app.json")?;
//! let mut conn = Connection::from_config(&config, "mysql.primary")?;
//!
//! if conn.ping() {
//!     let result = conn.query("SELECT VERSION()")?.execute()?;
//!     println!("{}", result.get(0, 0).unwrap_or_default());
//! }
//! ```

pub mod auth;
pub mod connection;
pub mod driver;
pub mod params;
pub mod protocol;
pub mod query;
pub mod runtime;
pub mod wire;

pub use connection::Connection;
pub use driver::{Driver, DriverError, DriverErrorKind};
pub use params::{ConnectParams, Transport};
pub use query::{Query, QueryResult};
pub use runtime::{LibraryRuntime, RuntimeGuard};
pub use wire::{WireDriver, WireHandle};

pub use mysqlxx_core::{
    ConfigError, ConfigSource, ConnectionError, ConnectionErrorKind, Error, LayeredConfig,
    LibraryInitError, ProtocolError, QueryError, Result, UsageError,
};
