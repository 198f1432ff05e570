//! Core types shared by the mysqlxx crates.
//!
//! - [`error`]: the error taxonomy every connection operation reports through
//! - [`config`]: dotted-path configuration lookup used to resolve named
//!   connection sections

pub mod config;
pub mod error;

pub use config::{ConfigSource, LayeredConfig};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, LibraryInitError, ProtocolError,
    QueryError, Result, UsageError,
};
