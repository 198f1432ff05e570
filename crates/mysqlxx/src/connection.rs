//! Single-connection lifecycle.
//!
//! A [`Connection`] owns at most one driver handle and moves between two
//! states:
//!
//! ```text
//! Unconnected --connect ok-------------> Connected
//! Connected   --disconnect-------------> Unconnected
//! Connected   --liveness probe fails---> Unconnected   (seen by connected()/ping())
//! Unconnected --connect error----------> Unconnected
//! ```
//!
//! Parameters of the last successful connect are retained so that
//! [`Connection::ping`] can re-open a link that dropped out from under it.
//! Dropping the connection releases the handle exactly once.
//!
//! A connection is meant to be used from one thread at a time. It may be
//! moved to another thread when the driver's handle is `Send`.

use mysqlxx_core::config::ConfigSource;
use mysqlxx_core::error::{Error, Result};

use crate::driver::Driver;
use crate::params::ConnectParams;
use crate::query::{Query, QueryResult};
use crate::wire::WireDriver;

/// A connection to a MySQL server.
///
/// # Example
///
/// ```rust,ignore
/// use mysqlxx::{Connection, ConnectParams};
///
/// let mut conn = Connection::open(
///     ConnectParams::new().host("127.0.0.1").port(3306).user("root").password("qwerty").db("test"),
/// )?;
/// let result = conn.query("SELECT 'Hello, World!'")?.execute()?;
/// println!("{}", result.get(0, 0).unwrap_or_default());
/// ```
pub struct Connection<D: Driver = WireDriver> {
    driver: D,
    handle: Option<D::Handle>,
    /// Set by a successful connect; survives a dropped link
    params: Option<ConnectParams>,
}

impl<D: Driver> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.handle.is_some())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<D: Driver + Default> Default for Connection<D> {
    fn default() -> Self {
        Self::with_driver(D::default())
    }
}

impl Connection {
    /// An unconnected connection, for delayed initialization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connection and connect it with `params`.
    pub fn open(params: ConnectParams) -> Result<Self> {
        Self::open_with(WireDriver, params)
    }

    /// Create a connection from the `section` of a configuration and connect it.
    pub fn from_config(config: &impl ConfigSource, section: &str) -> Result<Self> {
        Self::from_config_with(WireDriver, config, section)
    }
}

impl<D: Driver> Connection<D> {
    /// An unconnected connection using the given driver.
    pub fn with_driver(driver: D) -> Self {
        Self {
            driver,
            handle: None,
            params: None,
        }
    }

    /// [`Connection::open`] with an explicit driver.
    pub fn open_with(driver: D, params: ConnectParams) -> Result<Self> {
        let mut conn = Self::with_driver(driver);
        conn.connect(params)?;
        Ok(conn)
    }

    /// [`Connection::from_config`] with an explicit driver.
    pub fn from_config_with(driver: D, config: &impl ConfigSource, section: &str) -> Result<Self> {
        let mut conn = Self::with_driver(driver);
        conn.connect_config(config, section)?;
        Ok(conn)
    }

    /// Connect (or reconnect with other settings).
    ///
    /// Any existing handle is released first. Exactly one transport is used:
    /// the socket when the host is local and a socket is given, TCP
    /// otherwise. On failure the connection is left unconnected and forgets
    /// previously retained parameters.
    #[tracing::instrument(level = "debug", skip_all, fields(endpoint = %params.endpoint(), db = %params.db))]
    pub fn connect(&mut self, params: ConnectParams) -> Result<()> {
        D::runtime().ensure_initialized()?;

        self.release_handle();
        self.params = None;

        let endpoint = params.endpoint();
        tracing::debug!(
            socket = params.transport().is_socket(),
            connect_timeout_secs = params.connect_timeout.as_secs(),
            rw_timeout_secs = params.rw_timeout.as_secs(),
            "Opening connection"
        );

        match self.driver.open(&params) {
            Ok(handle) => {
                tracing::info!(endpoint = %endpoint, user = %params.user, "Connected");
                self.handle = Some(handle);
                self.params = Some(params);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(endpoint = %endpoint, error = %err, "Connect failed");
                Err(err.into_connection_error(endpoint))
            }
        }
    }

    /// Resolve `section` from `config` and connect.
    ///
    /// Resolution errors are returned before any network activity and leave
    /// the connection untouched.
    pub fn connect_config(&mut self, config: &impl ConfigSource, section: &str) -> Result<()> {
        let params = ConnectParams::from_config(config, section)?;
        self.connect(params)
    }

    /// Probe the server and report whether the link is alive.
    ///
    /// A failed probe releases the dead handle; retained parameters are kept
    /// for [`Connection::ping`].
    pub fn connected(&mut self) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        match self.driver.ping(handle) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(endpoint = %self.endpoint(), error = %err, "Liveness probe failed");
                self.release_handle();
                false
            }
        }
    }

    /// Whether a handle is held, without talking to the server.
    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Release the handle and forget the retained parameters. Idempotent.
    pub fn disconnect(&mut self) {
        if self.handle.is_some() {
            tracing::info!(endpoint = %self.endpoint(), "Disconnecting");
        }
        self.release_handle();
        self.params = None;
    }

    /// Probe the link, reconnecting once if it has dropped.
    ///
    /// The reconnect reuses the parameters of the last successful connect,
    /// timeouts included. Returns whether the connection is alive afterwards.
    /// A connection that was never connected (or was explicitly
    /// disconnected) returns false without attempting anything, as does one
    /// whose client library has been shut down.
    pub fn ping(&mut self) -> bool {
        if self.connected() {
            return true;
        }
        let Some(params) = self.params.as_ref() else {
            return false;
        };

        let endpoint = params.endpoint();
        if let Err(err) = D::runtime().ensure_initialized() {
            tracing::warn!(endpoint = %endpoint, error = %err, "Reconnect skipped");
            return false;
        }
        tracing::info!(endpoint = %endpoint, "Reconnecting");
        match self.driver.open(params) {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(endpoint = %endpoint, "Reconnected");
                true
            }
            Err(err) => {
                tracing::warn!(endpoint = %endpoint, error = %err, "Reconnect failed");
                false
            }
        }
    }

    /// Start a query bound to this connection.
    ///
    /// Fails immediately with a usage error when no handle is held. The
    /// link itself is not probed; a dropped link surfaces when the query
    /// executes.
    pub fn query(&mut self, text: impl Into<String>) -> Result<Query<'_, D>> {
        if self.handle.is_none() {
            return Err(Error::usage("query", "connection is not established"));
        }
        Ok(Query::new(self, text.into()))
    }

    /// Raw driver handle for low-level use.
    ///
    /// The handle stays owned by this connection; closing it is only
    /// possible through [`Connection::disconnect`].
    pub fn driver_handle(&mut self) -> Option<&mut D::Handle> {
        self.handle.as_mut()
    }

    /// The driver this connection uses.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Parameters retained from the last successful connect.
    pub fn params(&self) -> Option<&ConnectParams> {
        self.params.as_ref()
    }

    pub(crate) fn execute_text(&mut self, sql: &str) -> Result<QueryResult> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::usage("execute", "connection is not established"));
        };
        tracing::debug!(sql = %sql, "Executing query");
        self.driver.execute(handle, sql).map_err(|err| {
            let endpoint = self
                .params
                .as_ref()
                .map(ConnectParams::endpoint)
                .unwrap_or_default();
            err.into_query_error(endpoint, sql)
        })
    }

    fn endpoint(&self) -> String {
        self.params
            .as_ref()
            .map(ConnectParams::endpoint)
            .unwrap_or_default()
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.driver.close(handle);
        }
    }
}

impl<D: Driver> Drop for Connection<D> {
    fn drop(&mut self) {
        self.release_handle();
    }
}
