//! In-memory driver for exercising the connection lifecycle without a server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mysqlxx::{ConnectParams, Driver, DriverError, DriverErrorKind, LibraryRuntime, QueryResult};

pub static MOCK_INITS: AtomicUsize = AtomicUsize::new(0);

static MOCK_RUNTIME: LibraryRuntime = LibraryRuntime::new(
    "mock",
    || {
        MOCK_INITS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    },
    || {},
);

/// What the fake server has seen, and how it should behave next.
#[derive(Debug, Default)]
pub struct MockState {
    pub open_attempts: usize,
    pub opens: usize,
    pub closed: Vec<usize>,
    pub pings: usize,
    pub executed: Vec<String>,
    pub last_params: Option<ConnectParams>,
    /// Reject the next opens with an access-denied error
    pub fail_open: bool,
    /// Whether the server side of the link is up
    pub link_up: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Drop the link from the server side.
    pub fn sever(&self) {
        self.state().link_up = false;
    }
}

#[derive(Debug)]
pub struct MockHandle {
    pub id: usize,
}

impl Driver for MockDriver {
    type Handle = MockHandle;

    fn runtime() -> &'static LibraryRuntime {
        &MOCK_RUNTIME
    }

    fn open(&self, params: &ConnectParams) -> Result<MockHandle, DriverError> {
        let mut state = self.state();
        state.open_attempts += 1;
        state.last_params = Some(params.clone());
        if state.fail_open {
            return Err(DriverError::server(
                DriverErrorKind::Auth,
                1045,
                Some("28000".to_string()),
                format!("Access denied for user '{}'", params.user),
            ));
        }
        state.opens += 1;
        state.link_up = true;
        Ok(MockHandle { id: state.opens })
    }

    fn close(&self, handle: MockHandle) {
        self.state().closed.push(handle.id);
    }

    fn ping(&self, _handle: &mut MockHandle) -> Result<(), DriverError> {
        let mut state = self.state();
        state.pings += 1;
        if state.link_up {
            Ok(())
        } else {
            Err(DriverError::new(
                DriverErrorKind::Io,
                "MySQL server has gone away",
            ))
        }
    }

    fn execute(&self, _handle: &mut MockHandle, sql: &str) -> Result<QueryResult, DriverError> {
        let mut state = self.state();
        if !state.link_up {
            return Err(DriverError::new(DriverErrorKind::Io, "broken pipe"));
        }
        if sql.starts_with("SELEC ") {
            return Err(DriverError::server(
                DriverErrorKind::Server,
                1064,
                Some("42000".to_string()),
                "You have an error in your SQL syntax",
            ));
        }
        state.executed.push(sql.to_string());
        Ok(QueryResult {
            columns: vec!["sql".to_string()],
            rows: vec![vec![Some(sql.to_string())]],
            ..QueryResult::default()
        })
    }
}

pub fn params() -> ConnectParams {
    ConnectParams::new()
        .host("db.example")
        .port(3307)
        .user("app")
        .password("secret")
        .db("inventory")
}
