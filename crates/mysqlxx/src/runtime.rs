//! Process-wide, exactly-once client library initialization.
//!
//! Every [`Driver`](crate::driver::Driver) owns one `static` [`LibraryRuntime`].
//! Connections call [`LibraryRuntime::ensure_initialized`] before opening a
//! handle; the first caller in the process runs the library's init routine
//! and every other caller (on any thread) waits for and then observes that
//! single outcome. After the first call the check is a lock-free load.
//!
//! Teardown is not tied to any connection. Hold a [`RuntimeGuard`] for the
//! lifetime of `main`, or call [`LibraryRuntime::shutdown`] once all
//! connections are gone.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use mysqlxx_core::error::{Error, LibraryInitError};

/// Global init routine of a client library.
pub type InitFn = fn() -> Result<(), String>;
/// Global cleanup routine of a client library.
pub type EndFn = fn();

/// One-time init/teardown state for a client library.
pub struct LibraryRuntime {
    name: &'static str,
    init: InitFn,
    end: EndFn,
    state: OnceLock<Result<(), LibraryInitError>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for LibraryRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryRuntime")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl LibraryRuntime {
    /// Declare a runtime; nothing runs until the first `ensure_initialized`.
    pub const fn new(name: &'static str, init: InitFn, end: EndFn) -> Self {
        Self {
            name,
            init,
            end,
            state: OnceLock::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Name of the library this runtime guards.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Initialize the library if no caller has done so yet.
    ///
    /// Concurrent first callers block until the single init completes. A
    /// failed init is cached: every later call reports the same error, since
    /// no connection can ever be made in this process.
    pub fn ensure_initialized(&self) -> Result<(), Error> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::library_init(format!(
                "{} has already been shut down",
                self.name
            )));
        }

        let outcome = self.state.get_or_init(|| {
            tracing::debug!(library = self.name, "Initializing client library");
            match (self.init)() {
                Ok(()) => {
                    tracing::info!(library = self.name, "Client library initialized");
                    Ok(())
                }
                Err(message) => {
                    tracing::error!(library = self.name, error = %message, "Client library init failed");
                    Err(LibraryInitError { message })
                }
            }
        });

        outcome.clone().map_err(Error::LibraryInit)
    }

    /// Whether init has run and succeeded.
    pub fn is_initialized(&self) -> bool {
        matches!(self.state.get(), Some(Ok(())))
    }

    /// Whether [`LibraryRuntime::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Run the library's cleanup routine.
    ///
    /// Only the first call does anything, and cleanup only runs if init
    /// succeeded. Callers must ensure no connection will touch the library
    /// afterwards; later `ensure_initialized` calls fail.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.is_initialized() {
            (self.end)();
            tracing::info!(library = self.name, "Client library shut down");
        }
    }

    /// Scope guard that shuts the runtime down when dropped.
    pub fn guard(&'static self) -> RuntimeGuard {
        RuntimeGuard { runtime: self }
    }
}

/// Calls [`LibraryRuntime::shutdown`] on drop.
///
/// ```rust,ignore
/// use mysqlxx::{Driver, WireDriver};
///
/// fn main() {
///     let _library = WireDriver::runtime().guard();
///     // ... connections created and dropped here ...
/// }
/// ```
#[derive(Debug)]
#[must_use = "the runtime shuts down as soon as the guard is dropped"]
pub struct RuntimeGuard {
    runtime: &'static LibraryRuntime,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        self.runtime.shutdown();
    }
}
