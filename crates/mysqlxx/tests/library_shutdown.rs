mod common;

use mysqlxx::{Connection, Driver, Error};

use common::{MockDriver, params};

// Shuts the mock runtime down for this whole test binary; keep it the only test here.
#[test]
fn shutdown_blocks_connect_and_reconnect() {
    let driver = MockDriver::default();
    let mut conn = Connection::open_with(driver.clone(), params()).unwrap();
    driver.sever();

    MockDriver::runtime().shutdown();

    // The dead handle is released but no reopen is attempted.
    assert!(!conn.ping());
    assert!(!conn.has_handle());
    assert_eq!(driver.state().open_attempts, 1);

    let err = conn.connect(params()).unwrap_err();
    assert!(matches!(err, Error::LibraryInit(_)));
    assert_eq!(driver.state().open_attempts, 1);
}
