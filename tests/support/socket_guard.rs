//! Skips mock-server tests where the sandbox forbids binding localhost.

use std::env;
use std::net::{Ipv4Addr, TcpListener};

use wiremock::MockServer;

/// Set to `1`, `true` or `yes` to turn a skip into a failure (CI).
const REQUIRE_SOCKETS_ENV: &str = "XSRF_SESSION_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    env::var(REQUIRE_SOCKETS_ENV).is_ok_and(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}

/// Starts a mock server, or returns `None` when no loopback socket can be
/// bound and skipping is allowed.
///
/// # Panics
///
/// Panics when binding fails and `XSRF_SESSION_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    let loopback = TcpListener::bind((Ipv4Addr::LOCALHOST, 0));
    let Err(err) = loopback else {
        return Some(MockServer::start().await);
    };

    assert!(
        !sockets_required(),
        "[socket-bound-test] cannot bind 127.0.0.1: {err}; unset {REQUIRE_SOCKETS_ENV} to skip"
    );
    eprintln!(
        "[socket-bound-test] cannot bind 127.0.0.1 ({err}); skipping. \
         Set {REQUIRE_SOCKETS_ENV}=1 to fail instead."
    );
    None
}
