/*! Integration tests for sharedstate.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - path: Reading and writing values at dotted paths
 * - state: SharedState writes, subscriptions and broadcast
 * - registry: Object lifecycle and connection arrival/departure
 * - protocol: Wire shapes of requests, responses and updates
 * - mirror: Client mirrors converging through a transport
 * - transport: Memory and TCP transports end to end
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sharedstate=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod registry;
mod state;
mod transport;
