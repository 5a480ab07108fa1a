pub mod gate;
pub mod server;
pub mod transport;

pub use gate::ResponseGate;
pub use server::TestServer;
pub use transport::LocalTransport;

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for test output. `filter` is used when
/// `RUST_LOG` is unset; repeated calls are no-ops.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
