//! Shared fixtures for assetpipe's integration tests.

pub mod actions;
pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for anything a test awaits.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured and only shown for failing tests. `RUST_LOG` selects
/// the filter (default `info`), e.g. `RUST_LOG=assetpipe=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test timed out after {TEST_TIMEOUT:?}"),
    }
}
