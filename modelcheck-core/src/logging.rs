//! Tracing setup for test binaries and harness drivers.

use std::sync::Once;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Environment variable consulted for the log filter.
pub const LOG_ENV: &str = "MODELCHECK_LOG";

static INIT: Once = Once::new();

/// Install a human-readable subscriber routed through the libtest capture writer.
///
/// Safe to call from every test: only the first call installs anything, and an
/// already-installed global subscriber (from another harness) is left alone.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_test_writer()
            .with_filter(filter);
        if let Err(e) = tracing_subscriber::registry().with(layer).try_init() {
            eprintln!("modelcheck: tracing subscriber already set ({e})");
        }
    });
}
