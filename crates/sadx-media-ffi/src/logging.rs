//! One-time tracing setup for the host process.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_ENV: &str = "SADX_MEDIA_LOG";

const DEFAULT_FILTER: &str = "sadx_media=info,sadx_media_core=info";

static INIT: Once = Once::new();

/// Installs a stderr fmt subscriber on first call.
///
/// Does nothing if the host already installed a global subscriber.
pub fn init() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
