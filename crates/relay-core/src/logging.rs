//! Tracing setup
//!
//! The filter is read from `RELAY_LOG` (same syntax as `RUST_LOG`), falling
//! back to the given default.

use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "RELAY_LOG";

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global fmt subscriber
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(default: &str) -> bool {
    tracing_subscriber::registry()
        .with(filter(default))
        .with(fmt::layer())
        .try_init()
        .is_ok()
}

/// Standalone dispatcher, e.g. for [`crate::Pipeline::set_logger`]
pub fn dispatch(default: &str) -> Dispatch {
    Dispatch::new(
        tracing_subscriber::registry()
            .with(filter(default))
            .with(fmt::layer()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once() {
        init("relay_core=debug");
        assert!(!init("relay_core=debug"));
    }

    #[test]
    fn test_dispatch_scoped() {
        let logger = dispatch("debug");
        tracing::dispatcher::with_default(&logger, || {
            tracing::debug!(scope = "test", "scoped dispatcher active");
        });
    }
}
