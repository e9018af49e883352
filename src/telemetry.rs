//! Tracing setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Install a fmt subscriber filtered by `RUST_LOG`
///
/// Falls back to `default_directive` (e.g. `"info"`) when `RUST_LOG` is
/// unset or unparsable. Fails if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .try_init()
}
