//! Logging setup for binaries and tests embedding the engine.
//!
//! The library only emits events; nothing is printed until the host installs
//! a subscriber. [`init_tracing`] installs the usual `fmt` subscriber filtered
//! by `RUST_LOG`, falling back to the given directives. `log` records from the
//! pipeline loops are bridged into the same subscriber.

use crate::error::{Result, SpiderError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default directives used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,spider_engine=debug";

/// Installs a global `fmt` subscriber.
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| SpiderError::configuration(format!("cannot install subscriber: {}", e)))
}
