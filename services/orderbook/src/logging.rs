//! Tracing initialization for relay binaries.
//!
//! Two output modes, both filtered through `RUST_LOG` (default `info`):
//! - JSON (`json = true`) for log aggregation
//! - compact human-readable lines otherwise

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        registry.with(json_layer).try_init()?;
    } else {
        let compact_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false);
        registry.with(compact_layer).try_init()?;
    }
    Ok(())
}
