//! Subscriber setup for the CLI
//!
//! `RUST_LOG` takes precedence over the `[logging]` section of the config.
//! Logs go to stderr so `--json` output on stdout stays parseable.

use std::sync::Once;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use understory_core::Config;

static INIT: Once = Once::new();

/// Install the global subscriber. Only the first call has an effect.
pub fn init(config: &Config) {
    INIT.call_once(|| {
        let filter = match std::env::var("RUST_LOG") {
            Ok(value) if !value.trim().is_empty() => EnvFilter::new(value),
            _ => EnvFilter::new(config.log_directives()),
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_filter(filter);

        // A subscriber installed by an embedding process wins
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
