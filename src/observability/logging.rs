//! Subscriber setup for `tracing` and `log` output.
//!
//! `RUST_LOG` wins when set. Otherwise the `-v` count picks the level:
//! none is `warn`, one is `info`, two is `debug`, more is `trace`.
//! Records emitted through the `log` facade are forwarded by the
//! subscriber's log bridge.

use tracing_subscriber::EnvFilter;

pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn filter_for(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbosity))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
