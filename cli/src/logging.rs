//! Tracing setup for the `searchsync` binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const OWN_CRATES: [&str; 4] = [
    "searchsync_core",
    "searchsync_http",
    "searchsync_engine",
    "searchsync_cli",
];

/// Derived from the global `-v` / `--log-json` flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub verbose: bool,
    pub json: bool,
}

impl LogConfig {
    pub fn from_flags(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    /// `info` everywhere; `-v` lifts our own crates to `debug` and leaves
    /// reqwest/hyper alone.
    fn directives(&self) -> String {
        let mut directives = String::from("info");
        if self.verbose {
            for target in OWN_CRATES {
                directives.push_str(&format!(",{target}=debug"));
            }
        }
        directives
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over the flags.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
