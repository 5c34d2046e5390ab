//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays scriptable. The
//! filter comes from `RUST_LOG`, defaulting to `clarion=info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

pub const DEFAULT_FILTER: &str = "clarion=info,clarion_core=info";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter(DEFAULT_FILTER));
    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
