//! Structured logging setup
//!
//! - JSON output when `LOG_FORMAT=json` (log aggregation)
//! - Human-readable output otherwise
//!
//! # Usage
//!
//! ```rust,ignore
//! use ugm_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("ugm-sync");
//!     tracing::info!(principal = %id, "Role granted");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: level filter (default: info), e.g. `RUST_LOG=ugm_core=debug`

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Which formatter `init_logging` installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Parse the `LOG_FORMAT` value. Unknown values fall back to text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber for a process embedding the UGM layer.
///
/// Calling this twice is a no-op; the first subscriber stays installed.
pub fn init_logging(service_name: &str) {
    let filter = env_filter("info");
    let installed = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .flatten_event(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(service = service_name, "Logging initialized");
    }
}

/// Subscriber for tests: captured by the test harness, debug for the UGM crates.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("ugm_core=debug,ugm_directory=debug"))
        .with(fmt::layer().with_test_writer().with_target(true))
        .try_init();
}
