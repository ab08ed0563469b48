//! PatronPay Logging
//!
//! Shared tracing setup for PatronPay services and tests.
//!
//! ```no_run
//! use patronpay_logging::LogOptions;
//!
//! LogOptions::default().init();
//!
//! // Verbose service with module targets in the output
//! LogOptions::verbose(true).with_targets(true).init();
//! ```
//!
//! `RUST_LOG` always wins over the configured level, so operators can
//! re-filter a running deployment without a rebuild.

use tracing_subscriber::EnvFilter;

/// Minimum severity emitted when `RUST_LOG` is unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Subscriber configuration, applied once at process start
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub level: LogLevel,
    /// Include the emitting module path in each line
    pub show_targets: bool,
}

impl LogOptions {
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_targets(mut self, show: bool) -> Self {
        self.show_targets = show;
        self
    }

    /// The common CLI `-v` mapping: verbose means debug
    pub fn verbose(verbose: bool) -> Self {
        Self::default().with_level(if verbose { LogLevel::Debug } else { LogLevel::Info })
    }

    fn filter(self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }

    /// Install the global subscriber. Panics if one is already set; use
    /// [`LogOptions::try_init`] where that can happen.
    pub fn init(self) {
        self.try_init().expect("logging already initialized");
    }

    pub fn try_init(self) -> Result<(), String> {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_target(self.show_targets)
            .try_init()
            .map_err(|e| e.to_string())
    }
}

/// Quiet debug-level subscriber for tests; safe to call from every test
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
