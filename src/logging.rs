//! Console logging.
//!
//! Library code logs through `tracing` macros only. The binary installs a
//! subscriber once at startup with [`init_tracing`]: `RUST_LOG` wins when
//! set, otherwise the `--log-level` flag decides. Debug output carries
//! timestamps and targets; info output is a compact time-and-message line.

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
}

impl LogLevel {
    fn filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.filter()));

    match level {
        LogLevel::Debug => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogLevel::Info => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_level(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init(),
    }
}
