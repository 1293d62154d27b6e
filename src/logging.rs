//! Tracing initialisation for the publisher binary.
//!
//! Log lines go to standard error through a mutex-wrapped writer, so lines
//! from concurrently running region tasks never interleave mid-line.
//! Standard output stays free for the manifest.

use std::io;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// Newline-delimited JSON
    Json,
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Only the first call takes
/// effect.
pub fn init_logging(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let writer = Mutex::new(io::stderr());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(writer).with_target(false).json())
            .try_init()
            .ok(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(writer).with_target(false))
            .try_init()
            .ok(),
    };
}
