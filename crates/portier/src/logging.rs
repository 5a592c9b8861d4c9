//! Tracing setup: console output plus optional rolling JSON files.

use portier_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "portier=info,portier_auth=info,portier_config=info,warn";
const VERBOSE_FILTER: &str =
    "portier=debug,portier_auth=debug,portier_cache=debug,portier_config=debug,tower_http=debug,info";
const FILE_FILTER: &str = "portier=trace,portier_auth=trace,portier_cache=trace,info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `--verbose`, which wins over `[logging] level`.
/// The returned guard flushes the file writer and must outlive `main`.
pub fn init(verbose: bool, config: &LoggingConfig) -> Option<WorkerGuard> {
    let console_filter = console_filter(verbose, config.level.as_deref());

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "portier.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(console_filter))
        .with(file_layer)
        .init();

    guard
}

fn console_filter(verbose: bool, level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = match (verbose, level) {
        (true, _) => VERBOSE_FILTER,
        (false, Some(level)) => level,
        (false, None) => DEFAULT_FILTER,
    };
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
