//! Terminal logging for the operator CLI.

use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// HTTP and TLS crates underneath the key fetcher. Silenced below Trace.
const FILTERED_MODULES: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls", "h2", "mio"];

/// Install a stderr `TermLogger` at the configured level.
///
/// stdout is left to command output. Fails if a global logger is already set.
pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
    TermLogger::init(
        config.log_level_filter,
        log_config(config.log_level_filter),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
}

fn log_config(level: LevelFilter) -> simplelog::Config {
    let mut builder = ConfigBuilder::new();
    builder.set_time_format_rfc3339();

    if level < LevelFilter::Trace {
        for module in FILTERED_MODULES {
            builder.add_filter_ignore_str(module);
        }
    }

    builder.build()
}
