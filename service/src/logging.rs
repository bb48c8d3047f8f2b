use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// HTTP and WebSocket stack modules that stay quiet below TRACE.
const FILTERED_MODULES: &[&str] = &[
    "tower",
    "tracing",
    "hyper",
    "axum",
    "tungstenite",
    "tokio_tungstenite",
];

pub struct Logger {}

impl Logger {
    /// Install the terminal logger at the configured level.
    ///
    /// At TRACE the HTTP and WebSocket stacks log too; at every other level
    /// only the application crates do.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        TermLogger::init(
            config.log_level_filter,
            Self::log_config(config.log_level_filter),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    fn filters_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn ignored_modules(level: LevelFilter) -> &'static [&'static str] {
        if Self::filters_dependencies(level) {
            FILTERED_MODULES
        } else {
            &[]
        }
    }

    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        for module in Self::ignored_modules(level) {
            builder.add_filter_ignore_str(*module);
        }
        builder.build()
    }
}
