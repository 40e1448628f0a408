//! Logging setup for embedders and tests. Engines themselves only use the `log`
//! macros; wiring a dispatcher is the host's choice.

use colored::Colorize;
use fern::Dispatch;
use log::{Level, LevelFilter, SetLoggerError};
use std::io::stdout;
use time::macros::format_description;
use time::OffsetDateTime;

/// How much the root logger shows
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    /// Include the module path of each statement
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            show_target: false,
        }
    }
}

/// Build the root dispatcher without installing it
pub fn create_logger(config: &LogConfig) -> Dispatch {
    let show_target = config.show_target;
    Dispatch::new()
        .format(move |out, message, record| {
            let level = colored_level(record.level());
            if show_target {
                out.finish(format_args!(
                    "[{}] {} ({}) {}",
                    timestamp(),
                    level,
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!("[{}] {} {}", timestamp(), level, message))
            }
        })
        .level(config.level)
        .chain(stdout())
}

/// Install the root logger. Errors if a logger is already set.
pub fn init_logger(config: &LogConfig) -> Result<(), SetLoggerError> {
    create_logger(config).apply()
}

fn timestamp() -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}

fn colored_level(level: Level) -> String {
    let text = level.to_string().to_lowercase();
    match level {
        Level::Error => text.red().to_string(),
        Level::Warn => text.yellow().to_string(),
        Level::Info => text.green().to_string(),
        Level::Debug => text.blue().to_string(),
        Level::Trace => text.bright_black().to_string(),
    }
}
