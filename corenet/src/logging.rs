//! Logger construction. The reactor and API facade take a `slog::Logger` by
//! value rather than reaching for a process-global logger.

use sloggers::types::Severity;
use sloggers::{Config, LoggerConfig};
use std::path::Path;

/// Builds a terminal logger at the given severity, following the teacher's
/// `flux::logging::init` terminal/stderr default.
pub fn terminal(level: Severity) -> slog::Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(&format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        severity_str(level)
    ))
    .expect("built-in terminal logger config is valid toml");

    config.build_logger().expect("terminal logger backend is always constructible")
}

/// Builds a logger from a user-supplied `sloggers` TOML config file.
pub fn from_config_file(path: &Path) -> Result<slog::Logger, serdeconv::Error> {
    let config: LoggerConfig = serdeconv::from_toml_file(path)?;
    config
        .build_logger()
        .map_err(|e| serdeconv::Error::from(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

fn severity_str(level: Severity) -> &'static str {
    match level {
        Severity::Trace => "trace",
        Severity::Debug => "debug",
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
        Severity::Critical => "critical",
    }
}
