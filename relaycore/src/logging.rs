//! Logger construction. A terminal logger by default; callers that want
//! structured log shipping build their own `sloggers::Config` and pass it to
//! [`init_with_config`] instead.

use slog::Logger;
use sloggers::{Config, LoggerConfig};

const DEFAULT_CONFIG_TOML: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

/// Builds the default stderr terminal logger.
pub fn init() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(DEFAULT_CONFIG_TOML).expect("relaycore: built-in logging config is invalid TOML");
    config.build_logger().expect("relaycore: failed to build logger")
}

pub fn init_with_config(config: LoggerConfig) -> Logger {
    config.build_logger().expect("relaycore: failed to build logger")
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::info;

    #[test]
    fn default_logger_builds_and_accepts_records() {
        let logger = init();
        info!(logger, "relaycore logging self-test");
    }
}
