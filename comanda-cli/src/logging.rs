// logging.rs - tracing subscriber setup for the CLI
// Logs go to stderr so stdout stays clean JSON.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "COMANDA_LOG";

/// Log levels (ordered by severity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<LogLevel> {
        match s.trim().to_uppercase().as_str() {
            "ERROR" => Some(LogLevel::Error),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "INFO" => Some(LogLevel::Info),
            "DEBUG" => Some(LogLevel::Debug),
            "TRACE" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warn
    }
}

/// Pick the filter directive: `--log-level` first, then `COMANDA_LOG`
/// (any `EnvFilter` directive), then `warn`.
pub fn filter_directive(flag: Option<LogLevel>, env: Option<String>) -> String {
    match (flag, env) {
        (Some(level), _) => level.as_str().to_string(),
        (None, Some(directive)) if !directive.trim().is_empty() => directive,
        _ => LogLevel::default().as_str().to_string(),
    }
}

pub fn init_logging(flag: Option<LogLevel>) {
    let directive = filter_directive(flag, std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(LogLevel::default().as_str()));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("Info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("verbose"), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_filter_precedence() {
        assert_eq!(
            filter_directive(Some(LogLevel::Debug), Some("trace".to_string())),
            "debug"
        );
        assert_eq!(
            filter_directive(None, Some("comanda_core=info".to_string())),
            "comanda_core=info"
        );
        assert_eq!(filter_directive(None, Some("  ".to_string())), "warn");
        assert_eq!(filter_directive(None, None), "warn");
    }
}
