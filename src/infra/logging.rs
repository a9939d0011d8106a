//! # Logging Module / 日志模块
//!
//! Diagnostic logging through `tracing`, written to stderr so that it never mixes with
//! the console report on stdout. A level given on the command line wins over `RUST_LOG`;
//! without one, `RUST_LOG` is honoured and the default is `warn`.
//!
//! 通过 `tracing` 进行诊断日志记录，写入 stderr，因此永远不会与 stdout 上的控制台报告混在一起。
//! 命令行给出的级别优先于 `RUST_LOG`；未给出时使用 `RUST_LOG`，默认为 `warn`。

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Filter directive for the subscriber: the explicit level, else the `RUST_LOG` value,
/// else the default level.
pub fn filter_directive(explicit: Option<LogLevel>, env: Option<&str>) -> String {
    match (explicit, env.map(str::trim).filter(|v| !v.is_empty())) {
        (Some(level), _) => format!("risk_runner={}", level.to_tracing_level()),
        (None, Some(env)) => env.to_string(),
        (None, None) => format!("risk_runner={}", LogLevel::default().to_tracing_level()),
    }
}

/// Installs the global subscriber. Safe to call more than once; later calls are no-ops.
/// 安装全局订阅者。可以多次调用；之后的调用无效。
pub fn init_logging(explicit: Option<LogLevel>) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(explicit, env.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        EnvFilter::new(format!("risk_runner={}", LogLevel::default().to_tracing_level()))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn explicit_level_overrides_rust_log() {
        assert_eq!(filter_directive(Some(LogLevel::Debug), Some("trace")), "risk_runner=DEBUG");
        assert_eq!(filter_directive(None, Some("risk_runner=info")), "risk_runner=info");
        assert_eq!(filter_directive(None, Some("  ")), "risk_runner=WARN");
        assert_eq!(filter_directive(None, None), "risk_runner=WARN");
    }
}
