use anyhow::Result;
use chrono::{Datelike, Timelike};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

struct LogTimer;

impl fmt::time::FormatTime for LogTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        let cs = now.timestamp_subsec_millis() / 10;
        write!(
            w,
            "{:04}-{:02}-{:02}:{:02}:{:02}:{:02}:{:02}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            cs
        )
    }
}

/// 日志过滤表达式 / Filter directive for the configured level
///
/// librdkafka 与 sled 的内部日志压到 warn / librdkafka and sled internals are capped at warn
pub fn filter_directive(level: &str) -> String {
    format!("{},rdkafka=warn,sled=warn", level)
}

/// 初始化日志 / Install the global subscriber
///
/// 级别取自 `logging.level`，`RUST_LOG` 优先 / Level comes from `logging.level`; `RUST_LOG` wins when set
pub fn init_tracing() -> Result<()> {
    let level: String = crate::comm::config::get_global_config_manager()
        .ok()
        .and_then(|mgr| mgr.get("logging.level").ok())
        .unwrap_or_else(|| "info".to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(&level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    LogTracer::init().ok();
    fmt::SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_timer(LogTimer)
        .compact()
        .with_target(false)
        .try_init()
        .ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_parses() {
        let directive = filter_directive("debug");
        assert_eq!(directive, "debug,rdkafka=warn,sled=warn");
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
