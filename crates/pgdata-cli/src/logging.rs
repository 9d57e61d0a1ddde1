//! Logging setup for the `pgdata` binary
//!
//! Console output goes to stderr so command output on stdout stays
//! pipeable. An optional JSON layer writes daily-rolling files.

use std::path::PathBuf;

use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Filter used when neither `RUST_LOG` nor `--log-level` is given
pub const DEFAULT_FILTER: &str = "warn,pgdata=info,pgdata_cli=info";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence
    pub filter: String,

    /// Directory for JSON log files; no file logging when `None`
    pub json_log_dir: Option<PathBuf>,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close (for performance tracing)
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json_log_dir: None,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
        }
    }
}

impl LoggingConfig {
    /// A bare level such as `debug` applies to the pgdata crates only;
    /// anything else is used as a full filter directive
    pub fn with_level(mut self, level: Option<&str>) -> Self {
        if let Some(level) = level {
            self.filter = expand_level(level);
        }
        self
    }

    pub fn with_json_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.json_log_dir = dir;
        self
    }
}

fn expand_level(level: &str) -> String {
    let level = level.trim();
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {
            format!("warn,pgdata={0},pgdata_core={0},pgdata_connection={0},pgdata_driver_postgres={0},pgdata_ogr={0},pgdata_cli={0}", level)
        }
        _ => level.to_string(),
    }
}

/// Install the global subscriber
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))?;

    // NEW fires once when the span is created; ENTER would fire on every
    // async re-poll.
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    if let Some(log_dir) = &config.json_log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "pgdata.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // the guard flushes on drop and must live as long as the process
        std::mem::forget(guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        filter = %config.filter,
        json_log_dir = ?config.json_log_dir,
        "logging initialized"
    );
    Ok(())
}
