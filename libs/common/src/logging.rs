//! Unified logging module for the bridge executables
//!
//! Console output plus, when file logging is enabled, two daily-rolling files
//! in the configured log folder: `<service>_info.log.<date>` with every event
//! and `<service>_errors.log.<date>` with warnings and errors only.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] command=GETPOS;X;, response=CURPOS=400`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Global guards for keeping the non-blocking writers alive
static GUARDS: OnceLock<Arc<Mutex<Vec<WorkerGuard>>>> = OnceLock::new();

fn keep_guard(guard: WorkerGuard) {
    let guards = GUARDS.get_or_init(|| Arc::new(Mutex::new(Vec::new())));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => {
            eprintln!("Warning: GUARDS lock was poisoned, recovering...");
            poisoned.into_inner().push(guard);
        },
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix (e.g. "serialsrv", "gcconv")
    pub service_name: String,
    /// Folder for the info and error log files
    pub log_dir: PathBuf,
    /// Console log level, overridden by RUST_LOG
    pub console_level: Level,
    /// Write the info/error files in addition to the console
    pub enable_file: bool,
    /// Enable JSON format for the info file
    pub enable_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "bridge".to_string(),
            log_dir: PathBuf::from("logs"),
            console_level: Level::INFO,
            enable_file: false,
            enable_json: false,
        }
    }
}

/// Install the global subscriber
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Respect RUST_LOG when set
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_str) => EnvFilter::new(env_str),
        Err(_) => EnvFilter::new(config.console_level.as_str().to_lowercase()),
    };

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let (info_layer, error_layer) = if config.enable_file {
        fs::create_dir_all(&config.log_dir)?;

        let info_appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}_info.log", config.service_name),
        );
        let (info_writer, info_guard) = tracing_appender::non_blocking(info_appender);
        keep_guard(info_guard);

        let error_appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}_errors.log", config.service_name),
        );
        let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);
        keep_guard(error_guard);

        let info_layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(info_writer)
                .with_level(true)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(info_writer)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };

        let error_layer = fmt::layer()
            .with_writer(error_writer)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(LevelFilter::WARN)
            .boxed();

        (Some(info_layer), Some(error_layer))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(error_layer)
        .try_init()?;

    if config.enable_file {
        tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    }

    Ok(())
}
