/// Structured logging for the compliance analysis run.
///
/// Every message is tagged with the pipeline stage that produced it and,
/// where relevant, the site it concerns. Messages go through the `log`
/// facade; the binary installs `env_logger` with an explicit level so no
/// environment variable is consulted.

use std::fmt;
use std::io::Write;

use crate::model::RenderError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Evaluate,
    Aggregate,
    Anomaly,
    Reconcile,
    ControlChart,
    Report,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "LOAD"),
            Stage::Evaluate => write!(f, "EVAL"),
            Stage::Aggregate => write!(f, "AGG"),
            Stage::Anomaly => write!(f, "ML"),
            Stage::Reconcile => write!(f, "RECON"),
            Stage::ControlChart => write!(f, "SPC"),
            Stage::Report => write!(f, "REPORT"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Installs the global logger.
///
/// With `console_timestamps` each line carries a UTC timestamp and level;
/// without it only the level marker and message are printed. Calling this
/// twice is harmless: the second install is ignored.
pub fn init_logger(min_level: LogLevel, console_timestamps: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(min_level.into());

    if console_timestamps {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.args()
            )
        });
    } else {
        builder.format(|buf, record| {
            let marker = match record.level() {
                log::Level::Error => "✗ ",
                log::Level::Warn => "⚠ ",
                _ => "",
            };
            writeln!(buf, "   {}{}", marker, record.args())
        });
    }

    let _ = builder.try_init();
}

/// Formats the stage/site prefix shared by every log line.
pub fn format_entry(stage: Stage, site: Option<&str>, message: &str) -> String {
    let site_part = site.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{}{}: {}", stage, site_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(stage: Stage, site: Option<&str>, message: &str) {
    log::info!("{}", format_entry(stage, site, message));
}

/// Log a warning message
pub fn warn(stage: Stage, site: Option<&str>, message: &str) {
    log::warn!("{}", format_entry(stage, site, message));
}

/// Log an error message
pub fn error(stage: Stage, site: Option<&str>, message: &str) {
    log::error!("{}", format_entry(stage, site, message));
}

/// Log a debug message
pub fn debug(stage: Stage, site: Option<&str>, message: &str) {
    log::debug!("{}", format_entry(stage, site, message));
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log an image that could not be written. The run continues.
pub fn log_render_failure(err: &RenderError) {
    error(Stage::Report, None, &err.to_string());
}

/// Log a fatal error that aborts the run.
pub fn log_fatal(err: &dyn std::error::Error) {
    error(Stage::System, None, &format!("analysis aborted: {}", err));
}

// ---------------------------------------------------------------------------
// Stage Summary Logging
// ---------------------------------------------------------------------------

/// Log how many of `total` items a stage flagged, at a level that reflects
/// the outcome: nothing flagged is info, everything flagged is an error,
/// anything in between is a warning.
pub fn log_stage_summary(stage: Stage, what: &str, total: usize, flagged: usize) {
    let message = format!("{}: {}/{} flagged", what, flagged, total);

    if flagged == 0 {
        info(stage, None, &message);
    } else if flagged == total {
        error(stage, None, &message);
    } else {
        warn(stage, None, &message);
    }
}
