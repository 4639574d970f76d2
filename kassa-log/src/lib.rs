//! Kassa Logging
//!
//! Structured logging for the kassa payment gateway, controlled by the
//! `KASSA_DEBUG` environment variable or the gateway's own debug setting.
//!
//! # Features
//!
//! - **Environment-controlled**: `KASSA_DEBUG=1` enables debug logging
//! - **Runtime toggle**: the gateway's "debug log" setting calls [`set_debug`]
//! - **Structured output**: JSON lines carry a `source` field naming the gateway
//! - **Redaction**: [`redact`] masks e-mail addresses and card-like digit runs
//!
//! # Usage
//!
//! ```rust
//! use kassa_log::{debug, info, warn, error};
//!
//! debug!("Building payment request");
//! info!("Payment created for order {}", 1234);
//! warn!("Provider list unavailable");
//! error!(target: "kassa::refund", "Refund rejected with status {}", 422);
//! ```
//!
//! # Environment Variables
//!
//! - `KASSA_DEBUG=1` - Enable debug logging
//! - `KASSA_LOG_LEVEL=debug|info|notice|warning|error|critical` - Set log level
//! - `KASSA_LOG_FORMAT=json|pretty|compact|facade` - Set output format
//! - `KASSA_LOG_COLOR=1|0`, `KASSA_LOG_TIMESTAMPS=1|0`, `KASSA_LOG_MODULE=1|0`

use once_cell::sync::Lazy;
use serde::Serialize;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Value of the `source` field attached to every structured entry.
pub const SOURCE: &str = "kassa";

// ============================================================================
// Levels and formats
// ============================================================================

/// Log level, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Off = 5,
}

impl Level {
    const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Off,
    ];

    /// Parse a level name; shop-platform (PSR-3) names fold onto the
    /// nearest level.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" | "notice" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "critical" | "alert" | "emergency" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON lines (default)
    Json,
    /// Human readable, one entry per line
    Pretty,
    /// Short single-line form
    Compact,
    /// Hand entries to whatever `log` implementation the host installed
    Facade,
}

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "facade" | "log" => Some(Format::Facade),
            _ => None,
        }
    }
}

// ============================================================================
// Global state
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Output settings read once from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: Format,
    pub color: bool,
    pub timestamps: bool,
    pub module_path: bool,
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
}

impl LogConfig {
    /// Read `KASSA_*` variables; also seeds the level and debug flag.
    pub fn from_env() -> Self {
        let debug = env_flag("KASSA_DEBUG").unwrap_or(false);
        let level = env::var("KASSA_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });
        DEBUG_ENABLED.store(debug, Ordering::SeqCst);
        LOG_LEVEL.store(level as u8, Ordering::SeqCst);

        Self {
            format: env::var("KASSA_LOG_FORMAT")
                .ok()
                .and_then(|s| Format::parse(&s))
                .unwrap_or(Format::Json),
            color: env_flag("KASSA_LOG_COLOR")
                .unwrap_or_else(|| env::var("NO_COLOR").is_err() && env::var("TERM").is_ok()),
            timestamps: env_flag("KASSA_LOG_TIMESTAMPS").unwrap_or(true),
            module_path: env_flag("KASSA_LOG_MODULE").unwrap_or(true),
        }
    }
}

/// Read the environment now instead of on the first log call.
pub fn init() {
    Lazy::force(&CONFIG);
}

pub fn config() -> &'static LogConfig {
    &CONFIG
}

#[inline]
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn current_level() -> Level {
    let raw = LOG_LEVEL.load(Ordering::Relaxed) as usize;
    Level::ALL.get(raw).copied().unwrap_or(Level::Off)
}

pub fn set_level(level: Level) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Switch debug logging at runtime.
///
/// Turning it off returns to `Info` only when debug had lowered the level.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    let level = current_level();
    if enabled && level > Level::Debug {
        set_level(Level::Debug);
    } else if !enabled && level == Level::Debug {
        set_level(Level::Info);
    }
}

// ============================================================================
// Redaction
// ============================================================================

/// Mask personal data before it reaches a log line.
///
/// E-mail local parts are replaced by `***`, and any run of 8 or more digits
/// (card numbers, phone numbers) keeps only its last four digits.
pub fn redact(input: &str) -> String {
    let joined = input
        .split(' ')
        .map(|word| match word.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
                format!("***@{}", domain)
            }
            _ => word.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::with_capacity(joined.len());
    let mut digits = String::new();
    for c in joined.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        flush_digits(&mut out, &mut digits);
        out.push(c);
    }
    flush_digits(&mut out, &mut digits);
    out
}

fn flush_digits(out: &mut String, digits: &mut String) {
    if digits.len() >= 8 {
        out.push_str(&"*".repeat(digits.len() - 4));
        out.push_str(&digits[digits.len() - 4..]);
    } else {
        out.push_str(digits);
    }
    digits.clear();
}

// ============================================================================
// Entries
// ============================================================================

/// One log entry as written in JSON format.
#[derive(Debug, Serialize)]
pub struct Entry<'a> {
    pub timestamp: String,
    pub level: &'static str,
    pub source: &'static str,
    pub target: &'a str,
    pub message: &'a str,
}

impl<'a> Entry<'a> {
    pub fn new(level: Level, target: &'a str, message: &'a str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_str(),
            source: SOURCE,
            target,
            message,
        }
    }

    /// Render for a text format; `None` for [`Format::Facade`].
    pub fn render(&self, format: Format, config: &LogConfig) -> Option<String> {
        let target = config.module_path && !self.target.is_empty();
        let line = match format {
            Format::Json => serde_json::to_string(self).ok()?,
            Format::Pretty => {
                let mut line = String::new();
                if config.timestamps {
                    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    line.push_str(&format!("{} ", now));
                }
                line.push_str(&format!("{:5} ", paint(self.level, config.color)));
                if target {
                    line.push_str(&format!("[{}] ", self.target));
                }
                line.push_str(self.message);
                line
            }
            Format::Compact => {
                let mut line = String::new();
                if config.timestamps {
                    line.push_str(&format!("{} ", chrono::Local::now().format("%H:%M:%S")));
                }
                line.push_str(&self.level[..1]);
                line.push(' ');
                if target {
                    line.push_str(&format!("{}: ", self.target));
                }
                line.push_str(self.message);
                line
            }
            Format::Facade => return None,
        };
        Some(line)
    }
}

#[cfg(feature = "color")]
fn paint(level: &str, color: bool) -> String {
    use colored::Colorize;
    if !color {
        return level.to_string();
    }
    match level {
        "TRACE" => level.magenta().to_string(),
        "DEBUG" => level.blue().to_string(),
        "INFO" => level.green().to_string(),
        "WARN" => level.yellow().to_string(),
        _ => level.red().bold().to_string(),
    }
}

#[cfg(not(feature = "color"))]
fn paint(level: &str, _color: bool) -> String {
    level.to_string()
}

/// Write one entry; used by the macros.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    if !is_level_enabled(level) && !(level == Level::Debug && is_debug_enabled()) {
        return;
    }
    let config = config();
    match Entry::new(level, target, message).render(config.format, config) {
        Some(line) => eprintln!("{}", line),
        None => forward(level, target, message),
    }
}

fn forward(level: Level, target: &str, message: &str) {
    let level = match level {
        Level::Trace => log::Level::Trace,
        Level::Debug => log::Level::Debug,
        Level::Info => log::Level::Info,
        Level::Warn => log::Level::Warn,
        Level::Error => log::Level::Error,
        Level::Off => return,
    };
    log::log!(target: target, level, "{}", message);
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::is_level_enabled(level)
            || (level == $crate::Level::Debug && $crate::is_debug_enabled())
        {
            $crate::log(level, $target, &format!($($arg)+));
        }
    }};
}

#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => { $crate::__log!($crate::Level::Trace, target: $target, $($arg)+) };
    ($($arg:tt)+) => { $crate::__log!($crate::Level::Trace, target: module_path!(), $($arg)+) };
}

/// Log a debug message.
///
/// Enabled by `KASSA_DEBUG=1`, `KASSA_LOG_LEVEL=debug` or the gateway's
/// debug setting.
///
/// ```rust
/// use kassa_log::debug;
///
/// let reference = "9f2c";
/// debug!("Stored reference {}", reference);
/// debug!(target: "kassa::callback", "Dispatching callback");
/// ```
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => { $crate::__log!($crate::Level::Debug, target: $target, $($arg)+) };
    ($($arg:tt)+) => { $crate::__log!($crate::Level::Debug, target: module_path!(), $($arg)+) };
}

#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => { $crate::__log!($crate::Level::Info, target: $target, $($arg)+) };
    ($($arg:tt)+) => { $crate::__log!($crate::Level::Info, target: module_path!(), $($arg)+) };
}

#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => { $crate::__log!($crate::Level::Warn, target: $target, $($arg)+) };
    ($($arg:tt)+) => { $crate::__log!($crate::Level::Warn, target: module_path!(), $($arg)+) };
}

#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => { $crate::__log!($crate::Level::Error, target: $target, $($arg)+) };
    ($($arg:tt)+) => { $crate::__log!($crate::Level::Error, target: module_path!(), $($arg)+) };
}

// ============================================================================
// Tracing Integration
// ============================================================================

/// Subscriber for hosts that log through `tracing`; filtered by
/// `RUST_LOG`, else by the kassa level.
#[cfg(feature = "tracing")]
pub fn subscriber() -> impl tracing::Subscriber {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let config = config();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(current_level().as_str().to_ascii_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(config.color))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> LogConfig {
        LogConfig {
            format: Format::Json,
            color: false,
            timestamps: false,
            module_path: true,
        }
    }

    #[test]
    fn test_level_parse_accepts_shop_platform_names() {
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("notice"), Some(Level::Info));
        assert_eq!(Level::parse("critical"), Some(Level::Error));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("invalid"), None);
        assert!(Level::Debug < Level::Info);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("log"), Some(Format::Facade));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_json_entry_names_the_gateway() {
        let entry = Entry::new(Level::Warn, "kassa::refund", "Refund rejected");
        let line = entry.render(Format::Json, &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["source"], "kassa");
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["target"], "kassa::refund");
        assert_eq!(value["message"], "Refund rejected");
    }

    #[test]
    fn test_text_formats() {
        let entry = Entry::new(Level::Info, "kassa::payment", "Payment created");
        let config = plain();

        assert_eq!(
            entry.render(Format::Pretty, &config).unwrap(),
            "INFO  [kassa::payment] Payment created"
        );
        assert_eq!(
            entry.render(Format::Compact, &config).unwrap(),
            "I kassa::payment: Payment created"
        );
        assert_eq!(entry.render(Format::Facade, &config), None);
    }

    #[test]
    fn test_redact_email() {
        assert_eq!(
            redact("customer jane.doe@example.com paid"),
            "customer ***@example.com paid"
        );
    }

    #[test]
    fn test_redact_card_number() {
        assert_eq!(redact("pan 4153013999700024"), "pan ************0024");
        assert_eq!(redact("order 1234"), "order 1234");
    }

    #[test]
    fn test_debug_toggle() {
        let original = is_debug_enabled();

        set_debug(true);
        assert!(is_debug_enabled());
        assert!(is_level_enabled(Level::Debug));

        set_debug(false);
        assert!(!is_debug_enabled());

        set_debug(original);
    }

    #[test]
    fn test_macros_expand() {
        trace!("trace message");
        debug!("debug message");
        info!(target: "kassa::test", "with target {}", 1);
        warn!("warn message");
        error!("error message");
    }
}
