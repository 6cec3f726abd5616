//! Leveled diagnostic logging for the `awkc` compiler.
//!
//! Messages go to stderr so they never interleave with generated C on
//! stdout. The level is a process-wide atomic; each macro captures the
//! module path of its call site.
//!
//! # Example
//!
//! ```
//! use awkc_log::{debug, info, warn, Level};
//!
//! awkc_log::set_level(Level::Debug);
//!
//! let slabs = 3;
//! info!("arena holds {} slabs", slabs);
//! debug!("slab sizes: {:?}", [4096, 4096, 65536]);
//! warn!("slab limit reached");
//! ```

use std::fmt::{self, Arguments};
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels ordered from most severe (`Error`) to least severe (`Trace`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures the compiler cannot recover from locally.
    Error = 0,
    /// Recoverable problems such as a reached arena byte limit.
    Warn = 1,
    /// High level progress.
    Info = 2,
    /// Structural events: slab growth, table rehash, scope rollback.
    Debug = 3,
    /// Everything else.
    Trace = 4,
}

impl Level {
    const ALL: [Level; 5] = [
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid log level `{0}` (expected error, warn, info, debug or trace)")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring ASCII case.
    ///
    /// ```
    /// use awkc_log::Level;
    ///
    /// assert_eq!("error".parse(), Ok(Level::Error));
    /// assert_eq!("INFO".parse(), Ok(Level::Info));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseLevelError(s.to_owned()))
    }
}

/// The process-wide logger.
///
/// Holds the minimum level and whether ANSI colours are emitted. Obtain it
/// through [`get_logger`].
pub struct Logger {
    level: AtomicU8,
    color: AtomicBool,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            color: AtomicBool::new(true),
        }
    }

    /// Sets the minimum level; less severe messages are dropped.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Enables or disables ANSI colour codes in the level tag.
    pub fn set_color(&self, enabled: bool) {
        self.color.store(enabled, Ordering::Relaxed);
    }

    /// Returns true if a message at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    fn format(&self, level: Level, target: &str, args: Arguments<'_>) -> String {
        if self.color.load(Ordering::Relaxed) {
            const RESET: &str = "\x1b[0m";
            let color = level.color_code();
            format!("{color}[{level}]{RESET} {target}: {args}")
        } else {
            format!("[{level}] {target}: {args}")
        }
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, initialising it at `Level::Info` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Info))
}

/// Sets the minimum level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum level of the global logger from a level name.
///
/// ```
/// awkc_log::set_level_from_str("debug").unwrap();
/// assert!(awkc_log::set_level_from_str("verbose").is_err());
/// ```
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments<'_>) {
    let logger = get_logger();
    if !logger.enabled(level) {
        return;
    }
    eprintln!("{}", logger.format(level, target, args));
}

/// Returns true if the global logger would write a message at `level`.
///
/// Use it to skip computing expensive diagnostics.
///
/// ```
/// use awkc_log::{log_enabled, Level};
///
/// awkc_log::set_level(Level::Warn);
/// assert!(!log_enabled!(Level::Trace));
/// ```
#[macro_export]
macro_rules! log_enabled {
    ($level:expr) => {
        $crate::get_logger().enabled($level)
    };
}

/// Logs a message at an explicit level.
///
/// ```
/// use awkc_log::{log, Level};
///
/// log!(level: Level::Info, "interned {} identifiers", 42);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
