//! Thin wrapper over slog so every crate logs through one vocabulary.
//! Severity comes from `WARDEN_LOG_LEVEL`; the logger writes to stderr.

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;
use std::env;

pub use slog::{crit, debug, error, info, o, trace, warn};
pub use slog::{Discard, Logger};

pub const LOG_LEVEL_ENV: &str = "WARDEN_LOG_LEVEL";

fn severity_from_env() -> Severity {
    match env::var(LOG_LEVEL_ENV).as_ref().map(String::as_str) {
        Ok("trace") => Severity::Trace,
        Ok("debug") => Severity::Debug,
        Ok("info") => Severity::Info,
        Ok("warning") => Severity::Warning,
        Ok("error") => Severity::Error,
        Ok("critical") => Severity::Critical,
        _ => Severity::Info,
    }
}

/// Build the root logger. Failures here are unrecoverable and very early,
/// so they abort the process.
pub fn init() -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(severity_from_env());
    builder.destination(Destination::Stderr);

    builder.build().expect("logger construction failed")
}

/// A logger that swallows everything; used by library consumers that do not
/// care for output and throughout tests.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
