//! Structured logging for the replication pipeline.
//!
//! A small `Logger`/`LogLevelFilter` pair built on `tracing`, with an atomic
//! level filter adjustable at runtime (e.g. from a `--verbose` CLI flag) and
//! convenience methods tagging each event with the owning session and phase.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::Level;

/// Minimum level to emit, adjustable at runtime.
///
/// Stored as a u8: 0=Debug, 1=Info, 2=Warning, 3=Error.
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: Level) -> Self {
        Self(AtomicU8::new(level_to_u8(level)))
    }

    pub fn get(&self) -> Level {
        u8_to_level(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: Level) {
        self.0.store(level_to_u8(level), Ordering::Relaxed);
    }

    pub fn should_log(&self, level: Level) -> bool {
        level_to_u8(level) <= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

fn level_to_u8(level: Level) -> u8 {
    match level {
        Level::ERROR => 0,
        Level::WARN => 1,
        Level::INFO => 2,
        Level::DEBUG => 3,
        Level::TRACE => 4,
    }
}

fn u8_to_level(val: u8) -> Level {
    match val {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logger tagging every emitted event with a session id and, optionally, a
/// pipeline phase. Cloning is cheap: the level filter is shared via `Arc`.
#[derive(Clone)]
pub struct Logger {
    level_filter: Arc<LogLevelFilter>,
    session_id: Option<String>,
    phase: Option<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            level_filter: Arc::new(LogLevelFilter::default()),
            session_id: None,
            phase: None,
        }
    }

    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    fn log(&self, level: Level, message: &str) {
        if !self.level_filter.should_log(level) {
            return;
        }
        let session = self.session_id.as_deref().unwrap_or("-");
        let phase = self.phase.as_deref().unwrap_or("-");
        match level {
            Level::ERROR => tracing::error!(session = session, phase = phase, "{}", message),
            Level::WARN => tracing::warn!(session = session, phase = phase, "{}", message),
            Level::INFO => tracing::info!(session = session, phase = phase, "{}", message),
            Level::DEBUG => tracing::debug!(session = session, phase = phase, "{}", message),
            Level::TRACE => tracing::trace!(session = session, phase = phase, "{}", message),
        }
    }

    pub fn debug(&self, msg: &str) {
        self.log(Level::DEBUG, msg);
    }

    pub fn info(&self, msg: &str) {
        self.log(Level::INFO, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.log(Level::WARN, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(Level::ERROR, msg);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a global `tracing` subscriber, honoring `RUST_LOG` and falling
/// back to `verbose`'s implied level. `log` follows the CLI's `--log` flag:
/// `"0"`/`"off"` disables logging entirely, `"1"`/`"stdout"` writes to
/// stdout, anything else (including the default `"2"`) writes to stderr.
pub fn init_tracing(verbose: bool, log: &str) {
    use tracing_subscriber::EnvFilter;

    if matches!(log, "0" | "off") {
        return;
    }

    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let _ = if matches!(log, "1" | "stdout") {
        subscriber.with_writer(std::io::stdout).try_init()
    } else {
        subscriber.with_writer(std::io::stderr).try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let filter = LogLevelFilter::new(Level::WARN);

        assert!(!filter.should_log(Level::DEBUG));
        assert!(!filter.should_log(Level::INFO));

        assert!(filter.should_log(Level::WARN));
        assert!(filter.should_log(Level::ERROR));
    }

    #[test]
    fn test_level_filter_update() {
        let filter = LogLevelFilter::new(Level::DEBUG);
        assert!(filter.should_log(Level::DEBUG));

        filter.set(Level::ERROR);
        assert!(!filter.should_log(Level::DEBUG));
        assert!(!filter.should_log(Level::WARN));
        assert!(filter.should_log(Level::ERROR));
    }

    #[test]
    fn test_level_roundtrip() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            let filter = LogLevelFilter::new(level);
            assert_eq!(filter.get(), level);
        }
    }

    #[test]
    fn logger_tags_session_and_phase() {
        let logger = Logger::new().with_session("sess-1").with_phase("building");
        assert_eq!(logger.session_id.as_deref(), Some("sess-1"));
        assert_eq!(logger.phase.as_deref(), Some("building"));
    }
}
