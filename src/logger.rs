//! Process-wide logger with a standalone/embedded split, mirroring the
//! teacher's `logger.rs`: most processes just want println/eprintln, but
//! the seam to forward structured events over a channel is kept so a
//! future supervisor process can consume them instead of owning a
//! terminal.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        write!(f, "[{}]", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    pub source: &'static str,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.source, self.message)
    }
}

enum LoggerMode {
    Standalone,
    Embedded(Sender<LogEvent>),
}

pub struct Logger {
    mode: Mutex<LoggerMode>,
    min_severity: AtomicU8,
}

impl Logger {
    fn new_standalone() -> Self {
        Logger {
            mode: Mutex::new(LoggerMode::Standalone),
            min_severity: AtomicU8::new(Severity::Info as u8),
        }
    }

    pub fn set_embedded_mode(&self, sender: Sender<LogEvent>) {
        *self.mode.lock().unwrap() = LoggerMode::Embedded(sender);
    }

    pub fn set_standalone_mode(&self) {
        *self.mode.lock().unwrap() = LoggerMode::Standalone;
    }

    pub fn set_verbose(&self, verbose: bool) {
        let level = if verbose { Severity::Debug } else { Severity::Info };
        self.min_severity.store(level as u8, Ordering::Relaxed);
    }

    pub fn log(&self, severity: Severity, source: &'static str, message: String) {
        if (severity as u8) < self.min_severity.load(Ordering::Relaxed) {
            return;
        }
        let event = LogEvent {
            severity,
            message,
            source,
        };
        let mode = self.mode.lock().unwrap();
        match &*mode {
            LoggerMode::Standalone => {
                if matches!(severity, Severity::Error | Severity::Fatal) {
                    eprintln!("{}", event);
                } else {
                    println!("{}", event);
                }
            }
            LoggerMode::Embedded(sender) => {
                if sender.try_send(event.clone()).is_err() {
                    eprintln!("{} (channel full, dropped)", event);
                }
            }
        }
    }

    pub fn debug(&self, source: &'static str, message: String) {
        self.log(Severity::Debug, source, message)
    }
    pub fn info(&self, source: &'static str, message: String) {
        self.log(Severity::Info, source, message)
    }
    pub fn warn(&self, source: &'static str, message: String) {
        self.log(Severity::Warn, source, message)
    }
    pub fn error(&self, source: &'static str, message: String) {
        self.log(Severity::Error, source, message)
    }
    pub fn fatal(&self, source: &'static str, message: String) {
        self.log(Severity::Fatal, source, message)
    }
}

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn get_logger() -> &'static Logger {
    GLOBAL_LOGGER.get_or_init(Logger::new_standalone)
}

pub fn init_embedded() -> Receiver<LogEvent> {
    let (tx, rx) = crossbeam_channel::unbounded();
    get_logger().set_embedded_mode(tx);
    rx
}

pub fn set_verbose(verbose: bool) {
    get_logger().set_verbose(verbose);
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().debug(module_path!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().info(module_path!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().warn(module_path!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().error(module_path!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().fatal(module_path!(), format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_gates_debug_by_default() {
        let logger = Logger::new_standalone();
        assert_eq!(logger.min_severity.load(Ordering::Relaxed), Severity::Info as u8);
        logger.set_verbose(true);
        assert_eq!(logger.min_severity.load(Ordering::Relaxed), Severity::Debug as u8);
    }

    #[test]
    fn embedded_mode_forwards_events() {
        let logger = Logger::new_standalone();
        let (tx, rx) = crossbeam_channel::unbounded();
        logger.set_embedded_mode(tx);
        logger.info("test", "hello".to_string());
        let event = rx.recv().unwrap();
        assert_eq!(event.message, "hello");
        assert_eq!(event.severity, Severity::Info);
    }
}
