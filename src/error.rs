//! The router's error taxonomy: one variant per failure category named in
//! the design, each carrying enough context to log or report usefully.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouterError {
    /// Bad configuration document, unknown filter variant, out-of-range
    /// value that can't be clamped. Fatal at initial load.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A device failed to open or a send failed. Never escalated past the
    /// registry; callers see a partial result instead.
    #[error("device error ({name}): {message}")]
    Device { name: String, message: String },

    /// The clock worker missed a tick boundary by `diff_ns`.
    #[error("clock timing error: missed tick by {diff_ns}ns")]
    Timing { diff_ns: i64 },

    /// A malformed master/worker control payload, or a malformed wire
    /// message (bad status byte, truncated payload, unterminated sysex).
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Anything unanticipated. Logged at Fatal and the process exits 1.
    #[error("unexpected fault: {message}")]
    Fault { message: String },
}

impl RouterError {
    pub fn config(message: impl Into<String>) -> Self {
        RouterError::Config {
            message: message.into(),
        }
    }

    pub fn device(name: impl Into<String>, message: impl Into<String>) -> Self {
        RouterError::Device {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn timing(diff_ns: i64) -> Self {
        RouterError::Timing { diff_ns }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RouterError::Protocol {
            message: message.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        RouterError::Fault {
            message: message.into(),
        }
    }
}
