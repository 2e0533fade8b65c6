#![forbid(unsafe_code)]

//! Host-level error taxonomy.
//!
//! Propagation policy:
//!
//! - `Arg` and `Limit` become guest-visible `(nil, message)` returns and
//!   never abort the host.
//! - `Guest` transitions the computer to Halt.
//! - `Config` and `Init` abort `Client::load()` (it returns false).
//! - `Io` during a framer flush is logged and retried; three consecutive
//!   failures escalate to Halt.

use std::fmt;
use std::io;

use boxen_value::ArgError;

/// Top-level error type for the machine runtime.
#[derive(Debug)]
pub enum ClientError {
    /// Missing section or malformed configuration value.
    Config(String),
    /// A component rejected its configuration, or a required component is
    /// missing.
    Init(String),
    /// The interpreter raised, or produced an invalid yield.
    Guest(String),
    /// File or terminal failure.
    Io(io::Error),
    /// A guest-supplied argument failed coercion.
    Arg(ArgError),
    /// Memory, energy, or signal-queue exhaustion.
    Limit(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Guest(msg) => write!(f, "guest: {msg}"),
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Arg(err) => write!(f, "{err}"),
            Self::Limit(msg) => write!(f, "limit: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Arg(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ArgError> for ClientError {
    fn from(err: ArgError) -> Self {
        Self::Arg(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_severity_class() {
        assert_eq!(
            ClientError::Init("exactly one computer required".into()).to_string(),
            "init: exactly one computer required"
        );
    }

    #[test]
    fn arg_errors_keep_their_message() {
        let err = ClientError::Arg(ArgError {
            index: 1,
            expected: "string",
            found: "nil",
        });
        assert_eq!(err.to_string(), "bad argument #1 (string expected, got nil)");
    }
}
