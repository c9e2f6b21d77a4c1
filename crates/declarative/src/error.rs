//! Error types for property convergence.
//!
//! Errors are split by the phase that raises them: construction
//! (`InvalidValue`), validation (`Validation`), snapshot loading (`Parse`,
//! `Unsupported`) and mutation (`CommandFailed`, `SensitiveCommandFailed`).
//! An entity that does not exist is not an error; loaders return `Ok(None)`.

use thiserror::Error;

/// Errors that can occur while building, validating or converging an entity.
#[derive(Debug, Error)]
pub enum Error {
    /// Coercion or constraint failure on a property
    #[error("invalid value for {property}: {message}")]
    InvalidValue {
        /// Name of the offending property
        property: String,
        /// What was wrong with the value
        message: String,
    },

    /// Required property missing, or property not allowed for the entity subtype
    #[error("{entity}: {message}")]
    Validation {
        /// Entity identifier
        entity: String,
        /// Violated rule
        message: String,
    },

    /// The gateway reported a non-success exit
    #[error("command failed: {command}: {stderr}")]
    CommandFailed {
        /// Printable command line (secrets masked)
        command: String,
        /// Exit status, if the process ran at all
        status: Option<i32>,
        /// Captured stderr
        stderr: String,
    },

    /// A command carrying secrets failed; details are withheld
    #[error("command line and output suppressed due to their sensitive nature")]
    SensitiveCommandFailed,

    /// The daemon returned output we could not understand
    #[error("failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed
        what: String,
        /// Parser message
        message: String,
    },

    /// The daemon cannot do what was asked (missing extension, illegal transition)
    #[error("{entity}: {message}")]
    Unsupported {
        /// Entity identifier
        entity: String,
        /// Explanation
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an `InvalidValue` error.
    pub fn invalid(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a `Validation` error.
    pub fn validation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an `Unsupported` error.
    pub fn unsupported(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error came out of the gateway.
    pub fn is_command_failure(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::SensitiveCommandFailed
        )
    }

    /// Returns true if the error was raised before any mutation could happen.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(self, Self::InvalidValue { .. } | Self::Validation { .. })
    }
}

/// Result type for convergence operations
pub type Result<T> = std::result::Result<T, Error>;
