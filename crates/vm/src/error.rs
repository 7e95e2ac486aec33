//! Error types for the Teascript engine.
//!
//! Compile errors carry the offending line; runtime errors carry a
//! formatted stack trace. Both unwind to the nearest protected call
//! through ordinary `Result` propagation.

use thiserror::Error;

/// Engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeaError {
    /// Syntax or semantic error detected during compilation.
    #[error("[line {line}] Error{location}: {message}")]
    Compile {
        line: u32,
        location: String,
        message: String,
    },

    /// Error raised while executing bytecode or inside a native callback.
    #[error("{message}\n{trace}")]
    Runtime { message: String, trace: String },

    /// I/O failure while loading a source file or module.
    #[error("IO error: {message}")]
    Io { message: String },
}

impl TeaError {
    /// Create a compile error located at a token.
    pub fn compile<S: Into<String>>(line: u32, location: S, message: S) -> Self {
        Self::Compile {
            line,
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a runtime error with a pre-formatted stack trace.
    pub fn runtime<S: Into<String>>(message: S, trace: S) -> Self {
        Self::Runtime {
            message: message.into(),
            trace: trace.into(),
        }
    }

    /// Create an I/O error.
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// True for errors produced by the compiler front end.
    pub fn is_compile(&self) -> bool {
        matches!(self, TeaError::Compile { .. })
    }

    /// True for errors raised during execution.
    pub fn is_runtime(&self) -> bool {
        matches!(self, TeaError::Runtime { .. })
    }

    /// The message without location or trace decoration.
    pub fn message(&self) -> &str {
        match self {
            TeaError::Compile { message, .. } => message,
            TeaError::Runtime { message, .. } => message,
            TeaError::Io { message } => message,
        }
    }
}

/// Result type for engine operations.
pub type TeaResult<T> = std::result::Result<T, TeaError>;

impl From<std::io::Error> for TeaError {
    fn from(error: std::io::Error) -> Self {
        TeaError::io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display() {
        let error = TeaError::compile(3, " at 'x'", "Undefined variable");
        assert_eq!(error.to_string(), "[line 3] Error at 'x': Undefined variable");
        assert!(error.is_compile());
        assert!(!error.is_runtime());
    }

    #[test]
    fn runtime_error_keeps_message() {
        let error = TeaError::runtime("Bad call", "[line 1] in script");
        assert_eq!(error.message(), "Bad call");
        assert!(error.is_runtime());
    }
}
