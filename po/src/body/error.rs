//! Tool error taxonomy
//!
//! Every failure escaping a Body capability is a `ToolError`. The orchestrator
//! retries only transient classes; protocol and shape failures fail the
//! inference outright.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by Body capabilities
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("LLM timeout after {0:?}")]
    LlmTimeout(Duration),

    #[error("LLM protocol error: {0}")]
    LlmProtocol(String),

    #[error("LLM transport error: {0}")]
    LlmTransport(String),

    #[error("LLM API error {status}: {message}")]
    LlmApi { status: u16, message: String },

    #[error("File I/O error on {path}: {message}")]
    FileIo { path: PathBuf, message: String },

    #[error("Path {path} escapes the run sandbox {sandbox}")]
    SandboxViolation { path: PathBuf, sandbox: PathBuf },

    #[error("Script error ({entrypoint}): {message}")]
    ScriptError { entrypoint: String, message: String },

    #[error("User input cancelled")]
    UserInputCancelled,

    #[error("Cancelled")]
    Cancelled,

    #[error("Unknown paradigm {0}")]
    UnknownParadigm(String),

    #[error("Bad paradigm spec {name}: {message}")]
    BadParadigm { name: String, message: String },

    #[error("Unknown affordance {0}")]
    UnknownAffordance(String),

    #[error("Formatter error: {0}")]
    Formatter(String),

    #[error("Perception error: {0}")]
    Perception(String),
}

impl ToolError {
    /// Transient errors qualify for the bounded retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            ToolError::LlmTimeout(_) | ToolError::LlmTransport(_) => true,
            ToolError::LlmApi { status, .. } => *status >= 500 || *status == 429,
            ToolError::FileIo { .. } => false,
            ToolError::LlmProtocol(_)
            | ToolError::SandboxViolation { .. }
            | ToolError::ScriptError { .. }
            | ToolError::UserInputCancelled
            | ToolError::Cancelled
            | ToolError::UnknownParadigm(_)
            | ToolError::BadParadigm { .. }
            | ToolError::UnknownAffordance(_)
            | ToolError::Formatter(_)
            | ToolError::Perception(_) => false,
        }
    }

    /// Cancellation is terminal for the inference and never retried
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ToolError::Cancelled | ToolError::UserInputCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ToolError::LlmTimeout(Duration::from_secs(1)).is_transient());
        assert!(ToolError::LlmTransport("reset".into()).is_transient());
        assert!(
            ToolError::LlmApi {
                status: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            ToolError::LlmApi {
                status: 429,
                message: "rate".into()
            }
            .is_transient()
        );
        assert!(
            !ToolError::LlmApi {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
        assert!(!ToolError::LlmProtocol("bad json".into()).is_transient());
        assert!(!ToolError::Cancelled.is_transient());
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(ToolError::Cancelled.is_cancellation());
        assert!(ToolError::UserInputCancelled.is_cancellation());
        assert!(!ToolError::LlmProtocol("x".into()).is_cancellation());
    }
}
