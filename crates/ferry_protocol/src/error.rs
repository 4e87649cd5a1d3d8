//! Uniform failure type for remote project calls.

use thiserror::Error;

/// Why a remote call produced no usable result.
///
/// The orchestrator treats every variant the same way ("that step failed");
/// the variants exist so the failure can be logged with full context.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Request never completed (DNS, TLS, timeout, connection reset).
    #[error("{operation}: transport error: {message}")]
    Transport { operation: String, message: String },

    /// Server answered with a non-success HTTP status.
    #[error("{operation}: HTTP {status} {reason}: {body}")]
    Status {
        operation: String,
        status: u16,
        reason: String,
        body: String,
    },

    /// Response body could not be interpreted.
    #[error("{operation}: malformed response: {message}")]
    Malformed { operation: String, message: String },

    /// Server answered successfully but with nothing in it.
    #[error("{operation}: empty response")]
    Empty { operation: String },
}

impl ConnectorError {
    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        ConnectorError::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(operation: impl Into<String>, message: impl ToString) -> Self {
        ConnectorError::Malformed {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn empty(operation: impl Into<String>) -> Self {
        ConnectorError::Empty {
            operation: operation.into(),
        }
    }

    /// Name of the remote operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            ConnectorError::Transport { operation, .. }
            | ConnectorError::Status { operation, .. }
            | ConnectorError::Malformed { operation, .. }
            | ConnectorError::Empty { operation } => operation,
        }
    }
}

pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;
