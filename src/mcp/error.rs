//! MCP Error Types
//!
//! Design Decision: one `thiserror`-derived enum for the whole taxonomy
//!
//! Rationale: the Manager and the Child Connection fail in a small, closed
//! set of ways: unknown spec, not connected, not initialized, spawn
//! failure, transport failure, protocol failure, timeout. A single enum
//! with `#[from]` conversions for `io::Error` and `serde_json::Error` lets
//! `?` compose through spawn/write/parse paths while still giving callers
//! a name to match on.
//!
//! "Already connected" is deliberately *not* a variant here - it's a
//! non-error sentinel returned by `connectServer`, not a failure.

use thiserror::Error;

use crate::mcp::protocol::JsonRpcError;

#[derive(Debug, Error)]
pub enum McpError {
    /// `connectServer`/`registerServer` referenced a name with no registered spec.
    #[error("no server registered under the name '{0}'")]
    SpecUnknown(String),

    /// Any operation addressed a server name with no live connection.
    #[error("server '{0}' is not connected")]
    NotConnected(String),

    /// A user operation was attempted before the MCP handshake completed.
    #[error("connection to '{0}' is not initialized")]
    NotInitialized(String),

    /// The OS refused to spawn the child, or a pipe was not established.
    #[error("failed to spawn server '{0}': {1}")]
    SpawnFailure(String, String),

    /// A write to stdin failed, or the connection has entered `[closing]`.
    #[error("transport error on '{0}': {1}")]
    Transport(String, String),

    /// The child returned a JSON-RPC `error` object for a request.
    #[error("server '{server}' rejected '{method}': {message} (code {code})")]
    Protocol {
        server: String,
        method: String,
        code: i32,
        message: String,
    },

    /// No response arrived within the per-request deadline.
    #[error("request '{method}' to '{server}' timed out after {timeout_secs}s")]
    Timeout {
        server: String,
        method: String,
        timeout_secs: u64,
    },

    /// IO failure not already classified as a spawn or transport failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A request or response payload could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A registered spec, or an override supplied to `connectServer`, was malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl McpError {
    pub fn protocol(server: impl Into<String>, method: impl Into<String>, err: JsonRpcError) -> Self {
        Self::Protocol {
            server: server.into(),
            method: method.into(),
            code: err.code,
            message: err.message,
        }
    }
}

pub type Result<T> = std::result::Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_names_the_server() {
        let err = McpError::NotConnected("filesystem".into());
        assert_eq!(err.to_string(), "server 'filesystem' is not connected");
    }

    #[test]
    fn protocol_error_carries_remote_code_and_message() {
        let err = McpError::protocol(
            "filesystem",
            "tools/call",
            JsonRpcError {
                code: -32601,
                message: "unknown tool".into(),
                data: None,
            },
        );
        let rendered = err.to_string();
        assert!(rendered.contains("-32601"));
        assert!(rendered.contains("unknown tool"));
        assert!(rendered.contains("filesystem"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "enoent");
        let err: McpError = io_err.into();
        assert!(matches!(err, McpError::Io(_)));
    }
}
