use thiserror::Error;

use crate::protocol::RpcError;
use crate::state::ClientState;

/// Failure of a protocol-client operation.
///
/// `Clone` so that one outcome can be handed to every waiter of a shared
/// in-flight request.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("failed to launch `{command}`: {message}")]
    Launch { command: String, message: String },

    #[error("{server}: connection is inactive")]
    Inactive { server: String },

    #[error("unsupported position encoding ({encoding}) received from server {server}")]
    UnsupportedPositionEncoding { server: String, encoding: String },

    #[error("{server}: couldn't create connection to server: {message}")]
    StartFailed { server: String, message: String },

    #[error("{server} is not running and can't be stopped; its current state is {state}")]
    NotRunning { server: String, state: ClientState },

    #[error("{server}: stopping the server timed out")]
    StopTimedOut { server: String },

    #[error("{server}: connection closed")]
    ConnectionClosed { server: String },

    #[error("{server} responded with error {code}: {message}")]
    Response {
        server: String,
        code: i64,
        message: String,
    },

    #[error("invalid params for {method}: {message}")]
    InvalidParams { method: String, message: String },

    #[error("malformed payload: {0}")]
    Serialization(String),

    #[error("editor call failed: {0}")]
    Editor(String),
}

impl ClientError {
    pub(crate) fn response(server: &str, error: RpcError) -> Self {
        Self::Response {
            server: server.to_string(),
            code: error.code,
            message: error.message,
        }
    }

    pub(crate) fn invalid_params(method: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::InvalidParams {
            method: method.into(),
            message: err.to_string(),
        }
    }

    /// The send was refused because the client is not active.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive { .. })
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
