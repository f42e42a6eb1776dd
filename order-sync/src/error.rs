//! Client error types

use shared::OrderError;
use thiserror::Error;

/// Transport-level error (REST or push)
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied (403)
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend rejected the request (400/409/422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Any other non-success status
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),
}

impl ClientError {
    /// 401/403: retrying with the same token will not help
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Unauthorized | ClientError::Forbidden(_))
    }

    /// Worth retrying on the next tick
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => !e.is_decode() && !e.is_builder(),
            ClientError::Timeout | ClientError::WebSocket(_) | ClientError::Connection(_) => true,
            ClientError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Http(response) => match response.status().as_u16() {
                401 => ClientError::Unauthorized,
                403 => ClientError::Forbidden("push channel upgrade refused".to_string()),
                status => ClientError::Server {
                    status,
                    body: "push channel upgrade refused".to_string(),
                },
            },
            WsError::Io(e) => ClientError::Connection(e.to_string()),
            other => ClientError::WebSocket(other.to_string()),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Outcome of a user-initiated command (status advance, order creation)
///
/// Returned to the initiating view; never retried automatically.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Rejected locally, no network call made
    #[error(transparent)]
    InvalidTransition(OrderError),

    /// Order payload failed local validation, no network call made
    #[error(transparent)]
    InvalidOrder(OrderError),

    /// Order is not in the synchronized collection
    #[error("Unknown order: {0}")]
    UnknownOrder(shared::OrderId),

    /// Another command for this order is still in flight
    #[error("Order {0} has a command in flight")]
    Busy(shared::OrderId),

    /// Session expired or permission denied
    #[error("Session expired or not permitted: {0}")]
    Auth(ClientError),

    /// Transient failure; the user may retry
    #[error("Network error: {0}")]
    Network(ClientError),

    /// Backend refused the command
    #[error("Rejected by backend: {0}")]
    Rejected(ClientError),

    /// Channel has shut down
    #[error("Sync channel closed")]
    Closed,
}

impl CommandError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, CommandError::InvalidTransition(_))
    }
}

impl From<OrderError> for CommandError {
    fn from(err: OrderError) -> Self {
        if err.is_invalid_transition() {
            CommandError::InvalidTransition(err)
        } else {
            CommandError::InvalidOrder(err)
        }
    }
}

impl From<ClientError> for CommandError {
    fn from(err: ClientError) -> Self {
        if err.is_auth() {
            CommandError::Auth(err)
        } else if err.is_transient() {
            CommandError::Network(err)
        } else {
            CommandError::Rejected(err)
        }
    }
}
