//! Error types for the call-session coordinator

use thiserror::Error;

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors that can occur while coordinating call sessions
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Action targets a call that is not in the registry
    #[error("Call not found: {call_id}")]
    NotFound { call_id: String },

    /// Requester is not allowed to act on this call
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// A session with this call id already exists
    #[error("Call already exists: {call_id}")]
    AlreadyExists { call_id: String },

    /// The requested transition is not valid from the call's current state
    #[error("Invalid state for {action}: call {call_id} is {state}")]
    InvalidState {
        call_id: String,
        state: String,
        action: String,
    },

    /// Durable write failed; non-fatal to the real-time path
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Token verification failed
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Wire protocol or transport failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoordinatorError {
    /// Create a not-found error for a call id
    pub fn not_found(call_id: impl Into<String>) -> Self {
        Self::NotFound {
            call_id: call_id.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create an already-exists error for a call id
    pub fn already_exists(call_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            call_id: call_id.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(
        call_id: impl Into<String>,
        state: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            call_id: call_id.into(),
            state: state.into(),
            action: action.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(e: sqlx::Error) -> Self {
        Self::persistence(e.to_string())
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(e: serde_json::Error) -> Self {
        Self::transport(e.to_string())
    }
}
