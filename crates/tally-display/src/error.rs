//! # Display Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Display Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidMessage         │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  Serialization          │ │
//! │  │  Load / Save    │  │  Timeout        │  │  Rejected by hub        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for display operations.
pub type DisplayResult<T> = Result<T, DisplayError>;

#[derive(Debug, Error)]
pub enum DisplayError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid display configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Disconnected from display hub")]
    Disconnected,

    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The hub could not bind its listener.
    #[error("Failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The hub refused the handshake (e.g. `STORE_MISMATCH`).
    #[error("Rejected by hub ({code}): {message}")]
    Rejected { code: String, message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for DisplayError {
    fn from(err: serde_json::Error) -> Self {
        DisplayError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for DisplayError {
    fn from(err: url::ParseError) -> Self {
        DisplayError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DisplayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => DisplayError::Disconnected,
            WsError::Io(io) => DisplayError::ConnectionFailed(io.to_string()),
            other => DisplayError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DisplayError {
    fn from(err: std::io::Error) -> Self {
        DisplayError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DisplayError {
    fn from(err: toml::de::Error) -> Self {
        DisplayError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for DisplayError {
    fn from(err: toml::ser::Error) -> Self {
        DisplayError::ConfigSaveFailed(err.to_string())
    }
}

impl DisplayError {
    /// True if reconnecting may succeed.
    ///
    /// A hub rejection is final: the display is configured for another store.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DisplayError::ConnectionFailed(_)
                | DisplayError::Disconnected
                | DisplayError::Timeout(_)
                | DisplayError::WebSocketError(_)
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DisplayError::InvalidConfig(_)
                | DisplayError::InvalidUrl(_)
                | DisplayError::ConfigLoadFailed(_)
                | DisplayError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(DisplayError::ConnectionFailed("refused".into()).is_retryable());
        assert!(DisplayError::Disconnected.is_retryable());
        assert!(DisplayError::Timeout(10).is_retryable());

        assert!(!DisplayError::Rejected {
            code: "STORE_MISMATCH".into(),
            message: "wrong store".into()
        }
        .is_retryable());
        assert!(!DisplayError::InvalidUrl("http://x".into()).is_retryable());
    }

    #[test]
    fn test_rejection_message() {
        let err = DisplayError::Rejected {
            code: "STORE_MISMATCH".into(),
            message: "Store ID does not match".into(),
        };
        assert!(err.to_string().contains("STORE_MISMATCH"));
    }
}
