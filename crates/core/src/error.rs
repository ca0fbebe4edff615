// Error handling for the media session bridge

use crate::state::ConnectionState;
use thiserror::Error;

/// Reasons a connection to the session provider could not be established
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The provider service is not running or could not be reached
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider refused the connection
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other provider-reported failure
    #[error("connection failed: {0}")]
    Other(String),
}

/// Bridge error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Connecting to the session provider failed
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// A transport command was issued while no session was connected
    #[error("Not connected (connection is {state:?})")]
    NotConnected { state: ConnectionState },

    /// The live session rejected a forwarded command
    #[error("Command error: {0}")]
    Command(String),

    /// Unknown bridge handle (FFI)
    #[error("Invalid bridge handle")]
    InvalidHandle,

    /// Bad argument passed across the FFI boundary
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, BridgeError::NotConnected { .. })
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}
