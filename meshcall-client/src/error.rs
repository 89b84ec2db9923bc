use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Call client error types
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Media access failed: {0}")]
    MediaAccess(String),

    #[error("Signaling channel disconnected")]
    ChannelDisconnected,

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Transport failed: {0}")]
    TransportFailure(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Mesh coordinator stopped")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl ClientError {
    /// Failures a fresh peer link may recover from. Anything else ends the
    /// mesh's attempts for that peer.
    pub fn is_link_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::Negotiation(_) | ClientError::TransportFailure(_) | ClientError::Transport(_)
        )
    }
}
