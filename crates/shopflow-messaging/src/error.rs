use std::time::Duration;

/// Errors raised by the messaging layer.
///
/// Connection-level variants are handled by the supervisor, publish and
/// handler variants by the relay/consumer/inbox loops. None of them are meant
/// to reach HTTP-facing domain code.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("connection is shutting down")]
    ShuttingDown,
    #[error("failed to connect to broker: {0}")]
    ConnectFailure(String),
    #[error("broker operation failed: {0}")]
    Broker(String),
    #[error("publish failed: {0}")]
    PublishFailure(String),
    #[error("delivery stream closed")]
    StreamClosed,
    #[error("handler failed: {0}")]
    HandlerFailure(String),
    #[error("handler timed out after {0:?}")]
    HandlerTimeout(Duration),
    #[error("malformed payload: {0}")]
    DecodeFailure(String),
    #[error("failed to encode payload")]
    Encode(#[from] serde_json::Error),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl MessagingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::ConnectFailure(_) => "CONNECT_FAILURE",
            Self::Broker(_) => "BROKER",
            Self::PublishFailure(_) => "PUBLISH_FAILURE",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::HandlerFailure(_) => "HANDLER_FAILURE",
            Self::HandlerTimeout(_) => "HANDLER_TIMEOUT",
            Self::DecodeFailure(_) => "DECODE_FAILURE",
            Self::Encode(_) => "ENCODE",
            Self::Store(_) => "STORE",
        }
    }

    /// Shorthand for business handlers reporting a retryable failure.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::HandlerFailure(err.to_string())
    }

    /// Shorthand for handlers rejecting a payload they cannot parse.
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::DecodeFailure(err.to_string())
    }

    /// Whether retrying the same message can ever succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DecodeFailure(_) | Self::Encode(_))
    }
}
