use crate::xhr::lifecycle::Stage;
use crate::xhr::response::XhrResponse;
use thiserror::Error;

/// Errors surfaced to callers of the bridge client
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge disconnected")]
    Disconnected,

    /// The host reported a failure outcome
    #[error("{0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A network operation settled in `aborted`, `errored` or `timed-out`
    #[error("Network request {}{}", .stage.name(), .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Network {
        stage: Stage,
        message: Option<String>,
        response: Box<XhrResponse>,
    },

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Check if this error comes from the transport rather than the operation
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(BridgeError::Disconnected.to_string(), "Bridge disconnected");
        assert_eq!(
            BridgeError::Rejected("GM.setValue is not granted".to_string()).to_string(),
            "GM.setValue is not granted"
        );

        let err = BridgeError::Network {
            stage: Stage::TimedOut,
            message: None,
            response: Box::default(),
        };
        assert_eq!(err.to_string(), "Network request timed-out");

        let err = BridgeError::Network {
            stage: Stage::Errored,
            message: Some("connection refused".to_string()),
            response: Box::default(),
        };
        assert_eq!(err.to_string(), "Network request errored: connection refused");
        assert!(!err.is_transport());
        assert!(BridgeError::Disconnected.is_transport());
    }
}
