use thiserror::Error;

/// Errors raised while performing a privileged operation.
///
/// The router turns each of these into a failure outcome carrying the message.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{0} is not granted")]
    NotGranted(String),

    #[error("Invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Storage error for {namespace}: {message}")]
    Storage { namespace: String, message: String },

    #[error("Tab not found: {0}")]
    TabNotFound(u64),

    #[error("Browser error: {0}")]
    Browser(String),
}

pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    pub fn invalid_arguments(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(namespace: impl Into<String>, message: impl ToString) -> Self {
        Self::Storage {
            namespace: namespace.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            HostError::UnknownOperation("frobnicate".to_string()).to_string(),
            "Unknown operation: frobnicate"
        );
        assert_eq!(
            HostError::NotGranted("GM.setValue".to_string()).to_string(),
            "GM.setValue is not granted"
        );
        assert_eq!(
            HostError::invalid_arguments("setValue", "missing field `key`").to_string(),
            "Invalid arguments for setValue: missing field `key`"
        );
        assert_eq!(HostError::TabNotFound(4).to_string(), "Tab not found: 4");
    }
}
