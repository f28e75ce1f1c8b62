use thiserror::Error;

/// Errors raised while preparing a network request, before any event is emitted
#[derive(Error, Debug)]
pub enum XhrError {
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type XhrResult<T> = Result<T, XhrError>;
