//! Client gateway errors

use thiserror::Error;

/// Errors surfaced by the client gateway.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store rejected or failed the request.
    #[error("api error: {0}")]
    Api(String),

    /// The kubeconfig could not be read or produced no usable client.
    #[error("configuration error: {0}")]
    Config(String),

    /// An object could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the error is a not-found read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}
