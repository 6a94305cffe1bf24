//! Error types for the execution core.
//!
//! # Design
//! Only conditions that stop a call from producing a result envelope live
//! here: bad caller input, malformed requests, transport failures and
//! converter failures. A non-2xx answer from the server is not an error at
//! this layer; it comes back as a `BoxResponse` with `ResponseStatus::Error`.
//! `Api` exists solely for callers that opt into `BoxResponse::into_result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoxError {
    /// A required value was empty. Raised before any network activity.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// The base URI and path segments do not form a valid URL.
    #[error("invalid request uri: {0}")]
    InvalidUri(String),

    /// A multipart request was built without a file part.
    #[error("multipart request has no file part")]
    MissingFilePart,

    /// The request cannot be sent in its current shape.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Connectivity, timeout or TLS failure, passed through from the transport.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Reading a caller-supplied file stream failed.
    #[error("failed to read file part: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The converter rejected a body. `body` holds the raw text when it was
    /// read from a response.
    #[error("deserialization failed: {message}")]
    Deserialization {
        message: String,
        body: Option<String>,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

impl BoxError {
    /// True for errors raised before the request left the process.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BoxError::MissingParameter(_)
                | BoxError::InvalidUri(_)
                | BoxError::MissingFilePart
                | BoxError::Malformed(_)
        )
    }
}
