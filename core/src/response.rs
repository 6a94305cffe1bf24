//! The result envelope returned from every executed request.
//!
//! # Design
//! A non-2xx answer is ordinary data here, not an `Err`. Callers branch on
//! `status` and keep the server's body text for diagnostics. `into_result`
//! converts to a `Result` for callers that prefer `?`.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
}

impl ResponseStatus {
    /// `Success` for 2xx codes, `Error` for everything else.
    pub fn from_code(code: u16) -> Self {
        if (200..300).contains(&code) {
            ResponseStatus::Success
        } else {
            ResponseStatus::Error
        }
    }
}

/// Error payload the API returns alongside non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub context_info: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct BoxResponse<T> {
    pub status: ResponseStatus,
    pub status_code: u16,
    pub headers: HeaderMap,
    /// Decoded payload. Absent on error responses and on empty success bodies.
    pub response_object: Option<T>,
    /// Raw body text for buffered text results and for every error response.
    pub content_string: Option<String>,
    /// Server error payload, when an error body could be read as one.
    pub error: Option<ApiErrorBody>,
}

impl<T> BoxResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// The entity tag the server reported for this resource, if any.
    pub fn etag(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
    }

    /// Success yields the decoded object; an error response becomes
    /// `BoxError::Api` carrying the status code and raw body.
    pub fn into_result(self) -> Result<Option<T>, BoxError> {
        match self.status {
            ResponseStatus::Success => Ok(self.response_object),
            ResponseStatus::Error => Err(BoxError::Api {
                status: self.status_code,
                body: self.content_string.unwrap_or_default(),
            }),
        }
    }
}
