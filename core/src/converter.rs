//! Structured-payload converter seam.
//!
//! The core never parses structured content itself. It hands body text to a
//! `PayloadConverter` and treats whatever comes back as opaque.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BoxError;

/// Translates between wire text and typed domain objects.
pub trait PayloadConverter: Send + Sync {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String, BoxError>;

    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T, BoxError>;
}

/// JSON converter backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl PayloadConverter for JsonConverter {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String, BoxError> {
        serde_json::to_string(value).map_err(|e| BoxError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T, BoxError> {
        serde_json::from_str(content).map_err(|e| BoxError::Deserialization {
            message: e.to_string(),
            body: None,
        })
    }
}
