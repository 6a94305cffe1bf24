//! HTTP execution core for a cloud-storage API client.
//!
//! # Overview
//! Callers describe a call with `BoxRequest` (or `BoxMultipartRequest` for
//! uploads), hand it to a `BoxExecutor`, and get back a `BoxResponse` whose
//! payload shape was chosen up front: `RawBytes`, `ByteStream` or
//! `Structured<T>`.
//!
//! # Design
//! - Descriptors are plain data built by value; nothing is sent until
//!   `BoxExecutor::execute`.
//! - The transport client is injected, shared, and never global.
//! - Server-side failures (non-2xx) are results, not errors. `BoxError` is
//!   reserved for bad input, malformed requests, transport failures and
//!   converter failures.
//! - Structured payloads go through a `PayloadConverter`; the core never
//!   parses them itself.

pub mod converter;
pub mod decode;
pub mod error;
pub mod executor;
pub mod multipart;
pub mod request;
pub mod response;

pub use converter::{JsonConverter, PayloadConverter};
pub use decode::{BodyReader, ByteStream, DecodeMode, RawBytes, ResultKind, Structured};
pub use error::BoxError;
pub use executor::{BoxExecutor, ClientConfig, PreparedRequest};
pub use multipart::{EncodedMultipart, MultipartEncoder, MultipartWarning};
pub use request::{
    ApiRequest, BoxMultipartRequest, BoxRequest, ETag, FileFormPart, FormPart, RequestMethod,
    StringFormPart,
};
pub use response::{ApiErrorBody, BoxResponse, ResponseStatus};
