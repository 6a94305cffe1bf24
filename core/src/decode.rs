//! Response decoding by expected result kind.
//!
//! # Design
//! The caller names the result kind up front with one of three marker types:
//! `RawBytes`, `ByteStream` or `Structured<T>`. The set is sealed, so the
//! decoder only ever sees those three shapes. Dispatch never looks at the
//! response `Content-Type`; a body that does not match `T` surfaces as a
//! converter error.
//!
//! Error responses are handled the same way for every kind: the body is
//! buffered as text so the caller can inspect what the server said, and no
//! response object is produced.

use std::future::Future;
use std::io;
use std::marker::PhantomData;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use tokio_util::io::StreamReader;

use crate::converter::PayloadConverter;
use crate::error::BoxError;
use crate::response::{ApiErrorBody, BoxResponse, ResponseStatus};

/// Live response body. Nothing has been read from it when it is handed out.
pub type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    RawBytes,
    ByteStream,
    Structured,
}

/// Payload half of a decoded success response.
#[derive(Debug)]
pub struct DecodedBody<T> {
    pub object: Option<T>,
    pub content: Option<String>,
}

mod sealed {
    pub trait Sealed {}
}

/// The expected shape of a successful response body.
pub trait ResultKind: sealed::Sealed {
    type Output: Send;

    const MODE: DecodeMode;

    fn decode_body<C: PayloadConverter>(
        response: reqwest::Response,
        converter: &C,
    ) -> impl Future<Output = Result<DecodedBody<Self::Output>, BoxError>> + Send;
}

/// Whole body buffered into memory.
#[derive(Debug, Clone, Copy)]
pub struct RawBytes;

/// Body exposed as an unread `AsyncRead`.
#[derive(Debug, Clone, Copy)]
pub struct ByteStream;

/// Body read as text and handed to the payload converter.
#[derive(Debug)]
pub struct Structured<T>(PhantomData<fn() -> T>);

impl sealed::Sealed for RawBytes {}
impl sealed::Sealed for ByteStream {}
impl<T> sealed::Sealed for Structured<T> {}

impl ResultKind for RawBytes {
    type Output = Bytes;

    const MODE: DecodeMode = DecodeMode::RawBytes;

    fn decode_body<C: PayloadConverter>(
        response: reqwest::Response,
        _converter: &C,
    ) -> impl Future<Output = Result<DecodedBody<Bytes>, BoxError>> + Send {
        async move {
            let bytes = response.bytes().await?;
            Ok(DecodedBody {
                object: Some(bytes),
                content: None,
            })
        }
    }
}

impl ResultKind for ByteStream {
    type Output = BodyReader;

    const MODE: DecodeMode = DecodeMode::ByteStream;

    fn decode_body<C: PayloadConverter>(
        response: reqwest::Response,
        _converter: &C,
    ) -> impl Future<Output = Result<DecodedBody<BodyReader>, BoxError>> + Send {
        async move {
            Ok(DecodedBody {
                object: Some(into_reader(response)),
                content: None,
            })
        }
    }
}

impl<T> ResultKind for Structured<T>
where
    T: DeserializeOwned + Send,
{
    type Output = T;

    const MODE: DecodeMode = DecodeMode::Structured;

    fn decode_body<C: PayloadConverter>(
        response: reqwest::Response,
        converter: &C,
    ) -> impl Future<Output = Result<DecodedBody<T>, BoxError>> + Send {
        async move {
            let text = response.text().await?;
            // 204 and friends carry nothing to convert.
            let object = if text.is_empty() {
                None
            } else {
                match converter.deserialize(&text) {
                    Ok(object) => Some(object),
                    Err(BoxError::Deserialization { message, .. }) => {
                        return Err(BoxError::Deserialization {
                            message,
                            body: Some(text),
                        })
                    }
                    Err(err) => return Err(err),
                }
            };
            Ok(DecodedBody {
                object,
                content: Some(text),
            })
        }
    }
}

/// Turn a transport response into a result envelope for kind `K`.
pub async fn decode<K, C>(
    response: reqwest::Response,
    converter: &C,
) -> Result<BoxResponse<K::Output>, BoxError>
where
    K: ResultKind,
    C: PayloadConverter,
{
    let status_code = response.status().as_u16();
    let status = ResponseStatus::from_code(status_code);
    let headers = response.headers().clone();

    if status == ResponseStatus::Error {
        let text = response.text().await?;
        let error = converter.deserialize::<ApiErrorBody>(&text).ok();
        return Ok(BoxResponse {
            status,
            status_code,
            headers,
            response_object: None,
            content_string: Some(text),
            error,
        });
    }

    let body = K::decode_body(response, converter).await?;
    Ok(BoxResponse {
        status,
        status_code,
        headers,
        response_object: body.object,
        content_string: body.content,
        error: None,
    })
}

fn into_reader(response: reqwest::Response) -> BodyReader {
    let stream = response.bytes_stream().map_err(io::Error::other).boxed();
    StreamReader::new(stream)
}
