//! Request descriptors and their builders.
//!
//! # Design
//! A `BoxRequest` describes one HTTP call as plain data: where it goes, which
//! verb it uses, which headers and parameters it carries. Builder methods
//! take `self` by value and hand back the updated descriptor, so a partially
//! built request cannot be aliased and mutated behind another caller's back.
//!
//! Body selection is fixed by the descriptor's shape. A raw payload, when set,
//! wins over payload parameters. A `BoxMultipartRequest` ignores both and
//! sends its form parts. `GET` never carries a body.
//!
//! File parts borrow the caller's reader. The encoder reads from it but never
//! closes or drops it; releasing it stays with the caller.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncRead;
use url::Url;

use crate::converter::PayloadConverter;
use crate::error::BoxError;

/// HTTP verb of a request. Defaults to `Get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl From<RequestMethod> for reqwest::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Opaque entity tag used for `If-Match` conditional requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ETag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for ETag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptor of a simple (non-multipart) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxRequest {
    base_uri: String,
    segments: Vec<String>,
    method: RequestMethod,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    payload_parameters: Vec<(String, String)>,
    payload: Option<String>,
    authorization: Option<String>,
    timeout: Option<Duration>,
}

impl BoxRequest {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            segments: Vec::new(),
            method: RequestMethod::default(),
            headers: Vec::new(),
            query: Vec::new(),
            payload_parameters: Vec::new(),
            payload: None,
            authorization: None,
            timeout: None,
        }
    }

    /// Append one path segment. Reserved characters are percent-encoded.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn method(mut self, method: RequestMethod) -> Self {
        self.method = method;
        self
    }

    /// Attach a bearer token. The token is not validated; an empty token is
    /// sent as-is.
    pub fn authorize(mut self, token: impl Into<String>) -> Self {
        self.authorization = Some(token.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a header whose value may be absent. `None` attaches the header
    /// with an empty value.
    pub fn optional_header<V: Into<String>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        let value = value.map(Into::into).unwrap_or_default();
        self.header(name, value)
    }

    /// Make the request conditional on the server's entity tag. `None` leaves
    /// the request unconditional and no `If-Match` header is sent.
    pub fn if_match(self, etag: Option<ETag>) -> Self {
        match etag {
            Some(etag) => self.header("If-Match", etag.0),
            None => self,
        }
    }

    /// Append a query parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a form-encoded body parameter, used when no raw payload is set.
    pub fn payload_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload_parameters.push((name.into(), value.into()));
        self
    }

    /// Set a pre-serialized body. Takes precedence over payload parameters.
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Serialize `value` through the converter into the raw payload and mark
    /// the body as JSON.
    pub fn json_payload<C, T>(self, converter: &C, value: &T) -> Result<Self, BoxError>
    where
        C: PayloadConverter,
        T: Serialize,
    {
        let body = converter.serialize(value)?;
        Ok(self.header("Content-Type", "application/json").payload(body))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn http_method(&self) -> RequestMethod {
        self.method
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn payload_parameters(&self) -> &[(String, String)] {
        &self.payload_parameters
    }

    pub fn raw_payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve base URI, path segments and query parameters into a URL.
    /// Query parameters keep insertion order and are form-urlencoded.
    pub fn url(&self) -> Result<Url, BoxError> {
        if self.base_uri.trim().is_empty() {
            return Err(BoxError::MissingParameter("base_uri"));
        }
        let mut url = Url::parse(&self.base_uri)
            .map_err(|e| BoxError::InvalidUri(format!("{}: {e}", self.base_uri)))?;

        if !self.segments.is_empty() {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BoxError::InvalidUri(format!("{} cannot be a base", self.base_uri)))?;
            path.pop_if_empty().extend(&self.segments);
        }

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// A plain text form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringFormPart {
    pub name: String,
    pub value: String,
}

/// A binary form field read from a caller-owned stream.
pub struct FileFormPart<'a> {
    pub name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub(crate) reader: &'a mut (dyn AsyncRead + Send + Unpin),
}

impl<'a> FileFormPart<'a> {
    pub fn new<R>(name: impl Into<String>, file_name: impl Into<String>, reader: &'a mut R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content_type: None,
            reader,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl fmt::Debug for FileFormPart<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFormPart")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum FormPart<'a> {
    String(StringFormPart),
    File(FileFormPart<'a>),
}

impl<'a> FormPart<'a> {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormPart::String(StringFormPart {
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn file<R>(name: impl Into<String>, file_name: impl Into<String>, reader: &'a mut R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        FormPart::File(FileFormPart::new(name, file_name, reader))
    }

    pub fn name(&self) -> &str {
        match self {
            FormPart::String(part) => &part.name,
            FormPart::File(part) => &part.name,
        }
    }
}

impl<'a> From<FileFormPart<'a>> for FormPart<'a> {
    fn from(part: FileFormPart<'a>) -> Self {
        FormPart::File(part)
    }
}

impl From<StringFormPart> for FormPart<'_> {
    fn from(part: StringFormPart) -> Self {
        FormPart::String(part)
    }
}

/// Descriptor of a multipart/form-data upload. Defaults to `POST`.
#[derive(Debug)]
pub struct BoxMultipartRequest<'a> {
    request: BoxRequest,
    parts: Vec<FormPart<'a>>,
}

impl<'a> BoxMultipartRequest<'a> {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self::from_request(BoxRequest::new(base_uri).method(RequestMethod::Post))
    }

    pub fn from_request(request: BoxRequest) -> Self {
        Self {
            request,
            parts: Vec::new(),
        }
    }

    pub fn segment(self, segment: impl Into<String>) -> Self {
        self.map_request(|r| r.segment(segment))
    }

    pub fn method(self, method: RequestMethod) -> Self {
        self.map_request(|r| r.method(method))
    }

    pub fn authorize(self, token: impl Into<String>) -> Self {
        self.map_request(|r| r.authorize(token))
    }

    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_request(|r| r.header(name, value))
    }

    pub fn if_match(self, etag: Option<ETag>) -> Self {
        self.map_request(|r| r.if_match(etag))
    }

    pub fn param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_request(|r| r.param(name, value))
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.map_request(|r| r.timeout(timeout))
    }

    pub fn form_part(mut self, part: impl Into<FormPart<'a>>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn request(&self) -> &BoxRequest {
        &self.request
    }

    pub fn parts(&self) -> &[FormPart<'a>] {
        &self.parts
    }

    pub fn into_parts(self) -> (BoxRequest, Vec<FormPart<'a>>) {
        (self.request, self.parts)
    }

    fn map_request(mut self, f: impl FnOnce(BoxRequest) -> BoxRequest) -> Self {
        self.request = f(self.request);
        self
    }
}

/// Either shape of request accepted by the executor.
#[derive(Debug)]
pub enum ApiRequest<'a> {
    Simple(BoxRequest),
    Multipart(BoxMultipartRequest<'a>),
}

impl From<BoxRequest> for ApiRequest<'_> {
    fn from(request: BoxRequest) -> Self {
        ApiRequest::Simple(request)
    }
}

impl<'a> From<BoxMultipartRequest<'a>> for ApiRequest<'a> {
    fn from(request: BoxMultipartRequest<'a>) -> Self {
        ApiRequest::Multipart(request)
    }
}
