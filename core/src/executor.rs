//! Turns request descriptors into HTTP calls and decodes the answers.
//!
//! # Design
//! `BoxExecutor` holds only a shared `reqwest::Client` and a payload
//! converter. Both are handed in at construction; there is no ambient
//! client. Each call is independent: the descriptor is translated into a
//! `reqwest::Request`, sent exactly once, and the response is decoded into a
//! `BoxResponse` according to the caller's chosen result kind.
//!
//! `prepare` stops before the network so callers and tests can inspect the
//! exact wire request. `execute` is `prepare` followed by a single send.
//!
//! No retries and no timeouts are applied here beyond what the client or the
//! descriptor configure.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::converter::{JsonConverter, PayloadConverter};
use crate::decode::{decode, ResultKind};
use crate::error::BoxError;
use crate::multipart::{MultipartEncoder, MultipartWarning};
use crate::request::{ApiRequest, BoxRequest, RequestMethod};
use crate::response::BoxResponse;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Settings used to build the shared transport client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub user_agent: String,
    /// Whole-request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("box-core/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `BOX_USER_AGENT`, `BOX_HTTP_TIMEOUT_SECS` and
    /// `BOX_HTTP_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(agent) = std::env::var("BOX_USER_AGENT") {
            config.user_agent = agent;
        }
        config.timeout = env_secs("BOX_HTTP_TIMEOUT_SECS");
        config.connect_timeout = env_secs("BOX_HTTP_CONNECT_TIMEOUT_SECS");
        config
    }

    pub fn build_client(&self) -> Result<reqwest::Client, BoxError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric timeout");
            None
        }
    }
}

/// A wire request that has been built but not sent.
#[derive(Debug)]
pub struct PreparedRequest {
    pub request: reqwest::Request,
    pub warnings: Vec<MultipartWarning>,
}

#[derive(Debug, Clone)]
pub struct BoxExecutor<C = JsonConverter> {
    client: reqwest::Client,
    converter: C,
}

impl BoxExecutor<JsonConverter> {
    /// Wrap an existing client. The client must be built with
    /// `redirect::Policy::none()`; a client that follows redirects re-sends
    /// the request and reports the target's status instead of the 3xx.
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_converter(client, JsonConverter)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, BoxError> {
        Ok(Self::new(config.build_client()?))
    }
}

impl<C: PayloadConverter> BoxExecutor<C> {
    pub fn with_converter(client: reqwest::Client, converter: C) -> Self {
        Self { client, converter }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Build the wire request for `request` without sending it.
    ///
    /// Precondition and malformed-request errors are raised here. For
    /// multipart requests this reads the file part's stream.
    pub async fn prepare<'a>(
        &self,
        request: impl Into<ApiRequest<'a>>,
    ) -> Result<PreparedRequest, BoxError> {
        match request.into() {
            ApiRequest::Simple(request) => {
                let url = request.url()?;
                let mut headers = header_map(&request)?;
                let mut builder = self.client.request(request.http_method().into(), url);

                if let Some((content_type, body)) = simple_body(&request)? {
                    if let Some(content_type) = content_type {
                        if !headers.contains_key(CONTENT_TYPE) {
                            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                        }
                    }
                    builder = builder.body(body);
                }
                if let Some(timeout) = request.request_timeout() {
                    builder = builder.timeout(timeout);
                }

                Ok(PreparedRequest {
                    request: builder.headers(headers).build()?,
                    warnings: Vec::new(),
                })
            }
            ApiRequest::Multipart(request) => {
                let (request, parts) = request.into_parts();
                if request.http_method() == RequestMethod::Get {
                    return Err(BoxError::Malformed(
                        "multipart body cannot be sent with GET".to_string(),
                    ));
                }
                let url = request.url()?;
                let encoded = MultipartEncoder::new().encode(parts).await?;

                let mut headers = header_map(&request)?;
                let content_type = HeaderValue::from_str(&encoded.content_type())
                    .map_err(|e| BoxError::Malformed(format!("multipart content type: {e}")))?;
                headers.insert(CONTENT_TYPE, content_type);

                let mut builder = self
                    .client
                    .request(request.http_method().into(), url)
                    .headers(headers)
                    .body(encoded.body);
                if let Some(timeout) = request.request_timeout() {
                    builder = builder.timeout(timeout);
                }

                Ok(PreparedRequest {
                    request: builder.build()?,
                    warnings: encoded.warnings,
                })
            }
        }
    }

    /// Send `request` once and decode the response as `K`.
    ///
    /// Non-2xx answers come back as `Ok` with `ResponseStatus::Error`.
    /// Transport failures are returned unchanged as `BoxError::Transport`.
    pub async fn execute<'a, K: ResultKind>(
        &self,
        request: impl Into<ApiRequest<'a>>,
    ) -> Result<BoxResponse<K::Output>, BoxError> {
        let prepared = self.prepare(request).await?;
        tracing::debug!(
            method = %prepared.request.method(),
            url = %prepared.request.url(),
            mode = ?K::MODE,
            "sending request"
        );

        let response = self.client.execute(prepared.request).await?;
        tracing::debug!(status = response.status().as_u16(), "response received");

        decode::<K, C>(response, &self.converter).await
    }
}

/// Collect the descriptor's headers plus authorization. Later duplicates
/// replace earlier ones. Headers that cannot be represented on the wire are
/// skipped; an unsendable token is an error, since dropping it would send
/// the call anonymously.
fn header_map(request: &BoxRequest) -> Result<HeaderMap, BoxError> {
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping header that cannot be sent"),
        }
    }
    if let Some(token) = request.authorization() {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            BoxError::Malformed("authorization token cannot be sent as a header".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Body for a simple request, with the content type to use when the caller
/// set none. `GET` never has one; `PUT` and `DELETE` carry parameters just
/// like `POST` does.
fn simple_body(request: &BoxRequest) -> Result<Option<(Option<&'static str>, String)>, BoxError> {
    if request.http_method() == RequestMethod::Get {
        if request.raw_payload().is_some() || !request.payload_parameters().is_empty() {
            tracing::debug!("payload on GET request not sent");
        }
        return Ok(None);
    }
    if let Some(payload) = request.raw_payload() {
        return Ok(Some((None, payload.to_string())));
    }
    if request.payload_parameters().is_empty() {
        return Ok(None);
    }
    let body = serde_urlencoded::to_string(request.payload_parameters())
        .map_err(|e| BoxError::Serialization(e.to_string()))?;
    Ok(Some((Some(FORM_URLENCODED), body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{BoxMultipartRequest, ETag, FormPart};

    const BASE: &str = "https://api.box.com/2.0";

    fn executor() -> BoxExecutor {
        BoxExecutor::from_config(&ClientConfig::default()).unwrap()
    }

    fn body_of(request: &reqwest::Request) -> Option<&[u8]> {
        request.body().and_then(|b| b.as_bytes())
    }

    fn header<'r>(request: &'r reqwest::Request, name: &str) -> Option<&'r str> {
        request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn get_has_no_body_and_ordered_query() {
        let req = BoxRequest::new(BASE)
            .segment("search")
            .param("query", "annual report")
            .param("type", "file")
            .payload_param("ignored", "x");
        let prepared = executor().prepare(req).await.unwrap();

        assert_eq!(prepared.request.method(), reqwest::Method::GET);
        assert_eq!(
            prepared.request.url().as_str(),
            "https://api.box.com/2.0/search?query=annual+report&type=file"
        );
        assert!(prepared.request.body().is_none());
    }

    #[tokio::test]
    async fn post_sends_form_encoded_parameters() {
        let req = BoxRequest::new(BASE)
            .segment("oauth2")
            .segment("token")
            .method(RequestMethod::Post)
            .payload_param("grant_type", "refresh_token")
            .payload_param("refresh_token", "a b");
        let prepared = executor().prepare(req).await.unwrap();

        assert_eq!(body_of(&prepared.request), Some(&b"grant_type=refresh_token&refresh_token=a+b"[..]));
        assert_eq!(header(&prepared.request, "content-type"), Some(FORM_URLENCODED));
    }

    #[tokio::test]
    async fn raw_payload_wins_over_parameters() {
        let req = BoxRequest::new(BASE)
            .method(RequestMethod::Post)
            .header("Content-Type", "application/json")
            .payload_param("name", "ignored")
            .payload(r#"{"name":"kept"}"#);
        let prepared = executor().prepare(req).await.unwrap();

        assert_eq!(body_of(&prepared.request), Some(&br#"{"name":"kept"}"#[..]));
        assert_eq!(header(&prepared.request, "content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn put_and_delete_carry_parameters_as_body() {
        for method in [RequestMethod::Put, RequestMethod::Delete] {
            let req = BoxRequest::new(BASE).method(method).payload_param("recursive", "true");
            let prepared = executor().prepare(req).await.unwrap();
            assert_eq!(body_of(&prepared.request), Some(&b"recursive=true"[..]), "{method:?}");
        }
    }

    #[tokio::test]
    async fn delete_without_parameters_has_no_body() {
        let req = BoxRequest::new(BASE).method(RequestMethod::Delete);
        let prepared = executor().prepare(req).await.unwrap();
        assert!(prepared.request.body().is_none());
    }

    #[tokio::test]
    async fn authorization_and_conditional_headers_are_attached() {
        let req = BoxRequest::new(BASE)
            .authorize("secret")
            .if_match(Some(ETag::new("5")))
            .header("X-Dup", "first")
            .header("X-Dup", "second");
        let prepared = executor().prepare(req).await.unwrap();

        assert_eq!(header(&prepared.request, "authorization"), Some("Bearer secret"));
        assert_eq!(header(&prepared.request, "if-match"), Some("5"));
        assert_eq!(header(&prepared.request, "x-dup"), Some("second"));
        assert_eq!(prepared.request.headers().get_all("x-dup").iter().count(), 1);
    }

    #[tokio::test]
    async fn unsendable_headers_are_skipped() {
        let req = BoxRequest::new(BASE)
            .header("bad header", "v")
            .header("X-Line", "a\nb")
            .header("X-Ok", "fine");
        let prepared = executor().prepare(req).await.unwrap();

        assert_eq!(prepared.request.headers().len(), 1);
        assert_eq!(header(&prepared.request, "x-ok"), Some("fine"));
    }

    #[tokio::test]
    async fn unsendable_token_is_rejected_not_dropped() {
        let req = BoxRequest::new(BASE).authorize("bad\ntoken");
        let err = executor().prepare(req).await.unwrap_err();
        assert!(matches!(err, BoxError::Malformed(_)));
    }

    #[tokio::test]
    async fn empty_base_uri_fails_before_sending() {
        let err = executor().prepare(BoxRequest::new("")).await.unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn multipart_content_type_matches_body_boundary() {
        let mut file: &[u8] = b"payload";
        let req = BoxMultipartRequest::new(BASE)
            .segment("files")
            .segment("content")
            .authorize("t")
            .form_part(FormPart::file("file", "p.bin", &mut file))
            .form_part(FormPart::string("attributes", r#"{"name":"p.bin"}"#));
        let prepared = executor().prepare(req).await.unwrap();

        let content_type = header(&prepared.request, "content-type").unwrap().to_string();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let body = String::from_utf8(body_of(&prepared.request).unwrap().to_vec()).unwrap();
        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
        assert_eq!(body.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert_eq!(prepared.request.method(), reqwest::Method::POST);
    }

    #[tokio::test]
    async fn multipart_without_file_never_reaches_the_client() {
        let req = BoxMultipartRequest::new(BASE).form_part(FormPart::string("attributes", "{}"));
        let err = executor().prepare(req).await.unwrap_err();
        assert!(matches!(err, BoxError::MissingFilePart));
    }

    #[tokio::test]
    async fn multipart_get_is_malformed() {
        let mut file: &[u8] = b"x";
        let req = BoxMultipartRequest::new(BASE)
            .method(RequestMethod::Get)
            .form_part(FormPart::file("file", "x", &mut file));
        let err = executor().prepare(req).await.unwrap_err();
        assert!(matches!(err, BoxError::Malformed(_)));
    }

    #[tokio::test]
    async fn same_builder_calls_produce_identical_wire_requests() {
        let build = || {
            BoxRequest::new(BASE)
                .segment("files")
                .segment("9")
                .method(RequestMethod::Put)
                .authorize("t")
                .param("fields", "name")
                .payload(r#"{"name":"n"}"#)
        };
        let a = executor().prepare(build()).await.unwrap().request;
        let b = executor().prepare(build()).await.unwrap().request;

        assert_eq!(a.method(), b.method());
        assert_eq!(a.url(), b.url());
        assert_eq!(a.headers(), b.headers());
        assert_eq!(body_of(&a), body_of(&b));
    }

    #[tokio::test]
    async fn multipart_requests_match_once_boundary_is_normalized() {
        async fn encode() -> String {
            let mut file: &[u8] = b"same";
            let req = BoxMultipartRequest::new(BASE)
                .form_part(FormPart::file("file", "s.txt", &mut file))
                .form_part(FormPart::string("parent_id", "0"));
            let prepared = executor().prepare(req).await.unwrap();
            let content_type = header(&prepared.request, "content-type").unwrap().to_string();
            let boundary = content_type.rsplit('=').next().unwrap().to_string();
            String::from_utf8(body_of(&prepared.request).unwrap().to_vec())
                .unwrap()
                .replace(&boundary, "BOUNDARY")
        }
        assert_eq!(encode().await, encode().await);
    }

    #[test]
    fn default_config_sets_no_timeouts() {
        let config = ClientConfig::default();
        assert!(config.timeout.is_none());
        assert!(config.connect_timeout.is_none());
        assert!(config.user_agent.starts_with("box-core/"));
    }
}
