use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Id of the file every fresh `app()` starts with.
pub const FIXTURE_ID: &str = "1001";
pub const FIXTURE_NAME: &str = "readme.txt";
pub const FIXTURE_CONTENT: &[u8] = b"hello from the mock drive";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub etag: String,
    pub size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: u16,
    pub code: String,
    pub message: String,
}

/// One section of a multipart upload as the server parsed it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadResult {
    pub entries: Vec<BoxFile>,
    pub parts: Vec<ReceivedPart>,
}

/// What the server saw on `/echo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EchoReply {
    pub method: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub if_match: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct UpdateFile {
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
struct StoredFile {
    meta: BoxFile,
    content: Vec<u8>,
}

type Db = Arc<RwLock<HashMap<String, StoredFile>>>;

struct ApiFailure {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("file {id} not found"))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: "error".to_string(),
            status: self.status.as_u16(),
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn app() -> Router {
    let fixture = StoredFile {
        meta: BoxFile {
            kind: "file".to_string(),
            id: FIXTURE_ID.to_string(),
            name: FIXTURE_NAME.to_string(),
            etag: "0".to_string(),
            size: FIXTURE_CONTENT.len() as u64,
        },
        content: FIXTURE_CONTENT.to_vec(),
    };
    let db: Db = Arc::new(RwLock::new(HashMap::from([(FIXTURE_ID.to_string(), fixture)])));
    Router::new()
        .route("/files/content", post(upload_file))
        .route("/files/{id}", get(get_file).put(update_file).delete(delete_file))
        .route("/files/{id}/content", get(download_file))
        .route("/echo", any(echo))
        .route("/moved", any(moved))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn require_auth(headers: &HeaderMap) -> Result<(), ApiFailure> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty());
    match bearer {
        Some(_) => Ok(()),
        None => Err(ApiFailure::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing bearer token",
        )),
    }
}

fn check_if_match(headers: &HeaderMap, file: &BoxFile) -> Result<(), ApiFailure> {
    match headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()) {
        Some(tag) if tag != file.etag => Err(ApiFailure::new(
            StatusCode::PRECONDITION_FAILED,
            "precondition_failed",
            "the resource has been modified",
        )),
        _ => Ok(()),
    }
}

fn with_etag(file: &BoxFile) -> [(header::HeaderName, String); 1] {
    [(header::ETAG, file.etag.clone())]
}

async fn get_file(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiFailure> {
    require_auth(&headers)?;
    let files = db.read().await;
    let file = files.get(&id).ok_or_else(|| ApiFailure::not_found(&id))?;
    Ok((with_etag(&file.meta), Json(file.meta.clone())))
}

async fn update_file(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateFile>,
) -> Result<impl IntoResponse, ApiFailure> {
    require_auth(&headers)?;
    let mut files = db.write().await;
    let file = files.get_mut(&id).ok_or_else(|| ApiFailure::not_found(&id))?;
    check_if_match(&headers, &file.meta)?;
    if let Some(name) = input.name {
        file.meta.name = name;
    }
    let next = file.meta.etag.parse::<u64>().unwrap_or(0) + 1;
    file.meta.etag = next.to_string();
    Ok((with_etag(&file.meta), Json(file.meta.clone())))
}

async fn delete_file(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiFailure> {
    require_auth(&headers)?;
    let mut files = db.write().await;
    let file = files.get(&id).ok_or_else(|| ApiFailure::not_found(&id))?;
    check_if_match(&headers, &file.meta)?;
    files.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn download_file(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiFailure> {
    require_auth(&headers)?;
    let files = db.read().await;
    let file = files.get(&id).ok_or_else(|| ApiFailure::not_found(&id))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        file.content.clone(),
    ))
}

async fn upload_file(
    State(db): State<Db>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiFailure> {
    require_auth(&headers)?;

    let mut parts = Vec::new();
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiFailure::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiFailure::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string()))?;

        if upload.is_none() {
            if let Some(file_name) = &file_name {
                upload = Some((file_name.clone(), data.to_vec()));
            }
        }
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            content: String::from_utf8_lossy(&data).into_owned(),
        });
    }

    let (file_name, content) = upload.ok_or_else(|| {
        ApiFailure::new(StatusCode::BAD_REQUEST, "bad_request", "no file part in upload")
    })?;
    let stored = StoredFile {
        meta: BoxFile {
            kind: "file".to_string(),
            id: Uuid::new_v4().simple().to_string(),
            name: file_name,
            etag: "0".to_string(),
            size: content.len() as u64,
        },
        content,
    };
    let meta = stored.meta.clone();
    db.write().await.insert(meta.id.clone(), stored);

    Ok((
        StatusCode::CREATED,
        Json(UploadResult {
            entries: vec![meta],
            parts,
        }),
    ))
}

async fn moved() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/echo")])
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<EchoReply> {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(EchoReply {
        method: method.to_string(),
        query: uri.query().map(str::to_string),
        authorization: text(header::AUTHORIZATION),
        if_match: text(header::IF_MATCH),
        content_type: text(header::CONTENT_TYPE),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_serializes_type_field() {
        let file = BoxFile {
            kind: "file".to_string(),
            id: "1".to_string(),
            name: "a.txt".to_string(),
            etag: "0".to_string(),
            size: 3,
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["etag"], "0");
    }

    #[test]
    fn update_file_name_is_optional() {
        let input: UpdateFile = serde_json::from_str("{}").unwrap();
        assert!(input.name.is_none());
    }

    #[test]
    fn mismatched_if_match_is_rejected() {
        let file = BoxFile {
            kind: "file".to_string(),
            id: "1".to_string(),
            name: "a".to_string(),
            etag: "2".to_string(),
            size: 0,
        };
        let mut headers = HeaderMap::new();
        assert!(check_if_match(&headers, &file).is_ok());
        headers.insert(header::IF_MATCH, "2".parse().unwrap());
        assert!(check_if_match(&headers, &file).is_ok());
        headers.insert(header::IF_MATCH, "1".parse().unwrap());
        let failure = check_if_match(&headers, &file).err().unwrap();
        assert_eq!(failure.status, StatusCode::PRECONDITION_FAILED);
    }
}
