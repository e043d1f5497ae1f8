//! End-to-end pipeline runs against in-process mock services
//!
//! Each test spins up axum servers on ephemeral ports standing in for the
//! token endpoint, the host query endpoint, the resolved upload host and the
//! default fallback host.

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

use imgup::acquire::Acquirer;
use imgup::digest::digest;
use imgup::error::PipelineError;
use imgup::http::{HttpClient, HttpConfig};
use imgup::pipeline::{Pipeline, Stage};
use imgup::qiniu::{AuthError, TokenClient, UploadError, Uploader};
use imgup::transcode::{Encoder, TranscodeError};

const USER_TOKEN: &str = "user-secret";
const UPLOAD_TOKEN: &str = "AKTEST:signature:policy";
const BUCKET: &str = "chat68";

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

/// Address nothing listens on
async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

// ---------------------------------------------------------------------------
// Upload host mock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Received {
    token: String,
    key: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone)]
enum UploadReply {
    /// 200 with a receipt echoing the key
    Echo,
    Fixed(u16, &'static str),
}

#[derive(Clone)]
struct UploadHost {
    addr: String,
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl UploadHost {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last(&self) -> Received {
        self.received.lock().unwrap().last().cloned().unwrap()
    }
}

#[derive(Clone)]
struct UploadState {
    reply: UploadReply,
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn upload_handler(
    State(state): State<UploadState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut received = Received {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..Received::default()
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "token" => received.token = field.text().await.unwrap(),
            "key" => received.key = field.text().await.unwrap(),
            "file" => {
                received.file_name = field.file_name().map(str::to_string);
                received.content_type = field.content_type().map(str::to_string);
                received.bytes = field.bytes().await.unwrap().to_vec();
            }
            _ => {}
        }
    }

    let reply = match &state.reply {
        UploadReply::Echo => (
            StatusCode::OK,
            format!(
                r#"{{"hash":"FqHash","key":"{}","fsize":{}}}"#,
                received.key,
                received.bytes.len()
            ),
        ),
        UploadReply::Fixed(status, body) => {
            (StatusCode::from_u16(*status).unwrap(), body.to_string())
        }
    };

    state.received.lock().unwrap().push(received);
    reply
}

async fn spawn_upload_host(reply: UploadReply) -> UploadHost {
    let hits = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = UploadState {
        reply,
        hits: hits.clone(),
        received: received.clone(),
    };

    let app = Router::new()
        .route("/", post(upload_handler))
        .with_state(state);

    UploadHost {
        addr: serve(app).await,
        hits,
        received,
    }
}

// ---------------------------------------------------------------------------
// Token + host query mock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum QueryReply {
    Domain(String),
    Status(u16),
    /// 200 with a body that is not JSON
    Garbage,
    /// 200 with valid JSON but no `domains` array
    NoDomains,
}

#[derive(Clone)]
struct AuthState {
    token_reply: (u16, String),
    query_reply: QueryReply,
    token_hits: Arc<AtomicUsize>,
    seen_user_token: Arc<Mutex<Option<String>>>,
    seen_query: Arc<Mutex<HashMap<String, String>>>,
}

async fn token_handler(State(state): State<AuthState>, headers: HeaderMap) -> (StatusCode, String) {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    *state.seen_user_token.lock().unwrap() = headers
        .get("token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (status, body) = &state.token_reply;
    (StatusCode::from_u16(*status).unwrap(), body.clone())
}

async fn query_handler(
    State(state): State<AuthState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    *state.seen_query.lock().unwrap() = params;

    match &state.query_reply {
        QueryReply::Domain(domain) => (
            StatusCode::OK,
            format!(r#"{{"hosts":[{{"region":"z2","up":{{"domains":["{domain}","backup.invalid"]}}}}]}}"#),
        ),
        QueryReply::Status(status) => (StatusCode::from_u16(*status).unwrap(), String::new()),
        QueryReply::Garbage => (StatusCode::OK, "<html>gateway</html>".to_string()),
        QueryReply::NoDomains => (StatusCode::OK, r#"{"hosts":[{"region":"z2","up":{}}]}"#.to_string()),
    }
}

struct AuthService {
    addr: String,
    state: AuthState,
}

async fn spawn_auth(token_status: u16, token_body: &str, query_reply: QueryReply) -> AuthService {
    let state = AuthState {
        token_reply: (token_status, token_body.to_string()),
        query_reply,
        token_hits: Arc::new(AtomicUsize::new(0)),
        seen_user_token: Arc::new(Mutex::new(None)),
        seen_query: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/token", get(token_handler))
        .route("/query", get(query_handler))
        .with_state(state.clone());

    AuthService {
        addr: serve(app).await,
        state,
    }
}

fn token_ok() -> String {
    format!(r#"{{"code":1,"msg":"ok","data":{{"token":"{UPLOAD_TOKEN}"}}}}"#)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Stands in for cwebp: fixed output, records the requested quality
#[derive(Default)]
struct FakeEncoder {
    qualities: Mutex<Vec<u8>>,
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, input: Bytes, quality: u8) -> Result<Bytes, TranscodeError> {
        self.qualities.lock().unwrap().push(quality);
        let mut out = b"RIFFWEBP".to_vec();
        out.extend_from_slice(&input);
        Ok(Bytes::from(out))
    }
}

struct FailingEncoder;

#[async_trait]
impl Encoder for FailingEncoder {
    async fn encode(&self, _input: Bytes, _quality: u8) -> Result<Bytes, TranscodeError> {
        Err(TranscodeError::Other("unsupported image".to_string()))
    }
}

fn http() -> HttpClient {
    HttpClient::new(HttpConfig::default()).unwrap()
}

fn pipeline(auth: &AuthService, fallback: &UploadHost, encoder: Option<Arc<dyn Encoder>>) -> Pipeline {
    let http = http();
    Pipeline::builder()
        .acquirer(Acquirer::new(http.clone()))
        .tokens(
            TokenClient::new(http.clone(), format!("http://{}/token", auth.addr))
                .with_query_url(format!("http://{}/query", auth.addr))
                .with_default_host(fallback.addr.clone()),
        )
        .uploader(
            Uploader::new(http)
                .with_scheme("http")
                .with_fallback_host(fallback.addr.clone()),
        )
        .user_token(USER_TOKEN)
        .bucket(BUCKET)
        .maybe_encoder(encoder)
        .build()
}

fn write_image(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_local_file_without_webp() {
    let primary = spawn_upload_host(UploadReply::Echo).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(format!("http://{}", primary.addr))).await;

    let temp_dir = TempDir::new().unwrap();
    let bytes = b"not really a png";
    let input = write_image(&temp_dir, "photo.png", bytes);

    let outcome = pipeline(&auth, &fallback, None).run(&input).await.unwrap();

    let expected_key = format!("{}.png", digest(bytes));
    assert_eq!(outcome.key.as_str(), expected_key);
    assert_eq!(outcome.host, primary.addr);
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.attempts, 1);

    let report = outcome.report();
    assert!(report.starts_with("上传成功\nresponse_json:\n{\n"));
    assert!(report.contains(&format!("  \"key\": \"{expected_key}\"")));

    assert_eq!(primary.hits(), 1);
    assert_eq!(fallback.hits(), 0);

    let received = primary.last();
    assert_eq!(received.token, UPLOAD_TOKEN);
    assert_eq!(received.key, expected_key);
    assert_eq!(received.file_name.as_deref(), Some(expected_key.as_str()));
    assert_eq!(received.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(received.bytes, bytes);
    assert_eq!(received.user_agent.as_deref(), Some("QiniuDart"));

    assert_eq!(auth.state.seen_user_token.lock().unwrap().as_deref(), Some(USER_TOKEN));
    let query = auth.state.seen_query.lock().unwrap().clone();
    assert_eq!(query.get("ak").map(String::as_str), Some("AKTEST"));
    assert_eq!(query.get("bucket").map(String::as_str), Some(BUCKET));
}

#[tokio::test]
async fn test_file_without_extension_uses_bin() {
    let primary = spawn_upload_host(UploadReply::Echo).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "README", b"plain bytes");

    let outcome = pipeline(&auth, &fallback, None).run(&input).await.unwrap();
    assert_eq!(outcome.key.as_str(), format!("{}.bin", digest(b"plain bytes")));
}

#[tokio::test]
async fn test_webp_mode_hashes_encoded_bytes() {
    let primary = spawn_upload_host(UploadReply::Echo).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let source = b"jpeg payload";
    let input = write_image(&temp_dir, "cat.jpg", source);

    let encoder = Arc::new(FakeEncoder::default());
    let outcome = pipeline(&auth, &fallback, Some(encoder.clone() as Arc<dyn Encoder>))
        .run(&input)
        .await
        .unwrap();

    let mut encoded = b"RIFFWEBP".to_vec();
    encoded.extend_from_slice(source);
    let expected_key = format!("{}.webp", digest(&encoded));

    assert_eq!(outcome.key.as_str(), expected_key);
    assert_ne!(outcome.key.content_hash(), digest(source));
    assert_eq!(*encoder.qualities.lock().unwrap(), vec![95]);

    let received = primary.last();
    assert_eq!(received.content_type.as_deref(), Some("image/webp"));
    assert_eq!(received.bytes, encoded);
}

#[tokio::test]
async fn test_transcode_failure_stops_before_auth() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(fallback.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "cat.jpg", b"jpeg payload");

    let err = pipeline(&auth, &fallback, Some(Arc::new(FailingEncoder)))
        .run(&input)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "TRANSCODE_ERROR");
    assert_eq!(err.stage(), Stage::Transcoding);
    assert_eq!(auth.state.token_hits.load(Ordering::SeqCst), 0);
    assert_eq!(fallback.hits(), 0);
}

#[tokio::test]
async fn test_auth_rejection_is_terminal() {
    let primary = spawn_upload_host(UploadReply::Echo).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, r#"{"code":0,"msg":"invalid token"}"#, QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let err = pipeline(&auth, &fallback, None).run(&input).await.unwrap_err();

    assert!(matches!(err, PipelineError::Auth(AuthError::Rejected { .. })));
    assert_eq!(err.code(), "AUTH_ERROR");
    assert_eq!(auth.state.token_hits.load(Ordering::SeqCst), 1);
    assert_eq!(primary.hits(), 0);
    assert_eq!(fallback.hits(), 0);
}

#[tokio::test]
async fn test_auth_http_error() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(500, "upstream down", QueryReply::Status(500)).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let err = pipeline(&auth, &fallback, None).run(&input).await.unwrap_err();

    assert_eq!(err.code(), "AUTH_ERROR");
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn test_top_level_token_is_accepted() {
    let primary = spawn_upload_host(UploadReply::Echo).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let body = format!(r#"{{"code":1,"token":"{UPLOAD_TOKEN}"}}"#);
    let auth = spawn_auth(200, &body, QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    pipeline(&auth, &fallback, None).run(&input).await.unwrap();
    assert_eq!(primary.last().token, UPLOAD_TOKEN);
}

#[tokio::test]
async fn test_host_query_failure_uses_default_host() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Status(503)).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let outcome = pipeline(&auth, &fallback, None).run(&input).await.unwrap();

    assert_eq!(outcome.host, fallback.addr);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(fallback.hits(), 1);
}

#[tokio::test]
async fn test_unknown_host_retries_once_on_default_host() {
    let primary = spawn_upload_host(UploadReply::Fixed(400, r#"{"error":"no such domain"}"#)).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let bytes = b"retry me";
    let input = write_image(&temp_dir, "photo.png", bytes);

    let outcome = pipeline(&auth, &fallback, None).run(&input).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.host, fallback.addr);
    assert_eq!(primary.hits(), 1);
    assert_eq!(fallback.hits(), 1);

    // the retry carries the same key and payload
    assert_eq!(primary.last().key, fallback.last().key);
    assert_eq!(fallback.last().bytes, bytes);
}

#[tokio::test]
async fn test_failed_retry_is_final() {
    let primary = spawn_upload_host(UploadReply::Fixed(400, r#"{"error":"no such domain"}"#)).await;
    let fallback = spawn_upload_host(UploadReply::Fixed(400, r#"{"error":"no such domain"}"#)).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let err = pipeline(&auth, &fallback, None).run(&input).await.unwrap_err();

    assert!(matches!(err, PipelineError::Upload(UploadError::Rejected { status: 400, .. })));
    assert_eq!(err.code(), "UPLOAD_REJECTED");
    assert_eq!(err.stage(), Stage::RetryUploading);
    assert_eq!(primary.hits(), 1);
    assert_eq!(fallback.hits(), 1);
}

#[tokio::test]
async fn test_other_rejections_are_not_retried() {
    let primary = spawn_upload_host(UploadReply::Fixed(401, r#"{"error":"bad token"}"#)).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(primary.addr.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let err = pipeline(&auth, &fallback, None).run(&input).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("bad token"));
    assert_eq!(primary.hits(), 1);
    assert_eq!(fallback.hits(), 0);
}

#[tokio::test]
async fn test_missing_file_fails_before_network() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Status(500)).await;

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("absent.png").to_string_lossy().into_owned();

    let err = pipeline(&auth, &fallback, None).run(&input).await.unwrap_err();

    assert_eq!(err.code(), "FILE_READ_ERROR");
    assert_eq!(auth.state.token_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_url_input_is_downloaded() {
    let image = Router::new()
        .route(
            "/images/cat.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg; charset=binary")], "jpeg over http") }),
        )
        .route(
            "/missing.png",
            get(|| async { (StatusCode::NOT_FOUND, "no such file") }),
        );
    let image_addr = serve(image).await;

    let primary = spawn_upload_host(UploadReply::Echo).await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(primary.addr.clone())).await;
    let pipeline = pipeline(&auth, &fallback, None);

    let outcome = pipeline
        .run(&format!("http://{image_addr}/images/cat.jpg?size=large"))
        .await
        .unwrap();
    assert_eq!(outcome.key.as_str(), format!("{}.jpg", digest(b"jpeg over http")));
    assert_eq!(primary.last().content_type.as_deref(), Some("image/jpeg"));

    let err = pipeline
        .run(&format!("http://{image_addr}/missing.png"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DOWNLOAD_ERROR");
    assert_eq!(err.status(), Some(404));
    assert_eq!(primary.hits(), 1);
}

#[tokio::test]
async fn test_unparseable_host_query_uses_default_host() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Garbage).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let outcome = pipeline(&auth, &fallback, None).run(&input).await.unwrap();

    assert_eq!(outcome.host, fallback.addr);
    assert_eq!(fallback.hits(), 1);
}

#[tokio::test]
async fn test_host_query_without_domains_uses_default_host() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::NoDomains).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let outcome = pipeline(&auth, &fallback, None).run(&input).await.unwrap();

    assert_eq!(outcome.host, fallback.addr);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_unreachable_host_query_uses_default_host() {
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Status(500)).await;
    let query_addr = closed_addr().await;

    let http = http();
    let pipeline = Pipeline::builder()
        .acquirer(Acquirer::new(http.clone()))
        .tokens(
            TokenClient::new(http.clone(), format!("http://{}/token", auth.addr))
                .with_query_url(format!("http://{query_addr}/query"))
                .with_default_host(fallback.addr.clone()),
        )
        .uploader(
            Uploader::new(http)
                .with_scheme("http")
                .with_fallback_host(fallback.addr.clone()),
        )
        .user_token(USER_TOKEN)
        .bucket(BUCKET)
        .build();

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let outcome = pipeline.run(&input).await.unwrap();

    assert_eq!(outcome.host, fallback.addr);
    assert_eq!(fallback.hits(), 1);
}

#[tokio::test]
async fn test_transport_failure_is_not_retried() {
    let unreachable = closed_addr().await;
    let fallback = spawn_upload_host(UploadReply::Echo).await;
    let auth = spawn_auth(200, &token_ok(), QueryReply::Domain(unreachable.clone())).await;

    let temp_dir = TempDir::new().unwrap();
    let input = write_image(&temp_dir, "photo.png", b"bytes");

    let err = pipeline(&auth, &fallback, None).run(&input).await.unwrap_err();

    assert!(matches!(
        &err,
        PipelineError::Upload(UploadError::Transport { host, attempts: 1, .. }) if *host == unreachable
    ));
    assert_eq!(err.code(), "TRANSPORT_ERROR");
    assert_eq!(err.stage(), Stage::Uploading);
    assert_eq!(err.status(), None);
    assert_eq!(fallback.hits(), 0);
}
