// HTTP routing layer
//
// Thin axum surface over the pipeline: a blocking JSON endpoint, an SSE
// endpoint streaming per-job status events, artifact retrieval with
// post-serve cleanup, and the activity log download.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::activity::{ActivityLog, ActivityRecord};
use crate::artifacts::ArtifactStore;
use crate::config::Settings;
use crate::downloader::{status, Orchestrator, StatusEvent, StatusSender, StatusUpdate, ToolUpdater};
use crate::error::{Error, Result};
use crate::normalizer::{self, CanonicalUrl, Platform};

/// Events buffered per job before the producer has to wait for the
/// consumer; bounded so a slow client applies backpressure without loss.
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<ArtifactStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub updater: Arc<ToolUpdater>,
    pub activity: Arc<ActivityLog>,
}

#[derive(Debug, Deserialize)]
pub struct VideoRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub success: bool,
    pub download_id: String,
    pub filename: String,
    pub platform: Platform,
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    url: String,
}

/// Create the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/log", get(get_log))
        .route("/api/download", post(download))
        .route("/api/download/stream", get(download_stream))
        .route("/api/download/{id}", get(get_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Download the activity log file.
async fn get_log(State(state): State<AppState>) -> Result<Response> {
    let contents = tokio::fs::read_to_string(state.activity.path())
        .await
        .map_err(|_| Error::not_found("No activity log found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"activity.log\"".to_string(),
            ),
        ],
        contents,
    )
        .into_response())
}

/// Non-streaming download: runs the whole pipeline before responding.
async fn download(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<VideoRequest>,
) -> Result<Json<VideoResponse>> {
    spawn_update_check(&state);

    let url = validate_request_url(&request.url, &state.settings)?;
    let canonical = normalizer::normalize(&url)?;
    let platform = canonical.platform;

    // No live consumer for this variant; events go nowhere
    let (tx, rx) = status::channel(STATUS_CHANNEL_CAPACITY);
    drop(rx);
    let outcome = state.orchestrator.run(canonical, &tx).await?;

    let client = client_info(&headers, addr);
    state
        .activity
        .record(ActivityRecord {
            user: &client.user,
            ip: &client.ip,
            country: &client.country,
            url: &request.url,
            size_bytes: outcome.artifact.size_bytes,
        })
        .await;

    Ok(Json(VideoResponse {
        success: true,
        download_id: outcome.artifact.id.to_string(),
        filename: outcome.artifact.display_filename,
        platform,
    }))
}

/// Streaming download: the pipeline runs in its own task while status
/// events flow to the client as SSE. Exactly one terminal event (`error`
/// or `complete`) is emitted per job. A client disconnect does not cancel
/// the pipeline; the channel simply stops being read.
async fn download_stream(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    spawn_update_check(&state);

    let (tx, rx) = status::channel(STATUS_CHANNEL_CAPACITY);
    tx.status("Validating URL...").await;

    let validated = validate_request_url(&params.url, &state.settings)
        .and_then(|url| normalizer::normalize(&url));
    match validated {
        Ok(canonical) => {
            tx.status(format!("Connecting to {}...", canonical.platform))
                .await;
            let client = client_info(&headers, addr);
            let original_url = params.url.clone();
            tokio::spawn(run_streaming_job(state, canonical, original_url, client, tx));
        }
        Err(e) => {
            // Terminal: the sender drops here and the stream ends after
            // the buffered events drain
            tx.error(e.to_string()).await;
        }
    }

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(to_sse_event(event)), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn run_streaming_job(
    state: AppState,
    canonical: CanonicalUrl,
    original_url: String,
    client: ClientInfo,
    tx: StatusSender,
) {
    let platform = canonical.platform;
    match state.orchestrator.run(canonical, &tx).await {
        Ok(outcome) => {
            state
                .activity
                .record(ActivityRecord {
                    user: &client.user,
                    ip: &client.ip,
                    country: &client.country,
                    url: &original_url,
                    size_bytes: outcome.artifact.size_bytes,
                })
                .await;
            tx.complete(
                outcome.artifact.id.to_string(),
                outcome.artifact.display_filename,
                platform,
            )
            .await;
        }
        Err(e) => tx.error(e.to_string()).await,
    }
}

/// Retrieve a finished artifact by id and schedule its post-serve
/// deletion.
async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let artifact = state.store.get(&id).await?;
    Arc::clone(&state.store).schedule_post_serve_delete(artifact.id);

    let file = tokio::fs::File::open(&artifact.file_path)
        .await
        .map_err(|_| Error::not_found("File not found or expired"))?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_LENGTH, artifact.size_bytes.to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&artifact.display_filename),
            ),
        ],
        body,
    )
        .into_response())
}

fn spawn_update_check(state: &AppState) {
    let updater = Arc::clone(&state.updater);
    tokio::spawn(async move { updater.check(false).await });
}

struct ClientInfo {
    user: String,
    ip: String,
    country: String,
}

/// Identity headers set by the Cloudflare front; the peer address is the
/// fallback for the client IP.
fn client_info(headers: &HeaderMap, addr: SocketAddr) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ClientInfo {
        user: header("cf-access-authenticated-user-email").unwrap_or_else(|| "unknown".into()),
        ip: header("cf-connecting-ip").unwrap_or_else(|| addr.ip().to_string()),
        country: header("cf-ipcountry").unwrap_or_else(|| "unknown".into()),
    }
}

fn validate_request_url(raw: &str, settings: &Settings) -> Result<String> {
    let url = raw.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::validation("URL must start with http:// or https://"));
    }
    if url.len() > settings.max_url_length {
        return Err(Error::validation("URL too long"));
    }
    if !settings
        .allowed_domains
        .iter()
        .any(|domain| url.contains(domain.as_str()))
    {
        return Err(Error::UnsupportedPlatform);
    }
    Ok(url.to_string())
}

fn to_sse_event(event: StatusEvent) -> Event {
    let (name, data) = match event.update {
        StatusUpdate::Status(message) => ("status", json!({ "status": message })),
        StatusUpdate::Error(message) => ("error", json!({ "error": message })),
        StatusUpdate::Complete {
            download_id,
            filename,
            platform,
        } => (
            "complete",
            json!({
                "download_id": download_id,
                "filename": filename,
                "platform": platform,
            }),
        ),
    };
    Event::default()
        .id(event.sequence.to_string())
        .event(name)
        .data(data.to_string())
}

/// Build the content-disposition value for a display filename. Non-ASCII
/// names fall back to a generic ASCII filename while also carrying the
/// UTF-8 name in the RFC 5987 extended parameter; clients pick whichever
/// they understand.
fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() && !filename.contains('"') {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename=\"video.mp4\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::UnsupportedPlatform | Error::ExtractionFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ToolInvocation { .. }
            | Error::EmptyArtifact
            | Error::Io(_)
            | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("My Clip.mp4"),
            "attachment; filename=\"My Clip.mp4\""
        );
    }

    #[test]
    fn test_content_disposition_utf8_fallback() {
        let value = content_disposition("שיר יפה.mp4");
        assert!(value.starts_with("attachment; filename=\"video.mp4\""));
        assert!(value.contains("filename*=UTF-8''"));
        // Both parameters must be present for broad client compatibility
        assert!(value.contains("%D7%A9"));
    }

    #[test]
    fn test_validate_request_url() {
        let settings = Settings::default();

        assert!(validate_request_url("https://youtu.be/dQw4w9WgXcQ", &settings).is_ok());
        assert!(matches!(
            validate_request_url("youtu.be/dQw4w9WgXcQ", &settings),
            Err(Error::Validation(_))
        ));
        let oversized = format!("https://youtu.be/{}", "a".repeat(3000));
        assert!(matches!(
            validate_request_url(&oversized, &settings),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_request_url("https://example.com/video", &settings),
            Err(Error::UnsupportedPlatform)
        ));
    }

    #[test]
    fn test_client_info_prefers_cloudflare_headers() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "198.51.100.4".parse().unwrap());
        headers.insert("cf-ipcountry", "IL".parse().unwrap());
        let info = client_info(&headers, addr);
        assert_eq!(info.user, "unknown");
        assert_eq!(info.ip, "198.51.100.4");
        assert_eq!(info.country, "IL");

        let info = client_info(&HeaderMap::new(), addr);
        assert_eq!(info.ip, "127.0.0.1");
    }

    #[test]
    fn test_sse_event_mapping_is_typed() {
        let event = to_sse_event(StatusEvent {
            sequence: 3,
            update: StatusUpdate::Complete {
                download_id: "abc".into(),
                filename: "clip.mp4".into(),
                platform: Platform::Vimeo,
            },
        });
        // Event's Debug output is the easiest window into the wire format
        let rendered = format!("{:?}", event);
        assert!(rendered.contains("complete"));
        assert!(rendered.contains("vimeo"));
    }
}
