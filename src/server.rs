//! Local HTTP surface.
//!
//! A thin axum layer over the orchestrator: facility search, a processing
//! endpoint that streams progress as server-sent events, and a direct
//! upload endpoint for documents the caller already has in hand. The
//! upload path runs extraction and summarization only; it never touches
//! the browser session.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config;
use crate::extraction::pipeline::DocumentExtractor;
use crate::portal::locator::{validate_query, FacilitySearch};
use crate::portal::types::{looks_like_pdf, DocumentDescriptor, FacilityRef};
use crate::run::{Orchestrator, ProgressEvent, RunTarget};
use crate::summary::types::{DocumentSummary, Summarizer};

/// 60 MB, uploads plus multipart overhead.
const MAX_UPLOAD_BODY: usize = 60 * 1024 * 1024;

/// Buffered progress events before the producer blocks.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub locator: Arc<dyn FacilitySearch>,
    pub extractor: Arc<DocumentExtractor>,
    pub summarizer: Arc<dyn Summarizer>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct FacilityQuery {
    query: String,
}

/// Body of POST /api/process. Exactly one of the fields selects the target.
#[derive(Deserialize)]
struct ProcessRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    facility_id: Option<String>,
    #[serde(default)]
    facility_url: Option<String>,
}

impl ProcessRequest {
    fn into_target(self) -> Result<RunTarget, String> {
        match (self.query, self.facility_id, self.facility_url) {
            (Some(query), None, None) => Ok(RunTarget::Query(query)),
            (None, Some(id), None) => Ok(RunTarget::Facility(FacilityRef::Id(id))),
            (None, None, Some(url)) => Ok(RunTarget::Facility(FacilityRef::Url(url))),
            (None, None, None) => {
                Err("one of query, facility_id, facility_url is required".to_string())
            }
            _ => Err("query, facility_id and facility_url are mutually exclusive".to_string()),
        }
    }
}

#[derive(Serialize)]
struct UploadSummaryResponse {
    filename: String,
    size_bytes: usize,
    extraction_method: String,
    page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    summary: DocumentSummary,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/facilities", get(search_facilities))
        .route("/api/process", post(process))
        .route("/api/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = config::bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router(state)).await
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn search_facilities(
    State(state): State<AppState>,
    Query(params): Query<FacilityQuery>,
) -> impl IntoResponse {
    if validate_query(&params.query).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Query must be at least 2 non-whitespace characters.".into(),
            }),
        )
            .into_response();
    }

    match state.locator.search(&params.query).await {
        Ok(facilities) => Json(facilities).into_response(),
        Err(e) => {
            tracing::error!(query = %params.query, error = %e, "Facility search failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Facility search failed: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// Kick off a run and stream its progress as SSE. Each event is named by
/// its stage and carries the full `ProgressEvent` as JSON data. The stream
/// ends after the terminal `done` or `failed` event.
async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, impl IntoResponse> {
    let target = match request.into_target() {
        Ok(target) => target,
        Err(reason) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: reason }),
            ));
        }
    };

    let (tx, rx) = mpsc::channel::<ProgressEvent>(PROGRESS_CHANNEL_CAPACITY);
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.process(target, tx).await {
            // Already reported to the stream as a `failed` event.
            tracing::warn!(error = %e, "Processing run ended in failure");
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let name = event.stage.as_str();
        let data = serde_json::to_string(&event).unwrap_or_else(|e| {
            format!("{{\"stage\":\"failed\",\"progress\":100,\"message\":\"serialization error: {e}\"}}")
        });
        Ok(Event::default().event(name).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Extract and summarize a caller-supplied PDF without any portal work.
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> impl IntoResponse {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        match field.bytes().await {
            Ok(bytes) => file = Some((filename, bytes.to_vec())),
            Err(e) => {
                tracing::warn!("Failed to read upload body: {e}");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: "Failed to read file data.".into(),
                    }),
                )
                    .into_response();
            }
        }
    }

    let (filename, bytes) = match file {
        Some(file) => file,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "No file field in upload.".into(),
                }),
            )
                .into_response();
        }
    };

    if !looks_like_pdf(&bytes) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "Upload is not a PDF document.".into(),
            }),
        )
            .into_response();
    }

    let descriptor = DocumentDescriptor {
        id: 0,
        doc_type: filename.clone(),
        date: chrono::Local::now().format("%m/%d/%Y").to_string(),
        row_index: 0,
    };

    let extractor = Arc::clone(&state.extractor);
    let size_bytes = bytes.len();
    let extraction =
        tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await;
    let extracted = match extraction {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: format!("Text extraction failed: {e}"),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Extraction task crashed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Text extraction crashed.".into(),
                }),
            )
                .into_response();
        }
    };

    let summarizer = Arc::clone(&state.summarizer);
    let text = extracted.text;
    let descriptor_for_task = descriptor.clone();
    let summary = tokio::task::spawn_blocking(move || {
        summarizer.summarize_document(&text, &descriptor_for_task)
    })
    .await
    .unwrap_or_else(|e| DocumentSummary::placeholder(&descriptor, format!("summarizer crashed: {e}")));

    Json(UploadSummaryResponse {
        filename,
        size_bytes,
        extraction_method: extracted.method.as_str().to_string(),
        page_count: extracted.page_count,
        confidence: extracted.confidence,
        summary,
    })
    .into_response()
}
