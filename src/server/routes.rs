//! HTTP route handlers for the extraction API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::analysis::{self, AnalysisSummary, Analyzer};
use crate::extraction::{
    BatchOutcome, ConversationHandle, ExtractError, ExtractOutcome, ExtractorService, HandleKind,
};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/search", post(search_conversations))
        .route("/api/extract", post(extract_conversation))
        .route("/api/flow", post(run_flow))
        .route("/api/conversations", get(list_conversations))
        .route("/api/analyze", post(analyze_conversations))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gemscribe",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Map an extraction error to a response status.
fn error_response(e: &ExtractError) -> (StatusCode, String) {
    let status = match e {
        ExtractError::ConnectionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ExtractError::InvalidUrl(_) | ExtractError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Discovery request.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Optional query entered into the site's search surface.
    pub query: Option<String>,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

/// Discovery response.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Discovered entries in listing order.
    pub entries: Vec<HandleDto>,
    /// Number of entries returned.
    pub count: usize,
}

/// Discovered entry DTO.
#[derive(Debug, Serialize)]
pub struct HandleDto {
    /// Listing title.
    pub title: String,
    /// Entry category.
    pub kind: HandleKind,
    /// Direct address, when the listing exposed one.
    pub url: Option<String>,
}

impl From<ConversationHandle> for HandleDto {
    fn from(handle: ConversationHandle) -> Self {
        let url = match &handle.locator {
            crate::extraction::Locator::Url(url) => Some(url.clone()),
            crate::extraction::Locator::Element { .. } => None,
        };
        Self {
            title: handle.title,
            kind: handle.kind,
            url,
        }
    }
}

/// Handle discovery requests.
async fn search_conversations(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let service = ExtractorService::new(state.config.clone());
    let handles = service
        .discover(request.query.as_deref())
        .await
        .map_err(|e| error_response(&e))?;

    let limit = request.limit.unwrap_or(usize::MAX);
    let entries: Vec<HandleDto> = handles.into_iter().take(limit).map(HandleDto::from).collect();
    let count = entries.len();

    Ok(Json(SearchResponse { entries, count }))
}

/// Extraction request.
#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    /// Conversation address.
    pub url: String,
    /// Optional title override for artifact naming.
    pub title: Option<String>,
}

/// Handle extraction requests.
async fn extract_conversation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractOutcome>, (StatusCode, String)> {
    let service = ExtractorService::new(state.config.clone());
    let outcome = service
        .extract_url(&request.url, request.title.as_deref())
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(outcome))
}

/// Batch flow request.
#[derive(Debug, Deserialize)]
pub struct FlowRequest {
    /// Query entered into the site's search surface.
    pub query: String,
    /// How many discovered conversations to extract.
    pub count: Option<usize>,
}

/// Handle batch flow requests.
async fn run_flow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FlowRequest>,
) -> Result<Json<BatchOutcome>, (StatusCode, String)> {
    let service = ExtractorService::new(state.config.clone());
    let outcome = service
        .run_flow(&request.query, request.count.unwrap_or(2))
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(outcome))
}

/// Listing response for persisted extractions.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Persisted extractions, newest first.
    pub extracts: Vec<analysis::ExtractListing>,
    /// Number of extractions.
    pub count: usize,
}

/// Handle listing requests over persisted artifacts.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListResponse>, (StatusCode, String)> {
    let extracts = analysis::list_extracts(&state.config.extraction.output_dir)
        .map_err(|e| error_response(&e))?;
    let count = extracts.len();

    Ok(Json(ListResponse { extracts, count }))
}

/// Handle analysis requests over persisted artifacts.
async fn analyze_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalysisSummary>, (StatusCode, String)> {
    let analyzer = Analyzer::new(state.config.extraction.output_dir.clone())
        .map_err(|e| error_response(&e))?;
    let (summary, _) = analyzer.analyze_all().map_err(|e| error_response(&e))?;

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ListingSurface, Locator};

    #[test]
    fn test_handle_dto_carries_url_only_for_addressable_entries() {
        let addressable = ConversationHandle::new(
            "Thread about retries",
            Locator::Url("https://example.com/app/x".to_string()),
        );
        let clickable = ConversationHandle::new(
            "Thread about batching",
            Locator::Element {
                surface: ListingSurface::Search,
                index: 4,
            },
        );

        let a = HandleDto::from(addressable);
        let b = HandleDto::from(clickable);
        assert_eq!(a.url.as_deref(), Some("https://example.com/app/x"));
        assert!(b.url.is_none());
    }

    #[test]
    fn test_error_mapping_distinguishes_unreachable_browser() {
        let (status, _) =
            error_response(&ExtractError::ConnectionUnavailable("127.0.0.1:9222".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = error_response(&ExtractError::ConversionFailed);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
