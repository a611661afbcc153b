//! # HTTP Routes
//!
//! Thin axum layer over [`IntegrityEngine`]. Handlers read the wall clock
//! once and pass it down; all policy lives in the engine.
//!
//! | Engine error | Status |
//! |--------------|--------|
//! | `NotFound` | 404 |
//! | `InvalidInput` | 400 |
//! | `Store` | 503 |
//! | `Config` | 500 |

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use earnguard_common::{
    time::unix_now, Mode, ModeProvider, ModeSnapshot, ModeThresholds, ReviewDecision,
    SwappableModeProvider,
};
use earnguard_engine::{EngagementRequest, EngineError, IntegrityEngine};

// ════════════════════════════════════════════════════════════════════════════
// APP STATE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IntegrityEngine>,
    /// Same provider the engine reads, kept concrete for hot-swaps.
    pub modes: Arc<SwappableModeProvider>,
}

impl AppState {
    pub fn new(engine: Arc<IntegrityEngine>, modes: Arc<SwappableModeProvider>) -> Self {
        Self { engine, modes }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/engagements", post(record_engagement))
        .route("/earnings/process", post(process_earnings))
        .route("/creators/:id/summary", get(creator_summary))
        .route("/creators/:id/status", get(creator_status))
        .route("/admin/flags", get(pending_flags))
        .route("/admin/flags/:post_id/review", post(review_flag))
        .route("/admin/warnings/:id/clear", post(clear_warning))
        .route("/admin/pods", get(gaming_pods))
        .route("/admin/diversity-trends", get(diversity_trends))
        .route("/admin/mode", put(set_mode))
        .route("/metrics", get(metrics_endpoint))
        .route("/health", get(health))
        .with_state(state)
}

// ════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ════════════════════════════════════════════════════════════════════════════
// REQUEST BODIES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct ProcessEarningsBody {
    pub post_id: String,
    pub creator_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub reviewer_id: String,
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearWarningBody {
    pub admin_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetModeBody {
    pub mode: Mode,
    /// Replaces the stored thresholds of `mode` before switching.
    #[serde(default)]
    pub thresholds: Option<ModeThresholds>,
}

#[derive(Debug, Serialize)]
pub struct ClearWarningResponse {
    pub warning_id: String,
    pub cleared: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ════════════════════════════════════════════════════════════════════════════

async fn record_engagement(
    State(state): State<AppState>,
    Json(req): Json<EngagementRequest>,
) -> ApiResult<earnguard_engine::EngagementOutcome> {
    let outcome = state.engine.record_engagement(req, unix_now()).await?;
    Ok(Json(outcome))
}

async fn process_earnings(
    State(state): State<AppState>,
    Json(body): Json<ProcessEarningsBody>,
) -> ApiResult<earnguard_engine::ProcessedEarningsResult> {
    let result = state
        .engine
        .process_earnings(&body.post_id, &body.creator_id, unix_now())
        .await?;
    Ok(Json(result))
}

async fn creator_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<earnguard_engine::EarningsSummary> {
    Ok(Json(state.engine.earnings_summary(&id, unix_now()).await?))
}

async fn creator_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<earnguard_engine::CreatorStatus> {
    Ok(Json(state.engine.creator_status(&id, unix_now()).await?))
}

async fn pending_flags(
    State(state): State<AppState>,
) -> ApiResult<Vec<earnguard_common::FlaggedContent>> {
    Ok(Json(state.engine.pending_flagged_posts().await?))
}

async fn review_flag(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<earnguard_engine::ReviewOutcome> {
    let outcome = state
        .engine
        .review_flagged_post(&post_id, &body.reviewer_id, body.decision, body.notes, unix_now())
        .await?;
    Ok(Json(outcome))
}

async fn clear_warning(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ClearWarningBody>,
) -> ApiResult<ClearWarningResponse> {
    let cleared = state
        .engine
        .clear_warning(&id, &body.admin_id, unix_now())
        .await?;
    Ok(Json(ClearWarningResponse {
        warning_id: id,
        cleared,
    }))
}

async fn gaming_pods(
    State(state): State<AppState>,
) -> ApiResult<Vec<earnguard_engine::GamingPod>> {
    Ok(Json(state.engine.identify_gaming_pods(unix_now()).await?))
}

async fn diversity_trends(
    State(state): State<AppState>,
) -> ApiResult<Vec<earnguard_engine::DiversityTrend>> {
    Ok(Json(state.engine.track_diversity_trends(unix_now()).await?))
}

/// PUT /admin/mode
///
/// In-flight calls keep the snapshot they started with.
async fn set_mode(
    State(state): State<AppState>,
    Json(body): Json<SetModeBody>,
) -> ApiResult<ModeSnapshot> {
    if let Some(thresholds) = body.thresholds {
        state
            .modes
            .replace_thresholds(body.mode, thresholds)
            .map_err(EngineError::InvalidInput)?;
    }
    let snapshot = state.modes.set_mode(body.mode);
    info!(mode = %snapshot.mode, version = snapshot.version, "mode switched via admin api");
    Ok(Json((*snapshot).clone()))
}

/// GET /metrics - Prometheus text exposition.
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    // refresh the mode gauge before rendering
    let _ = state.engine.snapshot();
    let output = state.engine.metrics().to_prometheus();
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    (StatusCode::OK, headers, output)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.modes.snapshot();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "mode": snapshot.mode,
            "mode_version": snapshot.version,
        })),
    )
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use earnguard_common::{Creator, ContentType, Post};
    use earnguard_engine::IntegrityEngineBuilder;
    use earnguard_store::{MemoryStore, Store, StoreError};

    fn state(store: Arc<MemoryStore>, mode: Mode) -> AppState {
        let modes = Arc::new(SwappableModeProvider::with_defaults(mode));
        let engine = IntegrityEngineBuilder::new(store)
            .with_mode_provider(modes.clone())
            .build()
            .expect("engine");
        AppState::new(Arc::new(engine), modes)
    }

    async fn seed(store: &MemoryStore) {
        let mut creator = Creator::new("c1", 0);
        creator.email_verified = true;
        creator.phone_verified = true;
        store.put_creator(creator).await.expect("creator");
        let mut post = Post::new("p1", "c1", ContentType::Text, 0);
        post.likes = 10;
        store.put_post(post).await.expect("post");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&EngineError::not_found("post", "p")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&EngineError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::Store(StoreError::Unavailable("down".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_process_earnings_handler() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let st = state(store.clone(), Mode::Beta);

        let Json(result) = process_earnings(
            State(st.clone()),
            Json(ProcessEarningsBody {
                post_id: "p1".into(),
                creator_id: "c1".into(),
            }),
        )
        .await
        .expect("process");
        assert!(result.success);
        assert!(result.final_earnings > 0.0);

        let Json(summary) = creator_summary(State(st), Path("c1".to_string()))
            .await
            .expect("summary");
        assert!((summary.total - result.final_earnings).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_creator_is_404() {
        let st = state(Arc::new(MemoryStore::new()), Mode::Natural);
        let err = creator_status(State(st), Path("ghost".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_store_outage_is_503() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        store.set_unavailable(true);
        let st = state(store, Mode::Beta);
        let err = process_earnings(
            State(st),
            Json(ProcessEarningsBody {
                post_id: "p1".into(),
                creator_id: "c1".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_set_mode_swaps_snapshot() {
        let st = state(Arc::new(MemoryStore::new()), Mode::Beta);
        let before = st.engine.snapshot().version;

        let Json(snapshot) = set_mode(
            State(st.clone()),
            Json(SetModeBody {
                mode: Mode::Natural,
                thresholds: None,
            }),
        )
        .await
        .expect("set mode");
        assert_eq!(snapshot.mode, Mode::Natural);
        assert_eq!(snapshot.version, before + 1);
        assert_eq!(st.engine.snapshot().mode, Mode::Natural);
    }

    #[tokio::test]
    async fn test_set_mode_rejects_bad_thresholds() {
        let st = state(Arc::new(MemoryStore::new()), Mode::Beta);
        let mut bad = ModeThresholds::natural_default();
        bad.velocity.window_secs = 0;
        let err = set_mode(
            State(st.clone()),
            Json(SetModeBody {
                mode: Mode::Natural,
                thresholds: Some(bad),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(st.engine.snapshot().mode, Mode::Beta);
    }

    #[tokio::test]
    async fn test_metrics_renders_prometheus_text() {
        let st = state(Arc::new(MemoryStore::new()), Mode::Beta);
        let response = metrics_endpoint(State(st)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/plain; version=0.0.4; charset=utf-8")
        );
    }
}
