use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use log::{info, warn};

use crate::error::{FetchError, HubError, StoreError};
use crate::hub::{BroadcastHub, HubStats, MessageKind, Payload, PushOutcome};
use crate::models::{Fund, GroupSummary, PortfolioSummary, Position, ValueRecord};
use crate::services::MemoryStore;

const DEFAULT_HISTORY_DAYS: u32 = 7;

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<BroadcastHub>,
    pub store: Arc<MemoryStore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn ok<T>(message: impl Into<String>, data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        success: true,
        message: message.into(),
        data: Some(data),
    }))
}

fn fail<T>(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiResponse<T>>) {
    (status, Json(ApiResponse {
        success: false,
        message: message.into(),
        data: None,
    }))
}

fn hub_failure<T>(e: HubError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &e {
        HubError::InvalidInterval => StatusCode::BAD_REQUEST,
        HubError::UnknownFund(_) => StatusCode::NOT_FOUND,
        HubError::Fetch(FetchError::NotFound(_)) => StatusCode::NOT_FOUND,
        HubError::Fetch(_) => StatusCode::BAD_GATEWAY,
        HubError::Store(store_error) => return store_failure(store_error.clone()),
    };
    warn!("Request failed: {}", e);
    fail(status, e.to_string())
}

fn store_failure<T>(e: StoreError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::LockPoisoned => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Store request failed: {}", e);
    fail(status, e.to_string())
}

fn outcome_message(outcome: PushOutcome) -> &'static str {
    match outcome {
        PushOutcome::Queued => "Message queued",
        PushOutcome::DroppedOldest => "Message queued, oldest queued message dropped",
        PushOutcome::DroppedNewest => "Queue full, message dropped",
        PushOutcome::TimedOut => "Queue full, timed out waiting for space",
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntervalBody {
    pub seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct CustomMessageRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FundAlertRequest {
    pub fund_code: String,
    pub alert_type: String,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioAlertRequest {
    pub alert_type: String,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

// GET /api/health - Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fund_socket_api",
        "timestamp": chrono::Utc::now()
    }))
}

// GET /api/status - Hub state, subscriber and queue counters
pub async fn get_status(State(state): State<ApiState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

// POST /api/start - Start the scheduler and dispatcher
pub async fn start_broadcast(State(state): State<ApiState>) -> ApiResult<HubStats> {
    if state.hub.is_running() {
        return ok("Broadcast already running", state.hub.stats());
    }
    state.hub.start().await;
    info!("Broadcast started via API");
    ok("Broadcast started", state.hub.stats())
}

// POST /api/stop - Stop broadcasting and disconnect every subscriber
pub async fn stop_broadcast(State(state): State<ApiState>) -> ApiResult<HubStats> {
    if !state.hub.is_running() {
        return ok("Broadcast already stopped", state.hub.stats());
    }
    state.hub.stop().await;
    info!("Broadcast stopped via API");
    ok("Broadcast stopped", state.hub.stats())
}

// GET /api/interval
pub async fn get_interval(State(state): State<ApiState>) -> Json<IntervalBody> {
    Json(IntervalBody {
        seconds: state.hub.refresh_interval().as_secs_f64(),
    })
}

// PUT /api/interval - Takes effect at the next refresh cycle
pub async fn set_interval(
    State(state): State<ApiState>,
    Json(body): Json<IntervalBody>,
) -> ApiResult<IntervalBody> {
    let interval = Duration::try_from_secs_f64(body.seconds)
        .map_err(|_| fail(StatusCode::BAD_REQUEST, "Interval must be a number of seconds, at least 1"))?;
    state.hub.set_refresh_interval(interval).map_err(hub_failure)?;
    ok("Refresh interval updated", IntervalBody { seconds: interval.as_secs_f64() })
}

// POST /api/messages - Broadcast an arbitrary typed message
pub async fn send_message(
    State(state): State<ApiState>,
    Json(request): Json<CustomMessageRequest>,
) -> ApiResult<PushOutcome> {
    let kind = request.kind.trim();
    if kind.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Message type cannot be empty"));
    }
    let outcome = state
        .hub
        .send_custom_message(MessageKind::from_name(kind), Payload::Custom(request.data))
        .await;
    ok(outcome_message(outcome), outcome)
}

// POST /api/alerts/fund
pub async fn send_fund_alert(
    State(state): State<ApiState>,
    Json(request): Json<FundAlertRequest>,
) -> ApiResult<PushOutcome> {
    if request.fund_code.trim().is_empty() || request.alert_type.trim().is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Fund code and alert type are required"));
    }
    let outcome = state
        .hub
        .send_fund_alert(request.fund_code.trim(), &request.alert_type, request.value)
        .await;
    ok(outcome_message(outcome), outcome)
}

// POST /api/alerts/portfolio
pub async fn send_portfolio_alert(
    State(state): State<ApiState>,
    Json(request): Json<PortfolioAlertRequest>,
) -> ApiResult<PushOutcome> {
    if request.alert_type.trim().is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Alert type is required"));
    }
    let outcome = state.hub.send_portfolio_alert(&request.alert_type, request.value).await;
    ok(outcome_message(outcome), outcome)
}

// GET /api/funds - Last known price of every fund seen so far
pub async fn get_funds(State(state): State<ApiState>) -> ApiResult<Vec<Fund>> {
    let funds = state.store.funds().map_err(store_failure)?;
    ok(format!("{} funds", funds.len()), funds)
}

// GET /api/funds/:code
pub async fn get_fund(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult<Fund> {
    match state.store.fund(&code).map_err(store_failure)? {
        Some(fund) => ok("Fund retrieved", fund),
        None => Err(fail(StatusCode::NOT_FOUND, format!("No price recorded for fund {}", code))),
    }
}

// GET /api/funds/:code/value - Fetch and valuate now, outside the schedule
pub async fn get_fund_value(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult<ValueRecord> {
    let record = state.hub.realtime_value(&code).await.map_err(hub_failure)?;
    ok("Fund value calculated", record)
}

// GET /api/funds/:code/history?days=N
pub async fn get_fund_history(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<ValueRecord>> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    if days == 0 {
        return Err(fail(StatusCode::BAD_REQUEST, "days must be at least 1"));
    }
    let history = state.hub.fund_history(&code, days).await.map_err(hub_failure)?;
    ok(format!("{} records", history.len()), history)
}

// GET /api/portfolio/summary
pub async fn get_portfolio_summary(State(state): State<ApiState>) -> ApiResult<PortfolioSummary> {
    let summary = state.hub.realtime_summary().await.map_err(hub_failure)?;
    ok("Portfolio summary calculated", summary)
}

// GET /api/portfolio/groups
pub async fn get_group_summaries(
    State(state): State<ApiState>,
) -> ApiResult<HashMap<String, GroupSummary>> {
    let groups = state.hub.realtime_group_summaries().await.map_err(hub_failure)?;
    ok("Group summaries calculated", groups)
}

// GET /api/positions
pub async fn get_positions(State(state): State<ApiState>) -> ApiResult<Vec<Position>> {
    let positions = state.store.positions().map_err(store_failure)?;
    ok(format!("{} positions", positions.len()), positions)
}

// POST /api/positions - Create or replace the position for a fund
pub async fn save_position(
    State(state): State<ApiState>,
    Json(position): Json<Position>,
) -> ApiResult<Position> {
    let saved = state.store.upsert_position(position).map_err(store_failure)?;
    ok("Position saved", saved)
}

// DELETE /api/positions/:code
pub async fn delete_position(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult<Position> {
    let removed = state.store.delete_position(&code).map_err(store_failure)?;
    ok("Position deleted", removed)
}

// Create the API router
pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/start", post(start_broadcast))
        .route("/stop", post(stop_broadcast))
        .route("/interval", get(get_interval).put(set_interval))
        .route("/messages", post(send_message))
        .route("/alerts/fund", post(send_fund_alert))
        .route("/alerts/portfolio", post(send_portfolio_alert))
        .route("/funds", get(get_funds))
        .route("/funds/:code", get(get_fund))
        .route("/funds/:code/value", get(get_fund_value))
        .route("/funds/:code/history", get(get_fund_history))
        .route("/portfolio/summary", get(get_portfolio_summary))
        .route("/portfolio/groups", get(get_group_summaries))
        .route("/positions", get(get_positions).post(save_position))
        .route("/positions/:code", delete(delete_position))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
}
