//! REST surface served by `harvest-service`.
//!
//! Handlers only translate HTTP into [`RawRequest`]s and hand the service
//! result to the [`ResponseBuilder`]; nothing here decides a status code.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::application::{
    ApiResponse, FeedService, HealthStatusResponse, Outcome, PlanningService, PredictionService,
    ResponseBuilder,
};
use crate::domain::{DomainError, RawRequest, Violation, ViolationReason};

/// Shared handles for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub predictions: Arc<PredictionService>,
    pub feeds: Arc<FeedService>,
    pub planner: Arc<PlanningService>,
}

impl AppState {
    pub fn new(
        predictions: Arc<PredictionService>,
        feeds: Arc<FeedService>,
        planner: Arc<PlanningService>,
    ) -> Self {
        Self {
            predictions,
            feeds,
            planner,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/crop/recommend", post(recommend_crop))
        .route("/api/crop/yield", post(predict_yield))
        .route("/api/crop/plan", post(plan_crop))
        .route("/api/fertilizer/recommend", post(recommend_fertilizer))
        .route("/api/news", get(news))
        .route("/api/prices", post(prices))
        .route("/api/prices/commodities", get(commodities))
        .route("/api/prices/states", get(states))
        .route("/api/prices/markets", get(markets))
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// Request fields from a JSON object or a form-encoded body.
pub struct RequestFields(pub RawRequest);

#[async_trait]
impl<S> FromRequest<S> for RequestFields
where
    S: Send + Sync,
{
    type Rejection = ApiResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|err| unreadable_body(err.body_text()))?;
            return Ok(Self(RawRequest::from_pairs(pairs)));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| unreadable_body(err.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(RawRequest::new()));
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|err| unreadable_body(format!("body is not valid JSON: {err}")))?;
        RawRequest::from_json(&value)
            .map(Self)
            .ok_or_else(|| unreadable_body("body must be a JSON object".to_string()))
    }
}

fn unreadable_body(message: String) -> ApiResponse {
    ResponseBuilder::build::<()>(Outcome::ValidationFailed(vec![Violation::new(
        "body",
        ViolationReason::InvalidType,
        message,
    )]))
}

/// Run CPU-bound inference off the async workers.
async fn inference<T, F>(job: F) -> ApiResponse
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let result = tokio::task::spawn_blocking(job)
        .await
        .unwrap_or_else(|err| Err(DomainError::internal(format!("inference task failed: {err}"))));
    ResponseBuilder::from_result(result)
}

/// Run an upstream call in its own task. If the client goes away the
/// handler future is dropped, the guard fires, and the retry loop stops at
/// its next attempt boundary.
async fn upstream<T, F, Fut>(call: F) -> ApiResponse
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let result = tokio::spawn(call(cancel))
        .await
        .unwrap_or_else(|err| Err(DomainError::internal(format!("upstream task failed: {err}"))));
    ResponseBuilder::from_result(result)
}

async fn trace_requests(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    async move {
        let started = Instant::now();
        let mut response = next.run(req).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}

async fn health_check(State(state): State<AppState>) -> ApiResponse {
    let mut missing = state.predictions.unavailable_models();
    missing.extend(state.feeds.unconfigured_feeds());
    if !state.planner.is_configured() {
        missing.push("planner");
    }

    let status = HealthStatusResponse {
        ok: missing.is_empty(),
        message: if missing.is_empty() {
            "healthy".into()
        } else {
            "degraded".into()
        },
        details: (!missing.is_empty()).then(|| format!("unavailable: {}", missing.join(", "))),
        checked_at: Utc::now(),
    };
    ResponseBuilder::build(Outcome::Success(status))
}

async fn recommend_crop(State(state): State<AppState>, RequestFields(raw): RequestFields) -> ApiResponse {
    let service = Arc::clone(&state.predictions);
    inference(move || service.recommend_crop(&raw)).await
}

async fn predict_yield(State(state): State<AppState>, RequestFields(raw): RequestFields) -> ApiResponse {
    let service = Arc::clone(&state.predictions);
    inference(move || service.predict_yield(&raw)).await
}

async fn plan_crop(State(state): State<AppState>, RequestFields(raw): RequestFields) -> ApiResponse {
    let planner = Arc::clone(&state.planner);
    upstream(move |cancel| async move { planner.plan(&raw, &cancel).await }).await
}

async fn recommend_fertilizer(
    State(state): State<AppState>,
    RequestFields(raw): RequestFields,
) -> ApiResponse {
    let service = Arc::clone(&state.predictions);
    inference(move || service.recommend_fertilizer(&raw)).await
}

async fn news(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> ApiResponse {
    let feeds = Arc::clone(&state.feeds);
    let raw = RawRequest::from_pairs(params);
    upstream(move |cancel| async move { feeds.news(&raw, &cancel).await }).await
}

async fn commodities(State(state): State<AppState>) -> ApiResponse {
    let feeds = Arc::clone(&state.feeds);
    upstream(move |cancel| async move { feeds.commodities(&cancel).await }).await
}

async fn states(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> ApiResponse {
    let feeds = Arc::clone(&state.feeds);
    let raw = RawRequest::from_pairs(params);
    upstream(move |cancel| async move { feeds.states(&raw, &cancel).await }).await
}

async fn markets(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> ApiResponse {
    let feeds = Arc::clone(&state.feeds);
    let raw = RawRequest::from_pairs(params);
    upstream(move |cancel| async move { feeds.markets(&raw, &cancel).await }).await
}

async fn prices(State(state): State<AppState>, RequestFields(raw): RequestFields) -> ApiResponse {
    let feeds = Arc::clone(&state.feeds);
    upstream(move |cancel| async move { feeds.prices(&raw, &cancel).await }).await
}
