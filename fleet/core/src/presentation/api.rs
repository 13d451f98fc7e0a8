// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::ack::AckService;
use crate::application::checkin::CheckinService;
use crate::application::error::CheckinError;

pub struct AppState {
    pub checkin: Arc<CheckinService>,
    pub acks: Arc<AckService>,
}

pub fn app(checkin: Arc<CheckinService>, acks: Arc<AckService>) -> Router {
    let state = Arc::new(AppState { checkin, acks });

    Router::new()
        .route("/health", get(health))
        .route("/api/fleet/agents/{id}/checkin", post(checkin_handler))
        .route("/api/fleet/agents/{id}/acks", post(acks_handler))
        .route("/checkin/{id}", post(checkin_handler))
        .route("/acks/{id}", post(acks_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request failure rendered as a plain-text body.
#[derive(Debug)]
pub struct ApiError(pub CheckinError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            CheckinError::AgentNotFound => StatusCode::NOT_FOUND,
            CheckinError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<CheckinError> for ApiError {
    fn from(err: CheckinError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.0.to_string()).into_response()
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn log_failure(op: &str, agent_id: &str, err: &ApiError) {
    // Dropped connections and shutdown are not failures.
    if !err.0.is_cancelled() {
        error!(id = %agent_id, code = err.status().as_u16(), error = %err.0, "Fail {}", op);
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn checkin_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state
        .checkin
        .checkin(&id, authorization(&headers), &body)
        .await
        .map(Json)
        .map_err(|e| {
            let err = ApiError(e);
            log_failure("checkin", &id, &err);
            err
        })
}

async fn acks_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state
        .acks
        .ack(&id, authorization(&headers), &body)
        .await
        .map(Json)
        .map_err(|e| {
            let err = ApiError(e);
            log_failure("ACK", &id, &err);
            err
        })
}
