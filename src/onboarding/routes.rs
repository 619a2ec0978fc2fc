//! REST endpoints for driving and inspecting onboarding.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{Error, OnboardingError};

use super::service::OnboardingService;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub service: Arc<OnboardingService>,
}

/// Inbound farmer message, as relayed by the messaging webhook.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub phone_number: String,
    pub message: String,
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::Onboarding(OnboardingError::NotRequired { .. }) => StatusCode::CONFLICT,
        Error::Onboarding(OnboardingError::CustomerNotFound(_)) => StatusCode::NOT_FOUND,
        _ => {
            tracing::error!(error = %err, "Onboarding request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// POST /api/onboarding/messages
///
/// Runs one message through the state machine and returns the reply.
async fn post_message(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<InboundMessage>,
) -> Response {
    let phone = body.phone_number.trim();
    if phone.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "phone_number is required"})),
        )
            .into_response();
    }

    match state.service.handle_inbound(phone, &body.message).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/onboarding/customers/{id}
async fn get_customer(
    State(state): State<OnboardingRouteState>,
    Path(customer_id): Path<i64>,
) -> Response {
    match state.service.snapshot(customer_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/onboarding/customers/{id}/reset
///
/// Restarts onboarding and returns the refreshed snapshot.
async fn reset_customer(
    State(state): State<OnboardingRouteState>,
    Path(customer_id): Path<i64>,
) -> Response {
    if let Err(e) = state.service.reset_onboarding(customer_id).await {
        return error_response(e);
    }
    match state.service.snapshot(customer_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/messages", post(post_message))
        .route("/api/onboarding/customers/{id}", get(get_customer))
        .route("/api/onboarding/customers/{id}/reset", post(reset_customer))
        .with_state(state)
}
