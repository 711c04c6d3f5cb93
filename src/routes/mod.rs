//! API Routes
//!
//! - `POST /api/research` - Run the pipeline for one query
//! - `GET /api/health` - Health check

pub mod health;
pub mod research;

use crate::middleware::apply_cors;
use crate::pipeline::ResearchPipeline;
use crate::types::{AppError, PipelineError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResearchPipeline>,
}

/// Create the main application router
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    info!("Creating application router");

    let api_router = Router::new()
        .merge(research::router(state))
        .merge(health::router());

    apply_cors(api_router, allowed_origins).layer(TraceLayer::new_for_http())
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Run(failure) => match &failure.error {
                PipelineError::EmptyQuery => StatusCode::BAD_REQUEST,
                PipelineError::InsufficientMaterial { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::PlanParse(_) | PipelineError::Agent { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = match &self {
            AppError::Run(failure) => json!({
                "error": failure.error.to_string(),
                "state": failure.state,
                "failing_step": failure.failing_step,
                "last_completed_step": failure.last_completed_step,
            }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
