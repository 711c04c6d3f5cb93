use super::AppState;
use crate::models::StepOutcome;
use crate::report::FormattedReport;
use crate::types::{AppError, AppResult};
use axum::{extract::State, response::Json as ResponseJson, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    /// Answers to clarifying questions, supplied up front
    #[serde(default)]
    pub clarifications: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub report: FormattedReport,
    pub markdown: String,
    pub location: Option<String>,
    pub outcomes: Vec<StepOutcome>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/research", post(run_research))
        .with_state(state)
}

async fn run_research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> AppResult<ResponseJson<ResearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(AppError::InvalidRequest("query must not be empty".to_string()));
    }
    info!(query_len = request.query.len(), "Received research request");

    let output = state.pipeline.run(&request.query, request.clarifications).await?;

    Ok(Json(ResearchResponse {
        markdown: output.report.to_markdown(),
        report: output.report,
        location: output.location,
        outcomes: output.outcomes,
    }))
}
