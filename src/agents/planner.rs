//! Planner Agent
//!
//! Produces the numbered plan text that PlanParser turns into steps.

use super::non_empty;
use crate::llm::{prompt_vars, PromptTemplateId, TextGenerationService};
use crate::types::AgentInvocationError;
use tracing::info;

pub struct PlannerAgent;

impl PlannerAgent {
    pub async fn generate_plan(
        llm: &dyn TextGenerationService,
        query: &str,
    ) -> Result<String, AgentInvocationError> {
        info!(query_len = query.len(), "Generating research plan");

        let text = llm
            .generate(PromptTemplateId::Plan, &prompt_vars([("query", query.to_string())]))
            .await?;

        non_empty(text, "PlannerAgent")
    }
}
