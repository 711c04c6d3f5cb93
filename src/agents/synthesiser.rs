//! Synthesiser Agent
//!
//! Combines every successful critique into one analysis. Its input already
//! carries ledger global ids, so the markers it writes are global as well.

use super::non_empty;
use crate::citations::marker_labels;
use crate::llm::{prompt_vars, PromptTemplateId, TextGenerationService};
use crate::models::SynthesizedReport;
use crate::pipeline::router::SynthesisPayload;
use crate::types::AgentInvocationError;
use tracing::info;

pub struct SynthesiserAgent;

impl SynthesiserAgent {
    pub async fn synthesise(
        llm: &dyn TextGenerationService,
        payload: &SynthesisPayload,
    ) -> Result<SynthesizedReport, AgentInvocationError> {
        info!(
            input_chars = payload.formatted_critiques.len(),
            "Synthesising critiqued findings"
        );

        let text = llm
            .generate(
                PromptTemplateId::SynthesiseCritiques,
                &prompt_vars([
                    ("overall_user_query", payload.overall_query.clone()),
                    ("formatted_critiques", payload.formatted_critiques.clone()),
                    ("instructions", payload.instructions.clone()),
                ]),
            )
            .await?;
        let text = non_empty(text, "SynthesiserAgent")?;

        let citations_used = marker_labels(&text)
            .iter()
            .filter_map(|label| label.parse::<u32>().ok())
            .collect();

        Ok(SynthesizedReport { text, citations_used })
    }
}
