//! Research Agent
//!
//! Writes one research document from a step's search results. Sources are
//! numbered `[1]..[n]` in the prompt and the model cites them by number, so
//! label `n` in the returned text refers to the n-th search hit.

use super::non_empty;
use crate::citations::marker_labels;
use crate::llm::{prompt_vars, PromptTemplateId, TextGenerationService};
use crate::models::{ResearchDocument, SourceRef};
use crate::pipeline::router::ResearchPayload;
use crate::search::SearchHit;
use crate::types::AgentInvocationError;
use std::fmt::Write;
use tracing::info;

pub struct ResearchAgent;

impl ResearchAgent {
    pub async fn conduct(
        llm: &dyn TextGenerationService,
        payload: &ResearchPayload,
    ) -> Result<ResearchDocument, AgentInvocationError> {
        info!(
            step = payload.step_index,
            query = %payload.search_query,
            sources = payload.search_results.len(),
            degraded = payload.search_degraded,
            "Conducting research"
        );

        let guidance = if payload.guidance.trim().is_empty() {
            String::new()
        } else {
            format!("\nAdditional Research Guidance:\n{}\n", payload.guidance.trim())
        };
        let variables = prompt_vars([
            ("research_task", payload.task_description.clone()),
            ("search_query", payload.search_query.clone()),
            ("web_search_results", format_search_results(payload)),
            ("additional_guidance", guidance),
        ]);

        let text = llm.generate(PromptTemplateId::ConductResearch, &variables).await?;
        let raw_text = non_empty(text, "ResearchAgent")?;
        let citation_markers = marker_labels(&raw_text);

        info!(
            step = payload.step_index,
            chars = raw_text.len(),
            markers = citation_markers.len(),
            "Research document ready"
        );

        Ok(ResearchDocument {
            source_step_index: payload.step_index,
            task_description: payload.task_description.clone(),
            search_query: payload.search_query.clone(),
            raw_text,
            citation_markers,
            sources: payload
                .search_results
                .iter()
                .map(|hit| SourceRef {
                    title: hit.title.clone(),
                    url: hit.url.clone(),
                })
                .collect(),
            search_degraded: payload.search_degraded,
        })
    }
}

/// Numbered source listing handed to the model.
pub fn format_search_results(payload: &ResearchPayload) -> String {
    if payload.search_results.is_empty() {
        return format!(
            "Search for '{}' did not return results.\n\
             Please use your general knowledge to provide detailed information about this topic.\n\
             Focus specifically on addressing the research task: \"{}\".\n\
             Do not cite any numbered sources.",
            payload.search_query, payload.task_description
        );
    }
    format_hits(&payload.search_results)
}

fn format_hits(hits: &[SearchHit]) -> String {
    let mut out = String::from("Search Results:\n\n");
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}\nURL: {}\n{}\n", i + 1, hit.title, hit.url, hit.snippet);
    }
    out
}
