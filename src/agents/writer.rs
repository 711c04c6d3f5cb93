//! Writer Agent
//!
//! Formats the synthesis as Markdown. The reference list is built from the
//! citation ledger afterwards, so any list the model adds is cut off.

use super::non_empty;
use crate::llm::{prompt_vars, PromptTemplateId, TextGenerationService};
use crate::pipeline::router::WriterPayload;
use crate::types::AgentInvocationError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static MARKDOWN_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:markdown|md)\s*(.*?)\s*```").expect("fence pattern is valid")
});

static CHATTY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:here is|here's|i've formatted|the following is)[^:\n]*:\s*")
        .expect("prefix pattern is valid")
});

static REFERENCE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^#{1,3}\s*(?:references|sources|bibliography|sources and citations)\s*$")
        .expect("reference heading pattern is valid")
});

const JSON_KEYS: &[&str] = &["content", "markdown", "text", "output", "result", "message"];

pub struct WriterAgent;

impl WriterAgent {
    pub async fn format_report(
        llm: &dyn TextGenerationService,
        payload: &WriterPayload,
    ) -> Result<String, AgentInvocationError> {
        info!(input_chars = payload.synthesized_text.len(), "Formatting report");

        let text = llm
            .generate(
                PromptTemplateId::FormatReport,
                &prompt_vars([
                    ("user_query", payload.overall_query.clone()),
                    ("synthesized_report_text", payload.synthesized_text.clone()),
                    ("instructions", payload.instructions.clone()),
                ]),
            )
            .await?;

        non_empty(clean_output(&non_empty(text, "WriterAgent")?), "WriterAgent")
    }
}

/// Strip wrappers models put around Markdown, then drop any trailing
/// reference section.
pub fn clean_output(text: &str) -> String {
    let text = text.trim();
    let unwrapped = unwrap_json(text)
        .or_else(|| MARKDOWN_FENCE.captures(text).map(|c| c[1].to_string()))
        .unwrap_or_else(|| CHATTY_PREFIX.replace(text, "").into_owned());

    match REFERENCE_HEADING.find(&unwrapped) {
        Some(heading) => {
            debug!(at = heading.start(), "Dropping model-written reference section");
            unwrapped[..heading.start()].trim_end().to_string()
        }
        None => unwrapped.trim().to_string(),
    }
}

fn unwrap_json(text: &str) -> Option<String> {
    if !(text.starts_with('{') && text.ends_with('}')) {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    JSON_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
