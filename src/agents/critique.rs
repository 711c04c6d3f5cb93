//! Critique Agent
//!
//! Evaluates one research document and parses the labelled response into a
//! [`Critique`]. The document text is passed with its local `[n]` labels;
//! they are rewritten to global ids later, when critiques are combined.

use super::non_empty;
use crate::llm::{prompt_vars, PromptTemplateId, TextGenerationService};
use crate::models::{Critique, Quality, Relevance};
use crate::pipeline::router::CritiquePayload;
use crate::types::AgentInvocationError;
use tracing::info;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Relevance,
    KeyPoints,
    Gaps,
    Quality,
    Summary,
}

const LABELS: &[(&str, Section)] = &[
    ("relevance to task", Section::Relevance),
    ("relevance", Section::Relevance),
    ("key points covered", Section::KeyPoints),
    ("key points", Section::KeyPoints),
    ("potential gaps or biases", Section::Gaps),
    ("gaps or biases", Section::Gaps),
    ("gaps", Section::Gaps),
    ("overall quality assessment", Section::Quality),
    ("quality assessment", Section::Quality),
    ("quality", Section::Quality),
    ("concise summary of this document", Section::Summary),
    ("concise summary", Section::Summary),
    ("summary", Section::Summary),
];

pub struct CritiqueAgent;

impl CritiqueAgent {
    pub async fn critique(
        llm: &dyn TextGenerationService,
        payload: &CritiquePayload,
    ) -> Result<Critique, AgentInvocationError> {
        info!(
            step = payload.critique_step_index,
            document = payload.document_step_index,
            "Critiquing research document"
        );

        let text = llm
            .generate(
                PromptTemplateId::CritiqueDocument,
                &prompt_vars([
                    ("research_task_description", payload.task_description.clone()),
                    ("research_document_text", payload.raw_text.clone()),
                ]),
            )
            .await?;
        let text = non_empty(text, "CritiqueAgent")?;

        parse_critique(&text, payload.critique_step_index, payload.document_step_index)
            .map_err(|e| AgentInvocationError::Permanent(format!("CritiqueAgent: {}", e)))
    }
}

/// Split a line like `**Relevance to Task:** High` into its section and the
/// text after the colon.
fn label_line(line: &str) -> Option<(Section, &str)> {
    if bullet(line).is_some() {
        return None;
    }
    let stripped = line.trim().trim_start_matches(['#', '*', ' ']);
    let (label, rest) = stripped.split_once(':')?;
    let label = label.trim().trim_end_matches('*').trim().to_lowercase();
    let section = LABELS.iter().find(|(name, _)| *name == label).map(|(_, s)| *s)?;
    Some((section, rest.trim().trim_start_matches('*').trim()))
}

fn bullet(line: &str) -> Option<&str> {
    let line = line.trim();
    let item = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .or_else(|| {
            let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
            (rest.len() < line.len()).then(|| rest.trim_start_matches(['.', ')']))?.strip_prefix(' ')
        })?;
    let item = item.trim();
    (!item.is_empty()).then_some(item)
}

/// Parse the five labelled fields. Relevance and quality are required;
/// list sections and the summary may be empty.
pub fn parse_critique(text: &str, critique_step: u32, document_step: u32) -> Result<Critique, String> {
    let mut relevance: Option<Relevance> = None;
    let mut quality: Option<Quality> = None;
    let mut key_points = Vec::new();
    let mut gaps = Vec::new();
    let mut summary: Vec<&str> = Vec::new();
    let mut current = None;

    for line in text.lines() {
        if let Some((section, rest)) = label_line(line) {
            current = Some(section);
            match section {
                Section::Relevance if !rest.is_empty() => relevance = Some(rest.parse()?),
                Section::Quality if !rest.is_empty() => quality = Some(rest.parse()?),
                Section::Summary if !rest.is_empty() => summary.push(rest),
                Section::KeyPoints if !rest.is_empty() => key_points.push(rest.to_string()),
                Section::Gaps if !rest.is_empty() => gaps.push(rest.to_string()),
                _ => {}
            }
            continue;
        }

        let line_text = line.trim();
        match current {
            // score written on the line after its label
            Some(Section::Relevance) if relevance.is_none() && !line_text.is_empty() => {
                relevance = Some(line_text.parse()?)
            }
            Some(Section::Quality) if quality.is_none() && !line_text.is_empty() => {
                quality = Some(line_text.parse()?)
            }
            Some(Section::KeyPoints) => key_points.extend(bullet(line).map(String::from)),
            Some(Section::Gaps) => gaps.extend(bullet(line).map(String::from)),
            Some(Section::Summary) if !line_text.is_empty() => summary.push(line_text),
            _ => {}
        }
    }

    Ok(Critique {
        critique_step_index: critique_step,
        source_document_step_index: document_step,
        relevance: relevance.ok_or("missing 'Relevance to Task'")?,
        quality: quality.ok_or("missing 'Overall Quality Assessment'")?,
        key_points,
        gaps,
        summary: summary.join(" "),
    })
}
