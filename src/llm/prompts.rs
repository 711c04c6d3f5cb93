//! Prompt templates
//!
//! Each template has a fixed system message and a user message with
//! `{{variable}}` placeholders filled from the caller's variable map.

use super::provider::{PromptTemplateId, PromptVariables};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::warn;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("placeholder pattern is valid"));

pub struct PromptTemplate {
    pub system: &'static str,
    pub user: &'static str,
}

const PLAN: PromptTemplate = PromptTemplate {
    system: "You are a research planner. You break research questions into a short numbered plan \
             executed by specialised agents.",
    user: r#"Create a research plan for the following query.

Query: {{query}}

Write one numbered line per step, each starting with the agent tag in square brackets.
Available agents:
- [ResearchAgent] runs one web search. Always write: Search for: 'exact search query'
- [CritiqueAgent] evaluates the results of exactly one research step. Always write: Evaluate results from step N
- [SynthesiserAgent] combines all critiqued findings.
- [WriterAgent] writes the final report.

Example:
1. [ResearchAgent] Search for: 'solid state battery energy density 2024'
2. [ResearchAgent] Search for: 'solid state battery manufacturing challenges'
3. [CritiqueAgent] Evaluate results from step 1
4. [CritiqueAgent] Evaluate results from step 2
5. [SynthesiserAgent] Combine the critiqued findings into a coherent analysis
6. [WriterAgent] Write a structured report answering the query

Output only the plan."#,
};

const CLARIFIER_QUESTIONS: PromptTemplate = PromptTemplate {
    system: "You help researchers sharpen vague questions before work starts.",
    user: r#"Generate 3 to 5 short clarifying questions that would most improve research on this query.

Query: {{user_query}}

Answer in this format:
QUESTIONS:
1. ...
2. ..."#,
};

const CLARIFY_QUERY: PromptTemplate = PromptTemplate {
    system: "You decide whether a research query is specific enough to execute its plan.",
    user: r#"Query: {{user_query}}

Proposed plan:
{{initial_plan}}

If the query and plan are clear enough to proceed, answer exactly: CLARIFICATION_NOT_NEEDED
Otherwise answer with QUESTIONS: followed by up to 5 numbered clarifying questions."#,
};

const CONDUCT_RESEARCH: PromptTemplate = PromptTemplate {
    system: "You are a meticulous research analyst. You write factual research notes grounded in the \
             sources you are given.",
    user: r#"Research task: {{research_task}}
Search query used: {{search_query}}

Search results:
{{web_search_results}}
{{additional_guidance}}

Write a detailed research document addressing the task. Cite sources inline with their bracketed
number, e.g. [1] or [2, 3]. Only cite numbers that appear in the search results above. Do not add a
reference list."#,
};

const CRITIQUE_DOCUMENT: PromptTemplate = PromptTemplate {
    system: "You critically evaluate research documents for relevance, coverage and quality.",
    user: r#"Research task: {{research_task_description}}

Document:
{{research_document_text}}

Evaluate the document in exactly this format. Keep the document's bracketed citation numbers when
you refer to specific claims.

Relevance to Task: <High|Medium|Low>
Key Points Covered:
- ...
Potential Gaps or Biases:
- ...
Overall Quality Assessment: <Excellent|Good|Fair|Poor>
Concise Summary of this Document: <two or three sentences>"#,
};

const SYNTHESISE_CRITIQUES: PromptTemplate = PromptTemplate {
    system: "You synthesise critiqued research into one coherent, well-supported analysis.",
    user: r#"Overall research query: {{overall_user_query}}

Critiqued documents:
{{formatted_critiques}}

{{instructions}}

Synthesise the findings into a single analysis that answers the query. Weigh sources by the
critiques' relevance and quality. Keep every bracketed citation number exactly as written
(e.g. [14]); never renumber or invent citations. Do not add a reference list."#,
};

const FORMAT_REPORT: PromptTemplate = PromptTemplate {
    system: "You are a technical writer who turns research syntheses into polished Markdown reports.",
    user: r#"Research query: {{user_query}}

Synthesised findings:
{{synthesized_report_text}}

{{instructions}}

Format this as a Markdown report with a single # title, ## sections and ### subsections where
useful. Keep every bracketed citation number exactly as written. Do not add a references, sources
or bibliography section. Output only the Markdown."#,
};

pub fn template(id: PromptTemplateId) -> &'static PromptTemplate {
    match id {
        PromptTemplateId::Plan => &PLAN,
        PromptTemplateId::ClarifierQuestions => &CLARIFIER_QUESTIONS,
        PromptTemplateId::ClarifyQuery => &CLARIFY_QUERY,
        PromptTemplateId::ConductResearch => &CONDUCT_RESEARCH,
        PromptTemplateId::CritiqueDocument => &CRITIQUE_DOCUMENT,
        PromptTemplateId::SynthesiseCritiques => &SYNTHESISE_CRITIQUES,
        PromptTemplateId::FormatReport => &FORMAT_REPORT,
    }
}

/// Fill `{{name}}` placeholders in one pass; substituted values are never
/// re-expanded. Unknown names render empty.
pub fn render(template: &str, variables: &PromptVariables) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                warn!(variable = &caps[1], "Prompt variable not supplied");
                String::new()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::prompt_vars;

    #[test]
    fn test_render_substitutes_once() {
        let vars = prompt_vars([("query", "about {{guidance}}".into()), ("guidance", "G".into())]);
        assert_eq!(render("Q: {{query}} / {{ guidance }}", &vars), "Q: about {{guidance}} / G");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let vars = prompt_vars([("query", "x".into())]);
        assert_eq!(render("{{query}}|{{absent}}|", &vars), "x||");
    }

    #[test]
    fn test_every_template_names_its_core_variable() {
        assert!(template(PromptTemplateId::Plan).user.contains("{{query}}"));
        assert!(template(PromptTemplateId::ClarifyQuery).user.contains("{{initial_plan}}"));
        assert!(template(PromptTemplateId::CritiqueDocument)
            .user
            .contains("{{research_document_text}}"));
        assert!(template(PromptTemplateId::FormatReport)
            .user
            .contains("{{synthesized_report_text}}"));
    }
}
