//! Clarifier Agent
//!
//! Asks whether a query needs clarification and produces the questions.
//! When nobody is around to answer, the questions are mined for keywords
//! that become extra guidance for the research steps.

use super::non_empty;
use crate::llm::{prompt_vars, PromptTemplateId, TextGenerationService};
use crate::types::AgentInvocationError;
use std::fmt::Write;
use tracing::{info, warn};

const NOT_NEEDED: &str = "CLARIFICATION_NOT_NEEDED";
const QUESTIONS_PREFIX: &str = "QUESTIONS:";

const STOP_WORDS: &[&str] = &[
    "what", "when", "where", "which", "would", "could", "should", "about", "interested", "specific",
    "there", "these", "those", "your", "with", "from", "that", "this", "have", "want", "like",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarificationCheck {
    NotNeeded,
    Questions(Vec<String>),
}

pub struct ClarifierAgent;

impl ClarifierAgent {
    /// 3–5 questions for the query.
    pub async fn generate_questions(
        llm: &dyn TextGenerationService,
        query: &str,
    ) -> Result<Vec<String>, AgentInvocationError> {
        let text = llm
            .generate(
                PromptTemplateId::ClarifierQuestions,
                &prompt_vars([("user_query", query.to_string())]),
            )
            .await?;
        let questions = parse_questions(&non_empty(text, "ClarifierAgent")?);
        info!(count = questions.len(), "Clarifying questions generated");
        Ok(questions)
    }

    /// Decide from the query and its plan whether to ask anything.
    pub async fn check_plan(
        llm: &dyn TextGenerationService,
        query: &str,
        plan_text: &str,
    ) -> Result<ClarificationCheck, AgentInvocationError> {
        let text = llm
            .generate(
                PromptTemplateId::ClarifyQuery,
                &prompt_vars([
                    ("user_query", query.to_string()),
                    ("initial_plan", plan_text.to_string()),
                ]),
            )
            .await?;
        let text = non_empty(text, "ClarifierAgent")?;

        if text.contains(NOT_NEEDED) {
            return Ok(ClarificationCheck::NotNeeded);
        }
        let questions = parse_questions(&text);
        if text.starts_with(QUESTIONS_PREFIX) && !questions.is_empty() {
            return Ok(ClarificationCheck::Questions(questions));
        }

        warn!(output = %text.chars().take(120).collect::<String>(), "Unexpected clarifier output, proceeding");
        Ok(ClarificationCheck::NotNeeded)
    }
}

/// Numbered or bulleted lines, with an optional `QUESTIONS:` header. Falls
/// back to splitting on `?` when the model wrote prose.
pub fn parse_questions(text: &str) -> Vec<String> {
    let body = text.trim().strip_prefix(QUESTIONS_PREFIX).unwrap_or(text.trim());

    let listed: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '*'))
        .map(|l| {
            l.trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | ' '))
                .trim()
                .to_string()
        })
        .filter(|q| !q.is_empty())
        .collect();
    if !listed.is_empty() {
        return listed;
    }

    body.split('?')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("{}?", q))
        .collect()
}

/// Research guidance derived from unanswered questions.
pub fn extract_insights(questions: &[String]) -> String {
    let mut lines = String::new();
    for question in questions {
        let terms: Vec<&str> = question
            .trim_end_matches('?')
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
            .filter(|t| t.chars().count() > 3 && !STOP_WORDS.contains(&t.to_lowercase().as_str()))
            .collect();
        if !terms.is_empty() {
            let _ = writeln!(lines, "- Consider exploring: {}", terms.join(", "));
        }
    }

    if lines.is_empty() {
        return String::new();
    }
    format!("Additional research guidance based on potential clarifications:\n{}", lines)
}

/// Append answered questions to the query text; skipped answers are dropped.
pub fn fold_answers(query: &str, questions: &[String], answers: &[String]) -> String {
    let mut pairs = String::new();
    for (i, answer) in answers.iter().enumerate() {
        let answer = answer.trim();
        if answer.is_empty() {
            continue;
        }
        match questions.get(i) {
            Some(question) => {
                let _ = writeln!(pairs, "Q: {}\nA: {}", question, answer);
            }
            None => {
                let _ = writeln!(pairs, "- {}", answer);
            }
        }
    }

    if pairs.is_empty() {
        return query.to_string();
    }
    format!(
        "{}\n\nAdditional clarifications provided by user:\n{}",
        query,
        pairs.trim_end()
    )
}
