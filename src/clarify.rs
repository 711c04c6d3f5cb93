//! Interactive clarification
//!
//! The pipeline may pause after planning to ask the user a few questions.
//! Whoever answers sits behind [`InteractiveClarifier`]: a person at the
//! terminal, a preset list from the API request, or nothing at all.

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClarificationError {
    #[error("clarifier unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait InteractiveClarifier: Send + Sync {
    /// One answer per question, in order. An empty string means the
    /// question was skipped.
    async fn ask(&self, questions: &[String]) -> Result<Vec<String>, ClarificationError>;
}

/// Prompts on stdout and reads one line per question from stdin
pub struct ConsoleClarifier;

#[async_trait]
impl InteractiveClarifier for ConsoleClarifier {
    async fn ask(&self, questions: &[String]) -> Result<Vec<String>, ClarificationError> {
        let questions = questions.to_vec();
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            let mut answers = Vec::with_capacity(questions.len());

            writeln!(stdout, "\nA few questions to focus the research (press Enter to skip):")?;
            for (i, question) in questions.iter().enumerate() {
                write!(stdout, "\n{}. {}\n> ", i + 1, question)?;
                stdout.flush()?;
                let mut line = String::new();
                stdin.lock().read_line(&mut line)?;
                answers.push(line.trim().to_string());
            }
            Ok::<_, io::Error>(answers)
        })
        .await
        .map_err(|e| ClarificationError::Unavailable(e.to_string()))?
        .map_err(|e| ClarificationError::Unavailable(e.to_string()))
    }
}

/// Hands back answers supplied up front, aligned to the questions asked
pub struct PresetClarifier {
    answers: Vec<String>,
}

impl PresetClarifier {
    pub fn new(answers: Vec<String>) -> Self {
        Self { answers }
    }
}

#[async_trait]
impl InteractiveClarifier for PresetClarifier {
    async fn ask(&self, questions: &[String]) -> Result<Vec<String>, ClarificationError> {
        debug!(questions = questions.len(), answers = self.answers.len(), "Using preset answers");
        Ok((0..questions.len())
            .map(|i| self.answers.get(i).cloned().unwrap_or_default())
            .collect())
    }
}
