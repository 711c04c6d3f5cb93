// Type definitions, error taxonomy and shared result types

use crate::pipeline::RunState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Failures reported by the text generation collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("generation timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl GenerationError {
    /// Timeouts, rate limits and transport hiccups are worth retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GenerationError::InvalidResponse(_))
    }
}

/// Failures of a single agent invocation, classified for the retry loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentInvocationError {
    #[error("transient agent failure: {0}")]
    Transient(String),

    #[error("permanent agent failure: {0}")]
    Permanent(String),
}

impl AgentInvocationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentInvocationError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            AgentInvocationError::Transient(m) | AgentInvocationError::Permanent(m) => m,
        }
    }
}

impl From<GenerationError> for AgentInvocationError {
    fn from(err: GenerationError) -> Self {
        if err.is_transient() {
            AgentInvocationError::Transient(err.to_string())
        } else {
            AgentInvocationError::Permanent(err.to_string())
        }
    }
}

/// The plan text could not be turned into a usable step list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanParseError {
    #[error("no numbered steps were recognized in the plan")]
    NoSteps,

    #[error("step numbering is not sequential: expected {expected}, found {found}")]
    NonSequential { expected: u32, found: u32 },

    #[error("step {0} appears more than once")]
    Duplicate(u32),
}

/// A step needed an artifact that no earlier step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("step {step} is missing required output from step(s) {missing:?}")]
pub struct MissingDependencyError {
    pub step: u32,
    pub missing: Vec<u32>,
}

/// Run-fatal errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("plan could not be parsed: {0}")]
    PlanParse(#[from] PlanParseError),

    #[error("{stage} agent failed: {source}")]
    Agent {
        stage: &'static str,
        #[source]
        source: AgentInvocationError,
    },

    #[error("no usable critique was produced ({attempted} critique(s) attempted)")]
    InsufficientMaterial { attempted: usize },

    #[error("report could not be stored: {0}")]
    Storage(String),

    #[error("run was cancelled")]
    Cancelled,
}

/// Structured failure returned by the run entry point.
#[derive(Debug, Clone, thiserror::Error)]
#[error("research run failed while {state}: {error}")]
pub struct RunFailure {
    pub state: RunState,
    /// Step whose failure aborted the run, when one step is to blame.
    pub failing_step: Option<u32>,
    /// Highest step index that finished successfully before the abort.
    pub last_completed_step: Option<u32>,
    pub error: PipelineError,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Research run failed: {0}")]
    Run(#[from] RunFailure),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
