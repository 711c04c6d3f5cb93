//! Agent System
//!
//! Each agent wraps one prompt template: it turns a routed payload into
//! template variables, calls the text generation service and interprets
//! the response.
//!
//! ```text
//! Query
//!   │
//!   ▼
//! ┌─────────────┐
//! │  Planner    │  → numbered plan text
//! └─────────────┘
//!   │        ┌─────────────┐
//!   ├───────▶│ Clarifier   │  → questions / research guidance
//!   │        └─────────────┘
//!   ▼
//! ┌─────────────┐
//! │  Research   │  → documents citing [n] (in parallel)
//! └─────────────┘
//!   ▼
//! ┌─────────────┐
//! │  Critique   │  → structured evaluations
//! └─────────────┘
//!   ▼
//! ┌─────────────┐
//! │ Synthesiser │  → one analysis with global citation ids
//! └─────────────┘
//!   ▼
//! ┌─────────────┐
//! │   Writer    │  → Markdown body
//! └─────────────┘
//! ```

pub mod clarifier;
pub mod critique;
pub mod planner;
pub mod research;
pub mod synthesiser;
pub mod writer;

pub use clarifier::{ClarificationCheck, ClarifierAgent};
pub use critique::CritiqueAgent;
pub use planner::PlannerAgent;
pub use research::ResearchAgent;
pub use synthesiser::SynthesiserAgent;
pub use writer::WriterAgent;

use crate::types::AgentInvocationError;

/// Blank model output is a malformed response, not something to retry.
pub(crate) fn non_empty(text: String, agent: &str) -> Result<String, AgentInvocationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with("Error:") {
        return Err(AgentInvocationError::Permanent(format!(
            "{} returned no usable content",
            agent
        )));
    }
    Ok(trimmed.to_string())
}
