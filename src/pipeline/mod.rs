//! Research pipeline
//!
//! ```text
//! Planning → Clarifying → Executing → Synthesizing → Formatting → Done
//!     └──────────┴────────────┴────────────┴──────────────┴──────→ Failed
//! ```
//!
//! Clarifying is skipped when nothing needs clarification. Every stage
//! may fail the run; Done and Failed are final.

pub mod executor;
pub mod plan;
pub mod router;
pub mod run;

pub use executor::{ExecutionReport, Interrupted, PipelineExecutor};
pub use plan::PlanParser;
pub use router::{Artifacts, ContextRouter};
pub use run::{ResearchPipeline, RunOutput};

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Planning,
    Clarifying,
    Executing,
    Synthesizing,
    Formatting,
    Done,
    Failed,
}

impl RunState {
    pub fn is_final(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (*self, next) {
            (current, _) if current.is_final() => false,
            (_, Failed) => true,
            (Planning, Clarifying | Executing) => true,
            (Clarifying, Executing) => true,
            (Executing, Synthesizing) => true,
            (Synthesizing, Formatting) => true,
            (Formatting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Planning => "planning",
            RunState::Clarifying => "clarifying",
            RunState::Executing => "executing",
            RunState::Synthesizing => "synthesizing",
            RunState::Formatting => "formatting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}
