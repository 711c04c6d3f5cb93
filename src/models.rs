// Core models for a single research run

use crate::types::MissingDependencyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The user's original request. Never mutated once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent capability a plan step is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Clarifier,
    Research,
    Critique,
    Synthesiser,
    Writer,
}

impl AgentKind {
    /// Parse the bracketed tag used in plan text, e.g. `ResearchAgent`.
    ///
    /// Matching is case-insensitive, the `Agent` suffix is optional and
    /// the common spelling variants emitted by planners are accepted.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase();
        let name = tag.strip_suffix("agent").unwrap_or(&tag).trim();
        match name {
            "clarifier" | "clarify" => Some(AgentKind::Clarifier),
            "research" | "researcher" => Some(AgentKind::Research),
            "critique" | "critic" => Some(AgentKind::Critique),
            "synthesiser" | "synthesizer" | "synthesis" => Some(AgentKind::Synthesiser),
            "writer" | "write" => Some(AgentKind::Writer),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AgentKind::Clarifier => "ClarifierAgent",
            AgentKind::Research => "ResearchAgent",
            AgentKind::Critique => "CritiqueAgent",
            AgentKind::Synthesiser => "SynthesiserAgent",
            AgentKind::Writer => "WriterAgent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Non-fatal problems noticed while parsing a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum StepFlag {
    /// Research step without a single-quoted search query
    MissingSearchQuery,
    /// Description mentions a step that is not earlier in the plan
    InvalidReference { referenced: u32 },
    /// Critique step mentions more than one research step
    AmbiguousCritiqueTarget { candidates: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based, matches the numbering in the plan text
    pub index: u32,
    pub kind: AgentKind,
    pub description: String,
    /// Present iff the plan gave a quoted query for a Research step
    pub search_query: Option<String>,
    /// Earlier steps referenced from the description
    pub depends_on: BTreeSet<u32>,
    /// References to the step itself, later steps or steps that do not exist
    pub invalid_refs: BTreeSet<u32>,
    pub flags: Vec<StepFlag>,
}

impl Step {
    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// Ordered, immutable list of steps produced once per query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub(crate) fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: u32) -> Option<&Step> {
        // indices are gapless and start at 1
        index
            .checked_sub(1)
            .and_then(|i| self.steps.get(i as usize))
            .filter(|s| s.index == index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps_of(&self, kind: AgentKind) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.kind == kind)
    }
}

/// A cited source as returned by the search collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Output of a Research step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchDocument {
    pub source_step_index: u32,
    pub task_description: String,
    pub search_query: String,
    pub raw_text: String,
    /// Raw citation labels in the order they appear in `raw_text`
    pub citation_markers: Vec<String>,
    /// Sources offered to the model; label `n` refers to `sources[n - 1]`
    pub sources: Vec<SourceRef>,
    /// Search was unavailable and the document was written without sources
    pub search_degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl FromStr for Relevance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        words(s)
            .find_map(|word| match word.as_str() {
                "high" => Some(Relevance::High),
                "medium" | "moderate" => Some(Relevance::Medium),
                "low" => Some(Relevance::Low),
                _ => None,
            })
            .ok_or_else(|| format!("unknown relevance '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        words(s)
            .find_map(|word| match word.as_str() {
                "excellent" => Some(Quality::Excellent),
                "good" => Some(Quality::Good),
                "fair" => Some(Quality::Fair),
                "poor" => Some(Quality::Poor),
                _ => None,
            })
            .ok_or_else(|| format!("unknown quality '{}'", s.trim()))
    }
}

/// Lowercased words of a score value; the first known score word wins.
fn words(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Structured evaluation of one research document by one critique step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub critique_step_index: u32,
    pub source_document_step_index: u32,
    pub relevance: Relevance,
    pub quality: Quality,
    pub key_points: Vec<String>,
    pub gaps: Vec<String>,
    pub summary: String,
}

/// Ledger entry for one (origin step, raw marker) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEntry {
    pub global_id: u32,
    pub canonical_label: String,
    pub origin_step_index: u32,
    pub first_seen_order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

/// Output of the synthesis stage; markers reference ledger global ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedReport {
    pub text: String,
    pub citations_used: BTreeSet<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingDependency(MissingDependencyError),
    AgentFailure { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingDependency(e) => write!(f, "{}", e),
            SkipReason::AgentFailure { message } => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    /// Step kinds that are folded into a later stage rather than run alone
    Deferred,
    Succeeded,
    Skipped(SkipReason),
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending)
    }
}

/// Per-step record kept by the executor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub index: u32,
    pub kind: AgentKind,
    pub description: String,
    pub status: StepStatus,
    pub attempts: u32,
}
