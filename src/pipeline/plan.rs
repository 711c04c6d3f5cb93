//! Plan Parser
//!
//! Turns the planner's free-form numbered list into typed [`Step`]s:
//!
//! ```text
//! 1. [ResearchAgent] Search for: 'perovskite efficiency 2024'
//! 2. [CritiqueAgent] Evaluate results from step 1
//!    and note missing manufacturing data.       <- continuation line
//! 3. [SynthesiserAgent] Combine the critiques
//! ```
//!
//! Dependencies are inferred from "step N" mentions and are best-effort:
//! the executor tolerates both missed and spurious references.

use crate::models::{AgentKind, Plan, Step, StepFlag};
use crate::types::PlanParseError;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static STEP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s+)?(?:\*\*)?(\d+)\.(?:\*\*)?\s*\[([^\]]+)\]\s*(.*)$")
        .expect("step line pattern is valid")
});

/// Quoted query following an explicit "Search for" cue.
static SEARCH_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)search(?:\s+for)?\s*:?\s*(?:'([^']+)'|"([^"]+)"|‘([^’]+)’|“([^”]+)”)"#)
        .expect("search-for pattern is valid")
});

/// Any quoted span whose opening quote is not part of a word (so
/// apostrophes such as "company's" are not taken as delimiters).
static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s:(\[])(?:'([^']+)'|"([^"]+)"|‘([^’]+)’|“([^”]+)”)"#)
        .expect("quoted pattern is valid")
});

static STEP_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsteps?\s+#?(\d+(?:\s*(?:,|&|and|or|-|–|to)\s*#?\d+)*)")
        .expect("step reference pattern is valid")
});

static REF_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+|-|–|\bto\b").expect("reference token pattern is valid")
});

/// Upper bound on a "steps N-M" range so a typo cannot explode the set.
const MAX_RANGE_SPAN: u32 = 64;

pub struct PlanParser;

impl PlanParser {
    /// Parse plan text into an ordered, gapless list of steps
    pub fn parse(text: &str) -> Result<Plan, PlanParseError> {
        let mut raw: Vec<(u32, AgentKind, String)> = Vec::new();

        for line in text.lines() {
            if let Some((index, kind, rest)) = Self::match_step_line(line) {
                raw.push((index, kind, rest));
                continue;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match raw.last_mut() {
                Some((_, _, description)) => {
                    if !description.is_empty() {
                        description.push(' ');
                    }
                    description.push_str(trimmed);
                }
                None => debug!(line = %trimmed, "Ignoring plan preamble line"),
            }
        }

        if raw.is_empty() {
            return Err(PlanParseError::NoSteps);
        }

        let mut seen = HashSet::new();
        for (position, (index, _, _)) in raw.iter().enumerate() {
            if !seen.insert(*index) {
                return Err(PlanParseError::Duplicate(*index));
            }
            let expected = position as u32 + 1;
            if *index != expected {
                return Err(PlanParseError::NonSequential {
                    expected,
                    found: *index,
                });
            }
        }

        let total = raw.len() as u32;
        let mut steps: Vec<Step> = raw
            .into_iter()
            .map(|(index, kind, description)| Self::build_step(index, kind, description, total))
            .collect();

        Self::flag_ambiguous_critiques(&mut steps);

        for step in steps.iter().filter(|s| s.is_flagged()) {
            warn!(step = step.index, kind = %step.kind, flags = ?step.flags, "Plan step flagged");
        }
        info!(step_count = steps.len(), "Parsed research plan");

        Ok(Plan::from_steps(steps))
    }

    fn match_step_line(line: &str) -> Option<(u32, AgentKind, String)> {
        let caps = STEP_LINE.captures(line)?;
        let index = caps[1].parse::<u32>().ok()?;
        let kind = AgentKind::from_tag(&caps[2])?;
        Some((index, kind, caps[3].trim().to_string()))
    }

    fn build_step(index: u32, kind: AgentKind, description: String, total: u32) -> Step {
        let mut flags = Vec::new();

        let search_query = if kind == AgentKind::Research {
            let query = extract_search_query(&description);
            if query.is_none() {
                flags.push(StepFlag::MissingSearchQuery);
            }
            query
        } else {
            None
        };

        let mut depends_on = BTreeSet::new();
        let mut invalid_refs = BTreeSet::new();
        for referenced in extract_step_refs(&description) {
            if referenced >= 1 && referenced < index && referenced <= total {
                depends_on.insert(referenced);
            } else if invalid_refs.insert(referenced) {
                flags.push(StepFlag::InvalidReference { referenced });
            }
        }

        Step {
            index,
            kind,
            description,
            search_query,
            depends_on,
            invalid_refs,
            flags,
        }
    }

    fn flag_ambiguous_critiques(steps: &mut [Step]) {
        let research: HashSet<u32> = steps
            .iter()
            .filter(|s| s.kind == AgentKind::Research)
            .map(|s| s.index)
            .collect();

        for step in steps.iter_mut().filter(|s| s.kind == AgentKind::Critique) {
            let candidates: Vec<u32> = step
                .depends_on
                .iter()
                .copied()
                .filter(|i| research.contains(i))
                .collect();
            if candidates.len() > 1 {
                step.flags.push(StepFlag::AmbiguousCritiqueTarget { candidates });
            }
        }
    }
}

/// Quoted search query of a research step, preferring an explicit
/// "Search for:" cue over any other quoted span.
pub fn extract_search_query(description: &str) -> Option<String> {
    [&*SEARCH_FOR, &*QUOTED]
        .iter()
        .find_map(|re| re.captures(description))
        .and_then(|caps| {
            (1..=4)
                .find_map(|i| caps.get(i))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|q| !q.is_empty())
}

/// Step numbers mentioned in free text, in order of first mention.
/// "steps 2-4" expands to 2, 3, 4.
pub fn extract_step_refs(text: &str) -> Vec<u32> {
    let mut refs = Vec::new();
    for caps in STEP_REF.captures_iter(text) {
        let mut previous: Option<u32> = None;
        let mut pending_range = false;
        for token in REF_TOKEN.find_iter(&caps[1]) {
            match token.as_str().parse::<u32>() {
                Ok(n) => {
                    match previous {
                        Some(start) if pending_range && n > start && n - start <= MAX_RANGE_SPAN => {
                            refs.extend(start + 1..n);
                        }
                        _ => {}
                    }
                    refs.push(n);
                    previous = Some(n);
                    pending_range = false;
                }
                Err(_) => pending_range = true,
            }
        }
    }

    let mut seen = HashSet::new();
    refs.retain(|n| seen.insert(*n));
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_plan() {
        let plan = PlanParser::parse(
            "1. [ResearchAgent] Search for: 'X'\n2. [CritiqueAgent] Evaluate results from step 1",
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        let research = plan.get(1).unwrap();
        assert_eq!(research.kind, AgentKind::Research);
        assert_eq!(research.search_query.as_deref(), Some("X"));
        assert!(research.depends_on.is_empty());

        let critique = plan.get(2).unwrap();
        assert_eq!(critique.kind, AgentKind::Critique);
        assert_eq!(critique.depends_on, BTreeSet::from([1]));
        assert!(!critique.is_flagged());
    }

    #[test]
    fn test_indices_match_input_numbering() {
        let text = "Here is the plan:\n\
            1. [ResearchAgent] Search for: 'solar capacity growth'\n\
            2. [ResearchAgent] Search for: \"wind cost trends\"\n\
            3. [CritiqueAgent] Evaluate results from step 1\n\
            4. [CritiqueAgent] Evaluate results from step 2\n\
            5. [SynthesiserAgent] Combine findings from steps 3 and 4\n\
            6. [WriterAgent] Write the final report";
        let plan = PlanParser::parse(text).unwrap();

        let indices: Vec<u32> = plan.steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(plan.get(2).unwrap().search_query.as_deref(), Some("wind cost trends"));
        assert_eq!(plan.get(5).unwrap().depends_on, BTreeSet::from([3, 4]));
    }

    #[test]
    fn test_continuation_lines_join_previous_step() {
        let text = "1. [ResearchAgent] Search for: 'battery storage'\n\
            \x20  focusing on grid-scale deployments\n\
            2. [CritiqueAgent] Evaluate the results\n\
            from step 1 for recency";
        let plan = PlanParser::parse(text).unwrap();

        assert_eq!(
            plan.get(1).unwrap().description,
            "Search for: 'battery storage' focusing on grid-scale deployments"
        );
        assert_eq!(plan.get(2).unwrap().depends_on, BTreeSet::from([1]));
    }

    #[test]
    fn test_research_without_query_is_flagged_not_fatal() {
        let text = "1. [ResearchAgent] Look into the history of the topic\n\
            2. [ResearchAgent] Search for: 'current state'";
        let plan = PlanParser::parse(text).unwrap();

        let first = plan.get(1).unwrap();
        assert!(first.search_query.is_none());
        assert_eq!(first.flags, vec![StepFlag::MissingSearchQuery]);
        assert_eq!(plan.get(2).unwrap().search_query.as_deref(), Some("current state"));
    }

    #[test]
    fn test_apostrophes_are_not_quotes() {
        assert_eq!(extract_search_query("Review the company's 'annual filings' data"), Some("annual filings".into()));
        assert_eq!(extract_search_query("Review the company's filings"), None);
    }

    #[test]
    fn test_no_steps_is_an_error() {
        assert_eq!(PlanParser::parse("I could not make a plan."), Err(PlanParseError::NoSteps));
        assert_eq!(PlanParser::parse(""), Err(PlanParseError::NoSteps));
    }

    #[test]
    fn test_gaps_and_duplicates_are_errors() {
        let gap = "1. [ResearchAgent] Search for: 'a'\n3. [CritiqueAgent] from step 1";
        assert_eq!(
            PlanParser::parse(gap),
            Err(PlanParseError::NonSequential { expected: 2, found: 3 })
        );

        let dup = "1. [ResearchAgent] Search for: 'a'\n1. [ResearchAgent] Search for: 'b'";
        assert_eq!(PlanParser::parse(dup), Err(PlanParseError::Duplicate(1)));

        let late_start = "2. [ResearchAgent] Search for: 'a'";
        assert_eq!(
            PlanParser::parse(late_start),
            Err(PlanParseError::NonSequential { expected: 1, found: 2 })
        );
    }

    #[test]
    fn test_unknown_tag_is_continuation_text() {
        let text = "1. [ResearchAgent] Search for: 'a'\n2. [PlannerAgent] replan";
        let plan = PlanParser::parse(text).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan.get(1).unwrap().description.ends_with("2. [PlannerAgent] replan"));
    }

    #[test]
    fn test_forward_and_self_references_are_invalid() {
        let text = "1. [ResearchAgent] Search for: 'a'\n\
            2. [CritiqueAgent] Evaluate results from step 7 and step 2";
        let plan = PlanParser::parse(text).unwrap();
        let critique = plan.get(2).unwrap();

        assert!(critique.depends_on.is_empty());
        assert_eq!(critique.invalid_refs, BTreeSet::from([2, 7]));
        assert!(critique.flags.contains(&StepFlag::InvalidReference { referenced: 7 }));
    }

    #[test]
    fn test_ambiguous_critique_target_flagged() {
        let text = "1. [ResearchAgent] Search for: 'a'\n\
            2. [ResearchAgent] Search for: 'b'\n\
            3. [CritiqueAgent] Compare results from steps 1 and 2";
        let plan = PlanParser::parse(text).unwrap();
        assert_eq!(
            plan.get(3).unwrap().flags,
            vec![StepFlag::AmbiguousCritiqueTarget { candidates: vec![1, 2] }]
        );
    }

    #[test]
    fn test_step_reference_ranges() {
        assert_eq!(extract_step_refs("using steps 2-4"), vec![2, 3, 4]);
        assert_eq!(extract_step_refs("from step 1, then step 3 to 5"), vec![1, 3, 4, 5]);
        assert_eq!(extract_step_refs("results from step 2 and step 2"), vec![2]);
        assert!(extract_step_refs("a two-step process").is_empty());
    }

    #[test]
    fn test_bold_and_bulleted_numbering() {
        let text = "**1.** [ResearchAgent] Search for: 'a'\n- 2. [WriterAgent] Write it up";
        let plan = PlanParser::parse(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get(2).unwrap().kind, AgentKind::Writer);
    }
}
