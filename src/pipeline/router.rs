//! Context Router
//!
//! Decides, for each step, which earlier artifacts it consumes and builds
//! the exact payload for its agent call. Reads artifacts, never changes
//! them. The only side effect is recording citation markers into the
//! ledger while rewriting text for synthesis, which is idempotent.

use crate::citations::CitationLedger;
use crate::models::{AgentKind, Critique, Plan, ResearchDocument, SourceRef, Step, SynthesizedReport};
use crate::search::{SearchError, SearchHit, WebSearchTool};
use crate::types::MissingDependencyError;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{debug, warn};

/// Artifacts produced so far in a run
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    documents: BTreeMap<u32, ResearchDocument>,
    critiques: Vec<Critique>,
}

impl Artifacts {
    pub fn document(&self, step_index: u32) -> Option<&ResearchDocument> {
        self.documents.get(&step_index)
    }

    pub fn documents(&self) -> impl Iterator<Item = &ResearchDocument> {
        self.documents.values()
    }

    /// Ordered by critique step, then by the critiqued document's step
    pub fn critiques(&self) -> &[Critique] {
        &self.critiques
    }

    pub(crate) fn insert_document(&mut self, document: ResearchDocument) {
        self.documents.insert(document.source_step_index, document);
    }

    pub(crate) fn push_critiques(&mut self, critiques: Vec<Critique>) {
        self.critiques.extend(critiques);
        self.critiques
            .sort_by_key(|c| (c.critique_step_index, c.source_document_step_index));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchPayload {
    pub step_index: u32,
    pub task_description: String,
    pub search_query: String,
    pub search_results: Vec<SearchHit>,
    /// The search collaborator failed; the model works from general knowledge
    pub search_degraded: bool,
    pub guidance: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CritiquePayload {
    pub critique_step_index: u32,
    pub document_step_index: u32,
    /// Task of the research step that produced the document
    pub task_description: String,
    pub raw_text: String,
}

/// Payloads for the documents a critique step can reach
#[derive(Debug, Clone, PartialEq)]
pub struct CritiqueRouting {
    pub payloads: Vec<CritiquePayload>,
    /// Targets whose document does not exist
    pub missing: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisPayload {
    pub overall_query: String,
    pub formatted_critiques: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriterPayload {
    pub overall_query: String,
    pub synthesized_text: String,
    pub instructions: String,
}

pub struct ContextRouter<'a> {
    query: &'a str,
    guidance: &'a str,
    search: &'a dyn WebSearchTool,
    ledger: &'a CitationLedger,
}

impl<'a> ContextRouter<'a> {
    /// `query` is the effective query (original plus any clarifications).
    pub fn new(
        query: &'a str,
        guidance: &'a str,
        search: &'a dyn WebSearchTool,
        ledger: &'a CitationLedger,
    ) -> Self {
        Self {
            query,
            guidance,
            search,
            ledger,
        }
    }

    /// The quoted query, or the description when the plan gave none.
    pub fn search_query_for(step: &Step) -> String {
        step.search_query.clone().unwrap_or_else(|| {
            warn!(step = step.index, "No quoted search query, searching with the step description");
            step.description.clone()
        })
    }

    pub async fn research_payload(&self, step: &Step) -> Result<ResearchPayload, SearchError> {
        let search_query = Self::search_query_for(step);
        let search_results = self.search.search(&search_query).await?;
        debug!(step = step.index, hits = search_results.len(), "Search results routed");

        Ok(ResearchPayload {
            step_index: step.index,
            task_description: step.description.clone(),
            search_query,
            search_results,
            search_degraded: false,
            guidance: self.guidance.to_string(),
        })
    }

    /// Payload for a research step whose search failed for good.
    pub fn degraded_research_payload(&self, step: &Step) -> ResearchPayload {
        ResearchPayload {
            step_index: step.index,
            task_description: step.description.clone(),
            search_query: Self::search_query_for(step),
            search_results: Vec::new(),
            search_degraded: true,
            guidance: self.guidance.to_string(),
        }
    }

    /// Research steps a critique step evaluates.
    ///
    /// Referenced research steps when there are any. A step with no step
    /// references at all evaluates every earlier research step, since the
    /// plan text under-reports dependencies more often than it over-reports
    /// them. A step whose references lead to no research step has nothing
    /// to critique.
    pub fn critique_targets(step: &Step, plan: &Plan) -> Result<Vec<u32>, MissingDependencyError> {
        let referenced: Vec<u32> = step
            .depends_on
            .iter()
            .copied()
            .filter(|i| plan.get(*i).is_some_and(|s| s.kind == AgentKind::Research))
            .collect();
        if !referenced.is_empty() {
            return Ok(referenced);
        }

        if step.depends_on.is_empty() && step.invalid_refs.is_empty() {
            let earlier: Vec<u32> = plan
                .steps_of(AgentKind::Research)
                .map(|s| s.index)
                .filter(|i| *i < step.index)
                .collect();
            if !earlier.is_empty() {
                return Ok(earlier);
            }
        }

        let mut missing: Vec<u32> = step.depends_on.iter().chain(&step.invalid_refs).copied().collect();
        missing.sort_unstable();
        Err(MissingDependencyError {
            step: step.index,
            missing,
        })
    }

    pub fn critique_payloads(
        &self,
        step: &Step,
        plan: &Plan,
        artifacts: &Artifacts,
    ) -> Result<CritiqueRouting, MissingDependencyError> {
        let targets = Self::critique_targets(step, plan)?;
        let mut payloads = Vec::with_capacity(targets.len());
        let mut missing = Vec::new();

        for target in targets {
            match artifacts.document(target) {
                Some(doc) => payloads.push(CritiquePayload {
                    critique_step_index: step.index,
                    document_step_index: target,
                    task_description: doc.task_description.clone(),
                    raw_text: doc.raw_text.clone(),
                }),
                None => missing.push(target),
            }
        }

        if payloads.is_empty() {
            return Err(MissingDependencyError {
                step: step.index,
                missing,
            });
        }
        Ok(CritiqueRouting { payloads, missing })
    }

    /// All critiques as one ordered block. Markers are rewritten to ledger
    /// global ids, scoped to the critiqued document's step.
    pub fn synthesis_payload(&self, plan: &Plan, artifacts: &Artifacts, gaps: &[String]) -> SynthesisPayload {
        let mut block = String::new();

        for (i, critique) in artifacts.critiques().iter().enumerate() {
            let origin = critique.source_document_step_index;
            let (task, sources, text): (&str, &[SourceRef], &str) = match artifacts.document(origin) {
                Some(doc) => (
                    doc.task_description.as_str(),
                    doc.sources.as_slice(),
                    doc.raw_text.as_str(),
                ),
                None => ("N/A", &[][..], ""),
            };
            let global = |s: &str| self.ledger.globalize(s, origin, sources);

            let _ = writeln!(block, "Critiqued Document {}:", i + 1);
            let _ = writeln!(block, "Original Task: {}", task);
            let _ = writeln!(block, "Critique:");
            let _ = writeln!(block, "Relevance to Task: {:?}", critique.relevance);
            let _ = writeln!(block, "Key Points Covered:");
            for point in &critique.key_points {
                let _ = writeln!(block, "- {}", global(point));
            }
            let _ = writeln!(block, "Potential Gaps or Biases:");
            for gap in &critique.gaps {
                let _ = writeln!(block, "- {}", global(gap));
            }
            let _ = writeln!(block, "Overall Quality Assessment: {:?}", critique.quality);
            let _ = writeln!(block, "Concise Summary of this Document: {}", global(&critique.summary));
            if !text.is_empty() {
                let _ = writeln!(block, "Document Content:\n{}", global(text));
            }
            block.push_str("---\n");
        }

        let mut instructions = plan_instructions(plan, AgentKind::Synthesiser);
        if !gaps.is_empty() {
            instructions.push_str("\nSome material was unavailable; acknowledge these gaps where relevant:\n");
            for gap in gaps {
                let _ = writeln!(instructions, "- {}", gap);
            }
        }

        debug!(critiques = artifacts.critiques().len(), chars = block.len(), "Synthesis payload built");
        SynthesisPayload {
            overall_query: self.query.to_string(),
            formatted_critiques: block,
            instructions,
        }
    }

    pub fn writer_payload(&self, plan: &Plan, synthesized: &SynthesizedReport) -> WriterPayload {
        WriterPayload {
            overall_query: self.query.to_string(),
            synthesized_text: synthesized.text.clone(),
            instructions: plan_instructions(plan, AgentKind::Writer),
        }
    }
}

/// Descriptions of deferred plan steps, passed on as stage instructions.
fn plan_instructions(plan: &Plan, kind: AgentKind) -> String {
    let mut out = String::new();
    for step in plan.steps_of(kind) {
        if out.is_empty() {
            out.push_str("Plan instructions for this stage:\n");
        }
        let _ = writeln!(out, "- {}", step.description);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Quality, Relevance};
    use crate::pipeline::plan::PlanParser;
    use crate::search::DisabledSearch;

    fn doc(step: u32, text: &str) -> ResearchDocument {
        ResearchDocument {
            source_step_index: step,
            task_description: format!("Task {}", step),
            search_query: "q".into(),
            raw_text: text.into(),
            citation_markers: vec![],
            sources: vec![SourceRef {
                title: format!("S{}", step),
                url: format!("https://s{}.org", step),
            }],
            search_degraded: false,
        }
    }

    fn critique(critique_step: u32, doc_step: u32, summary: &str) -> Critique {
        Critique {
            critique_step_index: critique_step,
            source_document_step_index: doc_step,
            relevance: Relevance::High,
            quality: Quality::Good,
            key_points: vec!["point [1]".into()],
            gaps: vec![],
            summary: summary.into(),
        }
    }

    #[test]
    fn test_critique_targets() {
        let plan = PlanParser::parse(
            "1. [ResearchAgent] Search for: 'a'\n\
             2. [ResearchAgent] Search for: 'b'\n\
             3. [CritiqueAgent] Evaluate results from step 2\n\
             4. [CritiqueAgent] Evaluate all findings\n\
             5. [CritiqueAgent] Evaluate results from step 9\n\
             6. [CritiqueAgent] Review the critique from step 3",
        )
        .unwrap();

        assert_eq!(ContextRouter::critique_targets(plan.get(3).unwrap(), &plan), Ok(vec![2]));
        assert_eq!(ContextRouter::critique_targets(plan.get(4).unwrap(), &plan), Ok(vec![1, 2]));
        let err = ContextRouter::critique_targets(plan.get(5).unwrap(), &plan).unwrap_err();
        assert_eq!(err.missing, vec![9]);
        let err = ContextRouter::critique_targets(plan.get(6).unwrap(), &plan).unwrap_err();
        assert_eq!(err.missing, vec![3]);
    }

    #[test]
    fn test_critique_payload_requires_document() {
        let plan = PlanParser::parse(
            "1. [ResearchAgent] Search for: 'a'\n2. [CritiqueAgent] Evaluate results from step 1",
        )
        .unwrap();
        let ledger = CitationLedger::new();
        let router = ContextRouter::new("q", "", &DisabledSearch, &ledger);

        let err = router
            .critique_payloads(plan.get(2).unwrap(), &plan, &Artifacts::default())
            .unwrap_err();
        assert_eq!(err, MissingDependencyError { step: 2, missing: vec![1] });

        let mut artifacts = Artifacts::default();
        artifacts.insert_document(doc(1, "Findings [1]."));
        let routing = router.critique_payloads(plan.get(2).unwrap(), &plan, &artifacts).unwrap();
        assert_eq!(routing.payloads[0].task_description, "Task 1");
        assert_eq!(routing.payloads[0].raw_text, "Findings [1].");
        assert!(routing.missing.is_empty());
    }

    #[test]
    fn test_synthesis_block_uses_global_ids() {
        let plan = PlanParser::parse(
            "1. [ResearchAgent] Search for: 'a'\n\
             2. [ResearchAgent] Search for: 'b'\n\
             3. [CritiqueAgent] Evaluate results from step 1\n\
             4. [CritiqueAgent] Evaluate results from step 2\n\
             5. [SynthesiserAgent] Emphasise cost trends",
        )
        .unwrap();
        let ledger = CitationLedger::new();
        let mut artifacts = Artifacts::default();
        artifacts.insert_document(doc(1, "A [1]."));
        artifacts.insert_document(doc(2, "B [1]."));
        ledger.globalize("A [1].", 1, &[]);
        ledger.globalize("B [1].", 2, &[]);
        artifacts.push_critiques(vec![critique(4, 2, "About B [1].")]);
        artifacts.push_critiques(vec![critique(3, 1, "About A [1].")]);

        let router = ContextRouter::new("overall", "", &DisabledSearch, &ledger);
        let payload = router.synthesis_payload(&plan, &artifacts, &["Research step 7 unavailable".into()]);

        let first = payload.formatted_critiques.find("Original Task: Task 1").unwrap();
        let second = payload.formatted_critiques.find("Original Task: Task 2").unwrap();
        assert!(first < second);
        assert!(payload.formatted_critiques.contains("About A [1]."));
        assert!(payload.formatted_critiques.contains("About B [2]."));
        assert!(payload.instructions.contains("Emphasise cost trends"));
        assert!(payload.instructions.contains("Research step 7 unavailable"));
        assert_eq!(ledger.len(), 2);
    }
}
