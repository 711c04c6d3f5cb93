//! Research run entry point
//!
//! Walks one query through the run state machine and returns either the
//! formatted report or a [`RunFailure`] naming the state, the failing step
//! and the last step that completed.

use super::executor::{invoke_agent, PipelineExecutor};
use super::plan::PlanParser;
use super::router::ContextRouter;
use super::RunState;
use crate::agents::clarifier::{extract_insights, fold_answers};
use crate::agents::writer::clean_output;
use crate::agents::{ClarificationCheck, ClarifierAgent, PlannerAgent, SynthesiserAgent, WriterAgent};
use crate::citations::CitationLedger;
use crate::clarify::InteractiveClarifier;
use crate::config::{Config, PipelineConfig};
use crate::llm::{TextGenerationService, LLM};
use crate::models::{AgentKind, Plan, Query, StepOutcome};
use crate::report::{FormattedReport, ReportAssembler};
use crate::search::serpapi::SerpApiClient;
use crate::search::{DisabledSearch, WebSearchTool};
use crate::storage::{FileReportStore, ReportStore};
use crate::types::{AppResult, PipelineError, RunFailure};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub report: FormattedReport,
    pub plan: Plan,
    pub outcomes: Vec<StepOutcome>,
    /// Where the report store put the report, when one is configured
    pub location: Option<String>,
    /// States visited, in order
    pub transitions: Vec<RunState>,
}

/// Tracks the run state and turns errors into [`RunFailure`]s.
struct RunTracker {
    state: RunState,
    transitions: Vec<RunState>,
    last_completed_step: Option<u32>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: RunState::Planning,
            transitions: vec![RunState::Planning],
            last_completed_step: None,
        }
    }

    fn advance(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected run state transition");
        }
        info!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
        self.transitions.push(next);
    }

    fn fail(&mut self, error: PipelineError, failing_step: Option<u32>) -> RunFailure {
        let state = self.state;
        warn!(state = %state, error = %error, ?failing_step, "Research run failed");
        self.advance(RunState::Failed);
        RunFailure {
            state,
            failing_step,
            last_completed_step: self.last_completed_step,
            error,
        }
    }
}

/// Await `future` unless the run is cancelled first.
async fn cancellable<T>(cancel: &CancellationToken, future: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

fn first_step(plan: &Plan, kind: AgentKind) -> Option<u32> {
    plan.steps_of(kind).next().map(|s| s.index)
}

pub struct ResearchPipeline {
    llm: Arc<dyn TextGenerationService>,
    search: Arc<dyn WebSearchTool>,
    store: Option<Arc<dyn ReportStore>>,
    clarifier: Option<Arc<dyn InteractiveClarifier>>,
    config: PipelineConfig,
}

impl ResearchPipeline {
    pub fn new(llm: Arc<dyn TextGenerationService>, search: Arc<dyn WebSearchTool>, config: PipelineConfig) -> Self {
        Self {
            llm,
            search,
            store: None,
            clarifier: None,
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clarifier(mut self, clarifier: Arc<dyn InteractiveClarifier>) -> Self {
        self.clarifier = Some(clarifier);
        self
    }

    /// Production wiring: configured LLM provider, SerpAPI when a key is
    /// set, reports written under `REPORTS_DIR`.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let llm = LLM::new(&config.llm)?;
        let search: Arc<dyn WebSearchTool> = match SerpApiClient::from_config(&config.search) {
            Some(client) => Arc::new(client),
            None => {
                warn!("SERPAPI_API_KEY not set; research steps will run without web sources");
                Arc::new(DisabledSearch)
            }
        };

        Ok(Self::new(Arc::new(llm), search, config.pipeline.clone())
            .with_store(Arc::new(FileReportStore::new(config.storage.reports_dir.clone()))))
    }

    pub fn without_store(mut self) -> Self {
        self.store = None;
        self
    }

    pub async fn run(&self, query: &str, answers: Option<Vec<String>>) -> Result<RunOutput, RunFailure> {
        self.run_with_cancel(query, answers, CancellationToken::new()).await
    }

    /// Run the pipeline; cancelling the token stops it at the next await
    /// point and reports the last completed step.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        answers: Option<Vec<String>>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, RunFailure> {
        let run_id = Uuid::new_v4();
        let span = info_span!("research_run", %run_id);
        self.execute_run(run_id, query, answers, cancel).instrument(span).await
    }

    async fn execute_run(
        &self,
        run_id: Uuid,
        query: &str,
        answers: Option<Vec<String>>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, RunFailure> {
        let mut tracker = RunTracker::new();
        let llm = self.llm.as_ref();

        let query = query.trim();
        if query.is_empty() {
            return Err(tracker.fail(PipelineError::EmptyQuery, None));
        }
        info!(query_len = query.len(), "Research run started");

        // pre-supplied answers replace the interactive clarification stage
        let preset_answers = answers.filter(|a| a.iter().any(|s| !s.trim().is_empty()));
        let mut effective_query = match &preset_answers {
            Some(answers) => fold_answers(query, &[], answers),
            None => query.to_string(),
        };
        let mut guidance = String::new();

        // Planning
        let planned = cancellable(
            &cancel,
            invoke_agent(&self.config, "PlannerAgent", || {
                PlannerAgent::generate_plan(llm, &effective_query)
            }),
        )
        .await;
        let plan_text = match planned {
            None => return Err(tracker.fail(PipelineError::Cancelled, None)),
            Some(attempted) => attempted.result.map_err(|source| {
                tracker.fail(
                    PipelineError::Agent {
                        stage: "planning",
                        source,
                    },
                    None,
                )
            })?,
        };
        let plan = PlanParser::parse(&plan_text).map_err(|e| tracker.fail(e.into(), None))?;
        info!(steps = plan.len(), "Plan ready");

        // Clarifying
        let has_clarifier_step = first_step(&plan, AgentKind::Clarifier).is_some();
        if preset_answers.is_none() && (has_clarifier_step || self.config.auto_clarify) {
            tracker.advance(RunState::Clarifying);
            let questions = match cancellable(&cancel, self.clarifying_questions(query, &plan_text, has_clarifier_step)).await {
                None => return Err(tracker.fail(PipelineError::Cancelled, first_step(&plan, AgentKind::Clarifier))),
                Some(questions) => questions,
            };

            if !questions.is_empty() {
                let answered = match &self.clarifier {
                    Some(clarifier) => match cancellable(&cancel, clarifier.ask(&questions)).await {
                        None => {
                            return Err(tracker.fail(PipelineError::Cancelled, first_step(&plan, AgentKind::Clarifier)))
                        }
                        Some(Ok(answers)) => Some(answers),
                        Some(Err(e)) => {
                            warn!(error = %e, "Clarifier unavailable, continuing with guidance");
                            None
                        }
                    },
                    None => None,
                };
                match answered {
                    Some(answers) if answers.iter().any(|a| !a.trim().is_empty()) => {
                        effective_query = fold_answers(query, &questions, &answers);
                        info!(answers = answers.len(), "Clarifications folded into query");
                    }
                    _ => {
                        guidance = extract_insights(&questions);
                        info!("No clarifications given; questions turned into research guidance");
                    }
                }
            }
        }

        // Executing
        tracker.advance(RunState::Executing);
        let ledger = CitationLedger::new();
        let router = ContextRouter::new(&effective_query, &guidance, self.search.as_ref(), &ledger);
        let executor = PipelineExecutor::new(llm, &router, &ledger, &self.config, cancel.clone());
        let execution = match executor.execute(&plan).await {
            Ok(execution) => execution,
            Err(interrupted) => {
                tracker.last_completed_step = interrupted.last_completed_step;
                return Err(tracker.fail(PipelineError::Cancelled, None));
            }
        };
        tracker.last_completed_step = execution.last_completed_step();
        for skipped in execution.skipped() {
            info!(step = skipped.index, kind = %skipped.kind, "Step skipped");
        }

        if execution.artifacts.critiques().is_empty() {
            let attempted = execution.critique_steps();
            return Err(tracker.fail(PipelineError::InsufficientMaterial { attempted }, None));
        }

        // Synthesizing
        tracker.advance(RunState::Synthesizing);
        let synthesis_step = first_step(&plan, AgentKind::Synthesiser);
        let payload = router.synthesis_payload(&plan, &execution.artifacts, &execution.notes);
        let synthesized = match cancellable(
            &cancel,
            invoke_agent(&self.config, "SynthesiserAgent", || SynthesiserAgent::synthesise(llm, &payload)),
        )
        .await
        {
            None => return Err(tracker.fail(PipelineError::Cancelled, synthesis_step)),
            Some(attempted) => attempted.result.map_err(|source| {
                tracker.fail(
                    PipelineError::Agent {
                        stage: "synthesis",
                        source,
                    },
                    synthesis_step,
                )
            })?,
        };
        info!(
            chars = synthesized.text.len(),
            citations = synthesized.citations_used.len(),
            "Synthesis complete"
        );

        // Formatting
        tracker.advance(RunState::Formatting);
        let writer_step = first_step(&plan, AgentKind::Writer);
        let mut notes = execution.notes.clone();
        let payload = router.writer_payload(&plan, &synthesized);
        let body = match cancellable(
            &cancel,
            invoke_agent(&self.config, "WriterAgent", || WriterAgent::format_report(llm, &payload)),
        )
        .await
        {
            None => return Err(tracker.fail(PipelineError::Cancelled, writer_step)),
            Some(attempted) => match attempted.result {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Writer failed, using the unformatted synthesis");
                    notes.push(format!(
                        "Report formatting failed ({}); the synthesized text is shown unformatted",
                        e.message()
                    ));
                    let cleaned = clean_output(&synthesized.text);
                    if cleaned.is_empty() {
                        synthesized.text.clone()
                    } else {
                        cleaned
                    }
                }
            },
        };

        let report = ReportAssembler::new(run_id, Query::new(query))
            .with_coverage_notes(notes)
            .assemble(&body, &ledger);
        for warning in &report.warnings {
            warn!(label = %warning.label, "{}", warning.message);
        }

        let location = match &self.store {
            Some(store) => match store.save(&report).await {
                Ok(location) => {
                    info!(%location, "Report saved");
                    Some(location)
                }
                Err(e) => return Err(tracker.fail(PipelineError::Storage(e.to_string()), None)),
            },
            None => None,
        };

        tracker.advance(RunState::Done);
        info!(
            references = report.references.len(),
            unresolved = report.unresolved_references().count(),
            "Research run complete"
        );

        Ok(RunOutput {
            report,
            plan,
            outcomes: execution.outcomes,
            location,
            transitions: tracker.transitions,
        })
    }

    /// Questions worth asking, or none. Clarifier failures are not fatal.
    async fn clarifying_questions(&self, query: &str, plan_text: &str, from_plan_step: bool) -> Vec<String> {
        let llm = self.llm.as_ref();
        let result = if from_plan_step {
            invoke_agent(&self.config, "ClarifierAgent", || ClarifierAgent::generate_questions(llm, query))
                .await
                .result
        } else {
            invoke_agent(&self.config, "ClarifierAgent", || ClarifierAgent::check_plan(llm, query, plan_text))
                .await
                .result
                .map(|check| match check {
                    ClarificationCheck::NotNeeded => Vec::new(),
                    ClarificationCheck::Questions(questions) => questions,
                })
        };

        match result {
            Ok(questions) => questions,
            Err(e) => {
                warn!(error = %e, "Clarifier failed, continuing without clarification");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::ReferenceStatus;
    use crate::llm::PromptTemplateId;
    use crate::models::{SkipReason, StepStatus};
    use crate::clarify::PresetClarifier;
    use crate::testing::{MemoryStore, ScriptedLlm, ScriptedSearch};
    use crate::types::GenerationError;
    use crate::utils::RetryPolicy;
    use std::time::Duration;

    const CRITIQUE: &str = "Relevance to Task: High\nKey Points Covered:\n- Point [1]\n\
                            Overall Quality Assessment: Good\nConcise Summary of this Document: Fine [1].";

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy::immediate(1),
            agent_timeout: Duration::from_secs(5),
            max_concurrency: 4,
            auto_clarify: false,
        }
    }

    fn pipeline(llm: ScriptedLlm) -> ResearchPipeline {
        ResearchPipeline::new(Arc::new(llm), Arc::new(ScriptedSearch::new()), config())
    }

    /// Research step 1 plus a critique of it; the writer is left unscripted.
    fn scripted(synthesis: &str) -> ScriptedLlm {
        ScriptedLlm::new()
            .reply(
                PromptTemplateId::Plan,
                "1. [ResearchAgent] Search for: 'X'\n2. [CritiqueAgent] Evaluate results from step 1",
            )
            .reply(PromptTemplateId::ConductResearch, "X matters [1].")
            .reply(PromptTemplateId::CritiqueDocument, CRITIQUE)
            .reply(PromptTemplateId::SynthesiseCritiques, synthesis)
    }

    fn two_step_llm() -> ScriptedLlm {
        scripted("Synthesis of X [1].").reply(
            PromptTemplateId::FormatReport,
            "# About X\n\n## Findings\nX matters [1].",
        )
    }

    #[tokio::test]
    async fn test_single_research_citation_traces_to_step() {
        let store = Arc::new(MemoryStore::default());
        let output = pipeline(two_step_llm())
            .with_store(store.clone())
            .run("What about X?", None)
            .await
            .unwrap();

        let report = &output.report;
        assert_eq!(report.title, "About X");
        assert_eq!(report.references.len(), 1);
        let entry = report.references[0].entry.as_ref().unwrap();
        assert_eq!(entry.origin_step_index, 1);
        assert_eq!(report.references[0].status, ReferenceStatus::Resolved);
        assert!(report.body.contains("X matters [1]."));
        assert_eq!(output.location.as_deref(), Some("memory://1"));
        assert_eq!(store.saved.lock().len(), 1);
        assert_eq!(
            output.transitions,
            vec![
                RunState::Planning,
                RunState::Executing,
                RunState::Synthesizing,
                RunState::Formatting,
                RunState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_invented_marker_is_kept_unresolved() {
        let llm = scripted("X matters [1]. Also [9].")
            .reply(PromptTemplateId::FormatReport, "# About X\n\nX matters [1]. Also [9].");
        let output = pipeline(llm).run("What about X?", None).await.unwrap();

        let report = &output.report;
        assert!(report.body.contains("Also [9]."));
        let unresolved: Vec<_> = report.unresolved_references().collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].label, "9");
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_critique_of_missing_step_is_skipped() {
        let llm = ScriptedLlm::new()
            .reply(
                PromptTemplateId::Plan,
                "1. [ResearchAgent] Search for: 'X'\n\
                 2. [CritiqueAgent] Evaluate results from step 1\n\
                 3. [CritiqueAgent] Evaluate results from step 5",
            )
            .reply(PromptTemplateId::ConductResearch, "X [1].")
            .reply(PromptTemplateId::CritiqueDocument, CRITIQUE)
            .reply(PromptTemplateId::SynthesiseCritiques, "S [1].")
            .reply(PromptTemplateId::FormatReport, "# R\n\nS [1].");
        let output = pipeline(llm).run("X?", None).await.unwrap();

        assert!(matches!(
            output.outcomes[2].status,
            StepStatus::Skipped(SkipReason::MissingDependency(_))
        ));
        assert!(output
            .report
            .coverage_notes
            .iter()
            .any(|n| n.starts_with("Critique step 3 unavailable")));
    }

    #[tokio::test]
    async fn test_failed_research_does_not_fail_run() {
        let llm = ScriptedLlm::new()
            .reply(
                PromptTemplateId::Plan,
                "1. [ResearchAgent] Search for: 'broken'\n\
                 2. [ResearchAgent] Search for: 'fine'\n\
                 3. [CritiqueAgent] Evaluate results from step 1\n\
                 4. [CritiqueAgent] Evaluate results from step 2\n\
                 5. [SynthesiserAgent] Combine\n\
                 6. [WriterAgent] Write",
            )
            .reply(PromptTemplateId::ConductResearch, "Fine [1].")
            .fail_when(
                PromptTemplateId::ConductResearch,
                "broken",
                GenerationError::InvalidResponse("bad".into()),
            )
            .reply(PromptTemplateId::CritiqueDocument, CRITIQUE)
            .reply(PromptTemplateId::SynthesiseCritiques, "S [1].")
            .reply(PromptTemplateId::FormatReport, "# R\n\nS [1].");
        let output = pipeline(llm).run("X?", None).await.unwrap();

        assert!(matches!(output.outcomes[2].status, StepStatus::Skipped(_)));
        assert_eq!(output.outcomes[3].status, StepStatus::Succeeded);
        assert_eq!(output.outcomes[4].status, StepStatus::Deferred);
        let entry = output.report.references[0].entry.as_ref().unwrap();
        assert_eq!(entry.origin_step_index, 2);
        assert!(output.report.to_markdown().contains("Research step 1 unavailable"));
    }

    #[tokio::test]
    async fn test_no_critique_is_insufficient_material() {
        let llm = ScriptedLlm::new()
            .reply(
                PromptTemplateId::Plan,
                "1. [ResearchAgent] Search for: 'X'\n2. [CritiqueAgent] Evaluate results from step 1",
            )
            .reply(PromptTemplateId::ConductResearch, "X.")
            .reply(PromptTemplateId::CritiqueDocument, "no structure here");
        let failure = pipeline(llm).run("X?", None).await.unwrap_err();

        assert_eq!(failure.state, RunState::Executing);
        assert_eq!(failure.error, PipelineError::InsufficientMaterial { attempted: 1 });
        assert_eq!(failure.last_completed_step, Some(1));
    }

    #[tokio::test]
    async fn test_unparseable_plan_fails_in_planning() {
        let llm = ScriptedLlm::new().reply(PromptTemplateId::Plan, "I cannot plan this.");
        let failure = pipeline(llm).run("X?", None).await.unwrap_err();
        assert_eq!(failure.state, RunState::Planning);
        assert!(matches!(failure.error, PipelineError::PlanParse(_)));
    }

    #[tokio::test]
    async fn test_empty_query_and_cancellation() {
        let failure = pipeline(two_step_llm()).run("   ", None).await.unwrap_err();
        assert_eq!(failure.error, PipelineError::EmptyQuery);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let failure = pipeline(two_step_llm())
            .run_with_cancel("X?", None, cancel)
            .await
            .unwrap_err();
        assert_eq!(failure.error, PipelineError::Cancelled);
        assert_eq!(failure.state, RunState::Planning);
        assert_eq!(failure.last_completed_step, None);
    }

    #[tokio::test]
    async fn test_writer_failure_falls_back_to_synthesis() {
        let llm = scripted("Synthesis of X [1].").fail(
            PromptTemplateId::FormatReport,
            GenerationError::InvalidResponse("nope".into()),
        );
        let output = pipeline(llm).run("X?", None).await.unwrap();

        assert!(output.report.body.contains("Synthesis of X [1]."));
        assert!(output
            .report
            .coverage_notes
            .iter()
            .any(|n| n.starts_with("Report formatting failed")));
    }

    #[tokio::test]
    async fn test_writer_fallback_drops_model_reference_list() {
        let llm = scripted("Synthesis of X [1].\n\n## References\n1. Some invented source").fail(
            PromptTemplateId::FormatReport,
            GenerationError::InvalidResponse("nope".into()),
        );
        let output = pipeline(llm).run("X?", None).await.unwrap();

        assert!(output.report.body.contains("Synthesis of X [1]."));
        assert!(!output.report.body.contains("Some invented source"));
        assert_eq!(output.report.to_markdown().matches("## References").count(), 1);
    }

    /// Never answers, like a person who walked away from the terminal.
    struct SilentClarifier;

    #[async_trait::async_trait]
    impl InteractiveClarifier for SilentClarifier {
        async fn ask(&self, _questions: &[String]) -> Result<Vec<String>, crate::clarify::ClarificationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_answers() {
        let llm = two_step_llm().reply(PromptTemplateId::ClarifyQuery, "QUESTIONS:\n1. Which region?");
        let mut config = config();
        config.auto_clarify = true;
        let pipeline = ResearchPipeline::new(Arc::new(llm), Arc::new(ScriptedSearch::new()), config)
            .with_clarifier(Arc::new(SilentClarifier));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let failure = tokio::time::timeout(Duration::from_secs(2), pipeline.run_with_cancel("X?", None, cancel))
            .await
            .expect("cancellation reached the clarifier")
            .unwrap_err();

        assert_eq!(failure.error, PipelineError::Cancelled);
        assert_eq!(failure.state, RunState::Clarifying);
    }

    #[tokio::test]
    async fn test_preset_answers_fold_into_planning_query() {
        let llm = Arc::new(two_step_llm());
        let pipeline = ResearchPipeline::new(llm.clone(), Arc::new(ScriptedSearch::new()), config());
        pipeline
            .run("X?", Some(vec!["Only Europe".into()]))
            .await
            .unwrap();

        let plan_query = &llm.calls(PromptTemplateId::Plan)[0]["query"];
        assert!(plan_query.contains("Additional clarifications provided by user:\n- Only Europe"));
        assert!(llm.calls(PromptTemplateId::ClarifyQuery).is_empty());
    }

    #[tokio::test]
    async fn test_clarifier_answers_reach_research() {
        let llm = Arc::new(
            two_step_llm().reply(PromptTemplateId::ClarifyQuery, "QUESTIONS:\n1. Which region?"),
        );
        let mut config = config();
        config.auto_clarify = true;
        let pipeline = ResearchPipeline::new(llm.clone(), Arc::new(ScriptedSearch::new()), config)
            .with_clarifier(Arc::new(PresetClarifier::new(vec!["Asia".into()])));
        let output = pipeline.run("X?", None).await.unwrap();

        assert_eq!(output.transitions[1], RunState::Clarifying);
        let synthesis_query = &llm.calls(PromptTemplateId::SynthesiseCritiques)[0]["overall_user_query"];
        assert!(synthesis_query.contains("Q: Which region?\nA: Asia"));
    }

    #[tokio::test]
    async fn test_unanswered_questions_become_guidance() {
        let llm = Arc::new(
            two_step_llm().reply(PromptTemplateId::ClarifyQuery, "QUESTIONS:\n1. Which geographic markets?"),
        );
        let mut config = config();
        config.auto_clarify = true;
        let pipeline = ResearchPipeline::new(llm.clone(), Arc::new(ScriptedSearch::new()), config);
        pipeline.run("X?", None).await.unwrap();

        let guidance = &llm.calls(PromptTemplateId::ConductResearch)[0]["additional_guidance"];
        assert!(guidance.contains("Consider exploring: geographic, markets"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let failure = pipeline(two_step_llm())
            .with_store(store)
            .run("X?", None)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::Storage(_)));
        assert_eq!(failure.state, RunState::Formatting);
        assert_eq!(failure.last_completed_step, Some(2));
    }
}
