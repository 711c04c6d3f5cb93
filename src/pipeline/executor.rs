//! Pipeline Executor
//!
//! Runs the Research and Critique steps of a plan. Steps whose
//! dependencies have all reached a terminal state form a ready batch;
//! each batch runs concurrently (bounded by `max_concurrency`) against a
//! read-only view of the artifacts, then its results are applied in step
//! order. Clarifier, Synthesiser and Writer steps are deferred to the
//! stages that own them.
//!
//! A failing step never aborts the run: it is recorded as skipped and the
//! steps that needed its output are skipped in turn.

use super::router::{Artifacts, ContextRouter, CritiquePayload};
use crate::agents::{CritiqueAgent, ResearchAgent};
use crate::citations::CitationLedger;
use crate::config::PipelineConfig;
use crate::llm::TextGenerationService;
use crate::models::{AgentKind, Critique, Plan, ResearchDocument, SkipReason, Step, StepOutcome, StepStatus};
use crate::search::SearchError;
use crate::types::{AgentInvocationError, GenerationError};
use crate::utils::{with_retry, Attempted};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Call an agent with the per-call timeout and the retry policy.
pub(crate) async fn invoke_agent<T, F, Fut>(
    config: &PipelineConfig,
    label: &str,
    mut operation: F,
) -> Attempted<T, AgentInvocationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentInvocationError>>,
{
    let timeout = config.agent_timeout;
    with_retry(&config.retry, label, AgentInvocationError::is_transient, || {
        let call = operation();
        async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout.into()),
            }
        }
    })
    .await
}

/// Everything the executor produced
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// One per plan step, in plan order
    pub outcomes: Vec<StepOutcome>,
    pub artifacts: Artifacts,
    /// Human-readable notes on missing or degraded material
    pub notes: Vec<String>,
}

impl ExecutionReport {
    pub fn last_completed_step(&self) -> Option<u32> {
        last_succeeded(&self.outcomes)
    }

    pub fn critique_steps(&self) -> usize {
        self.outcomes.iter().filter(|o| o.kind == AgentKind::Critique).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Skipped(_)))
    }
}

/// Cancellation landed while a batch was running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupted {
    pub last_completed_step: Option<u32>,
}

enum StepResult {
    Research {
        document: Result<ResearchDocument, AgentInvocationError>,
        search_error: Option<SearchError>,
        attempts: u32,
    },
    Critique {
        critiques: Vec<Critique>,
        failures: Vec<(u32, String)>,
        missing: Vec<u32>,
        attempts: u32,
    },
    Skipped(SkipReason),
}

pub struct PipelineExecutor<'a> {
    llm: &'a dyn TextGenerationService,
    router: &'a ContextRouter<'a>,
    ledger: &'a CitationLedger,
    config: &'a PipelineConfig,
    cancel: CancellationToken,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(
        llm: &'a dyn TextGenerationService,
        router: &'a ContextRouter<'a>,
        ledger: &'a CitationLedger,
        config: &'a PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            llm,
            router,
            ledger,
            config,
            cancel,
        }
    }

    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionReport, Interrupted> {
        let mut outcomes: Vec<StepOutcome> = plan
            .steps()
            .iter()
            .map(|step| StepOutcome {
                index: step.index,
                kind: step.kind,
                description: step.description.clone(),
                status: match step.kind {
                    AgentKind::Research | AgentKind::Critique => StepStatus::Pending,
                    _ => StepStatus::Deferred,
                },
                attempts: 0,
            })
            .collect();
        let mut artifacts = Artifacts::default();
        let mut notes = Vec::new();
        let width = self.config.max_concurrency.max(1);

        loop {
            let ready: Vec<&Step> = plan
                .steps()
                .iter()
                .filter(|s| is_ready(s, plan, &outcomes))
                .collect();
            if ready.is_empty() {
                if outcomes.iter().any(|o| o.status == StepStatus::Pending) {
                    error!("Pending steps left with no ready step; stopping execution");
                }
                break;
            }

            info!(
                steps = ?ready.iter().map(|s| s.index).collect::<Vec<_>>(),
                "Running ready batch"
            );

            let artifacts_ref = &artifacts;
            let futures: Vec<_> = ready
                .into_iter()
                .map(|step| async move { (step, self.run_step(step, plan, artifacts_ref).await) })
                .collect();
            let batch = stream::iter(futures)
                .buffered(width)
                .collect::<Vec<_>>();

            let results = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Execution cancelled mid-batch");
                    return Err(Interrupted {
                        last_completed_step: last_succeeded(&outcomes),
                    });
                }
                results = batch => results,
            };

            for (step, result) in results {
                let outcome = &mut outcomes[step.index as usize - 1];
                self.apply(step, result, outcome, &mut artifacts, &mut notes);
            }
        }

        Ok(ExecutionReport {
            outcomes,
            artifacts,
            notes,
        })
    }

    async fn run_step(&self, step: &Step, plan: &Plan, artifacts: &Artifacts) -> StepResult {
        match step.kind {
            AgentKind::Research => self.run_research(step).await,
            AgentKind::Critique => self.run_critique(step, plan, artifacts).await,
            // deferred kinds never become ready
            _ => StepResult::Skipped(SkipReason::AgentFailure {
                message: format!("{} steps are not executed here", step.kind),
            }),
        }
    }

    async fn run_research(&self, step: &Step) -> StepResult {
        let timeout = self.config.agent_timeout;
        let searched = with_retry(&self.config.retry, "web search", SearchError::is_transient, || async move {
            tokio::time::timeout(timeout, self.router.research_payload(step))
                .await
                .unwrap_or_else(|_| Err(SearchError::SearchUnavailable("search timed out".into())))
        })
        .await;

        let (payload, search_error) = match searched.result {
            Ok(payload) => (payload, None),
            Err(e) => {
                warn!(step = step.index, error = %e, "Search failed, researching without sources");
                (self.router.degraded_research_payload(step), Some(e))
            }
        };

        let attempted = invoke_agent(self.config, "ResearchAgent", || ResearchAgent::conduct(self.llm, &payload)).await;
        StepResult::Research {
            document: attempted.result,
            search_error,
            attempts: attempted.attempts,
        }
    }

    async fn run_critique(&self, step: &Step, plan: &Plan, artifacts: &Artifacts) -> StepResult {
        let routing = match self.router.critique_payloads(step, plan, artifacts) {
            Ok(routing) => routing,
            Err(e) => {
                warn!(step = step.index, error = %e, "Critique step has nothing to evaluate");
                return StepResult::Skipped(SkipReason::MissingDependency(e));
            }
        };

        let attempted = join_all(routing.payloads.iter().map(|payload| self.critique_one(payload))).await;

        let mut critiques = Vec::new();
        let mut failures = Vec::new();
        let mut attempts = 0;
        for (payload, result) in routing.payloads.iter().zip(attempted) {
            attempts += result.attempts;
            match result.result {
                Ok(critique) => critiques.push(critique),
                Err(e) => failures.push((payload.document_step_index, e.message().to_string())),
            }
        }

        StepResult::Critique {
            critiques,
            failures,
            missing: routing.missing,
            attempts,
        }
    }

    async fn critique_one(&self, payload: &CritiquePayload) -> Attempted<Critique, AgentInvocationError> {
        invoke_agent(self.config, "CritiqueAgent", || CritiqueAgent::critique(self.llm, payload)).await
    }

    /// Record a step's result. Runs sequentially, in step order, after
    /// the whole batch finished.
    fn apply(
        &self,
        step: &Step,
        result: StepResult,
        outcome: &mut StepOutcome,
        artifacts: &mut Artifacts,
        notes: &mut Vec<String>,
    ) {
        match result {
            StepResult::Research {
                document,
                search_error,
                attempts,
            } => {
                outcome.attempts = attempts;
                match document {
                    Ok(document) => {
                        if let Some(e) = search_error {
                            notes.push(format!(
                                "Research step {} was written without web sources ({})",
                                step.index, e
                            ));
                        }
                        self.record_markers(&document);
                        info!(
                            step = step.index,
                            markers = document.citation_markers.len(),
                            "Research step succeeded"
                        );
                        artifacts.insert_document(document);
                        outcome.status = StepStatus::Succeeded;
                    }
                    Err(e) => {
                        warn!(step = step.index, error = %e, "Research step skipped");
                        notes.push(format!("Research step {} unavailable: {}", step.index, e.message()));
                        outcome.status = StepStatus::Skipped(SkipReason::AgentFailure {
                            message: e.message().to_string(),
                        });
                    }
                }
            }
            StepResult::Critique {
                critiques,
                failures,
                missing,
                attempts,
            } => {
                outcome.attempts = attempts;
                for target in &missing {
                    notes.push(format!(
                        "Critique step {} could not evaluate research step {}: no document",
                        step.index, target
                    ));
                }
                if critiques.is_empty() {
                    let message = failures
                        .iter()
                        .map(|(_, m)| m.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    warn!(step = step.index, error = %message, "Critique step skipped");
                    notes.push(format!("Critique step {} unavailable: {}", step.index, message));
                    outcome.status = StepStatus::Skipped(SkipReason::AgentFailure { message });
                    return;
                }
                for (target, message) in &failures {
                    notes.push(format!(
                        "Critique step {} could not evaluate research step {}: {}",
                        step.index, target, message
                    ));
                }
                info!(step = step.index, critiques = critiques.len(), "Critique step succeeded");
                artifacts.push_critiques(critiques);
                outcome.status = StepStatus::Succeeded;
            }
            StepResult::Skipped(reason) => {
                notes.push(format!("{} step {} unavailable: {}", kind_label(step.kind), step.index, reason));
                outcome.status = StepStatus::Skipped(reason);
            }
        }
    }

    fn record_markers(&self, document: &ResearchDocument) {
        for label in &document.citation_markers {
            let source = label
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| document.sources.get(i))
                .cloned();
            self.ledger
                .record_with_source(label, document.source_step_index, source);
        }
        debug!(step = document.source_step_index, ledger = self.ledger.len(), "Citation markers recorded");
    }
}

fn kind_label(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Research => "Research",
        AgentKind::Critique => "Critique",
        AgentKind::Clarifier => "Clarifier",
        AgentKind::Synthesiser => "Synthesiser",
        AgentKind::Writer => "Writer",
    }
}

fn last_succeeded(outcomes: &[StepOutcome]) -> Option<u32> {
    outcomes
        .iter()
        .filter(|o| o.status == StepStatus::Succeeded)
        .map(|o| o.index)
        .max()
}

/// Pending, and every step it depends on has finished one way or another.
/// A critique step that names no step waits for all earlier research.
fn is_ready(step: &Step, plan: &Plan, outcomes: &[StepOutcome]) -> bool {
    let status = |index: u32| {
        index
            .checked_sub(1)
            .and_then(|i| outcomes.get(i as usize))
            .map(|o| &o.status)
    };
    if status(step.index) != Some(&StepStatus::Pending) {
        return false;
    }
    let deps_done = step
        .depends_on
        .iter()
        .all(|d| status(*d).is_some_and(StepStatus::is_terminal));
    if !deps_done {
        return false;
    }
    if step.kind == AgentKind::Critique && step.depends_on.is_empty() && step.invalid_refs.is_empty() {
        return plan
            .steps_of(AgentKind::Research)
            .filter(|r| r.index < step.index)
            .all(|r| status(r.index).is_some_and(StepStatus::is_terminal));
    }
    true
}
