// Scripted collaborators for unit tests

use crate::llm::{PromptTemplateId, PromptVariables, TextGenerationService};
use crate::report::FormattedReport;
use crate::search::{SearchError, SearchHit, WebSearchTool};
use crate::storage::{ReportStore, StorageError};
use crate::types::GenerationError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

struct Rule {
    template: PromptTemplateId,
    needle: Option<String>,
    responses: VecDeque<Result<String, GenerationError>>,
}

impl Rule {
    fn matches(&self, template: PromptTemplateId, variables: &PromptVariables) -> bool {
        self.template == template
            && self
                .needle
                .as_ref()
                .map_or(true, |n| variables.values().any(|v| v.contains(n.as_str())))
    }

    /// Responses are consumed in order; the last one repeats.
    fn next(&mut self) -> Result<String, GenerationError> {
        if self.responses.len() > 1 {
            if let Some(response) = self.responses.pop_front() {
                return response;
            }
        }
        self.responses
            .front()
            .cloned()
            .unwrap_or_else(|| Err(GenerationError::InvalidResponse("empty script".into())))
    }
}

/// Text generation driven by canned responses per template. Rules added
/// with [`ScriptedLlm::fail_when`] take precedence over plain ones.
#[derive(Default)]
pub struct ScriptedLlm {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(PromptTemplateId, PromptVariables)>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, template: PromptTemplateId, needle: Option<&str>, response: Result<String, GenerationError>) -> Self {
        {
            let mut rules = self.rules.lock();
            let existing = rules
                .iter_mut()
                .find(|r| r.template == template && r.needle.as_deref() == needle);
            match existing {
                Some(rule) => rule.responses.push_back(response),
                None => rules.push(Rule {
                    template,
                    needle: needle.map(str::to_string),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    pub fn reply(self, template: PromptTemplateId, text: &str) -> Self {
        self.push(template, None, Ok(text.to_string()))
    }

    pub fn fail(self, template: PromptTemplateId, error: GenerationError) -> Self {
        self.push(template, None, Err(error))
    }

    /// Fail only when some variable contains `needle`.
    pub fn fail_when(self, template: PromptTemplateId, needle: &str, error: GenerationError) -> Self {
        self.push(template, Some(needle), Err(error))
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Variables of every call made with `template`, in call order.
    pub fn calls(&self, template: PromptTemplateId) -> Vec<PromptVariables> {
        self.calls
            .lock()
            .iter()
            .filter(|(t, _)| *t == template)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Templates of every call, in call order.
    pub fn call_order(&self) -> Vec<PromptTemplateId> {
        self.calls.lock().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl TextGenerationService for ScriptedLlm {
    async fn generate(
        &self,
        template: PromptTemplateId,
        variables: &PromptVariables,
    ) -> Result<String, GenerationError> {
        self.calls.lock().push((template, variables.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut rules = self.rules.lock();
        let position = rules
            .iter()
            .position(|r| r.needle.is_some() && r.matches(template, variables))
            .or_else(|| rules.iter().position(|r| r.needle.is_none() && r.matches(template, variables)));
        match position {
            Some(i) => rules[i].next(),
            None => Err(GenerationError::InvalidResponse(format!("no script for {}", template))),
        }
    }
}

/// Search that answers every query with one hit, or always fails
pub struct ScriptedSearch {
    failure: Option<SearchError>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self {
            failure: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: SearchError) -> Self {
        Self {
            failure: Some(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl WebSearchTool for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.queries.lock().push(query.to_string());
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(vec![hit(query)]),
        }
    }
}

/// One hit for `query` pointing at a stable example URL.
pub fn hit(query: &str) -> SearchHit {
    let slug: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    SearchHit {
        title: format!("About {}", query),
        url: format!("https://example.org/{}", slug),
        snippet: format!("Snippet on {}", query),
    }
}

/// Keeps saved reports in memory
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Vec<FormattedReport>>,
    pub fail: bool,
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn save(&self, report: &FormattedReport) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        let mut saved = self.saved.lock();
        saved.push(report.clone());
        Ok(format!("memory://{}", saved.len()))
    }
}
