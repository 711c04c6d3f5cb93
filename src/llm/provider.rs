use super::prompts;
use crate::config::{AgentModels, LLMConfig};
use crate::types::{AppError, GenerationError, LLMMessage, LLMRequest, LLMResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Prompt templates the pipeline asks the text generation service to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptTemplateId {
    Plan,
    ClarifierQuestions,
    ClarifyQuery,
    ConductResearch,
    CritiqueDocument,
    SynthesiseCritiques,
    FormatReport,
}

impl PromptTemplateId {
    /// Agent that owns the template; per-agent model overrides key on this.
    pub fn agent_name(&self) -> &'static str {
        match self {
            PromptTemplateId::Plan => "PlannerAgent",
            PromptTemplateId::ClarifierQuestions | PromptTemplateId::ClarifyQuery => "ClarifierAgent",
            PromptTemplateId::ConductResearch => "ResearchAgent",
            PromptTemplateId::CritiqueDocument => "CritiqueAgent",
            PromptTemplateId::SynthesiseCritiques => "SynthesiserAgent",
            PromptTemplateId::FormatReport => "WriterAgent",
        }
    }
}

impl fmt::Display for PromptTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type PromptVariables = HashMap<String, String>;

/// Build a variable map from `(name, value)` pairs.
pub fn prompt_vars<const N: usize>(pairs: [(&str, String); N]) -> PromptVariables {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// The language-model collaborator as the pipeline sees it.
#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn generate(
        &self,
        template: PromptTemplateId,
        variables: &PromptVariables,
    ) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> Result<LLMResponse, GenerationError>;
}

/// Prompt-template driven text generation over a chat-completion adapter
pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    models: AgentModels,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl LLM {
    pub fn new(config: &LLMConfig) -> Result<Self, AppError> {
        let adapter: Box<dyn LLMAdapter> = match config.provider.as_str() {
            "openai" | "openrouter" | "groq" | "glm" => Box::new(
                super::openai::OpenAICompatibleAdapter::new(&config.api_key, &config.base_url(), config.request_timeout),
            ),
            other => {
                return Err(AppError::Config(format!("Unsupported LLM provider: {}", other)));
            }
        };

        Ok(Self::with_adapter(adapter, config.models.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature))
    }

    pub fn with_adapter(adapter: Box<dyn LLMAdapter>, models: AgentModels) -> Self {
        Self {
            adapter,
            models,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub(crate) fn build_request(&self, template: PromptTemplateId, variables: &PromptVariables) -> LLMRequest {
        let prompt = prompts::template(template);
        LLMRequest {
            model: self.models.model_for(template.agent_name()).to_string(),
            messages: vec![
                LLMMessage::system(prompt.system),
                LLMMessage::user(prompts::render(prompt.user, variables)),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl TextGenerationService for LLM {
    async fn generate(
        &self,
        template: PromptTemplateId,
        variables: &PromptVariables,
    ) -> Result<String, GenerationError> {
        let request = self.build_request(template, variables);
        debug!(%template, model = %request.model, "Invoking language model");

        let response = self.adapter.create_chat_completion(&request).await?;
        if response.content.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(format!(
                "{} returned an empty completion",
                template
            )));
        }
        debug!(
            %template,
            total_tokens = response.usage.total_tokens,
            "Language model responded"
        );
        Ok(response.content)
    }
}
