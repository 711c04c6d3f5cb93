use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::utils::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    /// openai | openrouter | groq | glm (all speak the chat-completions dialect)
    pub provider: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub models: AgentModels,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub request_timeout: Duration,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            base_url: None,
            models: AgentModels::default(),
            max_tokens: None,
            temperature: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl LLMConfig {
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "openrouter" => "https://openrouter.ai/api/v1",
            "groq" => "https://api.groq.com/openai/v1",
            "glm" => "https://api.z.ai/api/paas/v4",
            _ => "https://api.openai.com/v1",
        }
        .to_string()
    }
}

/// Model selection per agent, falling back to a default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentModels {
    pub default_model: String,
    pub per_agent: HashMap<String, String>,
}

impl Default for AgentModels {
    fn default() -> Self {
        Self {
            default_model: "gpt-4.1-nano".to_string(),
            per_agent: HashMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct AgentModelsFile {
    default_model_id: Option<String>,
    #[serde(default)]
    agent_model_configs: HashMap<String, String>,
}

impl AgentModels {
    pub fn model_for(&self, agent: &str) -> &str {
        self.per_agent.get(agent).unwrap_or(&self.default_model)
    }

    /// Parse `{"default_model_id": .., "agent_model_configs": {"ResearchAgent": ..}}`.
    pub fn from_json(json: &str, fallback_default: &str) -> Result<Self> {
        let file: AgentModelsFile = serde_json::from_str(json).context("Invalid agent model configuration")?;
        Ok(Self {
            default_model: file.default_model_id.unwrap_or_else(|| fallback_default.to_string()),
            per_agent: file.agent_model_configs,
        })
    }

    pub fn from_file(path: &Path, fallback_default: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent model file {}", path.display()))?;
        Self::from_json(&json, fallback_default)
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub max_results: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub agent_timeout: Duration,
    pub max_concurrency: usize,
    /// Ask the clarifier whether the query needs clarification even when
    /// the plan has no clarifier step
    pub auto_clarify: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            agent_timeout: Duration::from_secs(120),
            max_concurrency: 4,
            auto_clarify: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub reports_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let default_model = env::var("LLM_DEFAULT_MODEL").unwrap_or_else(|_| "gpt-4.1-nano".to_string());
        let models = match env::var("AGENT_MODELS_FILE") {
            Ok(path) => AgentModels::from_file(Path::new(&path), &default_model)?,
            Err(_) => AgentModels {
                default_model,
                per_agent: HashMap::new(),
            },
        };
        let agent_timeout = Duration::from_secs(parse_var("AGENT_TIMEOUT_SECS", 120)?);

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", 3000)?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            llm: LLMConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
                api_key: env::var("LLM_API_KEY")
                    .or_else(|_| env::var("OPENAI_API_KEY"))
                    .unwrap_or_default(),
                base_url: env::var("LLM_BASE_URL").ok(),
                models,
                max_tokens: optional_var("LLM_MAX_TOKENS")?,
                temperature: optional_var("LLM_TEMPERATURE")?,
                request_timeout: agent_timeout,
            },
            search: SearchConfig {
                serpapi_key: env::var("SERPAPI_API_KEY").unwrap_or_default(),
                max_results: parse_var("SEARCH_MAX_RESULTS", 5)?,
            },
            pipeline: PipelineConfig {
                retry: RetryPolicy {
                    max_retries: parse_var("PIPELINE_MAX_RETRIES", 3)?,
                    base_delay: Duration::from_millis(parse_var("PIPELINE_BACKOFF_BASE_MS", 500)?),
                    max_delay: Duration::from_millis(parse_var("PIPELINE_BACKOFF_MAX_MS", 8000)?),
                },
                agent_timeout,
                max_concurrency: parse_var::<usize>("PIPELINE_MAX_CONCURRENCY", 4)?.max(1),
                auto_clarify: parse_var("PIPELINE_AUTO_CLARIFY", true)?,
            },
            storage: StorageConfig {
                reports_dir: env::var("REPORTS_DIR")
                    .unwrap_or_else(|_| "research_reports".to_string())
                    .into(),
            },
            log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(optional_var(name)?.unwrap_or(default))
}

fn optional_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_models_from_json() {
        let json = r#"{
            "default_model_id": "gpt-4.1-mini",
            "agent_model_configs": {"ResearchAgent": "gpt-4.1"}
        }"#;
        let models = AgentModels::from_json(json, "unused").unwrap();
        assert_eq!(models.model_for("ResearchAgent"), "gpt-4.1");
        assert_eq!(models.model_for("WriterAgent"), "gpt-4.1-mini");
    }

    #[test]
    fn test_agent_models_default_falls_back() {
        let models = AgentModels::from_json(r#"{"agent_model_configs": {}}"#, "gpt-4.1-nano").unwrap();
        assert_eq!(models.default_model, "gpt-4.1-nano");
        assert!(AgentModels::from_json("not json", "x").is_err());
    }

    #[test]
    fn test_provider_base_urls() {
        let mut config = LLMConfig::default();
        assert_eq!(config.base_url(), "https://api.openai.com/v1");
        config.provider = "groq".into();
        assert_eq!(config.base_url(), "https://api.groq.com/openai/v1");
        config.base_url = Some("http://localhost:8080/v1/".into());
        assert_eq!(config.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_invalid_numeric_var_is_error() {
        env::set_var("OXR_TEST_BAD_NUMBER", "many");
        assert!(parse_var::<u32>("OXR_TEST_BAD_NUMBER", 3).is_err());
        assert_eq!(parse_var::<u32>("OXR_TEST_UNSET_NUMBER", 3).unwrap(), 3);
    }
}
