//! SerpAPI Client
//!
//! Web search through SerpAPI's Google engines:
//! - Google Light: fast general web search (primary)
//! - Google Scholar: academic papers, tried when the web search fails
//!   or comes back thin

use super::{display_title, strip_tracking_params, SearchError, SearchHit, WebSearchTool};
use crate::config::SearchConfig;
use async_trait::async_trait;
use serde_json::Value;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Fewer web hits than this and Scholar is consulted as well.
const THIN_RESULTS: usize = 3;

pub struct SerpApiClient {
    api_key: String,
    scholar_enabled: bool,
    max_results: usize,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            scholar_enabled: true,
            max_results: 5,
        }
    }

    /// `None` when no key is configured.
    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }
        Some(Self::new(config.serpapi_key.clone()).with_max_results(config.max_results))
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self
    }

    pub fn with_scholar(mut self, enabled: bool) -> Self {
        self.scholar_enabled = enabled;
        self
    }

    async fn run_engine(&self, engine: &str, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        info!(engine, query = %query, "Searching via SerpAPI");

        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), engine.to_string());
        params.insert("q".to_string(), query.to_string());
        params.insert("hl".to_string(), "en".to_string());
        params.insert("num".to_string(), self.max_results.to_string());

        let search = SerpApiSearch::google(params, self.api_key.clone());
        let results = search
            .json()
            .await
            .map_err(|e| SearchError::SearchUnavailable(e.to_string()))?;

        debug!(engine, "Raw SerpAPI response received");
        let hits = parse_organic_results(&results, self.max_results)?;
        info!(engine, count = hits.len(), "SerpAPI search completed");
        Ok(hits)
    }
}

#[async_trait]
impl WebSearchTool for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let web = self.run_engine("google_light", query).await;

        let need_scholar = match &web {
            Ok(hits) => hits.len() < THIN_RESULTS,
            Err(e) => {
                warn!(error = %e, "Web search failed");
                true
            }
        };
        if !self.scholar_enabled || !need_scholar {
            return web;
        }

        match (web, self.run_engine("google_scholar", query).await) {
            (Ok(mut hits), Ok(scholar)) => {
                for hit in scholar {
                    if hits.len() >= self.max_results {
                        break;
                    }
                    if !hits.iter().any(|h| h.url == hit.url) {
                        hits.push(hit);
                    }
                }
                Ok(hits)
            }
            (Ok(hits), Err(e)) => {
                warn!(error = %e, "Scholar search failed, keeping web results");
                Ok(hits)
            }
            (Err(_), Ok(scholar)) => Ok(scholar),
            (Err(web_err), Err(e)) => {
                warn!(error = %e, "Scholar search failed");
                Err(web_err)
            }
        }
    }
}

/// Pull `{title, link, snippet}` out of a SerpAPI payload. A payload with
/// an `error` field is an unavailable backend; no `organic_results` means
/// no hits.
pub fn parse_organic_results(results: &Value, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    if let Some(error) = results.get("error").and_then(|v| v.as_str()) {
        // SerpAPI reports "no results" through the error field too
        if error.to_lowercase().contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        return Err(SearchError::SearchUnavailable(error.to_string()));
    }

    let Some(organic_results) = results.get("organic_results") else {
        return Ok(Vec::new());
    };
    let results_array = organic_results
        .as_array()
        .ok_or_else(|| SearchError::Parse("Expected array of results".to_string()))?;

    let hits = results_array
        .iter()
        .filter_map(|result| {
            let link = result.get("link").and_then(|v| v.as_str())?;
            let url = strip_tracking_params(link);
            let title = display_title(result.get("title").and_then(|v| v.as_str()), &url);
            let snippet = result
                .get("snippet")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Some(SearchHit {
                title,
                url,
                snippet,
            })
        })
        .take(max_results)
        .collect();

    Ok(hits)
}
