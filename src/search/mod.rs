//! Search Module
//!
//! Web search as consumed by research steps. The pipeline only sees the
//! [`WebSearchTool`] trait; SerpAPI is the production backend.

pub mod serpapi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use serpapi::SerpApiClient;

/// Errors that can occur during search operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("Search service unavailable: {0}")]
    SearchUnavailable(String),

    #[error("SerpAPI key not configured")]
    NoApiKey,

    #[error("Failed to parse search results: {0}")]
    Parse(String),
}

impl SearchError {
    /// Only an unreachable or failing backend is worth asking again.
    pub fn is_transient(&self) -> bool {
        matches!(self, SearchError::SearchUnavailable(_))
    }
}

/// One search result, in the order the engine ranked it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearchTool: Send + Sync {
    /// Ordered hits; an empty vector when nothing matched.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}

/// Stand-in used when no search backend is configured
pub struct DisabledSearch;

#[async_trait]
impl WebSearchTool for DisabledSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::NoApiKey)
    }
}

/// Title for a hit, derived from its URL when the engine gave none or a
/// generic one.
pub fn display_title(title: Option<&str>, url: &str) -> String {
    let title = title.map(str::trim).unwrap_or("");
    let generic = matches!(title.to_lowercase().as_str(), "" | "source" | "untitled" | "untitled source");
    if !generic {
        return title.to_string();
    }

    let Some((_, rest)) = url.split_once("://") else {
        return "Untitled source".to_string();
    };
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let (domain, path) = rest.split_once('/').unwrap_or((rest, ""));
    if path.is_empty() {
        format!("Source: {}", domain)
    } else {
        format!("Article from {}: {}", domain, path)
    }
}

/// Remove `utm_*` tracking parameters from a URL, keeping everything else.
pub fn strip_tracking_params(url: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url, None),
    };
    let Some((path, query)) = base.split_once('?') else {
        return url.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|p| {
            let name = p.strip_prefix("amp;").unwrap_or(p);
            !p.is_empty() && !name.starts_with("utm_")
        })
        .collect();

    let mut clean = path.to_string();
    if !kept.is_empty() {
        clean.push('?');
        clean.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        clean.push('#');
        clean.push_str(fragment);
    }
    clean
}
