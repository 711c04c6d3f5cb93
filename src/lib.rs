// Oxidized Research - multi-agent pipeline that turns a query into a cited report

pub mod agents;
pub mod citations;
pub mod clarify;
pub mod config;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod routes;
pub mod search;
pub mod storage;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::Config;
pub use pipeline::{ResearchPipeline, RunOutput};
pub use report::FormattedReport;
