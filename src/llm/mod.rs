// LLM abstraction layer

pub mod openai;
pub mod prompts;
pub mod provider;

pub use provider::*;
