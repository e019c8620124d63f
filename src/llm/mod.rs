//! LLM-powered natural language to SQL translation.

pub mod client;
pub mod prompt;
pub mod translator;

pub use client::{LanguageModel, LlmClient, LlmProvider};
pub use prompt::PromptBuilder;
pub use translator::{normalize, QueryTranslator};
