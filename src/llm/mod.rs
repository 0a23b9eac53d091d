//! LLM collaborator.
//!
//! Agents and the orchestrator talk to the language model only through
//! [`LlmClient`]. Every call can fail; callers decide how to degrade.

mod openai;
pub mod prompts;

pub use openai::OpenAiClient;

use crate::error::LlmResult;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Return a single intent label for the utterance.
    async fn classify(&self, text: &str, context: &JsonValue) -> LlmResult<String>;

    /// Translate a question into one SQL statement, without markdown.
    async fn generate_sql(&self, text: &str, schema_context: &JsonValue) -> LlmResult<String>;

    /// Free-form answer to a prompt.
    async fn generate_response(&self, prompt: &str, context: &JsonValue) -> LlmResult<String>;

    /// Narrative summary of query results.
    async fn summarize(
        &self,
        question: &str,
        sql: &str,
        sample_rows: &[Map<String, JsonValue>],
    ) -> LlmResult<String>;
}
