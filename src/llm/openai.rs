//! OpenAI-compatible chat-completions client.

use super::{LlmClient, prompts};
use crate::config::Config;
use crate::error::{LlmError, LlmResult};
use crate::sql::extract_sql;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

const CLASSIFY_MAX_TOKENS: u32 = 10;
const SUMMARY_MAX_TOKENS: u32 = 300;
const SUMMARY_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn from_config(config: &Config) -> LlmResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.llm_timeout_duration())
            .build()
            .map_err(|e| LlmError::NotConfigured(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone().filter(|k| !k.is_empty()),
            model: config.llm_model.clone(),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
        })
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> LlmResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("no API key".to_string()))?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, url = %url, "Sending chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn classify(&self, text: &str, context: &JsonValue) -> LlmResult<String> {
        let prompt = prompts::classify_prompt(text, context);
        self.complete(prompts::CLASSIFY_SYSTEM, &prompt, 0.0, CLASSIFY_MAX_TOKENS)
            .await
    }

    async fn generate_sql(&self, text: &str, schema_context: &JsonValue) -> LlmResult<String> {
        let prompt = prompts::sql_prompt(text, schema_context);
        let completion = self
            .complete(prompts::SQL_SYSTEM, &prompt, self.temperature, self.max_tokens)
            .await?;
        Ok(extract_sql(&completion))
    }

    async fn generate_response(&self, prompt: &str, context: &JsonValue) -> LlmResult<String> {
        let prompt = prompts::response_prompt(prompt, context);
        self.complete(
            prompts::RESPONSE_SYSTEM,
            &prompt,
            self.temperature,
            self.max_tokens,
        )
        .await
    }

    async fn summarize(
        &self,
        question: &str,
        sql: &str,
        sample_rows: &[Map<String, JsonValue>],
    ) -> LlmResult<String> {
        let prompt = prompts::summary_prompt(question, sql, sample_rows);
        self.complete(
            prompts::SUMMARY_SYSTEM,
            &prompt,
            SUMMARY_TEMPERATURE,
            SUMMARY_MAX_TOKENS,
        )
        .await
    }
}
