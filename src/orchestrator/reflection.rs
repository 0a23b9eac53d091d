//! Post-hoc review of query results before they reach the caller.

use crate::llm::LlmClient;
use crate::models::{AgentResponse, QueryRequest, QueryResult};
use tracing::debug;

/// Rows handed to the model for the narrative summary.
pub const SUMMARY_ROWS: usize = 10;

pub const NO_RESULTS_NOTE: &str =
    "The query returned no results. You may want to check your filters or broaden the criteria.";

/// Annotate a query response with a summary or a diagnostic note.
///
/// Only the response is touched. LLM failures leave it as it was.
pub async fn reflect(llm: &dyn LlmClient, request: &QueryRequest, response: AgentResponse) -> AgentResponse {
    let Some(result) = response
        .data
        .get("query_result")
        .and_then(|v| serde_json::from_value::<QueryResult>(v.clone()).ok())
    else {
        return response;
    };

    if !result.success {
        let error = result.error_message.as_deref().unwrap_or("unknown error");
        return response.with_note(format!("Query Error: {}", error));
    }

    // Writes report rows_affected and carry no rows to review
    if result.rows_affected.is_some() {
        return response;
    }

    if result.is_empty() {
        return response.with_note(NO_RESULTS_NOTE);
    }

    let sample = &result.rows[..result.rows.len().min(SUMMARY_ROWS)];
    match llm.summarize(&request.text, &result.sql_query, sample).await {
        Ok(summary) => response
            .with_note(format!("Summary: {}", summary))
            .with_data("summary", summary),
        Err(e) => {
            debug!(error = %e, "Summary generation failed");
            response
        }
    }
}
