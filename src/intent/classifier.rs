//! LLM-backed intent classification.

use crate::llm::LlmClient;
use crate::models::{Intent, SessionContext};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Flags describing the session, sent along with the utterance.
    pub fn context_flags(session: &SessionContext) -> JsonValue {
        json!({
            "has_connection": session.is_connected(),
            "has_selected_tables": session.has_selected_tables(),
            "has_dictionary": session.has_dictionary(),
        })
    }

    /// Classify an utterance. Never fails: errors and unrecognized labels
    /// yield [`Intent::Unknown`].
    pub async fn classify(&self, text: &str, session: &SessionContext) -> Intent {
        let context = Self::context_flags(session);
        match self.llm.classify(text, &context).await {
            Ok(label) => {
                let intent = Intent::from_label(&label).unwrap_or(Intent::Unknown);
                debug!(label = %label, intent = %intent, "Classified utterance");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent classification failed");
                Intent::Unknown
            }
        }
    }
}
