//! Two-tier intent resolution: the LLM classifier first, then ordered
//! keyword rules and session-state heuristics.

mod classifier;
pub mod fallback;

pub use classifier::IntentClassifier;
pub use fallback::{FALLBACK_RULES, FallbackRule, infer_intent};
