//! Conversation session storage.

mod store;

pub use store::{SessionLookup, SessionStore};
