//! Repositories wrapping the external collaborators.
//!
//! Agents never talk to the connector or the LLM directly for data access;
//! they go through these types, which own error conversion and logging.

mod connection;
mod metadata;
mod query;

pub use connection::ConnectionRepository;
pub use metadata::MetadataRepository;
pub use query::QueryRepository;
