//! NL2SQL Orchestrator Library
//!
//! A conversational layer that turns natural-language requests into
//! database work: connecting, exploring catalogs and tables, building data
//! dictionaries and answering questions with generated SQL.

pub mod agents;
pub mod auth;
pub mod config;
pub mod db;
pub mod dictionary;
pub mod error;
pub mod format;
pub mod intent;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod session;
pub mod sql;
pub mod transport;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::Orchestrator;
