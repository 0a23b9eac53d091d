//! Bounded per-session cache of generated SQL.
//!
//! Repeating a question reuses the SQL generated the first time instead of
//! asking the model again. The statement is still validated and executed on
//! every hit. Entries are evicted first-in first-out.

use crate::models::{Intent, QueryKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Entries kept per session.
pub const SQL_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedSql {
    pub intent: Intent,
    pub query_type: QueryKind,
    pub sql: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SqlCache {
    entries: HashMap<String, CachedSql>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SqlCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Questions that differ only in case or spacing share an entry.
    pub fn key(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn get(&self, text: &str) -> Option<&CachedSql> {
        self.entries.get(&Self::key(text))
    }

    /// Remember the SQL for a question. Re-caching a question keeps its
    /// place in the eviction order.
    pub fn insert(&mut self, text: &str, intent: Intent, query_type: QueryKind, sql: impl Into<String>) {
        let key = Self::key(text);
        if !self.entries.contains_key(&key) {
            while self.order.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(
            key,
            CachedSql {
                intent,
                query_type,
                sql: sql.into(),
                cached_at: Utc::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SqlCache {
    fn default() -> Self {
        Self::with_capacity(SQL_CACHE_CAPACITY)
    }
}
