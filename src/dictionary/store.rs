//! Filesystem-backed dictionary store.

use super::{DictionaryStore, StoredDictionary};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Subdirectories searched when a relative name is not found at the root.
const SEARCH_DIRS: &[&str] = &["dictionaries", "yaml", "data"];
const MAX_LISTED_FILES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryFormat {
    Yaml,
    Json,
}

impl DictionaryFormat {
    /// JSON for `.json`, YAML for everything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    fn is_dictionary_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "yaml" | "yml" | "json"))
    }
}

/// Reads and writes dictionaries under a root directory.
#[derive(Debug, Clone)]
pub struct FileDictionaryStore {
    root: PathBuf,
}

impl FileDictionaryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a name under the root. Names must stay inside the root: absolute
    /// paths and `..` components are rejected.
    fn resolve(&self, name: &str) -> AppResult<PathBuf> {
        let path = Path::new(name);
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::RootDir | Component::Prefix(_) | Component::ParentDir
            )
        });
        if escapes || path.as_os_str().is_empty() {
            return Err(AppError::invalid_input(format!(
                "Dictionary file '{}' must be a relative path inside the dictionary directory",
                name
            )));
        }
        Ok(self.root.join(path))
    }

    /// First existing candidate for a name, searching the usual subdirectories.
    async fn locate(&self, name: &str) -> AppResult<Option<PathBuf>> {
        let direct = self.resolve(name)?;
        if tokio::fs::try_exists(&direct).await.unwrap_or(false) {
            return Ok(Some(direct));
        }
        for dir in SEARCH_DIRS {
            let candidate = self.root.join(dir).join(name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

fn storage_error(path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::storage(err.to_string(), path.display().to_string())
}

#[async_trait]
impl DictionaryStore for FileDictionaryStore {
    async fn read(&self, name: &str) -> AppResult<JsonValue> {
        let path = match self.locate(name).await? {
            Some(path) => path,
            None => return Err(storage_error(&self.root.join(name), "File not found")),
        };
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| storage_error(&path, e))?;

        let document = match DictionaryFormat::from_path(&path) {
            DictionaryFormat::Json => serde_json::from_str::<JsonValue>(&content)?,
            DictionaryFormat::Yaml => serde_yaml::from_str::<JsonValue>(&content)?,
        };
        debug!(path = %path.display(), "Read dictionary");
        Ok(document)
    }

    async fn write(&self, name: &str, document: &JsonValue) -> AppResult<StoredDictionary> {
        let path = self.resolve(name)?;
        let content = match DictionaryFormat::from_path(&path) {
            DictionaryFormat::Json => serde_json::to_string_pretty(document)?,
            DictionaryFormat::Yaml => serde_yaml::to_string(document)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, e))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| storage_error(&path, e))?;

        info!(path = %path.display(), bytes = content.len(), "Dictionary saved");
        Ok(StoredDictionary {
            path,
            bytes: content.len() as u64,
        })
    }

    async fn list(&self) -> AppResult<Vec<String>> {
        let mut files = Vec::new();
        let dirs = std::iter::once(self.root.clone())
            .chain(SEARCH_DIRS.iter().map(|d| self.root.join(d)));

        for dir in dirs {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error(&dir, e))?
            {
                let path = entry.path();
                if DictionaryFormat::is_dictionary_file(&path) {
                    let shown = path.strip_prefix(&self.root).unwrap_or(&path);
                    files.push(shown.display().to_string());
                }
            }
        }
        files.sort();
        files.truncate(MAX_LISTED_FILES);
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DictionaryFormat::from_path(Path::new("a.json")),
            DictionaryFormat::Json
        );
        assert_eq!(
            DictionaryFormat::from_path(Path::new("a.YML")),
            DictionaryFormat::Yaml
        );
        assert_eq!(
            DictionaryFormat::from_path(Path::new("a.yaml")),
            DictionaryFormat::Yaml
        );
    }

    #[test]
    fn test_is_dictionary_file() {
        assert!(DictionaryFormat::is_dictionary_file(Path::new("x.yaml")));
        assert!(DictionaryFormat::is_dictionary_file(Path::new("x.JSON")));
        assert!(!DictionaryFormat::is_dictionary_file(Path::new("x.txt")));
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let store = FileDictionaryStore::new("/srv/dicts");
        assert_eq!(
            store.resolve("a.yaml").unwrap(),
            PathBuf::from("/srv/dicts/a.yaml")
        );
        assert_eq!(
            store.resolve("team/./b.json").unwrap(),
            PathBuf::from("/srv/dicts/team/b.json")
        );
        for name in ["/tmp/b.json", "../b.yaml", "team/../../b.yaml", ""] {
            assert!(
                matches!(store.resolve(name), Err(AppError::InvalidInput { .. })),
                "{} should be rejected",
                name
            );
        }
    }
}
