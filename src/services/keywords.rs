//! Keyword store access.
//!
//! The store holds polls, each with a list of options. Every option of every
//! poll is a keyword to track. The store is re-read on each call so edits are
//! picked up by the next poll cycle.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::KeywordSet;

/// Read-only source of the current keyword set.
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// Load the keyword set as it is right now.
    async fn load(&self) -> Result<KeywordSet>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Poll document as stored.
#[derive(Debug, Deserialize)]
struct Poll {
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PollsFile {
    #[serde(default)]
    polls: Vec<Poll>,
}

/// Keyword store backed by a TOML file of polls.
///
/// ```toml
/// [[polls]]
/// title = "Favourite language"
/// options = ["rust", "go"]
/// ```
#[derive(Debug, Clone)]
pub struct FileKeywordStore {
    path: PathBuf,
}

impl FileKeywordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(&self, content: &str) -> Result<KeywordSet> {
        let file: PollsFile = toml::from_str(content)
            .map_err(|e| AppError::keyword_store(self.describe(), e))?;
        Ok(KeywordSet::new(
            file.polls.into_iter().flat_map(|poll| poll.options),
        ))
    }
}

#[async_trait]
impl KeywordSource for FileKeywordStore {
    async fn load(&self) -> Result<KeywordSet> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AppError::keyword_store(self.describe(), e))?;
        let keywords = self.parse(&content)?;
        log::debug!(
            "Loaded {} keywords from {}",
            keywords.len(),
            self.describe()
        );
        Ok(keywords)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn store_with(content: &str) -> (tempfile::NamedTempFile, FileKeywordStore) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let store = FileKeywordStore::new(file.path());
        (file, store)
    }

    #[tokio::test]
    async fn loads_options_of_all_polls_in_order() {
        let (_file, store) = store_with(
            r#"
            [[polls]]
            title = "Languages"
            options = ["rust", "go"]

            [[polls]]
            options = ["happy", "sad"]
            "#,
        );

        let keywords = store.load().await.unwrap();
        assert_eq!(
            keywords.iter().collect::<Vec<_>>(),
            vec!["rust", "go", "happy", "sad"]
        );
    }

    #[tokio::test]
    async fn empty_file_is_empty_set() {
        let (_file, store) = store_with("");
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn picks_up_changes_between_loads() {
        let (file, store) = store_with("[[polls]]\noptions = [\"one\"]\n");
        assert_eq!(store.load().await.unwrap().len(), 1);

        std::fs::write(file.path(), "[[polls]]\noptions = [\"one\", \"two\"]\n").unwrap();
        assert_eq!(store.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeywordStore::new(dir.path().join("polls.toml"));
        assert!(matches!(
            store.load().await,
            Err(AppError::KeywordStore { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_file_is_store_error() {
        let (_file, store) = store_with("[[polls]\noptions = ");
        assert!(matches!(
            store.load().await,
            Err(AppError::KeywordStore { .. })
        ));
    }
}
