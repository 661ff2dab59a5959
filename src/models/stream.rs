//! Stream items, keyword sets and the events that flow between tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single item decoded from the stream source.
///
/// Only `text` is read; any other fields the source sends are ignored, and
/// items without text (deletions, limit notices) decode with an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamItem {
    #[serde(default)]
    pub text: String,
}

/// Ordered keyword options for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Keyword {
    original: String,
    folded: String,
}

impl KeywordSet {
    /// Build a set from store options, keeping order. Blank options are dropped.
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = options
            .into_iter()
            .map(Into::into)
            .filter(|option| !option.trim().is_empty())
            .map(|original| Keyword {
                folded: original.to_lowercase(),
                original,
            })
            .collect();
        Self { keywords }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Keywords in store order, as loaded.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.original.as_str())
    }

    /// Comma-joined form used as the stream filter parameter.
    pub fn track_param(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }

    /// Keywords contained in `text`, case-insensitively, in set order.
    ///
    /// Each keyword is checked once per text, so a keyword appearing several
    /// times still yields a single match.
    pub fn matches<'a>(&'a self, text: &str) -> impl Iterator<Item = &'a str> {
        let folded = text.to_lowercase();
        self.keywords
            .iter()
            .filter(move |k| folded.contains(&k.folded))
            .map(|k| k.original.as_str())
    }
}

/// A keyword match travelling from the poller to the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub keyword: String,
}

impl MatchEvent {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    /// Bytes sent to the queue.
    pub fn payload(&self) -> &[u8] {
        self.keyword.as_bytes()
    }
}

/// Summary of one fetch-and-match cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub keyword_count: usize,
    pub item_count: usize,
    pub event_count: usize,
}

impl CycleStats {
    pub fn started(keyword_count: usize) -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            keyword_count,
            item_count: 0,
            event_count: 0,
        }
    }

    pub fn finish(mut self) -> Self {
        self.end_time = Utc::now();
        self
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}
