//! Data entities shared between the feed source, reconciler and store.

use chrono::NaiveDateTime;

/// One news article as scraped, before a cluster label is attached.
/// The label arrives per batch and may be overridden by reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub text: String,
    pub topic: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub publisher: Option<String>,
}

/// A fully-labeled article ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub text: String,
    pub topic: Option<String>,
    pub cluster: String,
    pub published_at: Option<NaiveDateTime>,
    pub publisher: Option<String>,
}

impl RawItem {
    pub fn into_news(self, cluster: &str) -> NewsItem {
        NewsItem {
            title: self.title,
            text: self.text,
            topic: self.topic,
            cluster: cluster.to_string(),
            published_at: self.published_at,
            publisher: self.publisher,
        }
    }
}

/// A stored row, as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub topic: Option<String>,
    pub cluster: String,
    pub published_at: Option<NaiveDateTime>,
    pub publisher: Option<String>,
}

impl StoredItem {
    pub fn into_news(self) -> NewsItem {
        NewsItem {
            title: self.title,
            text: self.text,
            topic: self.topic,
            cluster: self.cluster,
            published_at: self.published_at,
            publisher: self.publisher,
        }
    }
}

/// Maximum stored width, in characters, of each string column.
///
/// Values over the limit are truncated on insert, not rejected. Truncated
/// `text` is the deduplication key, so every comparison anywhere in the
/// system has to go through [`truncate_chars`] with the same limit first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnLimits {
    pub title: usize,
    pub text: usize,
    pub topic: usize,
    pub cluster: usize,
    pub publisher: usize,
}

impl Default for ColumnLimits {
    fn default() -> Self {
        ColumnLimits {
            title: 100,
            text: 500,
            topic: 30,
            cluster: 100,
            publisher: 30,
        }
    }
}

/// Truncate a string to at most `limit` characters, on a char boundary.
pub fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
