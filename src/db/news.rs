//! Row-level operations on the news table.
//!
//! Every text comparison in here goes through [`Store::normalize_text`]
//! first: the store truncates on insert, so an untruncated probe would miss
//! rows that collide only after truncation.

use chrono::NaiveDateTime;
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::{debug, warn};

use super::core::Store;
use crate::error::StoreError;
use crate::model::{truncate_chars, NewsItem, StoredItem};
use crate::TARGET_DB;

/// Storage format for the optional publication timestamp.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(crate) fn encode_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn decode_datetime(raw: Option<String>) -> Option<NaiveDateTime> {
    let raw = raw?;
    match NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT) {
        Ok(dt) => Some(dt),
        Err(err) => {
            warn!(target: TARGET_DB, "Unreadable stored datetime '{}': {}", raw, err);
            None
        }
    }
}

fn row_to_item(row: &AnyRow) -> Result<StoredItem, sqlx::Error> {
    Ok(StoredItem {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        text: row.try_get("text")?,
        topic: row.try_get("topic")?,
        cluster: row.try_get("cluster")?,
        published_at: decode_datetime(row.try_get("published_at")?),
        publisher: row.try_get("publisher")?,
    })
}

impl Store {
    /// The deduplication key for a raw text: exactly what the text column
    /// would hold after insertion.
    pub fn normalize_text<'a>(&self, text: &'a str) -> &'a str {
        truncate_chars(text, self.limits().text)
    }

    /// Distinct cluster labels of stored items whose text matches any of
    /// `texts`. A non-empty result means the batch overlaps events already
    /// stored under (possibly different) labels.
    pub async fn clusters_for_texts(&self, texts: &[String]) -> Result<Vec<String>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=texts.len())
            .map(|n| format!("${}", n))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT cluster FROM news WHERE text IN ({}) ORDER BY cluster",
            placeholders
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for text in texts {
            query = query.bind(self.normalize_text(text));
        }

        let labels = query.fetch_all(self.pool()).await?;
        debug!(target: TARGET_DB, "{} of {} texts already stored", labels.len(), texts.len());
        Ok(labels)
    }

    /// All stored items currently filed under `cluster`.
    pub async fn items_in_cluster(&self, cluster: &str) -> Result<Vec<StoredItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, text, topic, cluster, published_at, publisher
             FROM news WHERE cluster = $1 ORDER BY id",
        )
        .bind(cluster)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| row_to_item(row).map_err(StoreError::from))
            .collect()
    }

    /// Existence check by normalized text.
    pub async fn text_exists(&self, text: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT id FROM news WHERE text = $1 LIMIT 1")
            .bind(self.normalize_text(text))
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    /// Append a batch of items in one transaction. Values longer than the
    /// configured column widths are truncated with a warning, never
    /// rejected. Callers filter already-stored texts first; a row that
    /// still collides with the unique text index surfaces as
    /// [`StoreError::Duplicate`] and rolls back the whole batch.
    pub async fn insert_items(&self, items: &[NewsItem]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;
        for item in items {
            let item = self.truncate_item(item);
            let result = sqlx::query(
                "INSERT INTO news (title, text, topic, cluster, published_at, publisher)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&item.title)
            .bind(&item.text)
            .bind(&item.topic)
            .bind(&item.cluster)
            .bind(item.published_at.as_ref().map(encode_datetime))
            .bind(&item.publisher)
            .execute(&mut *tx)
            .await;
            if let Err(err) = result {
                return Err(StoreError::from_insert(err));
            }
        }
        tx.commit().await?;

        debug!(target: TARGET_DB, "Inserted {} items", items.len());
        Ok(())
    }

    /// Atomically relabel every item filed under any of `old_labels`.
    pub async fn rename_cluster(
        &self,
        old_labels: &[String],
        new_label: &str,
    ) -> Result<(), StoreError> {
        if old_labels.is_empty() {
            return Ok(());
        }

        let placeholders = (2..=old_labels.len() + 1)
            .map(|n| format!("${}", n))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE news SET cluster = $1 WHERE cluster IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(self.normalize_cluster(new_label));
        for label in old_labels {
            query = query.bind(label);
        }

        let result = query.execute(self.pool()).await?;
        debug!(
            target: TARGET_DB,
            "Renamed {} items from {:?} to '{}'",
            result.rows_affected(),
            old_labels,
            new_label
        );
        Ok(())
    }

    /// One page of stored items in stable insertion order.
    pub async fn fetch_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, text, topic, cluster, published_at, publisher
             FROM news ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| row_to_item(row).map_err(StoreError::from))
            .collect()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    pub(crate) fn normalize_cluster<'a>(&self, label: &'a str) -> &'a str {
        truncate_chars(label, self.limits().cluster)
    }

    /// Clamp every string field to the configured column widths, logging
    /// each cut the way the store's schema would have reported it.
    pub(crate) fn truncate_item(&self, item: &NewsItem) -> NewsItem {
        let limits = self.limits();
        let clamp = |field: &str, value: &str, limit: usize| -> String {
            if value.chars().count() > limit {
                warn!(
                    target: TARGET_DB,
                    "Truncating '{}' from {} to {} chars",
                    field,
                    value.chars().count(),
                    limit
                );
            }
            truncate_chars(value, limit).to_string()
        };

        NewsItem {
            title: clamp("title", &item.title, limits.title),
            text: clamp("text", &item.text, limits.text),
            topic: item
                .topic
                .as_deref()
                .map(|t| clamp("topic", t, limits.topic)),
            cluster: clamp("cluster", &item.cluster, limits.cluster),
            published_at: item.published_at,
            publisher: item
                .publisher
                .as_deref()
                .map(|p| clamp("publisher", p, limits.publisher)),
        }
    }
}
