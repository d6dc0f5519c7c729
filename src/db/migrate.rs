//! Bulk copy between two stores of possibly different backends.

use std::collections::HashSet;

use tracing::{debug, info};

use super::core::Store;
use crate::error::StoreError;
use crate::TARGET_DB;

const COPY_PAGE_SIZE: i64 = 10_000;

impl Store {
    /// Copy every item from `source` into this store, in source insertion
    /// order, one page at a time. Incoming values are clamped to this
    /// store's column limits, which can make two source items collide; such
    /// collisions are dropped within the page, and texts already present
    /// here are skipped. A failure mid-copy leaves earlier pages applied;
    /// rerunning the copy skips them and picks up the rest.
    pub async fn copy_from(&self, source: &Store) -> Result<u64, StoreError> {
        let mut offset = 0i64;
        let mut copied = 0u64;

        loop {
            let page = source.fetch_page(COPY_PAGE_SIZE, offset).await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            let mut seen_in_page: HashSet<String> = HashSet::new();
            let mut to_insert = Vec::new();
            for stored in page {
                let item = self.truncate_item(&stored.into_news());
                if !seen_in_page.insert(item.text.clone()) {
                    debug!(target: TARGET_DB, "Dropping in-page duplicate text");
                    continue;
                }
                if self.text_exists(&item.text).await? {
                    continue;
                }
                to_insert.push(item);
            }

            copied += to_insert.len() as u64;
            self.insert_items(&to_insert).await?;
            debug!(
                target: TARGET_DB,
                "Copied page at offset {}: {} of {} items new", offset, to_insert.len(), page_len
            );

            offset += COPY_PAGE_SIZE;
        }

        info!(target: TARGET_DB, "Copy complete: {} items migrated", copied);
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnLimits, NewsItem};

    fn item(text: &str, cluster: &str) -> NewsItem {
        NewsItem {
            title: format!("title {}", text),
            text: text.to_string(),
            topic: None,
            cluster: cluster.to_string(),
            published_at: None,
            publisher: None,
        }
    }

    #[tokio::test]
    async fn copy_skips_items_already_in_destination() {
        let source = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        let dest = Store::open_in_memory(ColumnLimits::default()).await.unwrap();

        source
            .insert_items(&[item("T1", "A"), item("T2", "A"), item("T3", "B")])
            .await
            .unwrap();
        dest.insert_items(&[item("T2", "A")]).await.unwrap();

        let copied = dest.copy_from(&source).await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(dest.count().await.unwrap(), 3);
        assert!(dest.text_exists("T1").await.unwrap());
        assert!(dest.text_exists("T3").await.unwrap());
    }

    #[tokio::test]
    async fn copy_from_empty_source_terminates() {
        let source = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        let dest = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        assert_eq!(dest.copy_from(&source).await.unwrap(), 0);
        assert_eq!(dest.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn narrower_destination_collapses_colliding_texts() {
        let source = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        let dest = Store::open_in_memory(ColumnLimits {
            text: 5,
            ..ColumnLimits::default()
        })
        .await
        .unwrap();

        // Distinct in the source, identical after truncation to 5 chars.
        source
            .insert_items(&[item("abcde-one", "A"), item("abcde-two", "A")])
            .await
            .unwrap();

        let copied = dest.copy_from(&source).await.unwrap();
        assert_eq!(copied, 1);
        assert_eq!(dest.count().await.unwrap(), 1);
        let stored = dest.items_in_cluster("A").await.unwrap();
        assert_eq!(stored[0].text, "abcde");
    }

    #[tokio::test]
    async fn copy_is_idempotent() {
        let source = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        let dest = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        source
            .insert_items(&[item("T1", "A"), item("T2", "B")])
            .await
            .unwrap();

        assert_eq!(dest.copy_from(&source).await.unwrap(), 2);
        assert_eq!(dest.copy_from(&source).await.unwrap(), 0);
        assert_eq!(dest.count().await.unwrap(), 2);
    }
}
