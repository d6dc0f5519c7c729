//! The reconciliation core: folds one freshly scraped cluster batch into a
//! store while keeping two invariants intact: no two stored items share a
//! normalized text, and each distinct event sits under exactly one cluster
//! label.
//!
//! A batch is processed in five steps:
//!
//! 1. normalize every incoming text (truncation changes which texts collide,
//!    so it has to happen before any comparison);
//! 2. look up which stored cluster labels those texts already live under;
//!    a hit means this "new" event was seen before under a label that may
//!    have drifted, and the label policy decides who wins;
//! 3. dedup the batch against itself (one scrape pass can reach the same
//!    article through several links);
//! 4. drop items whose text the store already holds;
//! 5. insert whatever is left, or nothing. Empty batches and fully-known
//!    batches are ordinary, not errors.
//!
//! Nothing here locks: each batch re-derives everything from current store
//! state, so a run cancelled between rename and insert self-heals on the
//! next pass, and the store's unique text index settles any race.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::db::Store;
use crate::error::StoreError;
use crate::model::RawItem;
use crate::TARGET_RECONCILE;

/// What to do when an incoming batch overlaps clusters already stored under
/// different labels.
///
/// Publishers reword their event titles between polling runs. `NewestWins`
/// renames the stored rows so the whole event converges on the most recently
/// observed label. `KeepExisting` leaves stored labels alone and files new
/// items under the first label already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LabelPolicy {
    #[default]
    NewestWins,
    KeepExisting,
}

impl std::str::FromStr for LabelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(LabelPolicy::NewestWins),
            "keep-existing" => Ok(LabelPolicy::KeepExisting),
            other => Err(format!(
                "unknown label policy '{}', expected 'newest' or 'keep-existing'",
                other
            )),
        }
    }
}

/// What one batch did to the store.
#[derive(Debug, Default, PartialEq)]
pub struct BatchOutcome {
    /// Stored labels that were folded into the canonical one.
    pub renamed_from: Vec<String>,
    /// The label the batch's items ended up under.
    pub label: String,
    pub inserted: usize,
    pub already_known: usize,
}

pub struct Reconciler<'a> {
    store: &'a Store,
    policy: LabelPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store, policy: LabelPolicy) -> Self {
        Reconciler { store, policy }
    }

    /// Fold one scraped batch into the store. `label` is the proposed
    /// cluster label and must be non-empty (the feed source contract).
    pub async fn apply_batch(
        &self,
        label: &str,
        items: Vec<RawItem>,
    ) -> Result<BatchOutcome, StoreError> {
        if items.is_empty() {
            debug!(target: TARGET_RECONCILE, "Empty batch for '{}', nothing to do", label);
            return Ok(BatchOutcome {
                label: label.to_string(),
                ..BatchOutcome::default()
            });
        }

        // Step 1: comparisons below only make sense on normalized texts.
        let texts: Vec<String> = items
            .iter()
            .map(|item| self.store.normalize_text(&item.text).to_string())
            .collect();

        // Step 2: known texts reveal the labels this event is stored under.
        let stored_labels = self.store.clusters_for_texts(&texts).await?;
        let (canonical, renamed_from) = match self.policy {
            LabelPolicy::NewestWins => {
                if !stored_labels.is_empty() {
                    let stale: Vec<String> = stored_labels
                        .iter()
                        .filter(|l| l.as_str() != label)
                        .cloned()
                        .collect();
                    self.store.rename_cluster(&stale, label).await?;
                    (label.to_string(), stale)
                } else {
                    (label.to_string(), Vec::new())
                }
            }
            LabelPolicy::KeepExisting => {
                let canonical = stored_labels
                    .first()
                    .cloned()
                    .unwrap_or_else(|| label.to_string());
                (canonical, Vec::new())
            }
        };

        // Step 3: in-batch dedup, stable by first-seen order, last
        // occurrence winning on conflicting fields.
        let mut order: Vec<String> = Vec::new();
        let mut survivors: HashMap<String, RawItem> = HashMap::new();
        for (item, text) in items.into_iter().zip(texts) {
            if !survivors.contains_key(&text) {
                order.push(text.clone());
            }
            survivors.insert(text, item);
        }

        // Steps 4 and 5: insert only what the store does not hold yet.
        let mut to_insert = Vec::new();
        let mut already_known = 0usize;
        for text in &order {
            if self.store.text_exists(text).await? {
                already_known += 1;
                continue;
            }
            let item = survivors.remove(text).expect("survivor indexed by order");
            to_insert.push(item.into_news(&canonical));
        }

        let inserted = to_insert.len();
        self.store.insert_items(&to_insert).await?;

        info!(
            target: TARGET_RECONCILE,
            "Batch '{}': {} inserted, {} already known, {} labels folded",
            canonical,
            inserted,
            already_known,
            renamed_from.len()
        );
        Ok(BatchOutcome {
            renamed_from,
            label: canonical,
            inserted,
            already_known,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnLimits;
    use std::collections::HashSet;

    fn raw(title: &str, text: &str) -> RawItem {
        RawItem {
            title: title.to_string(),
            text: text.to_string(),
            topic: None,
            published_at: None,
            publisher: None,
        }
    }

    async fn store() -> Store {
        Store::open_in_memory(ColumnLimits::default()).await.unwrap()
    }

    async fn assert_all_texts_unique(store: &Store) {
        let rows = store.fetch_page(100_000, 0).await.unwrap();
        let texts: HashSet<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts.len(), rows.len(), "store holds duplicate texts");
    }

    #[tokio::test]
    async fn fresh_batch_inserts_everything() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);

        let outcome = rec
            .apply_batch("Flood in town", vec![raw("a", "text a"), raw("b", "text b")])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.label, "Flood in town");
        assert!(outcome.renamed_from.is_empty());
        assert_eq!(store.items_in_cluster("Flood in town").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);
        let outcome = rec.apply_batch("Anything", vec![]).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn applying_a_batch_twice_changes_nothing() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);
        let batch = || vec![raw("a", "text a"), raw("b", "text b")];

        rec.apply_batch("Event", batch()).await.unwrap();
        let second = rec.apply_batch("Event", batch()).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_known, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_all_texts_unique(&store).await;
    }

    #[tokio::test]
    async fn label_converges_on_newest() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);

        rec.apply_batch("Label A", vec![raw("a", "shared text")])
            .await
            .unwrap();
        let outcome = rec
            .apply_batch("Label B", vec![raw("a", "shared text"), raw("b", "new text")])
            .await
            .unwrap();

        assert_eq!(outcome.renamed_from, vec!["Label A".to_string()]);
        assert_eq!(outcome.inserted, 1);
        let stored = store.items_in_cluster("Label B").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(store.items_in_cluster("Label A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keep_existing_policy_files_under_stored_label() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::KeepExisting);

        rec.apply_batch("Label A", vec![raw("a", "shared text")])
            .await
            .unwrap();
        let outcome = rec
            .apply_batch("Label B", vec![raw("a", "shared text"), raw("b", "new text")])
            .await
            .unwrap();

        assert_eq!(outcome.label, "Label A");
        assert!(outcome.renamed_from.is_empty());
        assert_eq!(store.items_in_cluster("Label A").await.unwrap().len(), 2);
        assert!(store.items_in_cluster("Label B").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_dedups_itself_last_occurrence_wins() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);

        let outcome = rec
            .apply_batch(
                "Event",
                vec![
                    raw("first title", "same text"),
                    raw("other", "distinct text"),
                    raw("second title", "same text"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        let stored = store.items_in_cluster("Event").await.unwrap();
        // Stable by first-seen order, fields from the last occurrence.
        assert_eq!(stored[0].text, "same text");
        assert_eq!(stored[0].title, "second title");
        assert_eq!(stored[1].text, "distinct text");
    }

    #[tokio::test]
    async fn truncation_collision_keeps_one_item() {
        let limits = ColumnLimits {
            text: 8,
            ..ColumnLimits::default()
        };
        let store = Store::open_in_memory(limits).await.unwrap();
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);

        let outcome = rec
            .apply_batch(
                "Event",
                vec![raw("a", "12345678 one tail"), raw("b", "12345678 other tail")],
            )
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        let stored = store.items_in_cluster("Event").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "12345678");
        assert_all_texts_unique(&store).await;
    }

    #[tokio::test]
    async fn arbitrary_batch_sequence_never_duplicates_texts() {
        let store = store().await;
        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);

        let batches = [
            ("A", vec![raw("1", "t1"), raw("2", "t2")]),
            ("B", vec![raw("2", "t2"), raw("3", "t3")]),
            ("C", vec![raw("1", "t1"), raw("4", "t4"), raw("4b", "t4")]),
            ("A", vec![raw("5", "t5")]),
        ];
        for (label, items) in batches {
            rec.apply_batch(label, items).await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 5);
        assert_all_texts_unique(&store).await;
    }

    #[tokio::test]
    async fn rename_without_insert_heals_on_next_pass() {
        // Simulates a run cancelled between the rename and the insert: the
        // rename alone must leave the store in a state the next identical
        // batch completes from.
        let store = store().await;
        store
            .insert_items(&[raw("a", "shared text").into_news("Label A")])
            .await
            .unwrap();
        store
            .rename_cluster(&["Label A".to_string()], "Label B")
            .await
            .unwrap();

        let rec = Reconciler::new(&store, LabelPolicy::NewestWins);
        let outcome = rec
            .apply_batch("Label B", vec![raw("a", "shared text"), raw("b", "new text")])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(store.items_in_cluster("Label B").await.unwrap().len(), 2);
        assert_all_texts_unique(&store).await;
    }
}
