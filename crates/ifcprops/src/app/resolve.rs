//! Property resolution for flattened selections.

use futures::StreamExt;
use futures::stream;

use crate::app::store::{AggregationStore, Generation};
use crate::domain::capabilities::LoadedModel;
use crate::domain::model::ElementId;

/// Tunables for a resolution batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionOptions {
    /// Maximum number of property lookups in flight. `1` resolves sequentially.
    pub concurrency: usize,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl ResolutionOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

/// Outcome of one resolution batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub generation: Generation,
    pub requested: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Results that arrived after a newer generation took over and were dropped.
    pub discarded: usize,
}

impl BatchReport {
    /// True when the batch was superseded before all of its results landed.
    pub fn is_stale(&self) -> bool {
        self.discarded > 0
    }
}

/// Resolve every id exactly once and write the results into `store` under `generation`.
///
/// Element failures are logged and recorded as failed entries. Results arriving after the store
/// moved to a newer generation are dropped. The batch itself never fails.
pub async fn resolve_into(
    model: &dyn LoadedModel,
    ids: &[ElementId],
    store: &AggregationStore,
    generation: Generation,
    options: ResolutionOptions,
) -> BatchReport {
    let mut report = BatchReport {
        generation,
        requested: ids.len(),
        ..BatchReport::default()
    };

    let mut lookups = stream::iter(ids.iter().copied())
        .map(|id| async move { (id, model.properties(id).await) })
        .buffer_unordered(options.concurrency.max(1));

    while let Some((id, outcome)) = lookups.next().await {
        let accepted = match outcome {
            Ok(record) => {
                let accepted = store.put(generation, id, record);
                if accepted {
                    report.resolved += 1;
                }
                accepted
            }
            Err(err) => {
                tracing::warn!(element = %id, error = %err, "property resolution failed");
                let accepted = store.mark_failed(generation, id, err.to_string());
                if accepted {
                    report.failed += 1;
                }
                accepted
            }
        };

        if !accepted {
            tracing::debug!(element = %id, %generation, "discarding stale property record");
            report.discarded += 1;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::domain::errors::{ListingError, ResolutionError};
    use crate::domain::model::{PropertyRecord, Relation};

    #[derive(Default)]
    struct CountingModel {
        records: HashMap<ElementId, PropertyRecord>,
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn with(ids: &[u64]) -> Self {
            let records = ids
                .iter()
                .map(|id| (ElementId(*id), PropertyRecord::new(json!({ "id": id }))))
                .collect();
            Self {
                records,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LoadedModel for CountingModel {
        async fn properties(&self, id: ElementId) -> Result<PropertyRecord, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records
                .get(&id)
                .cloned()
                .ok_or(ResolutionError::NotFound(id))
        }

        async fn element_ids(&self) -> Result<Vec<ElementId>, ListingError> {
            Ok(self.records.keys().copied().collect())
        }

        async fn relations(&self) -> Result<Vec<Relation>, ListingError> {
            Ok(Vec::new())
        }
    }

    fn ids(values: &[u64]) -> Vec<ElementId> {
        values.iter().copied().map(ElementId).collect()
    }

    #[tokio::test]
    async fn failing_element_does_not_block_others() {
        let model = CountingModel::with(&[1, 3, 4]);
        let store = AggregationStore::new();
        let generation = store.reset();

        let report = resolve_into(
            &model,
            &ids(&[1, 2, 3, 4]),
            &store,
            generation,
            ResolutionOptions::default(),
        )
        .await;

        assert_eq!(report.requested, 4);
        assert_eq!(report.resolved, 3);
        assert_eq!(report.failed, 1);
        assert!(!report.is_stale());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.get(ElementId(2)).is_none());
        assert_eq!(snapshot.failed_ids(), vec![ElementId(2)]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn concurrent_resolution_fills_the_same_entries() {
        let model = CountingModel::with(&[1, 2, 3, 4, 5]);
        let store = AggregationStore::new();
        let generation = store.reset();

        let report = resolve_into(
            &model,
            &ids(&[5, 4, 3, 2, 1]),
            &store,
            generation,
            ResolutionOptions::with_concurrency(3),
        )
        .await;

        assert_eq!(report.resolved, 5);
        assert_eq!(store.len(), 5);
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn stale_generation_discards_every_result() {
        let model = CountingModel::with(&[1, 2]);
        let store = AggregationStore::new();
        let stale = store.reset();
        store.reset();

        let report = resolve_into(
            &model,
            &ids(&[1, 2]),
            &store,
            stale,
            ResolutionOptions::default(),
        )
        .await;

        assert_eq!(report.discarded, 2);
        assert!(report.is_stale());
        assert!(store.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        assert_eq!(ResolutionOptions::with_concurrency(0).concurrency, 1);
    }
}
