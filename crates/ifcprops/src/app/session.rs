//! Viewer session owning the loaded model, selection, and aggregated properties.

use std::sync::Arc;

use crate::app::relations::RelationIndex;
use crate::app::resolve::{BatchReport, ResolutionOptions, resolve_into};
use crate::app::selection::SelectionBatch;
use crate::app::store::{AggregationStore, StoreSnapshot};
use crate::domain::capabilities::{LoadedModel, ModelLoader, RelationIndexer};
use crate::domain::errors::DomainError;
use crate::domain::model::FragmentSelection;
use crate::infra::config::Config;

/// Context object for one viewer: everything the selection pipeline reads or writes.
///
/// Loading a model, selecting, and clearing all reset the aggregation store synchronously, so
/// results of superseded selections can never leak into the current one.
pub struct ViewerSession {
    options: ResolutionOptions,
    model: Option<Arc<dyn LoadedModel>>,
    relations: RelationIndex,
    selection: FragmentSelection,
    store: AggregationStore,
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::new(ResolutionOptions::default())
    }
}

impl ViewerSession {
    pub fn new(options: ResolutionOptions) -> Self {
        Self {
            options,
            model: None,
            relations: RelationIndex::default(),
            selection: FragmentSelection::new(),
            store: AggregationStore::new(),
        }
    }

    /// Build a session using the resolution settings of the layered configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(ResolutionOptions::with_concurrency(
            config.resolution.concurrency(),
        ))
    }

    /// Load model bytes and index their relations.
    ///
    /// The current model, selection, and store stay untouched when loading or indexing fails.
    pub async fn load_model(
        &mut self,
        loader: &dyn ModelLoader,
        indexer: &dyn RelationIndexer,
        bytes: &[u8],
    ) -> Result<(), DomainError> {
        let model = loader.load(bytes).await?;
        let relations = indexer.index(model.as_ref()).await?;
        self.attach_model(model, relations);
        Ok(())
    }

    /// Make `model` the active model, dropping any selection of the previous one.
    pub fn attach_model(&mut self, model: Arc<dyn LoadedModel>, relations: RelationIndex) {
        self.store.reset();
        self.selection = FragmentSelection::new();
        self.model = Some(model);
        self.relations = relations;
        tracing::info!(
            relation_roots = self.relations.roots().len(),
            "model attached to session"
        );
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn relations(&self) -> &RelationIndex {
        &self.relations
    }

    pub fn selection(&self) -> &FragmentSelection {
        &self.selection
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Handle a selection event up to the first suspension point.
    ///
    /// Resets the store, opens a new generation, and flattens the selection. The returned batch
    /// performs the asynchronous resolution when run.
    pub fn begin_selection(
        &mut self,
        selection: FragmentSelection,
    ) -> Result<SelectionBatch, DomainError> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| DomainError::precondition("no model is loaded; load a model before selecting elements"))?;

        let generation = self.store.reset();
        let ids = selection.flatten();
        tracing::info!(
            %generation,
            fragments = selection.fragment_count(),
            elements = ids.len(),
            "selection changed"
        );
        self.selection = selection;

        Ok(SelectionBatch::new(
            generation,
            ids,
            model,
            self.store.clone(),
            self.options,
        ))
    }

    /// Handle a selection event to completion.
    pub async fn select(&mut self, selection: FragmentSelection) -> Result<BatchReport, DomainError> {
        let batch = self.begin_selection(selection)?;
        Ok(batch.run().await)
    }

    /// Handle a selection-cleared event. In-flight batches become stale.
    pub fn clear_selection(&mut self) {
        let generation = self.store.reset();
        self.selection = FragmentSelection::new();
        tracing::info!(%generation, "selection cleared");
    }

    /// Resolve every element of the model into a standalone snapshot.
    ///
    /// The selection store is not touched. Listing failures abort the whole operation, element
    /// failures are recorded in the snapshot.
    pub async fn collect_all(&self) -> Result<StoreSnapshot, DomainError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| DomainError::precondition("no model is loaded; nothing to export"))?;

        let ids = model.element_ids().await?;
        tracing::info!(elements = ids.len(), "collecting properties of all elements");

        let store = AggregationStore::new();
        let generation = store.reset();
        let report = resolve_into(model.as_ref(), &ids, &store, generation, self.options).await;
        tracing::info!(
            resolved = report.resolved,
            failed = report.failed,
            "bulk property collection finished"
        );
        Ok(store.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use crate::domain::capabilities::ModelRelationIndexer;
    use crate::domain::errors::{ListingError, LoadError, ResolutionError};
    use crate::domain::model::{ElementId, PropertyRecord, Relation};

    #[derive(Default)]
    struct FakeModel {
        records: HashMap<ElementId, PropertyRecord>,
        gated: Option<(ElementId, Arc<Notify>)>,
        listing_fails: bool,
    }

    impl FakeModel {
        fn with(records: &[(u64, serde_json::Value)]) -> Self {
            Self {
                records: records
                    .iter()
                    .map(|(id, value)| (ElementId(*id), PropertyRecord::new(value.clone())))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LoadedModel for FakeModel {
        async fn properties(&self, id: ElementId) -> Result<PropertyRecord, ResolutionError> {
            if let Some((gated, gate)) = &self.gated
                && *gated == id
            {
                gate.notified().await;
            }
            self.records.get(&id).cloned().ok_or(ResolutionError::Failed {
                id,
                reason: "lookup threw".into(),
            })
        }

        async fn element_ids(&self) -> Result<Vec<ElementId>, ListingError> {
            if self.listing_fails {
                return Err(ListingError("indexer crashed".into()));
            }
            let mut ids: Vec<_> = self.records.keys().copied().collect();
            ids.sort();
            Ok(ids)
        }

        async fn relations(&self) -> Result<Vec<Relation>, ListingError> {
            Ok(vec![Relation {
                parent: ElementId(1),
                child: ElementId(10),
            }])
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl ModelLoader for FailingLoader {
        async fn load(&self, _bytes: &[u8]) -> Result<Arc<dyn LoadedModel>, LoadError> {
            Err(LoadError("not a model".into()))
        }
    }

    struct StaticLoader;

    #[async_trait]
    impl ModelLoader for StaticLoader {
        async fn load(&self, _bytes: &[u8]) -> Result<Arc<dyn LoadedModel>, LoadError> {
            Ok(Arc::new(FakeModel::with(&[(10, json!({ "name": "Wall" }))])))
        }
    }

    fn session_with(model: FakeModel) -> ViewerSession {
        let mut session = ViewerSession::default();
        session.attach_model(Arc::new(model), RelationIndex::default());
        session
    }

    #[tokio::test]
    async fn failed_element_is_skipped_without_error() {
        let mut session = session_with(FakeModel::with(&[(10, json!({ "name": "Wall" }))]));

        let report = session
            .select(FragmentSelection::from_pairs([("fragA", vec![10u64, 20])]))
            .await
            .expect("selection never fails once a model is loaded");

        assert_eq!(report.resolved, 1);
        assert_eq!(report.failed, 1);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(
            snapshot.get(ElementId(10)).map(PropertyRecord::as_value),
            Some(&json!({ "name": "Wall" }))
        );
        assert!(snapshot.get(ElementId(20)).is_none());
    }

    #[tokio::test]
    async fn new_selection_replaces_previous_entries() {
        let mut session = session_with(FakeModel::with(&[(1, json!({})), (2, json!({}))]));
        session
            .select(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .await
            .unwrap();
        session
            .select(FragmentSelection::from_pairs([("b", vec![2u64])]))
            .await
            .unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.records.keys().copied().collect::<Vec<_>>(), vec![ElementId(2)]);
    }

    #[tokio::test]
    async fn slow_stale_batch_cannot_overwrite_newer_selection() {
        let gate = Arc::new(Notify::new());
        let mut model = FakeModel::with(&[
            (1, json!({ "batch": "a" })),
            (2, json!({ "batch": "b" })),
            (3, json!({ "batch": "b" })),
        ]);
        model.gated = Some((ElementId(1), gate.clone()));
        let mut session = session_with(model);

        let slow = session
            .begin_selection(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .unwrap();
        let fast = session
            .begin_selection(FragmentSelection::from_pairs([("b", vec![2u64, 3])]))
            .unwrap();
        assert!(fast.generation() > slow.generation());

        let slow_task = tokio::spawn(slow.run());
        let fast_report = fast.run().await;
        assert_eq!(fast_report.resolved, 2);

        gate.notify_one();
        let slow_report = slow_task.await.unwrap();
        assert_eq!(slow_report.discarded, 1);
        assert_eq!(slow_report.resolved, 0);

        let snapshot = session.snapshot();
        assert_eq!(
            snapshot.records.keys().copied().collect::<Vec<_>>(),
            vec![ElementId(2), ElementId(3)]
        );
    }

    #[tokio::test]
    async fn clear_empties_store_and_invalidates_in_flight_batch() {
        let gate = Arc::new(Notify::new());
        let mut model = FakeModel::with(&[(1, json!({})), (2, json!({}))]);
        model.gated = Some((ElementId(1), gate.clone()));
        let mut session = session_with(model);

        session
            .select(FragmentSelection::from_pairs([("a", vec![2u64])]))
            .await
            .unwrap();
        assert_eq!(session.store().len(), 1);

        let pending = session
            .begin_selection(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .unwrap();
        session.clear_selection();
        gate.notify_one();
        let report = pending.run().await;

        assert!(report.is_stale());
        assert!(session.snapshot().is_empty());
        assert!(session.selection().is_empty());
    }

    #[tokio::test]
    async fn selecting_without_model_is_a_precondition_failure() {
        let mut session = ViewerSession::default();
        let err = session
            .select(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .await
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn bulk_collection_keeps_selection_store() {
        let mut session = session_with(FakeModel::with(&[(1, json!({})), (2, json!({}))]));
        session
            .select(FragmentSelection::from_pairs([("a", vec![2u64])]))
            .await
            .unwrap();

        let all = session.collect_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn listing_failure_aborts_bulk_collection() {
        let mut model = FakeModel::with(&[(1, json!({}))]);
        model.listing_fails = true;
        let mut session = session_with(model);
        session
            .select(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .await
            .unwrap();

        let err = session.collect_all().await.unwrap_err();
        assert!(matches!(err, DomainError::Listing(_)));
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_model() {
        let mut session = session_with(FakeModel::with(&[(1, json!({}))]));
        session
            .select(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .await
            .unwrap();

        let err = session
            .load_model(&FailingLoader, &ModelRelationIndexer, b"garbage")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Load(_)));
        assert!(session.has_model());
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn loading_model_resets_selection_and_indexes_relations() {
        let mut session = session_with(FakeModel::with(&[(1, json!({}))]));
        session
            .select(FragmentSelection::from_pairs([("a", vec![1u64])]))
            .await
            .unwrap();

        session
            .load_model(&StaticLoader, &ModelRelationIndexer, b"model")
            .await
            .unwrap();
        assert!(session.store().is_empty());
        assert_eq!(session.relations().children(ElementId(1)), &[ElementId(10)]);
    }
}
