//! Capabilities consumed from the viewer toolkit and the analysis backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::app::relations::RelationIndex;
use crate::domain::errors::{ListingError, LoadError, RemoteServiceError, ResolutionError};
use crate::domain::model::{ElementId, PropertyRecord, Relation};

/// Handle to a model that finished loading.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    /// Resolve the property record of one element. May fail per element.
    async fn properties(&self, id: ElementId) -> Result<PropertyRecord, ResolutionError>;

    /// Enumerate every element id of the model.
    async fn element_ids(&self) -> Result<Vec<ElementId>, ListingError>;

    /// Enumerate the parent to child relations of the model.
    async fn relations(&self) -> Result<Vec<Relation>, ListingError>;
}

/// Turns raw model bytes into a [`LoadedModel`].
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, bytes: &[u8]) -> Result<Arc<dyn LoadedModel>, LoadError>;
}

/// Builds the relation index consumed by the relation tree, once per model load.
#[async_trait]
pub trait RelationIndexer: Send + Sync {
    async fn index(&self, model: &dyn LoadedModel) -> Result<RelationIndex, ListingError>;
}

/// Default indexer reading relations straight from the model.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelRelationIndexer;

#[async_trait]
impl RelationIndexer for ModelRelationIndexer {
    async fn index(&self, model: &dyn LoadedModel) -> Result<RelationIndex, ListingError> {
        let relations = model.relations().await?;
        Ok(RelationIndex::from_relations(relations))
    }
}

/// Remote analysis backend receiving aggregated element data.
#[async_trait]
pub trait RemoteAnalysis: Send + Sync {
    /// Store raw or aggregated data.
    async fn store(&self, document: &Value) -> Result<Value, RemoteServiceError>;

    /// Simplify the data of a single element.
    async fn simplify(&self, record: &Value) -> Result<Value, RemoteServiceError>;

    /// Build a retrieval index from aggregated element records.
    async fn build_index(&self, elements: &[Value]) -> Result<Value, RemoteServiceError>;

    /// Ask a question against the retrieval index.
    async fn query(&self, question: &str, top_k: usize) -> Result<String, RemoteServiceError>;
}
