//! Model adapter backed by a JSON property dump.
//!
//! Expected layout:
//!
//! ```json
//! {
//!   "elements": { "10": { "Name": "Wall" } },
//!   "relations": { "1": [10, 20] }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::capabilities::{LoadedModel, ModelLoader};
use crate::domain::errors::{ListingError, LoadError, ResolutionError};
use crate::domain::model::{ElementId, PropertyRecord, Relation};

#[derive(Debug, Deserialize)]
struct ModelDocument {
    elements: BTreeMap<String, Value>,
    #[serde(default)]
    relations: BTreeMap<String, Vec<u64>>,
}

/// Loaded JSON property dump.
#[derive(Debug, Clone, Default)]
pub struct JsonModel {
    elements: BTreeMap<ElementId, PropertyRecord>,
    relations: Vec<Relation>,
}

impl JsonModel {
    /// Decode a model document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, LoadError> {
        let document: ModelDocument = serde_json::from_slice(bytes)
            .map_err(|err| LoadError(format!("invalid model document: {err}")))?;

        let mut elements = BTreeMap::new();
        for (key, value) in document.elements {
            let id = parse_key(&key)?;
            elements.insert(id, PropertyRecord::new(value));
        }

        let mut relations = Vec::new();
        for (key, children) in document.relations {
            let parent = parse_key(&key)?;
            relations.extend(children.into_iter().map(|child| Relation {
                parent,
                child: ElementId(child),
            }));
        }

        Ok(Self {
            elements,
            relations,
        })
    }

    /// Read and decode a model document from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read model file {}", path.display()))?;
        Self::from_slice(&bytes).with_context(|| format!("failed to load model {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Display label for an element: its `Name` attribute when present.
    pub fn label(&self, id: ElementId) -> String {
        let name = self
            .elements
            .get(&id)
            .and_then(|record| record.as_value().get("Name"))
            .and_then(|name| match name {
                Value::String(name) => Some(name.clone()),
                Value::Object(map) => map.get("value").and_then(Value::as_str).map(str::to_owned),
                _ => None,
            });
        match name {
            Some(name) => format!("{name} (#{id})"),
            None => format!("#{id}"),
        }
    }
}

fn parse_key(key: &str) -> Result<ElementId, LoadError> {
    key.parse()
        .map_err(|_| LoadError(format!("element id '{key}' is not an integer")))
}

#[async_trait]
impl LoadedModel for JsonModel {
    async fn properties(&self, id: ElementId) -> Result<PropertyRecord, ResolutionError> {
        self.elements
            .get(&id)
            .cloned()
            .ok_or(ResolutionError::NotFound(id))
    }

    async fn element_ids(&self) -> Result<Vec<ElementId>, ListingError> {
        Ok(self.elements.keys().copied().collect())
    }

    async fn relations(&self) -> Result<Vec<Relation>, ListingError> {
        Ok(self.relations.clone())
    }
}

/// [`ModelLoader`] producing [`JsonModel`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModelLoader;

#[async_trait]
impl ModelLoader for JsonModelLoader {
    async fn load(&self, bytes: &[u8]) -> Result<Arc<dyn LoadedModel>, LoadError> {
        let model = JsonModel::from_slice(bytes)?;
        tracing::info!(elements = model.len(), "model loaded");
        Ok(Arc::new(model))
    }
}
