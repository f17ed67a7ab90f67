//! Domain models for element selections and property records.

use std::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Identifier of one element inside a loaded model (`expressID`).
///
/// Only unique within a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElementId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse().map(ElementId)
    }
}

impl From<u64> for ElementId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Opaque attribute document describing one element.
///
/// The pipeline transports records without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyRecord(serde_json::Value);

impl PropertyRecord {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for PropertyRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Geometric selection reported by the viewer: fragment id to element ids.
///
/// Fragments keep insertion order and every fragment keeps its ids in insertion order without
/// repeats, mirroring the ordered map of sets the viewer hands out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentSelection {
    fragments: IndexMap<String, IndexSet<ElementId>>,
}

impl FragmentSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from `(fragment, ids)` pairs, merging repeated fragments.
    pub fn from_pairs<F, I>(pairs: impl IntoIterator<Item = (F, I)>) -> Self
    where
        F: Into<String>,
        I: IntoIterator,
        I::Item: Into<ElementId>,
    {
        let mut selection = Self::new();
        for (fragment, ids) in pairs {
            selection.insert(fragment, ids);
        }
        selection
    }

    /// Add ids to a fragment, creating it at the end when unknown.
    pub fn insert<I>(&mut self, fragment: impl Into<String>, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<ElementId>,
    {
        self.fragments
            .entry(fragment.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
    }

    /// Fragments with their ids, in insertion order.
    pub fn fragments(&self) -> impl Iterator<Item = (&str, &IndexSet<ElementId>)> {
        self.fragments
            .iter()
            .map(|(fragment, ids)| (fragment.as_str(), ids))
    }

    pub fn elements(&self, fragment: &str) -> Option<&IndexSet<ElementId>> {
        self.fragments.get(fragment)
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// True when no fragment carries any element.
    pub fn is_empty(&self) -> bool {
        self.fragments.values().all(IndexSet::is_empty)
    }

    /// Flatten the selection into the ids to resolve.
    ///
    /// Fragments are visited in insertion order, then ids in per-fragment order. An id shared by
    /// several fragments is kept once, at its first position.
    pub fn flatten(&self) -> Vec<ElementId> {
        self.fragments
            .values()
            .flatten()
            .copied()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Parent to child edge produced by the relation indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub parent: ElementId,
    pub child: ElementId,
}
