//! Aggregated property records for the active selection.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::model::{ElementId, PropertyRecord};

/// Tag identifying one selection batch. Only the latest generation may write.
///
/// The default generation is never writable; real generations come from
/// [`AggregationStore::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    generation: Generation,
    records: BTreeMap<ElementId, PropertyRecord>,
    failures: BTreeMap<ElementId, String>,
}

impl StoreState {
    // Generation zero belongs to a store that was never reset and accepts no writes.
    fn accepts(&self, generation: Generation) -> bool {
        generation.0 != 0 && self.generation == generation
    }
}

/// Shared handle to the element id to property record map.
///
/// Clones point at the same store. Every write carries the [`Generation`] returned by the
/// [`reset`](AggregationStore::reset) that opened its batch, and writes from older generations
/// are dropped.
#[derive(Debug, Clone, Default)]
pub struct AggregationStore {
    state: Arc<Mutex<StoreState>>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every entry and open a new generation.
    pub fn reset(&self) -> Generation {
        let mut state = self.state.lock();
        state.generation = Generation(state.generation.0 + 1);
        state.records.clear();
        state.failures.clear();
        state.generation
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.state.lock().generation
    }

    /// Whether `generation` is still the one allowed to write.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.state.lock().accepts(generation)
    }

    /// Insert or overwrite a record. Returns `false` when the write was stale and discarded.
    pub fn put(&self, generation: Generation, id: ElementId, record: PropertyRecord) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(generation) {
            return false;
        }
        state.failures.remove(&id);
        state.records.insert(id, record);
        true
    }

    /// Record that resolving `id` failed. Returns `false` when the write was stale.
    pub fn mark_failed(&self, generation: Generation, id: ElementId, reason: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(generation) {
            return false;
        }
        state.records.remove(&id);
        state.failures.insert(id, reason.into());
        true
    }

    pub fn get(&self, id: ElementId) -> Option<PropertyRecord> {
        self.state.lock().records.get(&id).cloned()
    }

    /// Number of resolved records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Consistent copy of the store for readers.
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock();
        StoreSnapshot {
            generation: state.generation,
            records: state.records.clone(),
            failures: state.failures.clone(),
        }
    }
}

/// Point-in-time copy of the [`AggregationStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub generation: Generation,
    pub records: BTreeMap<ElementId, PropertyRecord>,
    pub failures: BTreeMap<ElementId, String>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: ElementId) -> Option<&PropertyRecord> {
        self.records.get(&id)
    }

    pub fn failed_ids(&self) -> Vec<ElementId> {
        self.failures.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn record(name: &str) -> PropertyRecord {
        PropertyRecord::new(json!({ "Name": name }))
    }

    #[test]
    fn starts_empty() {
        let store = AggregationStore::new();
        assert!(store.is_empty());
        assert_eq!(store.generation(), Generation::default());
        assert!(store.snapshot().records.is_empty());
    }

    #[test]
    fn fresh_store_rejects_default_generation() {
        let store = AggregationStore::new();
        assert!(!store.is_current(Generation::default()));
        assert!(!store.put(Generation::default(), ElementId(1), record("Wall")));
        assert!(!store.mark_failed(Generation::default(), ElementId(2), "boom"));
        assert!(store.snapshot().records.is_empty());
        assert!(store.snapshot().failures.is_empty());

        let generation = store.reset();
        assert_ne!(generation, Generation::default());
        assert!(store.put(generation, ElementId(1), record("Wall")));
    }

    #[test]
    fn reset_clears_entries_and_bumps_generation() {
        let store = AggregationStore::new();
        let first = store.reset();
        assert!(store.put(first, ElementId(1), record("Wall")));
        assert!(store.mark_failed(first, ElementId(2), "boom"));

        let second = store.reset();
        assert!(second > first);
        assert!(store.is_empty());
        assert!(store.snapshot().failures.is_empty());
    }

    #[test]
    fn stale_writes_are_discarded() {
        let store = AggregationStore::new();
        let stale = store.reset();
        let current = store.reset();

        assert!(!store.put(stale, ElementId(1), record("Old")));
        assert!(!store.mark_failed(stale, ElementId(2), "late failure"));
        assert!(store.put(current, ElementId(3), record("New")));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(ElementId(3)), Some(&record("New")));
        assert!(snapshot.failures.is_empty());
        assert!(!store.is_current(stale));
    }

    #[test]
    fn put_overwrites_and_clears_failure() {
        let store = AggregationStore::new();
        let generation = store.reset();
        store.mark_failed(generation, ElementId(7), "timeout");
        store.put(generation, ElementId(7), record("Door"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(ElementId(7)), Some(&record("Door")));
        assert!(snapshot.failed_ids().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let store = AggregationStore::new();
        let handle = store.clone();
        let generation = store.reset();
        handle.put(generation, ElementId(4), record("Slab"));
        assert_eq!(store.get(ElementId(4)), Some(record("Slab")));
    }
}
