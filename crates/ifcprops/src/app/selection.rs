//! Selection batches and selection argument parsing.

use std::sync::Arc;

use crate::app::resolve::{BatchReport, ResolutionOptions, resolve_into};
use crate::app::store::{AggregationStore, Generation};
use crate::domain::capabilities::LoadedModel;
use crate::domain::model::{ElementId, FragmentSelection};

/// Work scheduled for one selection event.
///
/// Created by [`ViewerSession::begin_selection`](crate::app::session::ViewerSession::begin_selection)
/// after the store has been reset, so the batch only ever writes under its own generation.
/// Batches own everything they need and can be awaited in any order.
pub struct SelectionBatch {
    generation: Generation,
    ids: Vec<ElementId>,
    model: Arc<dyn LoadedModel>,
    store: AggregationStore,
    options: ResolutionOptions,
}

impl SelectionBatch {
    pub(crate) fn new(
        generation: Generation,
        ids: Vec<ElementId>,
        model: Arc<dyn LoadedModel>,
        store: AggregationStore,
        options: ResolutionOptions,
    ) -> Self {
        Self {
            generation,
            ids,
            model,
            store,
            options,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Flattened ids this batch resolves.
    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    /// Resolve every id of the batch into the shared store.
    pub async fn run(self) -> BatchReport {
        tracing::debug!(
            generation = %self.generation,
            elements = self.ids.len(),
            "resolving selection"
        );
        let report = resolve_into(
            self.model.as_ref(),
            &self.ids,
            &self.store,
            self.generation,
            self.options,
        )
        .await;
        if report.is_stale() {
            tracing::debug!(
                generation = %self.generation,
                discarded = report.discarded,
                "selection superseded before resolution finished"
            );
        }
        report
    }
}

impl std::fmt::Debug for SelectionBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionBatch")
            .field("generation", &self.generation)
            .field("ids", &self.ids)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Error returned when a `fragment=id,id` argument cannot be parsed.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SelectionParseError {
    #[error("selection '{0}' must look like <fragment>=<id>[,<id>...]")]
    MissingSeparator(String),
    #[error("selection '{0}' has an empty fragment id")]
    EmptyFragment(String),
    #[error("invalid element id '{id}' in selection '{input}'")]
    InvalidId { input: String, id: String },
}

/// Parse a `fragment=id,id` command-line argument.
pub fn parse_fragment_arg(input: &str) -> Result<(String, Vec<ElementId>), SelectionParseError> {
    let (fragment, ids) = input
        .split_once('=')
        .ok_or_else(|| SelectionParseError::MissingSeparator(input.to_string()))?;

    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Err(SelectionParseError::EmptyFragment(input.to_string()));
    }

    let ids = ids
        .split(',')
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            raw.parse::<ElementId>()
                .map_err(|_| SelectionParseError::InvalidId {
                    input: input.to_string(),
                    id: raw.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((fragment.to_string(), ids))
}

/// Build a selection from several `fragment=id,id` arguments.
pub fn selection_from_args<S: AsRef<str>>(
    args: &[S],
) -> Result<FragmentSelection, SelectionParseError> {
    let mut selection = FragmentSelection::new();
    for arg in args {
        let (fragment, ids) = parse_fragment_arg(arg.as_ref())?;
        selection.insert(fragment, ids);
    }
    Ok(selection)
}
