//! Forwarding aggregated properties to the remote analysis service.

use serde_json::Value;

use crate::app::export::ExportDocument;
use crate::app::store::StoreSnapshot;
use crate::domain::capabilities::RemoteAnalysis;
use crate::domain::errors::DomainError;
use crate::domain::model::ElementId;

/// Sends store snapshots to a [`RemoteAnalysis`] backend after checking preconditions locally.
///
/// Rejected requests never reach the network. Snapshots are only read.
pub struct Forwarder<R> {
    remote: R,
    index_built: bool,
}

impl<R: RemoteAnalysis> Forwarder<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            index_built: false,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Whether a retrieval index was built through this forwarder.
    pub fn index_built(&self) -> bool {
        self.index_built
    }

    /// Send the aggregated snapshot for storage.
    pub async fn store(&self, snapshot: &StoreSnapshot) -> Result<Value, DomainError> {
        require_data(snapshot)?;
        let document = ExportDocument::from_snapshot(snapshot)
            .and_then(|document| document.to_value())
            .map_err(DomainError::Export)?;
        let reply = self.remote.store(&document).await?;
        tracing::info!(elements = snapshot.len(), "snapshot stored remotely");
        Ok(reply)
    }

    /// Ask the service to simplify one element of the snapshot.
    pub async fn simplify(&self, snapshot: &StoreSnapshot, id: ElementId) -> Result<Value, DomainError> {
        require_data(snapshot)?;
        let record = snapshot.get(id).ok_or_else(|| {
            DomainError::precondition(format!("element {id} is not part of the current selection"))
        })?;
        let reply = self.remote.simplify(record.as_value()).await?;
        Ok(reply)
    }

    /// Build the retrieval index from every record of the snapshot.
    pub async fn build_index(&mut self, snapshot: &StoreSnapshot) -> Result<Value, DomainError> {
        require_data(snapshot)?;
        let elements: Vec<Value> = snapshot
            .records
            .values()
            .map(|record| record.as_value().clone())
            .collect();
        let reply = self.remote.build_index(&elements).await?;
        self.index_built = true;
        tracing::info!(elements = elements.len(), "retrieval index built");
        Ok(reply)
    }

    /// Query the retrieval index.
    pub async fn query(&self, question: &str, top_k: usize) -> Result<String, DomainError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DomainError::precondition("the question is empty"));
        }
        if !self.index_built {
            return Err(DomainError::precondition(
                "no retrieval index has been built yet; send the selection with the index action first",
            ));
        }
        let answer = self.remote.query(question, top_k.max(1)).await?;
        Ok(answer)
    }
}

fn require_data(snapshot: &StoreSnapshot) -> Result<(), DomainError> {
    if snapshot.is_empty() {
        return Err(DomainError::precondition(
            "no element properties are available; select elements first",
        ));
    }
    Ok(())
}
