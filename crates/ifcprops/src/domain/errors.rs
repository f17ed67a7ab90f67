//! Domain-specific errors.

use thiserror::Error;

use crate::domain::model::ElementId;

/// Failure resolving the properties of a single element.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("element {0} does not exist in the loaded model")]
    NotFound(ElementId),
    #[error("failed to resolve properties of element {id}: {reason}")]
    Failed { id: ElementId, reason: String },
}

/// Failure enumerating the elements or relations of a model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to list model contents: {0}")]
pub struct ListingError(pub String);

/// The model loader rejected the provided bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to load model: {0}")]
pub struct LoadError(pub String);

/// Failure talking to the remote analysis service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteServiceError {
    #[error("remote service responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("remote service unreachable: {0}")]
    Network(String),
    #[error("unexpected response from remote service: {0}")]
    InvalidResponse(String),
}

/// Operation-level failures surfaced to the user.
///
/// Element-level [`ResolutionError`]s never show up here; batches contain them.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Precondition(String),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
    #[error("export failed: {0:#}")]
    Export(#[source] anyhow::Error),
}

impl DomainError {
    pub fn precondition(message: impl Into<String>) -> Self {
        DomainError::Precondition(message.into())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, DomainError::Precondition(_))
    }
}
