use thiserror::Error;

use crate::object::ObjectType;

/// Failure reported by a [`Store`](super::Store) backend.
///
/// The engine never surfaces these to its callers: connect failures are
/// retried, write failures discard the offending task and read failures keep
/// the previous data for the cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store is not connected to a project")]
    NotConnected,
    #[error("project {project} does not exist in backend {backend}")]
    UnknownProject { backend: String, project: String },
    #[error("object type {0} is not served by this store")]
    UnknownType(ObjectType),
    #[error("object {object_type}:{id} not found")]
    NotFound { object_type: ObjectType, id: String },
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(String),
}
