use thiserror::Error;

use crate::object::ObjectType;

/// Failure of a mutation call on [`ObjectModel`](crate::ObjectModel).
///
/// Only caller mistakes surface here. Backend trouble never does: it shows up
/// as a snapshot that converges later, or not at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("object type {0} is not registered")]
    UnknownType(ObjectType),
    #[error("object of type {actual} cannot be stored as {expected}")]
    TypeMismatch {
        expected: ObjectType,
        actual: ObjectType,
    },
}

/// Failure of [`Registry::register`](crate::Registry::register).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no store declares any object type")]
    NoStores,
    #[error("object type {0} is declared by more than one store")]
    DuplicateType(ObjectType),
    #[error("failed to spawn {0} thread")]
    Spawn(String),
}
