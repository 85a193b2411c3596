//! Federated object cache for survey applications.
//!
//! An [`ObjectModel`] keeps an always-readable snapshot of every object type
//! registered through a [`Registry`]. Writes land in the snapshot at once and
//! reach their [`Store`] later, from a single background worker that also
//! reloads whatever changed behind the model's back. Subscribers learn about
//! new snapshots through a rate-bounded [`ModelChanged`] signal.

mod config;
mod error;
mod model;
mod object;
mod registry;
mod store;

pub use config::ModelConfig;
pub use error::{ModelError, RegistryError};
pub use model::{ModelChanged, ObjectModel, ProjectBinding, WorkerStats, CHANGED_EVENT};
pub use object::{ModelObject, ObjectId, ObjectType, Record};
pub use registry::Registry;
pub use store::{InMemoryStore, Store, StoreError};

// Derive macro for ModelObject
pub use survey_model_macros::ModelObject;

// Re-export the EventEmitter used by `ObjectModel::on_changed`
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
