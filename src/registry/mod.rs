//! Registry - binds stores to the object types they serve.
//!
//! Built once at startup. [`Registry::register`] consumes the builder and
//! returns the running [`ObjectModel`], so a model cannot be used before it
//! is registered, and cannot be registered twice.
//!
//! ## Example
//!
//! ```
//! use survey_model::{InMemoryStore, ModelConfig, Record, Registry};
//!
//! let params = InMemoryStore::<Record>::new(["sonar_params", "sensor_params"]);
//! let plans = InMemoryStore::<Record>::new(["plan", "track", "zone"]);
//!
//! let model = Registry::new()
//!     .store(params)
//!     .store(plans)
//!     .register(ModelConfig::default())
//!     .unwrap();
//!
//! assert_eq!(model.types().len(), 5);
//! model.shutdown();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::error::RegistryError;
use crate::model::ObjectModel;
use crate::object::{ModelObject, ObjectType};
use crate::store::Store;

/// Builder collecting the stores of an object model.
pub struct Registry<O: ModelObject> {
    stores: Vec<Arc<dyn Store<O>>>,
}

impl<O: ModelObject> Default for Registry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ModelObject> Registry<O> {
    pub fn new() -> Self {
        Self { stores: Vec::new() }
    }

    /// Add a store.
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: Store<O> + 'static,
    {
        self.stores.push(Arc::new(store));
        self
    }

    /// Add a store that is already shared.
    pub fn shared_store(mut self, store: Arc<dyn Store<O>>) -> Self {
        self.stores.push(store);
        self
    }

    /// Bind every declared type to its store and start the sync worker and
    /// the change notifier.
    ///
    /// Stores declaring no types are skipped. Fails if no store declares any
    /// type or if two stores declare the same type.
    pub fn register(self, config: ModelConfig) -> Result<ObjectModel<O>, RegistryError> {
        let sources = Sources::build(self.stores)?;
        ObjectModel::start(sources, config)
    }
}

/// One store plus the subset of types it serves.
pub(crate) struct Source<O: ModelObject> {
    pub store: Arc<dyn Store<O>>,
    pub types: Vec<ObjectType>,
    connected: AtomicBool,
}

impl<O: ModelObject> Source<O> {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// The type → source table. Immutable after registration.
pub(crate) struct Sources<O: ModelObject> {
    sources: Vec<Source<O>>,
    by_type: HashMap<ObjectType, usize>,
}

impl<O: ModelObject> Sources<O> {
    pub fn build(stores: Vec<Arc<dyn Store<O>>>) -> Result<Self, RegistryError> {
        let mut sources = Vec::with_capacity(stores.len());
        let mut by_type = HashMap::new();

        for store in stores {
            let mut types = store.list_types();
            types.sort();
            types.dedup();

            if types.is_empty() {
                warn!("store declares no object types, skipping");
                continue;
            }

            let index = sources.len();
            for object_type in &types {
                if by_type.insert(object_type.clone(), index).is_some() {
                    return Err(RegistryError::DuplicateType(object_type.clone()));
                }
            }

            info!(source = index, types = ?types, "registered store");
            sources.push(Source {
                store,
                types,
                connected: AtomicBool::new(false),
            });
        }

        if sources.is_empty() {
            return Err(RegistryError::NoStores);
        }

        Ok(Self { sources, by_type })
    }

    pub fn index_of(&self, object_type: &ObjectType) -> Option<usize> {
        self.by_type.get(object_type).copied()
    }

    pub fn for_type(&self, object_type: &ObjectType) -> Option<&Source<O>> {
        self.index_of(object_type).map(|index| &self.sources[index])
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> &Source<O> {
        &self.sources[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source<O>> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Every registered type, sorted.
    pub fn types(&self) -> Vec<ObjectType> {
        let mut types: Vec<ObjectType> = self.by_type.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn disconnect_all(&self) {
        for source in &self.sources {
            source.set_connected(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Record;
    use crate::store::InMemoryStore;

    fn store(types: &[&'static str]) -> Arc<dyn Store<Record>> {
        Arc::new(InMemoryStore::<Record>::new(types.iter().copied()))
    }

    #[test]
    fn builds_type_table() {
        let sources = Sources::build(vec![store(&["zone", "track"]), store(&["plan"])]).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources.index_of(&"zone".into()), Some(0));
        assert_eq!(sources.index_of(&"track".into()), Some(0));
        assert_eq!(sources.index_of(&"plan".into()), Some(1));
        assert_eq!(sources.index_of(&"sonar".into()), None);
        assert_eq!(
            sources.types(),
            vec![ObjectType::from("plan"), "track".into(), "zone".into()]
        );
    }

    #[test]
    fn rejects_duplicate_types() {
        let result = Sources::build(vec![store(&["zone"]), store(&["track", "zone"])]);
        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateType("zone".into()))
        );
    }

    #[test]
    fn rejects_empty_store_list() {
        assert_eq!(
            Sources::<Record>::build(Vec::new()).err(),
            Some(RegistryError::NoStores)
        );
    }

    #[test]
    fn skips_stores_without_types() {
        let sources = Sources::build(vec![store(&[]), store(&["zone"])]).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources.index_of(&"zone".into()), Some(0));

        assert_eq!(
            Sources::build(vec![store(&[])]).err(),
            Some(RegistryError::NoStores)
        );
    }

    #[test]
    fn sources_start_disconnected() {
        let sources = Sources::build(vec![store(&["zone"])]).unwrap();
        assert!(!sources.get(0).is_connected());
        sources.get(0).set_connected(true);
        assert!(sources.for_type(&"zone".into()).unwrap().is_connected());
        sources.disconnect_all();
        assert!(!sources.get(0).is_connected());
    }
}
