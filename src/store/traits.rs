use std::collections::HashMap;

use super::StoreError;
use crate::model::ProjectBinding;
use crate::object::{ModelObject, ObjectId, ObjectType};

/// A backend persisting objects of one or more [`ObjectType`]s for the
/// currently bound project.
///
/// Calls are made from the model's sync worker thread, except
/// [`generate_id`](Store::generate_id) which runs on the caller of
/// `ObjectModel::add`. No timeout is imposed on any call: a hung store stalls
/// the worker loop, never the foreground, so implementations must return in
/// bounded time.
pub trait Store<O: ModelObject>: Send + Sync {
    /// Types served by this store. Queried once, at registration.
    fn list_types(&self) -> Vec<ObjectType>;

    /// Bind to a project. Called again after every project switch and after
    /// every failed attempt.
    fn connect(&self, project: &ProjectBinding) -> Result<(), StoreError>;

    /// Backend-maintained change counter for one type. Equal values across two
    /// reads mean nothing changed in between.
    fn mod_count(&self, object_type: &ObjectType) -> Result<u32, StoreError>;

    /// Every `(type, id)` pair currently stored.
    fn list_ids(&self) -> Result<Vec<(ObjectType, ObjectId)>, StoreError>;

    /// Fetch one object. `Ok(None)` when the id is not (or no longer) present.
    fn get(&self, object_type: &ObjectType, id: &str) -> Result<Option<O>, StoreError>;

    /// Fetch every object of one type.
    fn get_all(&self, object_type: &ObjectType) -> Result<HashMap<ObjectId, O>, StoreError> {
        let mut objects = HashMap::new();
        for (ty, id) in self.list_ids()? {
            if &ty != object_type {
                continue;
            }
            if let Some(object) = self.get(&ty, &id)? {
                objects.insert(id, object);
            }
        }
        Ok(objects)
    }

    /// Allocate an id for a new object without persisting anything.
    fn generate_id(&self, _object: &O) -> ObjectId {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Persist a new object under an id produced by [`generate_id`](Store::generate_id).
    fn add(&self, id: &ObjectId, object: &O) -> Result<(), StoreError>;

    /// Replace an existing object.
    fn modify(&self, id: &ObjectId, object: &O) -> Result<(), StoreError>;

    /// Delete an object.
    fn remove(&self, object_type: &ObjectType, id: &str) -> Result<(), StoreError>;

    /// Upsert (`Some`) or delete (`None`) regardless of prior existence.
    fn set(
        &self,
        object_type: &ObjectType,
        id: &ObjectId,
        object: Option<&O>,
    ) -> Result<(), StoreError>;
}
