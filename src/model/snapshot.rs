use std::collections::HashMap;
use std::sync::Arc;

use super::task::Task;
use crate::object::{ObjectId, ObjectType};

/// All objects of one type, keyed by id.
pub(crate) type TypeMap<O> = HashMap<ObjectId, O>;

/// Published, read-only view of every registered type.
///
/// Never mutated once other threads can see it: writers clone on write
/// (`Arc::make_mut`), so a reader holding an `Arc<Snapshot>` keeps a
/// consistent view. Type maps are shared between consecutive snapshots until
/// one of them changes.
#[derive(Debug)]
pub(crate) struct Snapshot<O> {
    pub types: HashMap<ObjectType, Arc<TypeMap<O>>>,
    pub revision: u64,
}

impl<O> Clone for Snapshot<O> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            revision: self.revision,
        }
    }
}

impl<O: Clone + PartialEq> Snapshot<O> {
    /// An empty snapshot holding an empty map for each type.
    pub fn empty<'a>(types: impl IntoIterator<Item = &'a ObjectType>) -> Self {
        Self {
            types: types
                .into_iter()
                .map(|object_type| (object_type.clone(), Arc::new(TypeMap::new())))
                .collect(),
            revision: 0,
        }
    }

    pub fn type_map(&self, object_type: &ObjectType) -> Option<&TypeMap<O>> {
        self.types.get(object_type).map(|objects| objects.as_ref())
    }

    /// Apply a task to this snapshot. Returns whether content changed.
    pub fn apply(&mut self, task: &Task<O>) -> bool {
        apply_task(&mut self.types, task)
    }
}

/// Apply one task to a set of type maps, cloning only the touched map when
/// it is shared. Returns whether content changed.
pub(crate) fn apply_task<O: Clone + PartialEq>(
    types: &mut HashMap<ObjectType, Arc<TypeMap<O>>>,
    task: &Task<O>,
) -> bool {
    let slot = types.entry(task.object_type.clone()).or_default();

    match task.payload() {
        Some(object) => {
            if slot.get(&task.id) == Some(object) {
                return false;
            }
            Arc::make_mut(slot).insert(task.id.clone(), object.clone());
            true
        }
        None => {
            if !slot.contains_key(&task.id) {
                return false;
            }
            Arc::make_mut(slot).remove(&task.id);
            true
        }
    }
}
