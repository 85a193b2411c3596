//! InMemoryStore - HashMap-backed store for testing and development.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Serialize};

use super::{Store, StoreError};
use crate::model::ProjectBinding;
use crate::object::{ModelObject, ObjectId, ObjectType};

/// Tables of one project. Objects are kept serialized so nothing handed out
/// aliases stored state.
#[derive(Default)]
struct ProjectTables {
    objects: HashMap<ObjectType, BTreeMap<ObjectId, Vec<u8>>>,
    mod_counts: HashMap<ObjectType, u32>,
}

impl ProjectTables {
    fn touch(&mut self, object_type: &ObjectType) {
        let count = self.mod_counts.entry(object_type.clone()).or_insert(0);
        *count = count.wrapping_add(1);
    }
}

/// In-memory store serving a fixed set of object types.
///
/// Projects must be created with [`create_project`](InMemoryStore::create_project)
/// before `connect` succeeds, mirroring a backend where a project that does
/// not exist yet cannot be bound. Clone-friendly via Arc: clones share tables,
/// binding and counters.
///
/// ## Example
///
/// ```
/// use survey_model::{InMemoryStore, ProjectBinding, Record, Store};
///
/// let store = InMemoryStore::<Record>::new(["zone"]);
/// let project = ProjectBinding::new("memory://", "survey-1");
/// store.create_project(&project);
/// store.connect(&project).unwrap();
///
/// let zone = Record::new("zone").with("name", "north");
/// let id = store.generate_id(&zone);
/// store.add(&id, &zone).unwrap();
/// assert_eq!(store.get(&"zone".into(), &id).unwrap(), Some(zone));
/// ```
pub struct InMemoryStore<O> {
    types: Vec<ObjectType>,
    projects: Arc<RwLock<HashMap<ProjectBinding, ProjectTables>>>,
    bound: Arc<RwLock<Option<ProjectBinding>>>,
    id_seq: Arc<AtomicU64>,
    reads: Arc<AtomicUsize>,
    _marker: PhantomData<fn() -> O>,
}

impl<O> Clone for InMemoryStore<O> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            projects: Arc::clone(&self.projects),
            bound: Arc::clone(&self.bound),
            id_seq: Arc::clone(&self.id_seq),
            reads: Arc::clone(&self.reads),
            _marker: PhantomData,
        }
    }
}

impl<O> InMemoryStore<O> {
    /// Create a store serving the given object types.
    pub fn new<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ObjectType>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            projects: Arc::new(RwLock::new(HashMap::new())),
            bound: Arc::new(RwLock::new(None)),
            id_seq: Arc::new(AtomicU64::new(1)),
            reads: Arc::new(AtomicUsize::new(0)),
            _marker: PhantomData,
        }
    }

    /// Create an empty project. Existing projects are left untouched.
    pub fn create_project(&self, project: &ProjectBinding) {
        if let Ok(mut projects) = self.projects.write() {
            projects.entry(project.clone()).or_default();
        }
    }

    /// The project this store is currently bound to.
    pub fn bound_project(&self) -> Option<ProjectBinding> {
        self.bound.read().ok().and_then(|bound| bound.clone())
    }

    /// Number of content reads served (`list_ids`, `get`, `get_all`).
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn ensure_type(&self, object_type: &ObjectType) -> Result<(), StoreError> {
        if self.types.contains(object_type) {
            Ok(())
        } else {
            Err(StoreError::UnknownType(object_type.clone()))
        }
    }

    fn current(&self) -> Result<ProjectBinding, StoreError> {
        self.bound
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    fn with_tables<R>(
        &self,
        f: impl FnOnce(&ProjectTables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let project = self.current()?;
        let projects = self
            .projects
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let tables = projects.get(&project).ok_or(StoreError::NotConnected)?;
        f(tables)
    }

    fn with_tables_mut<R>(
        &self,
        f: impl FnOnce(&mut ProjectTables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let project = self.current()?;
        let mut projects = self
            .projects
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let tables = projects.get_mut(&project).ok_or(StoreError::NotConnected)?;
        f(tables)
    }
}

fn encode<O: Serialize>(object: &O) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(object).map_err(|e| StoreError::Serde(e.to_string()))
}

fn decode<O: DeserializeOwned>(bytes: &[u8]) -> Result<O, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serde(e.to_string()))
}

impl<O> Store<O> for InMemoryStore<O>
where
    O: ModelObject + Serialize + DeserializeOwned,
{
    fn list_types(&self) -> Vec<ObjectType> {
        self.types.clone()
    }

    fn connect(&self, project: &ProjectBinding) -> Result<(), StoreError> {
        let exists = self
            .projects
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?
            .contains_key(project);
        if !exists {
            return Err(StoreError::UnknownProject {
                backend: project.backend.clone(),
                project: project.project.clone(),
            });
        }

        let mut bound = self
            .bound
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        *bound = Some(project.clone());
        Ok(())
    }

    fn mod_count(&self, object_type: &ObjectType) -> Result<u32, StoreError> {
        self.ensure_type(object_type)?;
        self.with_tables(|tables| Ok(tables.mod_counts.get(object_type).copied().unwrap_or(0)))
    }

    fn list_ids(&self) -> Result<Vec<(ObjectType, ObjectId)>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.with_tables(|tables| {
            let mut ids = Vec::new();
            for object_type in &self.types {
                if let Some(objects) = tables.objects.get(object_type) {
                    ids.extend(objects.keys().map(|id| (object_type.clone(), id.clone())));
                }
            }
            Ok(ids)
        })
    }

    fn get(&self, object_type: &ObjectType, id: &str) -> Result<Option<O>, StoreError> {
        self.ensure_type(object_type)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.with_tables(|tables| {
            match tables.objects.get(object_type).and_then(|objects| objects.get(id)) {
                Some(bytes) => Ok(Some(decode(bytes)?)),
                None => Ok(None),
            }
        })
    }

    fn get_all(&self, object_type: &ObjectType) -> Result<HashMap<ObjectId, O>, StoreError> {
        self.ensure_type(object_type)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.with_tables(|tables| {
            let mut objects = HashMap::new();
            if let Some(stored) = tables.objects.get(object_type) {
                for (id, bytes) in stored {
                    objects.insert(id.clone(), decode(bytes)?);
                }
            }
            Ok(objects)
        })
    }

    fn generate_id(&self, object: &O) -> ObjectId {
        let seq = self.id_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", object.object_type(), seq)
    }

    fn add(&self, id: &ObjectId, object: &O) -> Result<(), StoreError> {
        let object_type = object.object_type();
        self.ensure_type(&object_type)?;
        let bytes = encode(object)?;
        self.with_tables_mut(|tables| {
            let objects = tables.objects.entry(object_type.clone()).or_default();
            if objects.contains_key(id) {
                return Err(StoreError::Rejected(format!(
                    "object {}:{} already exists",
                    object_type, id
                )));
            }
            objects.insert(id.clone(), bytes);
            tables.touch(&object_type);
            Ok(())
        })
    }

    fn modify(&self, id: &ObjectId, object: &O) -> Result<(), StoreError> {
        let object_type = object.object_type();
        self.ensure_type(&object_type)?;
        let bytes = encode(object)?;
        self.with_tables_mut(|tables| {
            let slot = tables
                .objects
                .get_mut(&object_type)
                .and_then(|objects| objects.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    object_type: object_type.clone(),
                    id: id.clone(),
                })?;
            *slot = bytes;
            tables.touch(&object_type);
            Ok(())
        })
    }

    fn remove(&self, object_type: &ObjectType, id: &str) -> Result<(), StoreError> {
        self.ensure_type(object_type)?;
        self.with_tables_mut(|tables| {
            let removed = tables
                .objects
                .get_mut(object_type)
                .and_then(|objects| objects.remove(id));
            if removed.is_none() {
                return Err(StoreError::NotFound {
                    object_type: object_type.clone(),
                    id: id.to_string(),
                });
            }
            tables.touch(object_type);
            Ok(())
        })
    }

    fn set(
        &self,
        object_type: &ObjectType,
        id: &ObjectId,
        object: Option<&O>,
    ) -> Result<(), StoreError> {
        self.ensure_type(object_type)?;
        let bytes = object.map(encode).transpose()?;
        self.with_tables_mut(|tables| {
            let objects = tables.objects.entry(object_type.clone()).or_default();
            match bytes {
                Some(bytes) => {
                    objects.insert(id.clone(), bytes);
                }
                None => {
                    if objects.remove(id).is_none() {
                        return Ok(());
                    }
                }
            }
            tables.touch(object_type);
            Ok(())
        })
    }
}
