//! A store wrapping `InMemoryStore` with switchable faults and call counters.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use survey_model::{
    InMemoryStore, ObjectId, ObjectType, ProjectBinding, Record, Store, StoreError,
};

#[derive(Default)]
struct Faults {
    fail_connect: AtomicBool,
    panic_on_connect: AtomicBool,
    reject_writes: AtomicBool,
    unreachable: AtomicBool,
    get_delay_ms: AtomicU64,
}

#[derive(Default)]
struct Calls {
    connects: AtomicUsize,
    writes: AtomicUsize,
    mod_counts: AtomicUsize,
}

/// Clones share the backend, the faults and the counters.
#[derive(Clone)]
pub struct ScriptedStore {
    inner: InMemoryStore<Record>,
    faults: Arc<Faults>,
    calls: Arc<Calls>,
}

impl ScriptedStore {
    pub fn new(types: &[&str]) -> Self {
        Self {
            inner: InMemoryStore::new(types.iter().copied()),
            faults: Arc::new(Faults::default()),
            calls: Arc::new(Calls::default()),
        }
    }

    /// The wrapped backend, for seeding and inspecting data behind the
    /// model's back.
    pub fn backend(&self) -> &InMemoryStore<Record> {
        &self.inner
    }

    pub fn create_project(&self, project: &ProjectBinding) {
        self.inner.create_project(project);
    }

    /// Write directly into `project`, as another client of the backend would.
    pub fn seed(&self, project: &ProjectBinding, id: &str, record: Record) {
        let restore = self.inner.bound_project();
        self.inner.connect(project).unwrap();
        self.inner
            .set(&record.object_type.clone(), &id.to_string(), Some(&record))
            .unwrap();
        if let Some(restore) = restore {
            self.inner.connect(&restore).unwrap();
        }
    }

    pub fn fail_connect(&self, fail: bool) {
        self.faults.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// The next `connect` panics on the worker thread.
    pub fn panic_on_connect(&self) {
        self.faults.panic_on_connect.store(true, Ordering::SeqCst);
    }

    pub fn reject_writes(&self, reject: bool) {
        self.faults.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Writes fail with `NotConnected` while set.
    pub fn unreachable(&self, unreachable: bool) {
        self.faults.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn slow_gets(&self, delay: Duration) {
        self.faults
            .get_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.calls.connects.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.calls.writes.load(Ordering::SeqCst)
    }

    pub fn mod_count_reads(&self) -> usize {
        self.calls.mod_counts.load(Ordering::SeqCst)
    }

    /// Content reads (`list_ids`, `get`, `get_all`).
    pub fn reads(&self) -> usize {
        self.inner.reads()
    }

    fn write(&self) -> Result<(), StoreError> {
        self.calls.writes.fetch_add(1, Ordering::SeqCst);
        if self.faults.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::NotConnected);
        }
        if self.faults.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("read-only backend".into()));
        }
        Ok(())
    }
}

impl Store<Record> for ScriptedStore {
    fn list_types(&self) -> Vec<ObjectType> {
        self.inner.list_types()
    }

    fn connect(&self, project: &ProjectBinding) -> Result<(), StoreError> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        if self.faults.panic_on_connect.swap(false, Ordering::SeqCst) {
            panic!("scripted store exploded");
        }
        if self.faults.fail_connect.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".into()));
        }
        self.inner.connect(project)
    }

    fn mod_count(&self, object_type: &ObjectType) -> Result<u32, StoreError> {
        self.calls.mod_counts.fetch_add(1, Ordering::SeqCst);
        self.inner.mod_count(object_type)
    }

    fn list_ids(&self) -> Result<Vec<(ObjectType, ObjectId)>, StoreError> {
        self.inner.list_ids()
    }

    fn get(&self, object_type: &ObjectType, id: &str) -> Result<Option<Record>, StoreError> {
        let delay = self.faults.get_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        self.inner.get(object_type, id)
    }

    fn get_all(&self, object_type: &ObjectType) -> Result<HashMap<ObjectId, Record>, StoreError> {
        self.inner.get_all(object_type)
    }

    fn generate_id(&self, object: &Record) -> ObjectId {
        self.inner.generate_id(object)
    }

    fn add(&self, id: &ObjectId, object: &Record) -> Result<(), StoreError> {
        self.write()?;
        self.inner.add(id, object)
    }

    fn modify(&self, id: &ObjectId, object: &Record) -> Result<(), StoreError> {
        self.write()?;
        self.inner.modify(id, object)
    }

    fn remove(&self, object_type: &ObjectType, id: &str) -> Result<(), StoreError> {
        self.write()?;
        self.inner.remove(object_type, id)
    }

    fn set(
        &self,
        object_type: &ObjectType,
        id: &ObjectId,
        object: Option<&Record>,
    ) -> Result<(), StoreError> {
        self.write()?;
        self.inner.set(object_type, id, object)
    }
}
