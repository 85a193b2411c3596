//! Object Model - an always-responsive, thread-safe view over slow stores.
//!
//! Foreground calls read and write an in-memory [snapshot](Snapshot) and never
//! touch a backend. Writes are applied to the snapshot immediately and queued
//! as tasks; a single sync worker thread drains the queue into the owning
//! stores, reloads what changed and republishes. A change notifier turns
//! republished snapshots into at most one [`ModelChanged`] per interval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 foreground threads (UI, ...)                  │
//! │   add / modify / remove / set        get / get_all / get_ids  │
//! └──────────────────────────────────────────────────────────────┘
//!        │ queue lock → snapshot lock           │ snapshot lock
//!        ▼                                      ▼
//! ┌──────────────┐                     ┌──────────────────────────┐
//! │  task queue  │                     │   Arc<Snapshot>          │
//! └──────────────┘                     └──────────────────────────┘
//!        │ swap                                 ▲ replace
//!        ▼                                      │
//! ┌──────────────────────────────────────────────────────────────┐
//! │ sync worker: switch project → connect → apply → reload → publish │
//! └──────────────────────────────────────────────────────────────┘
//!        │                                      │
//!        ▼                                      ▼
//!   Store (params)                         Store (plans)   ...
//! ```
//!
//! ## Example
//!
//! ```
//! use survey_model::{InMemoryStore, ModelConfig, ProjectBinding, Record, Registry};
//!
//! let store = InMemoryStore::<Record>::new(["zone"]);
//! let project = ProjectBinding::new("memory://", "survey-1");
//! store.create_project(&project);
//!
//! let model = Registry::new().store(store).register(ModelConfig::default()).unwrap();
//! model.set_project(project);
//!
//! let id = model.add(Record::new("zone").with("name", "north")).unwrap();
//! // Visible immediately, before the backend has seen it.
//! let zone = model.get(&"zone".into(), &id).unwrap();
//! assert_eq!(zone.get_str("name"), Some("north"));
//!
//! model.shutdown();
//! ```

mod notifier;
mod snapshot;
mod state;
mod task;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::config::ModelConfig;
use crate::error::{ModelError, RegistryError};
use crate::object::{ModelObject, ObjectId, ObjectType};
use crate::registry::{Source, Sources};

pub use notifier::{ModelChanged, CHANGED_EVENT};
pub use state::ProjectBinding;
pub use worker::WorkerStats;

use notifier::{ChangeNotifier, NotifierThread};
use snapshot::Snapshot;
use state::ModelState;
use task::Task;
use worker::SyncWorker;

/// Pending wake-up request for the sync worker.
#[derive(Debug, Default)]
struct WakeState {
    pending: bool,
    stopped: bool,
}

/// State shared between the foreground handle and the sync worker.
///
/// Lock order: `queue`, then `state` or `snapshot`. `state` and `snapshot`
/// are never held together, and `wake` is never held with another lock.
pub(crate) struct Shared<O: ModelObject> {
    sources: Sources<O>,
    queue: Mutex<Vec<Task<O>>>,
    snapshot: RwLock<Arc<Snapshot<O>>>,
    state: Mutex<ModelState>,
    wake: Mutex<WakeState>,
    wake_cv: Condvar,
    force_reload: AtomicBool,
}

impl<O: ModelObject> Shared<O> {
    fn new(sources: Sources<O>) -> Self {
        let snapshot = Snapshot::empty(sources.types().iter());
        Self {
            sources,
            queue: Mutex::new(Vec::new()),
            snapshot: RwLock::new(Arc::new(snapshot)),
            state: Mutex::new(ModelState::default()),
            wake: Mutex::new(WakeState::default()),
            wake_cv: Condvar::new(),
            force_reload: AtomicBool::new(false),
        }
    }

    /// Apply a task to the snapshot and queue it, atomically with respect
    /// to the worker's publish step and to project switch requests.
    fn submit(&self, mut task: Task<O>) {
        {
            let mut queue = self.queue.lock();
            task.epoch = self.state.lock().epoch;

            let mut snapshot = self.snapshot.write();
            let next = Arc::make_mut(&mut *snapshot);
            if next.apply(&task) {
                next.revision += 1;
            }
            debug!(
                object_type = %task.object_type,
                id = %task.id,
                kind = task.label(),
                revision = next.revision,
                "queued task"
            );
            queue.push(task);
        }
        self.wake();
    }

    /// Ask the worker to move to `project`. Holding the queue lock splits
    /// the queue cleanly: tasks submitted before the request carry the old
    /// epoch, tasks submitted after it the new one.
    fn request_project(&self, project: Option<ProjectBinding>) {
        let changed = {
            let _queue = self.queue.lock();
            self.state.lock().request(project)
        };
        if changed {
            self.wake();
        }
    }

    fn current_snapshot(&self) -> Arc<Snapshot<O>> {
        self.snapshot.read().clone()
    }

    fn revision(&self) -> u64 {
        self.snapshot.read().revision
    }

    fn wake(&self) {
        let mut wake = self.wake.lock();
        wake.pending = true;
        self.wake_cv.notify_one();
    }

    fn stop(&self) {
        let mut wake = self.wake.lock();
        wake.stopped = true;
        self.wake_cv.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.wake.lock().stopped
    }

    /// Sleep until woken, stopped or `timeout` elapses. Returns `false` once
    /// stopped.
    fn wait(&self, timeout: std::time::Duration) -> bool {
        let mut wake = self.wake.lock();
        if !wake.pending && !wake.stopped {
            self.wake_cv.wait_for(&mut wake, timeout);
        }
        wake.pending = false;
        !wake.stopped
    }
}

/// Handle of a registered object model.
///
/// Produced only by [`Registry::register`](crate::Registry::register) and
/// consumed by [`shutdown`](ObjectModel::shutdown). `ObjectModel` is `Sync`:
/// share it by reference (or behind an `Arc`) between foreground threads.
pub struct ObjectModel<O: ModelObject> {
    shared: Arc<Shared<O>>,
    notifier: Arc<ChangeNotifier>,
    worker: Option<JoinHandle<WorkerStats>>,
    notify_thread: Option<NotifierThread>,
}

impl<O: ModelObject> ObjectModel<O> {
    pub(crate) fn start(sources: Sources<O>, config: ModelConfig) -> Result<Self, RegistryError> {
        let shared = Arc::new(Shared::new(sources));
        let notifier = Arc::new(ChangeNotifier::new(shared.revision()));

        let worker = SyncWorker::new(Arc::clone(&shared), config.clone());
        let worker = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| RegistryError::Spawn(format!("{}: {}", config.worker_name, e)))?;

        let revision_source = Arc::clone(&shared);
        let notify_name = format!("{}-notify", config.worker_name);
        let notify_thread = match NotifierThread::spawn(
            notify_name.clone(),
            Arc::clone(&notifier),
            config.notify_interval(),
            move || revision_source.revision(),
        ) {
            Ok(notify_thread) => notify_thread,
            Err(e) => {
                shared.stop();
                let _ = worker.join();
                return Err(RegistryError::Spawn(format!("{}: {}", notify_name, e)));
            }
        };

        info!(
            sources = shared.sources.len(),
            types = shared.sources.types().len(),
            "object model registered"
        );

        Ok(Self {
            shared,
            notifier,
            worker: Some(worker),
            notify_thread: Some(notify_thread),
        })
    }

    fn source_for(&self, object_type: &ObjectType) -> Result<&Source<O>, ModelError> {
        self.shared
            .sources
            .for_type(object_type)
            .ok_or_else(|| ModelError::UnknownType(object_type.clone()))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a new object and return the id its store allocated for it.
    ///
    /// Only the id allocation reaches the store synchronously; the write
    /// itself is queued.
    pub fn add(&self, object: O) -> Result<ObjectId, ModelError> {
        let object_type = object.object_type();
        let source = self.source_for(&object_type)?;
        let id = source.store.generate_id(&object);
        self.shared.submit(Task::add(object_type, id.clone(), object));
        Ok(id)
    }

    /// Replace the object `id` of `object`'s type.
    pub fn modify(&self, id: &str, object: O) -> Result<(), ModelError> {
        let object_type = object.object_type();
        self.source_for(&object_type)?;
        self.shared.submit(Task::modify(object_type, id.to_string(), object));
        Ok(())
    }

    /// Remove an object.
    pub fn remove(&self, object_type: &ObjectType, id: &str) -> Result<(), ModelError> {
        self.source_for(object_type)?;
        self.shared.submit(Task::remove(object_type.clone(), id.to_string()));
        Ok(())
    }

    /// Upsert (`Some`) or remove (`None`) an object regardless of whether it
    /// exists.
    pub fn set(&self, object_type: &ObjectType, id: &str, object: Option<O>) -> Result<(), ModelError> {
        self.source_for(object_type)?;
        if let Some(object) = &object {
            let actual = object.object_type();
            if &actual != object_type {
                return Err(ModelError::TypeMismatch {
                    expected: object_type.clone(),
                    actual,
                });
            }
        }
        self.shared.submit(Task::set(object_type.clone(), id.to_string(), object));
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// A copy of one object, `None` for an unknown type or id.
    pub fn get(&self, object_type: &ObjectType, id: &str) -> Option<O> {
        let snapshot = self.shared.current_snapshot();
        snapshot
            .type_map(object_type)
            .and_then(|objects| objects.get(id))
            .cloned()
    }

    /// A copy of every object of one type, empty for an unknown type.
    pub fn get_all(&self, object_type: &ObjectType) -> HashMap<ObjectId, O> {
        let snapshot = self.shared.current_snapshot();
        snapshot
            .type_map(object_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Every `(type, id)` pair in the snapshot, sorted.
    pub fn get_ids(&self) -> Vec<(ObjectType, ObjectId)> {
        let snapshot = self.shared.current_snapshot();
        let mut ids: Vec<(ObjectType, ObjectId)> = snapshot
            .types
            .iter()
            .flat_map(|(object_type, objects)| {
                objects.keys().map(move |id| (object_type.clone(), id.clone()))
            })
            .collect();
        ids.sort();
        ids
    }

    /// Revision of the current snapshot. Advances whenever content changes.
    pub fn get_revision(&self) -> u64 {
        self.shared.revision()
    }

    pub fn contains(&self, object_type: &ObjectType, id: &str) -> bool {
        self.shared
            .current_snapshot()
            .type_map(object_type)
            .is_some_and(|objects| objects.contains_key(id))
    }

    /// Number of objects of one type.
    pub fn len(&self, object_type: &ObjectType) -> usize {
        self.shared
            .current_snapshot()
            .type_map(object_type)
            .map_or(0, |objects| objects.len())
    }

    /// Every registered type, sorted.
    pub fn types(&self) -> Vec<ObjectType> {
        self.shared.sources.types()
    }

    // ========================================================================
    // Project binding
    // ========================================================================

    /// Request a switch to another project. Takes effect on the worker's
    /// next cycle; until then reads keep returning the old project's content.
    ///
    /// Writes made before this call still go to the old project. Writes made
    /// after it wait for the new one.
    pub fn set_project(&self, project: ProjectBinding) {
        info!(project = %project, "project switch requested");
        self.shared.request_project(Some(project));
    }

    /// Request unbinding from any project. The snapshot empties once the
    /// worker adopts it.
    pub fn clear_project(&self) {
        info!("project unbind requested");
        self.shared.request_project(None);
    }

    /// The binding the worker is currently operating on.
    pub fn project(&self) -> Option<ProjectBinding> {
        self.shared.state.lock().current.clone()
    }

    /// Force the next cycle to reload every connected store, ignoring
    /// unchanged mod counts.
    pub fn refresh(&self) {
        self.shared.force_reload.store(true, Ordering::SeqCst);
        self.shared.wake();
    }

    /// Whether the store serving `object_type` is connected to the current
    /// project.
    pub fn is_connected(&self, object_type: &ObjectType) -> bool {
        self.shared
            .sources
            .for_type(object_type)
            .is_some_and(|source| source.is_connected())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Receive a [`ModelChanged`] after snapshots were republished, at most
    /// one per notify interval. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<ModelChanged> {
        self.notifier.subscribe()
    }

    /// Register a callback for [`ModelChanged`]. Callbacks run on emitter
    /// threads, not on the caller's.
    #[cfg(feature = "emitter")]
    pub fn on_changed<F>(&self, listener: F)
    where
        F: Fn(ModelChanged) + Send + Sync + 'static,
    {
        self.notifier.on_changed(listener);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop the worker and the notifier and wait for both. The worker
    /// finishes its in-flight store call first.
    pub fn shutdown(mut self) -> WorkerStats {
        self.shared.stop();
        if let Some(notify_thread) = self.notify_thread.take() {
            notify_thread.stop();
        }
        let stats = match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(stats) => stats,
                Err(_) => {
                    error!("sync worker panicked, its stats are lost");
                    WorkerStats::default()
                }
            },
            None => WorkerStats::default(),
        };
        info!(cycles = stats.cycles, "object model shut down");
        stats
    }
}

impl<O: ModelObject> Drop for ObjectModel<O> {
    fn drop(&mut self) {
        // Don't join on drop - let the threads finish naturally
        self.shared.stop();
    }
}
