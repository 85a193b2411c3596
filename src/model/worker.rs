//! Sync worker - the background reconciliation loop.
//!
//! Each cycle runs, in order:
//! 1. project switch: drain the tasks queued before the request against the
//!    old binding (no retry), disconnect everything, adopt the desired
//!    binding. Tasks queued after the request stay queued for it;
//! 2. connect every disconnected source;
//! 3. apply queued tasks: unreachable stores get their tasks back, rejected
//!    tasks are dropped;
//! 4. reload sources whose mod counts moved, publishing intermediate
//!    snapshots when a reload runs past its budget;
//! 5. publish backend data with still-queued tasks overlaid, if content
//!    changed. Merging happens outside the queue lock.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::snapshot::{apply_task, Snapshot, TypeMap};
use super::state::ProjectBinding;
use super::task::{Task, TaskKind};
use super::Shared;
use crate::config::ModelConfig;
use crate::object::{ModelObject, ObjectId, ObjectType};
use crate::registry::Source;
use crate::store::StoreError;

/// Merges attempted outside the queue lock before publishing under it.
const PUBLISH_ATTEMPTS: usize = 3;

/// Statistics from the sync worker, returned by `ObjectModel::shutdown`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    /// Reconciliation cycles completed.
    pub cycles: usize,
    /// Tasks accepted by their store.
    pub tasks_applied: usize,
    /// Tasks rejected by their store and discarded.
    pub tasks_rejected: usize,
    /// Tasks put back because their store was unreachable.
    pub tasks_requeued: usize,
    /// Tasks discarded unapplied on a project switch or at shutdown, including
    /// writes made for a project that was replaced before it was adopted.
    pub tasks_dropped: usize,
    /// Full reloads of a source.
    pub reloads: usize,
    /// Snapshots published (intermediate ones included).
    pub publishes: usize,
    /// Intermediate snapshots published by reloads over budget.
    pub partial_publishes: usize,
}

type TypeData<O> = HashMap<ObjectType, Arc<TypeMap<O>>>;

/// Last backend-confirmed content of one source.
struct SourceCache<O> {
    loaded: bool,
    mod_counts: HashMap<ObjectType, u32>,
    data: TypeData<O>,
    connect_failures: u32,
}

impl<O> SourceCache<O> {
    fn new() -> Self {
        Self {
            loaded: false,
            mod_counts: HashMap::new(),
            data: HashMap::new(),
            connect_failures: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Types whose published content must be rebuilt and compared.
#[derive(Debug, Default)]
struct Dirty {
    all: bool,
    types: HashSet<ObjectType>,
}

impl Dirty {
    fn with_types<'a>(&self, types: impl IntoIterator<Item = &'a ObjectType>) -> Self {
        let mut dirty = Dirty {
            all: self.all,
            types: self.types.clone(),
        };
        dirty.types.extend(types.into_iter().cloned());
        dirty
    }
}

enum Dispatch {
    Applied,
    Rejected(StoreError),
    Unreachable,
}

pub(crate) struct SyncWorker<O: ModelObject> {
    shared: Arc<Shared<O>>,
    config: ModelConfig,
    caches: Vec<SourceCache<O>>,
    stats: WorkerStats,
}

impl<O: ModelObject> SyncWorker<O> {
    pub fn new(shared: Arc<Shared<O>>, config: ModelConfig) -> Self {
        let caches = (0..shared.sources.len()).map(|_| SourceCache::new()).collect();
        Self {
            shared,
            config,
            caches,
            stats: WorkerStats::default(),
        }
    }

    pub fn run(mut self) -> WorkerStats {
        info!(sources = self.shared.sources.len(), "sync worker started");

        while !self.shared.is_stopped() {
            let disconnected = self.cycle();

            // Unreachable stores are retried after a longer pause rather
            // than on every wake.
            let timeout = if disconnected {
                self.config.reconnect_delay()
            } else {
                self.config.poll_interval()
            };
            if !self.shared.wait(timeout) {
                break;
            }
        }

        self.drain_on_exit();
        info!(
            cycles = self.stats.cycles,
            applied = self.stats.tasks_applied,
            rejected = self.stats.tasks_rejected,
            "sync worker stopped"
        );
        self.stats
    }

    /// One reconciliation cycle. Returns whether a bound project still has
    /// disconnected sources.
    fn cycle(&mut self) -> bool {
        self.stats.cycles += 1;

        let mut dirty = Dirty::default();
        if self.switch_project() {
            dirty.all = true;
        }

        let project = self.shared.state.lock().current.clone();
        if let Some(project) = &project {
            self.connect(project);
        }

        self.apply_tasks(&mut dirty);

        let force = self.shared.force_reload.swap(false, Ordering::SeqCst);
        self.reload(force, &mut dirty);

        self.publish(&dirty, None);

        project.is_some() && self.shared.sources.iter().any(|source| !source.is_connected())
    }

    // ========================================================================
    // Project switch & connection
    // ========================================================================

    /// Adopt a requested binding. Returns whether every type must be
    /// rebuilt.
    ///
    /// Tasks stamped with the adopted epoch were submitted before the request
    /// and are drained against the old binding. Tasks stamped with the
    /// requested epoch stay queued. Anything in between was meant for a
    /// binding replaced before it was adopted and is dropped.
    fn switch_project(&mut self) -> bool {
        let (epoch, current, desired, old, abandoned) = {
            let mut queue = self.shared.queue.lock();
            let state = self.shared.state.lock();
            if !state.switch_pending() {
                return false;
            }

            let mut old = Vec::new();
            let mut keep = Vec::new();
            let mut abandoned = 0;
            for task in mem::take(&mut *queue) {
                if task.epoch == state.adopted {
                    old.push(task);
                } else if task.epoch == state.epoch {
                    keep.push(task);
                } else {
                    abandoned += 1;
                }
            }
            *queue = keep;
            (state.epoch, state.current.clone(), state.desired.clone(), old, abandoned)
        };

        if abandoned > 0 {
            self.stats.tasks_dropped += abandoned;
            debug!(tasks = abandoned, "dropping tasks queued for a superseded project");
        }

        if desired == current {
            // Switched away and back before this cycle: nothing to reconnect.
            let mut queue = self.shared.queue.lock();
            let mut old = old;
            for task in &mut old {
                task.epoch = epoch;
            }
            old.append(&mut queue);
            *queue = old;
            self.shared.state.lock().adopt(epoch, desired);
            return abandoned > 0;
        }

        if !old.is_empty() {
            debug!(tasks = old.len(), "draining queue before project switch");
        }
        self.drain(old);

        self.shared.sources.disconnect_all();
        for cache in &mut self.caches {
            cache.reset();
        }

        info!(
            from = ?current.as_ref().map(ToString::to_string),
            to = ?desired.as_ref().map(ToString::to_string),
            "switching project"
        );
        self.shared.state.lock().adopt(epoch, desired);
        true
    }

    fn connect(&mut self, project: &ProjectBinding) {
        for (index, source) in self.shared.sources.iter().enumerate() {
            if source.is_connected() {
                continue;
            }

            let cache = &mut self.caches[index];
            match source.store.connect(project) {
                Ok(()) => {
                    source.set_connected(true);
                    cache.loaded = false;
                    info!(
                        source = index,
                        project = %project,
                        attempts = cache.connect_failures + 1,
                        "store connected"
                    );
                    cache.connect_failures = 0;
                }
                Err(e) => {
                    cache.connect_failures += 1;
                    if cache.connect_failures == 1 {
                        warn!(source = index, project = %project, error = %e, "store connect failed, will retry");
                    } else {
                        debug!(source = index, attempts = cache.connect_failures, error = %e, "store connect failed");
                    }
                }
            }
        }
    }

    // ========================================================================
    // Task application
    // ========================================================================

    fn apply_tasks(&mut self, dirty: &mut Dirty) {
        let tasks = mem::take(&mut *self.shared.queue.lock());
        if tasks.is_empty() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let adopted = shared.state.lock().adopted;
        let mut requeue = Vec::new();
        let mut waiting = 0;

        for task in tasks {
            // Submitted after a switch request made during this cycle.
            if task.epoch != adopted {
                requeue.push(task);
                continue;
            }
            let Some(source) = shared.sources.for_type(&task.object_type) else {
                continue;
            };
            if !source.is_connected() {
                waiting += 1;
                requeue.push(task);
                continue;
            }

            match dispatch(source, &task) {
                Dispatch::Applied => {
                    self.stats.tasks_applied += 1;
                    debug!(object_type = %task.object_type, id = %task.id, kind = task.label(), "task applied");
                }
                Dispatch::Rejected(e) => {
                    // Not retried: the optimistic value is rolled back on publish.
                    self.stats.tasks_rejected += 1;
                    warn!(
                        object_type = %task.object_type,
                        id = %task.id,
                        kind = task.label(),
                        error = %e,
                        "store rejected task"
                    );
                    dirty.types.insert(task.object_type.clone());
                }
                Dispatch::Unreachable => {
                    source.set_connected(false);
                    warn!(object_type = %task.object_type, "store lost its connection");
                    waiting += 1;
                    requeue.push(task);
                }
            }
        }

        if !requeue.is_empty() {
            self.stats.tasks_requeued += waiting;
            let mut queue = self.shared.queue.lock();
            // Keep the original order ahead of anything queued meanwhile.
            requeue.append(&mut queue);
            *queue = requeue;
        }
    }

    /// Best-effort application of tasks with no retry.
    fn drain(&mut self, tasks: Vec<Task<O>>) {
        let shared = Arc::clone(&self.shared);
        for task in tasks {
            let connected = shared
                .sources
                .for_type(&task.object_type)
                .filter(|source| source.is_connected());

            let outcome = match connected {
                Some(source) => dispatch(source, &task),
                None => Dispatch::Unreachable,
            };

            match outcome {
                Dispatch::Applied => self.stats.tasks_applied += 1,
                Dispatch::Rejected(e) => {
                    self.stats.tasks_rejected += 1;
                    warn!(object_type = %task.object_type, id = %task.id, error = %e, "store rejected task");
                }
                Dispatch::Unreachable => {
                    self.stats.tasks_dropped += 1;
                    debug!(object_type = %task.object_type, id = %task.id, "dropping task, store not connected");
                }
            }
        }
    }

    /// Drain what was queued for the current binding. Tasks waiting for a
    /// switch that never happened are dropped.
    fn drain_on_exit(&mut self) {
        let adopted = self.shared.state.lock().adopted;
        let (tasks, pending): (Vec<_>, Vec<_>) = mem::take(&mut *self.shared.queue.lock())
            .into_iter()
            .partition(|task| task.epoch == adopted);

        if !pending.is_empty() {
            self.stats.tasks_dropped += pending.len();
            debug!(tasks = pending.len(), "dropping tasks queued for a project never adopted");
        }
        if !tasks.is_empty() {
            info!(tasks = tasks.len(), "draining queue before exit");
            self.drain(tasks);
        }
    }

    // ========================================================================
    // Reload
    // ========================================================================

    fn reload(&mut self, force: bool, dirty: &mut Dirty) {
        let shared = Arc::clone(&self.shared);

        for (index, source) in shared.sources.iter().enumerate() {
            if !source.is_connected() {
                continue;
            }

            let mod_counts = match read_mod_counts(source) {
                Ok(mod_counts) => mod_counts,
                Err(e) => {
                    self.read_failed(index, source, "mod count", e);
                    continue;
                }
            };

            let cache = &self.caches[index];
            if cache.loaded && !force && cache.mod_counts == mod_counts {
                continue;
            }

            match self.load_source(index, source, dirty) {
                Ok(data) => {
                    let cache = &mut self.caches[index];
                    cache.data = data;
                    cache.mod_counts = mod_counts;
                    cache.loaded = true;
                    dirty.types.extend(source.types.iter().cloned());
                    self.stats.reloads += 1;
                    debug!(source = index, "source reloaded");
                }
                Err(e) => self.read_failed(index, source, "reload", e),
            }
        }
    }

    /// Fetch every object of a source. Publishes an intermediate snapshot each
    /// time the reload budget runs out.
    fn load_source(
        &mut self,
        index: usize,
        source: &Source<O>,
        dirty: &Dirty,
    ) -> Result<TypeData<O>, StoreError> {
        let budget = self.config.reload_budget();
        let mut deadline = Instant::now() + budget;

        let ids = source.store.list_ids()?;
        let mut fresh: HashMap<ObjectType, TypeMap<O>> = source
            .types
            .iter()
            .map(|object_type| (object_type.clone(), TypeMap::new()))
            .collect();

        for (position, (object_type, id)) in ids.iter().enumerate() {
            let Some(objects) = fresh.get_mut(object_type) else {
                continue;
            };
            // A listed id that is gone by now is simply absent.
            if let Some(object) = source.store.get(object_type, id)? {
                objects.insert(id.clone(), object);
            }

            let remaining = &ids[position + 1..];
            if !remaining.is_empty() && Instant::now() >= deadline {
                let partial = self.partial_data(index, &fresh, remaining, dirty.all);
                let dirty = dirty.with_types(&source.types);
                if self.publish(&dirty, Some((index, &partial))) {
                    self.stats.partial_publishes += 1;
                }
                debug!(source = index, fetched = position + 1, total = ids.len(), "published partial reload");
                deadline = Instant::now() + budget;
            }
        }

        Ok(fresh
            .into_iter()
            .map(|(object_type, objects)| (object_type, Arc::new(objects)))
            .collect())
    }

    /// Objects fetched so far plus the published values of ids not fetched
    /// yet. Right after a project switch the published values belong to the
    /// old project, so only the (reset) cache is used.
    fn partial_data(
        &self,
        index: usize,
        fresh: &HashMap<ObjectType, TypeMap<O>>,
        remaining: &[(ObjectType, ObjectId)],
        switched: bool,
    ) -> TypeData<O> {
        let known = if switched {
            self.caches[index].data.clone()
        } else {
            self.shared.current_snapshot().types.clone()
        };
        let mut partial: HashMap<ObjectType, TypeMap<O>> = fresh.clone();

        for (object_type, id) in remaining {
            let Some(objects) = partial.get_mut(object_type) else {
                continue;
            };
            if let Some(object) = known.get(object_type).and_then(|known| known.get(id)) {
                objects.insert(id.clone(), object.clone());
            }
        }

        partial
            .into_iter()
            .map(|(object_type, objects)| (object_type, Arc::new(objects)))
            .collect()
    }

    fn read_failed(&self, index: usize, source: &Source<O>, what: &str, error: StoreError) {
        if error == StoreError::NotConnected {
            source.set_connected(false);
            warn!(source = index, "store lost its connection, keeping previous data");
        } else {
            warn!(source = index, error = %error, "store {} failed, keeping previous data", what);
        }
    }

    // ========================================================================
    // Publish
    // ========================================================================

    /// Rebuild dirty types from backend data, overlay still-queued tasks and
    /// replace the snapshot if anything differs. Returns whether it did.
    ///
    /// `partial` substitutes in-progress data for one source. The merge runs
    /// on a copy of the queue; it is installed only if no task was submitted
    /// meanwhile, otherwise merged again.
    fn publish(&mut self, dirty: &Dirty, partial: Option<(usize, &TypeData<O>)>) -> bool {
        let shared = Arc::clone(&self.shared);

        for _ in 0..PUBLISH_ATTEMPTS {
            let (current, tasks) = {
                let queue = shared.queue.lock();
                (shared.current_snapshot(), queue.clone())
            };
            let merged = self.merge(dirty, partial, &current, &tasks);

            let queue = shared.queue.lock();
            if queue.len() == tasks.len() && Arc::ptr_eq(&shared.current_snapshot(), &current) {
                return match merged {
                    Some(types) => {
                        self.install(types, &current);
                        true
                    }
                    None => false,
                };
            }
            debug!("tasks submitted during publish, merging again");
        }

        // Foreground writes keep winning: merge under the lock.
        let queue = shared.queue.lock();
        let current = shared.current_snapshot();
        match self.merge(dirty, partial, &current, &queue) {
            Some(types) => {
                self.install(types, &current);
                true
            }
            None => false,
        }
    }

    /// Backend data for the types to rebuild with `tasks` overlaid. `None`
    /// when the result equals `current`.
    fn merge(
        &self,
        dirty: &Dirty,
        partial: Option<(usize, &TypeData<O>)>,
        current: &Snapshot<O>,
        tasks: &[Task<O>],
    ) -> Option<TypeData<O>> {
        let rebuild: HashSet<ObjectType> = if dirty.all {
            self.shared.sources.types().into_iter().collect()
        } else {
            dirty
                .types
                .iter()
                .cloned()
                .chain(tasks.iter().map(|task| task.object_type.clone()))
                .collect()
        };
        if rebuild.is_empty() {
            return None;
        }

        let mut types = current.types.clone();
        for object_type in &rebuild {
            let Some(index) = self.shared.sources.index_of(object_type) else {
                continue;
            };
            let data = match partial {
                Some((partial_index, data)) if partial_index == index => data,
                _ => &self.caches[index].data,
            };
            types.insert(
                object_type.clone(),
                data.get(object_type).cloned().unwrap_or_default(),
            );
        }

        for task in tasks {
            apply_task(&mut types, task);
        }

        let changed = rebuild
            .iter()
            .any(|object_type| types.get(object_type) != current.types.get(object_type));
        changed.then_some(types)
    }

    /// Replace the snapshot. Called with the queue lock held.
    fn install(&mut self, types: TypeData<O>, current: &Snapshot<O>) {
        let revision = current.revision + 1;
        *self.shared.snapshot.write() = Arc::new(Snapshot { types, revision });
        self.stats.publishes += 1;
        debug!(revision, "published snapshot");
    }
}

fn read_mod_counts<O: ModelObject>(source: &Source<O>) -> Result<HashMap<ObjectType, u32>, StoreError> {
    let mut mod_counts = HashMap::with_capacity(source.types.len());
    for object_type in &source.types {
        mod_counts.insert(object_type.clone(), source.store.mod_count(object_type)?);
    }
    Ok(mod_counts)
}

fn dispatch<O: ModelObject>(source: &Source<O>, task: &Task<O>) -> Dispatch {
    let store = &source.store;
    let result = match &task.kind {
        TaskKind::Add(object) => store.add(&task.id, object),
        TaskKind::Modify(object) => store.modify(&task.id, object),
        TaskKind::Remove => store.remove(&task.object_type, &task.id),
        TaskKind::AutomaticUpsert(object) => store.set(&task.object_type, &task.id, object.as_ref()),
    };

    match result {
        Ok(()) => Dispatch::Applied,
        Err(StoreError::NotConnected) => Dispatch::Unreachable,
        Err(e) => Dispatch::Rejected(e),
    }
}
