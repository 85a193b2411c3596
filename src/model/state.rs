use std::fmt;

use serde::{Deserialize, Serialize};

/// The `(backend, project)` pair stores connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectBinding {
    /// Backend locator, e.g. a database URI.
    pub backend: String,
    /// Project name within that backend.
    pub project: String,
}

impl ProjectBinding {
    pub fn new(backend: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for ProjectBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.backend, self.project)
    }
}

/// Desired vs. current binding. A switch requested by `set_project` is only
/// visible in `desired` until the sync worker adopts it.
///
/// Every request that changes `desired` starts a new epoch. Tasks are stamped
/// with the epoch they were submitted under, so the worker can tell writes
/// meant for the old binding from writes made after the request.
#[derive(Debug, Default, Clone)]
pub(crate) struct ModelState {
    pub desired: Option<ProjectBinding>,
    pub current: Option<ProjectBinding>,
    /// Epoch of `desired`.
    pub epoch: u64,
    /// Epoch of `current`.
    pub adopted: u64,
}

impl ModelState {
    pub fn switch_pending(&self) -> bool {
        self.epoch != self.adopted
    }

    /// Record a new desired binding. Returns `false` when it is already the
    /// desired one.
    pub fn request(&mut self, project: Option<ProjectBinding>) -> bool {
        if self.desired == project {
            return false;
        }
        self.desired = project;
        self.epoch += 1;
        true
    }

    /// The worker took over `project`, the binding desired as of `epoch`.
    /// A request made since stays pending.
    pub fn adopt(&mut self, epoch: u64, project: Option<ProjectBinding>) {
        self.current = project;
        self.adopted = epoch;
    }
}
