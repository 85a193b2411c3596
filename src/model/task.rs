use crate::object::{ObjectId, ObjectType};

/// What a queued task does to its object.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TaskKind<O> {
    Add(O),
    Modify(O),
    Remove,
    /// Upsert (`Some`) or delete (`None`) regardless of prior existence,
    /// from `set`.
    AutomaticUpsert(Option<O>),
}

/// A mutation applied optimistically to the snapshot and not yet confirmed
/// by the owning store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Task<O> {
    pub object_type: ObjectType,
    pub id: ObjectId,
    pub kind: TaskKind<O>,
    /// Project epoch the task was submitted under. Only tasks of the adopted
    /// epoch are applied to the current binding.
    pub epoch: u64,
}

impl<O> Task<O> {
    fn new(object_type: ObjectType, id: ObjectId, kind: TaskKind<O>) -> Self {
        Self {
            object_type,
            id,
            kind,
            epoch: 0,
        }
    }

    pub fn add(object_type: ObjectType, id: ObjectId, object: O) -> Self {
        Self::new(object_type, id, TaskKind::Add(object))
    }

    pub fn modify(object_type: ObjectType, id: ObjectId, object: O) -> Self {
        Self::new(object_type, id, TaskKind::Modify(object))
    }

    pub fn remove(object_type: ObjectType, id: ObjectId) -> Self {
        Self::new(object_type, id, TaskKind::Remove)
    }

    pub fn set(object_type: ObjectType, id: ObjectId, object: Option<O>) -> Self {
        Self::new(object_type, id, TaskKind::AutomaticUpsert(object))
    }

    /// The object this task leaves behind, `None` for a removal.
    pub fn payload(&self) -> Option<&O> {
        match &self.kind {
            TaskKind::Add(object) | TaskKind::Modify(object) => Some(object),
            TaskKind::AutomaticUpsert(object) => object.as_ref(),
            TaskKind::Remove => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            TaskKind::Add(_) => "add",
            TaskKind::Modify(_) => "modify",
            TaskKind::Remove => "remove",
            TaskKind::AutomaticUpsert(_) => "set",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_without_payload_leaves_nothing_behind() {
        let task: Task<String> = Task::set("zone".into(), "z1".into(), None);
        assert_eq!(task.payload(), None);
        assert_eq!(task.label(), "set");

        let task = Task::set("zone".into(), "z1".into(), Some("x".to_string()));
        assert_eq!(task.payload().map(String::as_str), Some("x"));
    }
}
