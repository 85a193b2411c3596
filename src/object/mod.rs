//! Object identity - the discriminators and payload contract the engine caches.
//!
//! Ids are only unique within one [`ObjectType`]: a zone `"A"` and a track
//! `"A"` are different objects.

mod record;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use record::Record;

/// Identifier of an object, unique within its [`ObjectType`].
pub type ObjectId = String;

/// Discriminator for a class of domain object (survey plan, track, zone, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectType(String);

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectType {
    fn from(name: &str) -> Self {
        ObjectType(name.to_string())
    }
}

impl From<String> for ObjectType {
    fn from(name: String) -> Self {
        ObjectType(name)
    }
}

impl AsRef<str> for ObjectType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trait for payloads the object model can cache.
///
/// `Clone` is the deep copy handed to readers and `PartialEq` the content
/// equality used to decide whether a new snapshot is worth publishing.
/// Usually derived:
///
/// ```ignore
/// #[derive(Clone, PartialEq, ModelObject)]
/// #[model(object_type = "zone")]
/// struct Zone { name: String }
/// ```
pub trait ModelObject: Clone + PartialEq + Send + Sync + 'static {
    /// The type this object is filed under.
    fn object_type(&self) -> ObjectType;
}
