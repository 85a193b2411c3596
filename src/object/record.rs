//! Record - a schemaless object for applications without their own domain enum.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ModelObject, ObjectType};

/// A dynamic object: an [`ObjectType`] plus a JSON field map.
///
/// ## Example
///
/// ```
/// use survey_model::Record;
///
/// let zone = Record::new("zone").with("name", "north").with("depth", 12.5);
/// assert_eq!(zone.get_str("name"), Some("north"));
/// assert_eq!(zone.get_f64("depth"), Some(12.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub object_type: ObjectType,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(object_type: impl Into<ObjectType>) -> Self {
        Self {
            object_type: object_type.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }
}

impl ModelObject for Record {
    fn object_type(&self) -> ObjectType {
        self.object_type.clone()
    }
}
