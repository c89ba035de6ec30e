use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{Schema, ValidationError, decode_list_at, kind_of};

/// Location of a value inside a decoded payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of a named argument or top-level value, e.g. `args[1]`.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn item(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Decodes a scalar or plain-data value with serde, tagging errors with `path`.
pub fn decode_value<T: DeserializeOwned>(
    value: &Value,
    path: &FieldPath,
) -> Result<T, ValidationError> {
    T::deserialize(value).map_err(|e| ValidationError::new(path.clone(), e.to_string()))
}

/// Field-by-field access to one JSON object during decoding.
///
/// Absent and `null` optional fields leave the target untouched so the
/// entity keeps its default. Unknown keys are ignored.
pub(crate) struct ObjectReader<'a> {
    map: &'a Map<String, Value>,
    path: &'a FieldPath,
}

impl<'a> ObjectReader<'a> {
    pub fn new(value: &'a Value, path: &'a FieldPath) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self { map, path }),
            other => Err(ValidationError::new(
                path.clone(),
                format!("expected object, got {}", kind_of(other)),
            )),
        }
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T, ValidationError> {
        let path = self.path.field(name);
        match self.present(name) {
            Some(value) => decode_value(value, &path),
            None => Err(ValidationError::new(path, "missing required field")),
        }
    }

    pub fn optional<T: DeserializeOwned>(
        &self,
        name: &str,
        target: &mut T,
    ) -> Result<(), ValidationError> {
        if let Some(value) = self.present(name) {
            *target = decode_value(value, &self.path.field(name))?;
        }
        Ok(())
    }

    /// Nested entity list; absent means no children.
    pub fn children<T: Schema>(&self, name: &str) -> Result<Vec<T>, ValidationError> {
        match self.present(name) {
            Some(value) => decode_list_at(value, &self.path.field(name)),
            None => Ok(Vec::new()),
        }
    }
}

/// Builds the JSON object for one entity in field-table order.
pub(crate) struct ObjectWriter(Map<String, Value>);

impl ObjectWriter {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn field_when(self, emit: bool, name: &str, value: impl Into<Value>) -> Self {
        if emit { self.field(name, value) } else { self }
    }

    pub fn finish(self) -> Value {
        Value::Object(self.0)
    }
}
