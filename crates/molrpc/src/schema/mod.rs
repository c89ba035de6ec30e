//! Wire codec for the structural graph.
//!
//! Every entity has a hand-written field table (see `entities`): encoding
//! emits a JSON object with every encodable field, decoding validates each
//! field against its declared shape and reports the first failure with the
//! full path from the root of the payload, e.g.
//! `complexes[0].molecules[1].chains[0].residues[4].atoms[2].position`.
//!
//! Decoding a container materializes all of its children first and then
//! links them in one step, so callers never observe a half-linked graph.

mod entities;
mod fields;

use serde_json::Value;

pub use fields::{FieldPath, decode_value};

/// A wire value failed its codec's shape, type or required-field contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value at {path}: {reason}")]
pub struct ValidationError {
    pub path: FieldPath,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: FieldPath, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }
}

/// Which side of the bridge an encoding is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emit {
    /// Caller to service. Decode-only fields are left out.
    #[default]
    Outbound,
    /// Service to caller. Includes the decode-only fields the service owns.
    Authoritative,
}

impl Emit {
    pub fn is_authoritative(self) -> bool {
        self == Emit::Authoritative
    }
}

/// Paired encode/decode rule for one entity type.
pub trait Schema: Sized {
    /// Encodes every field meant for `emit`. Never fails on in-memory values.
    fn encode_as(&self, emit: Emit) -> Value;

    fn encode(&self) -> Value {
        self.encode_as(Emit::Outbound)
    }

    /// Decodes `value`, reporting failures relative to `path`.
    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError>;

    fn decode(value: &Value) -> Result<Self, ValidationError> {
        Self::decode_at(value, &FieldPath::root())
    }
}

/// Encodes an ordered list of entities as a JSON array.
pub fn encode_list<T: Schema>(items: &[T]) -> Value {
    encode_list_as(items, Emit::Outbound)
}

pub fn encode_list_as<T: Schema>(items: &[T], emit: Emit) -> Value {
    Value::Array(items.iter().map(|item| item.encode_as(emit)).collect())
}

/// Decodes a JSON array element by element, preserving order.
pub fn decode_list_at<T: Schema>(
    value: &Value,
    path: &FieldPath,
) -> Result<Vec<T>, ValidationError> {
    let items = value.as_array().ok_or_else(|| {
        ValidationError::new(path.clone(), format!("expected array, got {}", kind_of(value)))
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| T::decode_at(item, &path.item(i)))
        .collect()
}

pub fn decode_list<T: Schema>(value: &Value) -> Result<Vec<T>, ValidationError> {
    decode_list_at(value, &FieldPath::root())
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
