//! Static operation registry.
//!
//! The single source of truth for what may cross the bridge: each allowed
//! operation name maps to an ordered list of parameter codecs and an optional
//! result codec. Names missing from the registry are not callable remotely,
//! whatever the collaborator exposes locally.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{
    Emit, FieldPath, Schema, ValidationError, decode_list_at, decode_value, encode_list_as,
};
use crate::streams::StreamInfo;
use crate::structure::{Complex, Workspace};

/// Names of the stock operations.
pub mod ops {
    pub const REQUEST_WORKSPACE: &str = "request_workspace";
    pub const UPDATE_WORKSPACE: &str = "update_workspace";
    pub const REQUEST_COMPLEX_LIST: &str = "request_complex_list";
    pub const REQUEST_COMPLEXES: &str = "request_complexes";
    pub const UPDATE_STRUCTURES_SHALLOW: &str = "update_structures_shallow";
    pub const UPDATE_STRUCTURES_DEEP: &str = "update_structures_deep";
    pub const ADD_TO_WORKSPACE: &str = "add_to_workspace";
    pub const REMOVE_FROM_WORKSPACE: &str = "remove_from_workspace";
    pub const ZOOM_ON_STRUCTURES: &str = "zoom_on_structures";
    pub const CENTER_ON_STRUCTURES: &str = "center_on_structures";
    pub const SEND_NOTIFICATION: &str = "send_notification";
    pub const CREATE_WRITING_STREAM: &str = "create_writing_stream";
    pub const STREAM_UPDATE: &str = "stream_update";
    pub const STREAM_DESTROY: &str = "stream_destroy";
    pub const UPLOAD_SHAPES: &str = "upload_shapes";
    pub const GET_PLUGIN_DATA: &str = "get_plugin_data";
}

/// Session metadata returned by `get_plugin_data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginData {
    pub plugin_id: i64,
    pub session_id: i64,
    #[serde(default)]
    pub version_table: BTreeMap<String, i64>,
}

/// Encode/decode rule for one parameter or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Int,
    IntList,
    FloatList,
    Str,
    Workspace,
    Complexes,
    Stream,
    PluginData,
    /// Opaque JSON passed through unchanged.
    Json,
}

impl Codec {
    pub fn decode_at(self, value: &Value, path: &FieldPath) -> Result<Payload, ValidationError> {
        Ok(match self {
            Codec::Int => Payload::Int(decode_value(value, path)?),
            Codec::IntList => Payload::IntList(decode_value(value, path)?),
            Codec::FloatList => Payload::FloatList(decode_value(value, path)?),
            Codec::Str => Payload::Str(decode_value(value, path)?),
            Codec::Workspace => Payload::Workspace(Workspace::decode_at(value, path)?),
            Codec::Complexes => Payload::Complexes(decode_list_at(value, path)?),
            Codec::Stream => Payload::Stream(decode_value(value, path)?),
            Codec::PluginData => Payload::PluginData(decode_value(value, path)?),
            Codec::Json => Payload::Json(value.clone()),
        })
    }

    pub fn accepts(self, payload: &Payload) -> bool {
        payload.codec() == Some(self)
    }
}

/// A typed value crossing the bridge.
#[derive(Debug)]
pub enum Payload {
    /// No value; the result of operations without a result codec.
    Null,
    Int(i64),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    Str(String),
    Workspace(Workspace),
    Complexes(Vec<Complex>),
    Stream(StreamInfo),
    PluginData(PluginData),
    Json(Value),
}

impl Payload {
    pub fn codec(&self) -> Option<Codec> {
        Some(match self {
            Payload::Null => return None,
            Payload::Int(_) => Codec::Int,
            Payload::IntList(_) => Codec::IntList,
            Payload::FloatList(_) => Codec::FloatList,
            Payload::Str(_) => Codec::Str,
            Payload::Workspace(_) => Codec::Workspace,
            Payload::Complexes(_) => Codec::Complexes,
            Payload::Stream(_) => Codec::Stream,
            Payload::PluginData(_) => Codec::PluginData,
            Payload::Json(_) => Codec::Json,
        })
    }

    pub fn encode(&self) -> Value {
        self.encode_as(Emit::Outbound)
    }

    pub fn encode_as(&self, emit: Emit) -> Value {
        match self {
            Payload::Null => Value::Null,
            Payload::Int(v) => Value::from(*v),
            Payload::IntList(v) => Value::from(v.clone()),
            Payload::FloatList(v) => Value::from(v.clone()),
            Payload::Str(v) => Value::from(v.as_str()),
            Payload::Workspace(ws) => ws.encode_as(emit),
            Payload::Complexes(list) => encode_list_as(list, emit),
            Payload::Stream(info) => to_json(info),
            Payload::PluginData(data) => to_json(data),
            Payload::Json(v) => v.clone(),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Payload::Null => "null",
            Payload::Int(_) => "int",
            Payload::IntList(_) => "int list",
            Payload::FloatList(_) => "float list",
            Payload::Str(_) => "string",
            Payload::Workspace(_) => "workspace",
            Payload::Complexes(_) => "complex list",
            Payload::Stream(_) => "stream",
            Payload::PluginData(_) => "plugin data",
            Payload::Json(_) => "json",
        }
    }

    pub fn into_int(self) -> Option<i64> {
        match self {
            Payload::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_int_list(self) -> Option<Vec<i64>> {
        match self {
            Payload::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_float_list(self) -> Option<Vec<f64>> {
        match self {
            Payload::FloatList(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_str(self) -> Option<String> {
        match self {
            Payload::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_workspace(self) -> Option<Workspace> {
        match self {
            Payload::Workspace(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_complexes(self) -> Option<Vec<Complex>> {
        match self {
            Payload::Complexes(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_stream(self) -> Option<StreamInfo> {
        match self {
            Payload::Stream(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_plugin_data(self) -> Option<PluginData> {
        match self {
            Payload::PluginData(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Plain-data payloads have string keys only and always serialize.
fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize payload");
        Value::Null
    })
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Int(v)
    }
}

impl From<Vec<i64>> for Payload {
    fn from(v: Vec<i64>) -> Self {
        Payload::IntList(v)
    }
}

impl From<Vec<f64>> for Payload {
    fn from(v: Vec<f64>) -> Self {
        Payload::FloatList(v)
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Str(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Str(v.to_string())
    }
}

impl From<Workspace> for Payload {
    fn from(v: Workspace) -> Self {
        Payload::Workspace(v)
    }
}

impl From<Vec<Complex>> for Payload {
    fn from(v: Vec<Complex>) -> Self {
        Payload::Complexes(v)
    }
}

impl From<StreamInfo> for Payload {
    fn from(v: StreamInfo) -> Self {
        Payload::Stream(v)
    }
}

impl From<PluginData> for Payload {
    fn from(v: PluginData) -> Self {
        Payload::PluginData(v)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

/// Calling convention of one remotely callable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: String,
    pub params: Vec<Codec>,
    /// `None` means the operation returns no payload.
    pub result: Option<Codec>,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>, params: &[Codec], result: Option<Codec>) -> Self {
        Self {
            name: name.into(),
            params: params.to_vec(),
            result,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Lookup table from operation name to its [`OperationSpec`].
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: HashMap<String, OperationSpec>,
}

impl OperationRegistry {
    pub fn empty() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// The stock table shared by the default client and dispatcher.
    pub fn standard() -> Self {
        use Codec as C;
        [
            OperationSpec::new(ops::REQUEST_WORKSPACE, &[], Some(C::Workspace)),
            OperationSpec::new(ops::UPDATE_WORKSPACE, &[C::Workspace], None),
            OperationSpec::new(ops::REQUEST_COMPLEX_LIST, &[], Some(C::Complexes)),
            OperationSpec::new(ops::REQUEST_COMPLEXES, &[C::IntList], Some(C::Complexes)),
            OperationSpec::new(ops::UPDATE_STRUCTURES_SHALLOW, &[C::Complexes], None),
            OperationSpec::new(ops::UPDATE_STRUCTURES_DEEP, &[C::Complexes], None),
            OperationSpec::new(ops::ADD_TO_WORKSPACE, &[C::Complexes], Some(C::Complexes)),
            OperationSpec::new(ops::REMOVE_FROM_WORKSPACE, &[C::Complexes], None),
            OperationSpec::new(ops::ZOOM_ON_STRUCTURES, &[C::IntList], None),
            OperationSpec::new(ops::CENTER_ON_STRUCTURES, &[C::IntList], None),
            OperationSpec::new(ops::SEND_NOTIFICATION, &[C::Int, C::Str], None),
            OperationSpec::new(ops::CREATE_WRITING_STREAM, &[C::IntList, C::Int], Some(C::Stream)),
            OperationSpec::new(ops::STREAM_UPDATE, &[C::Int, C::FloatList], None),
            OperationSpec::new(ops::STREAM_DESTROY, &[C::Int], None),
            OperationSpec::new(ops::UPLOAD_SHAPES, &[C::Json], Some(C::Json)),
            OperationSpec::new(ops::GET_PLUGIN_DATA, &[], Some(C::PluginData)),
        ]
        .into_iter()
        .fold(Self::empty(), Self::with)
    }

    /// Adds or replaces `spec`, builder style.
    pub fn with(mut self, spec: OperationSpec) -> Self {
        self.register(spec);
        self
    }

    /// Adds or replaces `spec`, returning the previous entry of that name.
    pub fn register(&mut self, spec: OperationSpec) -> Option<OperationSpec> {
        self.operations.insert(spec.name.clone(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_table_lists_every_stock_operation() {
        let registry = OperationRegistry::standard();
        insta::assert_json_snapshot!(registry.names(), @r#"
        [
          "add_to_workspace",
          "center_on_structures",
          "create_writing_stream",
          "get_plugin_data",
          "remove_from_workspace",
          "request_complex_list",
          "request_complexes",
          "request_workspace",
          "send_notification",
          "stream_destroy",
          "stream_update",
          "update_structures_deep",
          "update_structures_shallow",
          "update_workspace",
          "upload_shapes",
          "zoom_on_structures"
        ]
        "#);
    }

    #[test]
    fn stream_operations_have_expected_shapes() {
        let registry = OperationRegistry::standard();
        let create = registry.get(ops::CREATE_WRITING_STREAM).unwrap();
        assert_eq!(create.params, vec![Codec::IntList, Codec::Int]);
        assert_eq!(create.result, Some(Codec::Stream));
        assert_eq!(registry.get(ops::STREAM_DESTROY).unwrap().result, None);
        assert!(!registry.contains("open_url"));
    }

    #[test]
    fn custom_registry_overrides_entries() {
        let mut registry = OperationRegistry::standard();
        let prev =
            registry.register(OperationSpec::new(ops::ZOOM_ON_STRUCTURES, &[Codec::Int], None));
        assert!(prev.is_some());
        assert_eq!(registry.get(ops::ZOOM_ON_STRUCTURES).unwrap().arity(), 1);

        let tiny =
            OperationRegistry::empty().with(OperationSpec::new("ping", &[], Some(Codec::Str)));
        assert_eq!(tiny.len(), 1);
        assert!(tiny.get(ops::REQUEST_WORKSPACE).is_none());
    }

    #[test]
    fn codecs_decode_scalars_with_paths() {
        let path = FieldPath::named("args").item(1);
        assert_eq!(Codec::Int.decode_at(&json!(3), &path).unwrap().into_int(), Some(3));
        assert_eq!(
            Codec::FloatList
                .decode_at(&json!([1, 2.5]), &path)
                .unwrap()
                .into_float_list(),
            Some(vec![1.0, 2.5])
        );
        let err = Codec::IntList.decode_at(&json!("nope"), &path).unwrap_err();
        assert_eq!(err.path.as_str(), "args[1]");
    }

    #[test]
    fn stream_and_plugin_payloads_encode_flat() {
        let stream = Payload::from(StreamInfo::opened(3));
        assert_eq!(stream.encode(), json!({"stream_id": 3, "error": 0}));
        let refused = Payload::from(StreamInfo::refused(2));
        assert_eq!(refused.encode(), json!({"stream_id": -1, "error": 2}));

        let data = PluginData {
            plugin_id: 2,
            session_id: 11,
            version_table: BTreeMap::from([("Workspace".to_string(), 1)]),
        };
        let encoded = Payload::from(data.clone()).encode();
        insta::assert_json_snapshot!(encoded, @r#"
        {
          "plugin_id": 2,
          "session_id": 11,
          "version_table": {
            "Workspace": 1
          }
        }
        "#);
        let decoded = Codec::PluginData
            .decode_at(&encoded, &FieldPath::root())
            .unwrap()
            .into_plugin_data();
        assert_eq!(decoded, Some(data));
    }

    #[test]
    fn accepts_matches_variant() {
        assert!(Codec::Json.accepts(&Payload::from(json!([1]))));
        assert!(!Codec::Complexes.accepts(&Payload::Null));
        assert!(!Codec::Int.accepts(&Payload::from("x")));
    }
}
