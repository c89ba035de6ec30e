//! Wire protocol types.
//!
//! Every message is one UTF-8 JSON text. Requests go to the service's
//! well-known channel; each response goes to the ephemeral channel named in
//! the request that caused it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Environment variable naming the service's well-known request channel.
pub const CHANNEL_ENV: &str = "MOLRPC_CHANNEL";

/// Fresh response channel name for one call. Never reused.
pub fn response_channel() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Request envelope published on the service channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation name, resolved against the operation registry.
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    pub response_channel: String,
}

impl Request {
    pub fn new(
        function: impl Into<String>,
        args: Vec<Value>,
        response_channel: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            args,
            kwargs: Map::new(),
            response_channel: response_channel.into(),
        }
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }
}

/// Category of a failure reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An argument failed its codec.
    Validation,
    UnknownOperation,
    /// A stream id is not registered.
    Lookup,
    /// The collaborator itself failed (error, panic or wrong result shape).
    RemoteExecution,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::Lookup => "lookup",
            ErrorKind::RemoteExecution => "remote_execution",
        };
        f.write_str(s)
    }
}

/// Message published to a request's response channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        /// Encoded result; `null` for operations without a result codec.
        #[serde(default)]
        result: Value,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Response::Ok { result }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}
