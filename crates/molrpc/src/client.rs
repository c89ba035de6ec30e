//! Caller-side correlator.
//!
//! Every call gets its own freshly generated response channel. The client
//! subscribes to it before publishing the request, waits for exactly one
//! message, then drops the subscription. Concurrent calls never share a
//! channel, so they cannot receive each other's responses.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::bridge::protocol::{self, CHANNEL_ENV, ErrorKind, Request, Response};
use crate::bridge::transport::{PubSub, TransportError};
use crate::dispatcher::NotificationKind;
use crate::registry::{Codec, OperationRegistry, OperationSpec, Payload, PluginData, ops};
use crate::schema::{FieldPath, Schema, ValidationError, encode_list};
use crate::streams::{StreamInfo, StreamType};
use crate::structure::{Complex, Workspace};

/// Seconds to wait for a response; `0` disables the timeout.
pub const CALL_TIMEOUT_ENV: &str = "MOLRPC_CALL_TIMEOUT";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The service's well-known request channel.
    pub channel: String,
    /// `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn without_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    /// Reads `MOLRPC_CHANNEL` (required) and `MOLRPC_CALL_TIMEOUT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let channel = std::env::var(CHANNEL_ENV)
            .ok()
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::Missing(CHANNEL_ENV))?;
        let mut config = Self::new(channel);
        if let Ok(raw) = std::env::var(CALL_TIMEOUT_ENV) {
            config.call_timeout = timeout_from_secs(&raw)?;
        }
        Ok(config)
    }
}

fn timeout_from_secs(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        name: CALL_TIMEOUT_ENV,
        value: raw.to_string(),
    };
    let secs: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs).map(Some).map_err(|_| invalid())
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The name is not in the client's registry; nothing was sent.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{operation} takes {expected} argument(s), got {got}")]
    Arity {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {position} of {operation} is {given}, expected {expected:?}")]
    ArgumentMismatch {
        operation: String,
        position: usize,
        given: &'static str,
        expected: Codec,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no response to {operation} within {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("response channel for {operation} closed before a response arrived")]
    SubscriptionClosed { operation: String },

    #[error("malformed response to {operation}: {reason}")]
    MalformedResponse { operation: String, reason: String },

    #[error("invalid response to {operation}: {source}")]
    Validation {
        operation: String,
        source: ValidationError,
    },

    #[error("{operation} failed remotely ({kind}): {message}")]
    Remote {
        operation: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("stream was not opened (error code {error})")]
    StreamNotOpened { error: i64 },
}

impl CallError {
    /// Wire error kind for failures reported by the service.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            CallError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Handle to a remote workspace service. Cheap to clone.
#[derive(Clone)]
pub struct WorkspaceClient {
    transport: Arc<dyn PubSub>,
    registry: Arc<OperationRegistry>,
    config: ClientConfig,
}

impl WorkspaceClient {
    pub fn new(transport: Arc<dyn PubSub>, config: ClientConfig) -> Self {
        Self {
            transport,
            registry: Arc::new(OperationRegistry::standard()),
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Generic correlated call. Each argument must match the declared codec
    /// for its position.
    pub async fn call(&self, operation: &str, args: &[Payload]) -> Result<Payload, CallError> {
        self.call_with_kwargs(operation, args, Map::new()).await
    }

    pub async fn call_with_kwargs(
        &self,
        operation: &str,
        args: &[Payload],
        kwargs: Map<String, Value>,
    ) -> Result<Payload, CallError> {
        let spec = self.resolve(operation, args.len())?;
        for (position, (codec, arg)) in spec.params.iter().zip(args).enumerate() {
            if !codec.accepts(arg) {
                return Err(CallError::ArgumentMismatch {
                    operation: operation.to_string(),
                    position,
                    given: arg.variant_name(),
                    expected: *codec,
                });
            }
        }
        let encoded = args.iter().map(Payload::encode).collect();
        self.round_trip(spec, encoded, kwargs).await
    }

    /// Call with arguments already encoded by their codecs.
    async fn call_encoded(&self, operation: &str, args: Vec<Value>) -> Result<Payload, CallError> {
        let spec = self.resolve(operation, args.len())?;
        self.round_trip(spec, args, Map::new()).await
    }

    fn resolve(&self, operation: &str, given: usize) -> Result<&OperationSpec, CallError> {
        let spec = self
            .registry
            .get(operation)
            .ok_or_else(|| CallError::UnknownOperation(operation.to_string()))?;
        if spec.arity() != given {
            return Err(CallError::Arity {
                operation: operation.to_string(),
                expected: spec.arity(),
                got: given,
            });
        }
        Ok(spec)
    }

    async fn round_trip(
        &self,
        spec: &OperationSpec,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Payload, CallError> {
        let operation = spec.name.as_str();
        let response_channel = protocol::response_channel();
        let request = Request::new(operation, args, response_channel.as_str()).with_kwargs(kwargs);
        let text = serde_json::to_string(&request).map_err(|e| TransportError::Publish {
            channel: self.config.channel.clone(),
            reason: e.to_string(),
        })?;

        let mut subscription = self.transport.subscribe(&response_channel).await?;
        tracing::debug!(operation, response_channel = %response_channel, "Sending request");
        let receivers = self.transport.publish(&self.config.channel, text).await?;
        if receivers == 0 {
            tracing::warn!(
                operation,
                channel = %self.config.channel,
                "No service listening on request channel"
            );
        }

        let reply = match self.config.call_timeout {
            Some(timeout) => tokio::time::timeout(timeout, subscription.next_message())
                .await
                .map_err(|_| CallError::Timeout {
                    operation: operation.to_string(),
                    timeout,
                })?,
            None => subscription.next_message().await,
        };
        drop(subscription);

        let reply = reply.ok_or_else(|| CallError::SubscriptionClosed {
            operation: operation.to_string(),
        })?;
        let response: Response =
            serde_json::from_str(&reply).map_err(|e| CallError::MalformedResponse {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        match (response, spec.result) {
            (Response::Error { kind, message }, _) => Err(CallError::Remote {
                operation: operation.to_string(),
                kind,
                message,
            }),
            (Response::Ok { .. }, None) => Ok(Payload::Null),
            (Response::Ok { result }, Some(codec)) => codec
                .decode_at(&result, &FieldPath::named("result"))
                .map_err(|source| CallError::Validation {
                    operation: operation.to_string(),
                    source,
                }),
        }
    }

    pub async fn request_workspace(&self) -> Result<Workspace, CallError> {
        let payload = self.call_encoded(ops::REQUEST_WORKSPACE, vec![]).await?;
        expect(ops::REQUEST_WORKSPACE, payload.into_workspace())
    }

    pub async fn update_workspace(&self, workspace: &Workspace) -> Result<(), CallError> {
        self.call_encoded(ops::UPDATE_WORKSPACE, vec![workspace.encode()])
            .await
            .map(drop)
    }

    /// Shallow stubs of every complex in the workspace (no molecules).
    pub async fn request_complex_list(&self) -> Result<Vec<Complex>, CallError> {
        let payload = self.call_encoded(ops::REQUEST_COMPLEX_LIST, vec![]).await?;
        expect(ops::REQUEST_COMPLEX_LIST, payload.into_complexes())
    }

    pub async fn request_complexes(&self, indices: &[i64]) -> Result<Vec<Complex>, CallError> {
        let payload = self
            .call_encoded(ops::REQUEST_COMPLEXES, vec![Value::from(indices.to_vec())])
            .await?;
        expect(ops::REQUEST_COMPLEXES, payload.into_complexes())
    }

    pub async fn update_structures_shallow(&self, complexes: &[Complex]) -> Result<(), CallError> {
        self.call_encoded(ops::UPDATE_STRUCTURES_SHALLOW, vec![encode_list(complexes)])
            .await
            .map(drop)
    }

    pub async fn update_structures_deep(&self, complexes: &[Complex]) -> Result<(), CallError> {
        self.call_encoded(ops::UPDATE_STRUCTURES_DEEP, vec![encode_list(complexes)])
            .await
            .map(drop)
    }

    /// Returns the added complexes with their assigned indices.
    pub async fn add_to_workspace(&self, complexes: &[Complex]) -> Result<Vec<Complex>, CallError> {
        let payload = self
            .call_encoded(ops::ADD_TO_WORKSPACE, vec![encode_list(complexes)])
            .await?;
        expect(ops::ADD_TO_WORKSPACE, payload.into_complexes())
    }

    pub async fn remove_from_workspace(&self, complexes: &[Complex]) -> Result<(), CallError> {
        self.call_encoded(ops::REMOVE_FROM_WORKSPACE, vec![encode_list(complexes)])
            .await
            .map(drop)
    }

    pub async fn zoom_on_structures(&self, indices: &[i64]) -> Result<(), CallError> {
        self.call_encoded(ops::ZOOM_ON_STRUCTURES, vec![Value::from(indices.to_vec())])
            .await
            .map(drop)
    }

    pub async fn center_on_structures(&self, indices: &[i64]) -> Result<(), CallError> {
        self.call_encoded(ops::CENTER_ON_STRUCTURES, vec![Value::from(indices.to_vec())])
            .await
            .map(drop)
    }

    pub async fn send_notification(
        &self,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), CallError> {
        self.call_encoded(
            ops::SEND_NOTIFICATION,
            vec![Value::from(kind.as_raw()), Value::from(message)],
        )
        .await
        .map(drop)
    }

    /// Opens a writing stream over `atom_indices`. Check
    /// [`WritingStream::is_open`] before sending updates.
    pub async fn create_writing_stream(
        &self,
        atom_indices: &[i64],
        stream_type: StreamType,
    ) -> Result<WritingStream, CallError> {
        let payload = self
            .call_encoded(
                ops::CREATE_WRITING_STREAM,
                vec![Value::from(atom_indices.to_vec()), Value::from(stream_type.as_raw())],
            )
            .await?;
        let info = expect(ops::CREATE_WRITING_STREAM, payload.into_stream())?;
        Ok(WritingStream {
            client: self.clone(),
            info,
            stream_type,
        })
    }

    pub async fn upload_shapes(&self, shapes: Value) -> Result<Value, CallError> {
        let payload = self.call_encoded(ops::UPLOAD_SHAPES, vec![shapes]).await?;
        expect(ops::UPLOAD_SHAPES, payload.into_json())
    }

    pub async fn get_plugin_data(&self) -> Result<PluginData, CallError> {
        let payload = self.call_encoded(ops::GET_PLUGIN_DATA, vec![]).await?;
        expect(ops::GET_PLUGIN_DATA, payload.into_plugin_data())
    }
}

fn expect<T>(operation: &str, value: Option<T>) -> Result<T, CallError> {
    value.ok_or_else(|| CallError::MalformedResponse {
        operation: operation.to_string(),
        reason: "result does not match the registered codec".to_string(),
    })
}

/// Caller-side handle to a stream owned by the service.
///
/// Holds only the id and the error code returned at creation. Handles do not
/// survive a service restart.
pub struct WritingStream {
    client: WorkspaceClient,
    info: StreamInfo,
    stream_type: StreamType,
}

impl WritingStream {
    pub fn id(&self) -> i64 {
        self.info.stream_id
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn error_code(&self) -> i64 {
        self.info.error_code()
    }

    pub fn is_open(&self) -> bool {
        self.info.is_open()
    }

    fn ensure_open(&self) -> Result<(), CallError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CallError::StreamNotOpened {
                error: self.error_code(),
            })
        }
    }

    pub async fn update(&self, data: &[f64]) -> Result<(), CallError> {
        self.ensure_open()?;
        self.client
            .call_encoded(
                ops::STREAM_UPDATE,
                vec![Value::from(self.id()), Value::from(data.to_vec())],
            )
            .await
            .map(drop)
    }

    pub async fn destroy(&self) -> Result<(), CallError> {
        self.ensure_open()?;
        self.client
            .call_encoded(ops::STREAM_DESTROY, vec![Value::from(self.id())])
            .await
            .map(drop)
    }
}

impl std::fmt::Debug for WritingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritingStream")
            .field("info", &self.info)
            .field("stream_type", &self.stream_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bridge::local::LocalBroker;

    fn client(broker: &LocalBroker) -> WorkspaceClient {
        WorkspaceClient::new(
            Arc::new(broker.clone()),
            ClientConfig::new("service").with_call_timeout(Duration::from_millis(200)),
        )
    }

    /// Answers every request on `service` with `reply(request)`.
    fn spawn_responder(
        broker: &LocalBroker,
        reply: fn(&Request) -> Response,
    ) -> tokio::task::JoinHandle<()> {
        let broker = broker.clone();
        tokio::spawn(async move {
            let mut requests = broker.subscribe("service").await.unwrap();
            while let Some(text) = requests.next_message().await {
                let request: Request = serde_json::from_str(&text).unwrap();
                let response = serde_json::to_string(&reply(&request)).unwrap();
                broker.publish(&request.response_channel, response).await.unwrap();
            }
        })
    }

    async fn wait_for_service(broker: &LocalBroker) {
        while broker.subscriber_count("service") == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn unknown_operation_fails_before_sending() {
        let broker = LocalBroker::new();
        let err = client(&broker).call("open_url", &[]).await.unwrap_err();
        assert!(matches!(err, CallError::UnknownOperation(ref name) if name == "open_url"));
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn arity_and_argument_kinds_are_checked_locally() {
        let broker = LocalBroker::new();
        let c = client(&broker);

        let err = c.call(ops::REQUEST_COMPLEXES, &[]).await.unwrap_err();
        assert!(matches!(err, CallError::Arity { expected: 1, got: 0, .. }));

        let err = c
            .call(ops::REQUEST_COMPLEXES, &[Payload::from("1")])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument 0 of request_complexes is string, expected IntList"
        );
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn timeout_unsubscribes_response_channel() {
        let broker = LocalBroker::new();
        let err = client(&broker).request_complex_list().await.unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }), "{err}");
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn remote_errors_surface_with_kind() {
        let broker = LocalBroker::new();
        let _responder = spawn_responder(&broker, |_| {
            Response::error(ErrorKind::Lookup, "no stream with id 9")
        });
        wait_for_service(&broker).await;

        let err = client(&broker)
            .call(ops::STREAM_DESTROY, &[Payload::Int(9)])
            .await
            .unwrap_err();
        assert_eq!(err.remote_kind(), Some(ErrorKind::Lookup));
    }

    #[tokio::test]
    async fn results_are_decoded_with_result_codec() {
        let broker = LocalBroker::new();
        let _responder = spawn_responder(&broker, |req| match req.function.as_str() {
            ops::REQUEST_COMPLEXES => {
                Response::ok(json!([{"index": 4, "name": "x", "rotation": [0, 0, 0, 1]}]))
            }
            ops::GET_PLUGIN_DATA => Response::ok(json!({"plugin_id": 1, "session_id": 2})),
            _ => Response::ok(json!([{"index": 1, "rotation": [0, 0]}])),
        });
        wait_for_service(&broker).await;
        let c = client(&broker);

        let complexes = c.request_complexes(&[4]).await.unwrap();
        assert_eq!(complexes[0].name, "x");
        assert!(complexes[0].rotation.is_identity());

        let data = c.get_plugin_data().await.unwrap();
        assert_eq!((data.plugin_id, data.session_id), (1, 2));

        let err = c.request_complex_list().await.unwrap_err();
        let CallError::Validation { source, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(source.path.as_str(), "result[0].rotation");
    }

    #[tokio::test]
    async fn malformed_response_is_reported() {
        let broker = LocalBroker::new();
        let _responder = spawn_responder(&broker, |_| Response::ok(Value::Null));
        wait_for_service(&broker).await;
        // Null is not a complex list.
        let err = client(&broker).request_complex_list().await.unwrap_err();
        assert!(matches!(err, CallError::Validation { .. }), "{err}");
    }

    #[tokio::test]
    async fn unopened_stream_handle_fails_locally() {
        let broker = LocalBroker::new();
        let _responder =
            spawn_responder(&broker, |_| Response::ok(json!({"stream_id": -1, "error": 5})));
        wait_for_service(&broker).await;

        let stream = client(&broker)
            .create_writing_stream(&[1, 2], StreamType::Color)
            .await
            .unwrap();
        assert!(!stream.is_open());
        assert_eq!(stream.error_code(), 5);
        let err = stream.update(&[0.0; 8]).await.unwrap_err();
        assert!(matches!(err, CallError::StreamNotOpened { error: 5 }));
    }

    #[test]
    fn call_timeout_parsing() {
        assert_eq!(timeout_from_secs("0").unwrap(), None);
        assert_eq!(
            timeout_from_secs(" 1.5 ").unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert!(timeout_from_secs("-1").is_err());
        assert!(timeout_from_secs("soon").is_err());
        assert!(matches!(
            timeout_from_secs("1e300"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn default_config() {
        let config = ClientConfig::new("svc");
        assert_eq!(config.call_timeout, Some(DEFAULT_CALL_TIMEOUT));
        assert_eq!(config.without_call_timeout().call_timeout, None);
    }
}
