//! Service-side request loop.
//!
//! The dispatcher reads envelopes from the well-known request channel one at
//! a time, resolves each against the operation registry, runs it on the
//! [`Collaborator`] and publishes exactly one response to the envelope's
//! response channel. Per-request failures (bad arguments, unknown names,
//! collaborator errors and panics) become error responses; only a malformed
//! envelope goes unanswered, since it carries no usable response channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::bridge::protocol::{CHANNEL_ENV, ErrorKind, Request, Response};
use crate::bridge::transport::{PubSub, TransportError};
use crate::registry::{OperationRegistry, Payload, PluginData, ops};
use crate::schema::{Emit, FieldPath, ValidationError};
use crate::streams::{StreamError, StreamOpening, StreamRegistry, StreamType};
use crate::structure::wire_enum;

/// Domain failure raised by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

wire_enum! {
    /// Severity of a user-facing notification.
    NotificationKind {
        #[default]
        Message = 0,
        Success = 1,
        Warning = 2,
        Error = 3,
    }
}

/// The authoritative runtime that owns the live workspace.
///
/// Implementations may do their work synchronously inside these methods;
/// the dispatcher awaits them either way.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Runs any registered operation that is not a stream, notification or
    /// plugin-data operation. `args` are already decoded per the registry.
    async fn invoke(
        &self,
        operation: &str,
        args: Vec<Payload>,
        kwargs: Map<String, Value>,
    ) -> Result<Payload, RemoteError>;

    async fn create_writing_stream(
        &self,
        atom_indices: Vec<i64>,
        stream_type: StreamType,
    ) -> Result<StreamOpening, RemoteError>;

    async fn plugin_data(&self) -> Result<PluginData, RemoteError> {
        Ok(PluginData::default())
    }

    async fn send_notification(
        &self,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RemoteError> {
        match kind {
            NotificationKind::Error => tracing::error!(message, "Notification"),
            NotificationKind::Warning => tracing::warn!(message, "Notification"),
            _ => tracing::info!(message, "Notification"),
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to subscribe to request channel: {0}")]
    Subscribe(#[from] TransportError),

    #[error("request channel {0} closed by transport")]
    ChannelClosed(String),
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Well-known channel the dispatcher reads requests from.
    pub channel: String,
}

impl DispatcherConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// Reads `MOLRPC_CHANNEL`; generates a fresh channel name when unset.
    pub fn from_env() -> Self {
        match std::env::var(CHANNEL_ENV) {
            Ok(channel) if !channel.is_empty() => Self::new(channel),
            _ => {
                let channel = uuid::Uuid::new_v4().to_string();
                tracing::info!(%channel, "No {} set, generated request channel", CHANNEL_ENV);
                Self::new(channel)
            }
        }
    }
}

/// Why one request failed; always answered on its response channel.
#[derive(Debug, thiserror::Error)]
enum RequestFailure {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{operation} takes {expected} argument(s), got {got}")]
    Arity {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("{operation} returned {returned}, expected {expected}")]
    WrongResult {
        operation: String,
        returned: &'static str,
        expected: String,
    },
}

impl RequestFailure {
    fn kind(&self) -> ErrorKind {
        match self {
            RequestFailure::UnknownOperation(_) => ErrorKind::UnknownOperation,
            RequestFailure::Arity { .. } | RequestFailure::Validation(_) => ErrorKind::Validation,
            RequestFailure::Stream(StreamError::Lookup(_)) => ErrorKind::Lookup,
            RequestFailure::Stream(StreamError::Remote(_))
            | RequestFailure::Remote(_)
            | RequestFailure::Panicked(_)
            | RequestFailure::WrongResult { .. } => ErrorKind::RemoteExecution,
        }
    }
}

pub struct Dispatcher {
    transport: Arc<dyn PubSub>,
    collaborator: Arc<dyn Collaborator>,
    registry: Arc<OperationRegistry>,
    streams: StreamRegistry,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn PubSub>,
        collaborator: Arc<dyn Collaborator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            transport,
            collaborator,
            registry: Arc::new(OperationRegistry::standard()),
            streams: StreamRegistry::new(),
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    /// Processes requests until `shutdown` fires or the transport closes the
    /// request channel.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DispatchError> {
        let mut requests = self.transport.subscribe(&self.config.channel).await?;
        tracing::info!(channel = %self.config.channel, "Dispatcher listening for requests");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!(channel = %self.config.channel, "Dispatcher shutting down");
                    return Ok(());
                }

                msg = requests.next_message() => match msg {
                    Some(text) => self.handle_message(&text).await,
                    None => {
                        tracing::warn!(channel = %self.config.channel, "Request channel closed");
                        return Err(DispatchError::ChannelClosed(self.config.channel.clone()));
                    }
                }
            }
        }
    }

    /// Handles one raw message from the request channel. Never fails.
    pub async fn handle_message(&self, text: &str) {
        let request: Request = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "Dropping malformed request envelope");
                if let Err(e) = self
                    .collaborator
                    .send_notification(NotificationKind::Error, "JSON Decode Failure")
                    .await
                {
                    tracing::warn!(error = %e, "Failed to send decode failure notification");
                }
                return;
            }
        };

        tracing::debug!(
            operation = %request.function,
            response_channel = %request.response_channel,
            "Received request"
        );
        let response = self.execute(&request).await;
        self.respond(&request, &response).await;
    }

    /// Runs one decoded request and builds its response.
    pub async fn execute(&self, request: &Request) -> Response {
        match self.try_execute(request).await {
            Ok(result) => Response::ok(result),
            Err(failure) => {
                tracing::warn!(
                    operation = %request.function,
                    error = %failure,
                    "Request failed"
                );
                Response::error(failure.kind(), failure.to_string())
            }
        }
    }

    async fn respond(&self, request: &Request, response: &Response) {
        let text = match serde_json::to_string(response) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    operation = %request.function,
                    error = %e,
                    "Failed to encode response"
                );
                return;
            }
        };
        match self.transport.publish(&request.response_channel, text).await {
            Ok(0) => tracing::warn!(
                operation = %request.function,
                response_channel = %request.response_channel,
                "Response published with no caller listening"
            ),
            Ok(_) => tracing::trace!(
                response_channel = %request.response_channel,
                "Response published"
            ),
            Err(e) => tracing::error!(
                response_channel = %request.response_channel,
                error = %e,
                "Failed to publish response"
            ),
        }
    }

    async fn try_execute(&self, request: &Request) -> Result<Value, RequestFailure> {
        let spec = self
            .registry
            .get(&request.function)
            .ok_or_else(|| RequestFailure::UnknownOperation(request.function.clone()))?;

        if request.args.len() != spec.arity() {
            return Err(RequestFailure::Arity {
                operation: spec.name.clone(),
                expected: spec.arity(),
                got: request.args.len(),
            });
        }

        let args_path = FieldPath::named("args");
        let args = spec
            .params
            .iter()
            .zip(&request.args)
            .enumerate()
            .map(|(i, (codec, value))| codec.decode_at(value, &args_path.item(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let routed = self.route(&spec.name, args, request.kwargs.clone());
        let payload = match AssertUnwindSafe(routed).catch_unwind().await {
            Ok(result) => result?,
            Err(panic) => return Err(RequestFailure::Panicked(panic_message(panic.as_ref()))),
        };

        match spec.result {
            None => Ok(Value::Null),
            Some(codec) if codec.accepts(&payload) => Ok(payload.encode_as(Emit::Authoritative)),
            Some(codec) => Err(RequestFailure::WrongResult {
                operation: spec.name.clone(),
                returned: payload.variant_name(),
                expected: format!("{codec:?}"),
            }),
        }
    }

    async fn route(
        &self,
        operation: &str,
        args: Vec<Payload>,
        kwargs: Map<String, Value>,
    ) -> Result<Payload, RequestFailure> {
        let mut args = Args::new(args);
        match operation {
            ops::CREATE_WRITING_STREAM => {
                let indices = args.take(Payload::into_int_list, "int list")?;
                let raw_type = args.take(Payload::into_int, "int")?;
                let stream_type = StreamType::try_from(raw_type)
                    .map_err(|reason| ValidationError::new(args.path(1), reason))?;
                let opening = self
                    .collaborator
                    .create_writing_stream(indices, stream_type)
                    .await?;
                Ok(Payload::Stream(self.streams.register(opening)))
            }
            ops::STREAM_UPDATE => {
                let stream_id = args.take(Payload::into_int, "int")?;
                let data = args.take(Payload::into_float_list, "float list")?;
                self.streams.update(stream_id, &data).await?;
                Ok(Payload::Null)
            }
            ops::STREAM_DESTROY => {
                let stream_id = args.take(Payload::into_int, "int")?;
                self.streams.destroy(stream_id).await?;
                Ok(Payload::Null)
            }
            ops::SEND_NOTIFICATION => {
                let raw_kind = args.take(Payload::into_int, "int")?;
                let message = args.take(Payload::into_str, "string")?;
                let kind = NotificationKind::try_from(raw_kind)
                    .map_err(|reason| ValidationError::new(args.path(0), reason))?;
                self.collaborator.send_notification(kind, &message).await?;
                Ok(Payload::Null)
            }
            ops::GET_PLUGIN_DATA => Ok(Payload::PluginData(self.collaborator.plugin_data().await?)),
            _ => Ok(self
                .collaborator
                .invoke(operation, args.into_rest(), kwargs)
                .await?),
        }
    }
}

/// Positional access to decoded arguments for the built-in operations.
struct Args {
    items: std::vec::IntoIter<Payload>,
    position: usize,
}

impl Args {
    fn new(items: Vec<Payload>) -> Self {
        Self {
            items: items.into_iter(),
            position: 0,
        }
    }

    fn path(&self, index: usize) -> FieldPath {
        FieldPath::named("args").item(index)
    }

    fn take<T>(
        &mut self,
        extract: fn(Payload) -> Option<T>,
        expected: &str,
    ) -> Result<T, ValidationError> {
        let path = self.path(self.position);
        self.position += 1;
        self.items
            .next()
            .and_then(extract)
            .ok_or_else(|| ValidationError::new(path, format!("expected {expected}")))
    }

    fn into_rest(self) -> Vec<Payload> {
        self.items.collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::bridge::local::LocalBroker;
    use crate::registry::{Codec, OperationSpec};
    use crate::streams::LiveStream;
    use crate::structure::Complex;

    struct NullStream;

    #[async_trait]
    impl LiveStream for NullStream {
        async fn update(&self, data: &[f64]) -> Result<(), RemoteError> {
            if data.is_empty() {
                return Err(RemoteError::new("empty update"));
            }
            Ok(())
        }

        async fn destroy(&self) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockCollaborator {
        notifications: Mutex<Vec<(NotificationKind, String)>>,
        invoked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Collaborator for MockCollaborator {
        async fn invoke(
            &self,
            operation: &str,
            _args: Vec<Payload>,
            _kwargs: Map<String, Value>,
        ) -> Result<Payload, RemoteError> {
            self.invoked.lock().unwrap().push(operation.to_string());
            match operation {
                ops::REQUEST_COMPLEX_LIST => Ok(vec![Complex::named(1, "1tyl")].into()),
                ops::REQUEST_WORKSPACE => Ok(Payload::Int(3)),
                ops::ADD_TO_WORKSPACE => Err(RemoteError::new("workspace is locked")),
                ops::ZOOM_ON_STRUCTURES => panic!("camera exploded"),
                _ => Ok(Payload::Null),
            }
        }

        async fn create_writing_stream(
            &self,
            _atom_indices: Vec<i64>,
            stream_type: StreamType,
        ) -> Result<StreamOpening, RemoteError> {
            match stream_type {
                StreamType::Label => Ok(StreamOpening::Refused(2)),
                _ => Ok(StreamOpening::Opened(Arc::new(NullStream))),
            }
        }

        async fn send_notification(
            &self,
            kind: NotificationKind,
            message: &str,
        ) -> Result<(), RemoteError> {
            self.notifications
                .lock()
                .unwrap()
                .push((kind, message.to_string()));
            Ok(())
        }
    }

    fn dispatcher(collaborator: Arc<MockCollaborator>) -> (Dispatcher, LocalBroker) {
        let broker = LocalBroker::new();
        let dispatcher = Dispatcher::new(
            Arc::new(broker.clone()),
            collaborator,
            DispatcherConfig::new("service"),
        );
        (dispatcher, broker)
    }

    fn request(function: &str, args: Vec<Value>) -> Request {
        Request::new(function, args, "reply")
    }

    #[tokio::test]
    async fn success_payload_is_encoded_with_result_codec() {
        let (d, _) = dispatcher(Arc::default());
        let resp = d.execute(&request(ops::REQUEST_COMPLEX_LIST, vec![])).await;
        let Response::Ok { result } = resp else {
            panic!("expected ok");
        };
        assert_eq!(result[0]["index"], 1);
        assert_eq!(result[0]["name"], "1tyl");
    }

    #[tokio::test]
    async fn operation_without_result_codec_answers_null() {
        let (d, _) = dispatcher(Arc::default());
        let resp = d.execute(&request(ops::CENTER_ON_STRUCTURES, vec![json!([1])])).await;
        assert_eq!(resp, Response::ok(Value::Null));
    }

    #[tokio::test]
    async fn unknown_operation_is_answered() {
        let (d, _) = dispatcher(Arc::default());
        let resp = d.execute(&request("open_url", vec![])).await;
        insta::assert_json_snapshot!(resp, @r#"
        {
          "status": "error",
          "kind": "unknown_operation",
          "message": "unknown operation: open_url"
        }
        "#);
    }

    #[tokio::test]
    async fn arity_and_argument_errors_are_validation_failures() {
        let collaborator = Arc::new(MockCollaborator::default());
        let (d, _) = dispatcher(collaborator.clone());

        let resp = d.execute(&request(ops::REQUEST_COMPLEXES, vec![])).await;
        assert_eq!(
            resp,
            Response::error(
                ErrorKind::Validation,
                "request_complexes takes 1 argument(s), got 0"
            )
        );

        let bad_rotation = json!([{"index": 1, "rotation": [0, 1]}]);
        let resp = d
            .execute(&request(ops::UPDATE_STRUCTURES_DEEP, vec![bad_rotation]))
            .await;
        let Response::Error { kind, message } = resp else {
            panic!("expected error");
        };
        assert_eq!(kind, ErrorKind::Validation);
        assert!(message.starts_with("invalid value at args[0][0].rotation"), "{message}");

        assert!(collaborator.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn collaborator_failures_become_remote_execution() {
        let (d, _) = dispatcher(Arc::default());

        let resp = d.execute(&request(ops::ADD_TO_WORKSPACE, vec![json!([])])).await;
        assert_eq!(
            resp,
            Response::error(ErrorKind::RemoteExecution, "workspace is locked")
        );

        let resp = d.execute(&request(ops::ZOOM_ON_STRUCTURES, vec![json!([1])])).await;
        assert_eq!(
            resp,
            Response::error(ErrorKind::RemoteExecution, "operation panicked: camera exploded")
        );

        let resp = d.execute(&request(ops::REQUEST_WORKSPACE, vec![])).await;
        assert_eq!(
            resp,
            Response::error(
                ErrorKind::RemoteExecution,
                "request_workspace returned int, expected Workspace"
            )
        );
    }

    #[tokio::test]
    async fn stream_lifecycle_through_requests() {
        let (d, _) = dispatcher(Arc::default());

        let resp = d
            .execute(&request(ops::CREATE_WRITING_STREAM, vec![json!([1, 2, 3]), json!(1)]))
            .await;
        let Response::Ok { result } = resp else {
            panic!("expected ok");
        };
        assert_eq!(result["error"], 0);
        let id = result["stream_id"].as_i64().unwrap();

        let update = |data: Value| request(ops::STREAM_UPDATE, vec![json!(id), data]);
        assert!(d.execute(&update(json!([1, 2, 3]))).await.is_ok());

        let resp = d.execute(&update(json!([]))).await;
        assert_eq!(resp, Response::error(ErrorKind::RemoteExecution, "empty update"));

        assert!(d.execute(&request(ops::STREAM_DESTROY, vec![json!(id)])).await.is_ok());
        let resp = d.execute(&update(json!([1]))).await;
        assert_eq!(
            resp,
            Response::error(ErrorKind::Lookup, format!("no stream with id {id}"))
        );
    }

    #[tokio::test]
    async fn refused_and_invalid_stream_types() {
        let (d, _) = dispatcher(Arc::default());

        let resp = d
            .execute(&request(ops::CREATE_WRITING_STREAM, vec![json!([1]), json!(3)]))
            .await;
        assert_eq!(resp, Response::ok(json!({"stream_id": -1, "error": 2})));
        assert!(d.streams().is_empty());

        let resp = d
            .execute(&request(ops::CREATE_WRITING_STREAM, vec![json!([1]), json!(99)]))
            .await;
        assert_eq!(
            resp,
            Response::error(
                ErrorKind::Validation,
                "invalid value at args[1]: StreamType out of range: 99"
            )
        );
    }

    #[tokio::test]
    async fn notification_operation_reaches_collaborator() {
        let collaborator = Arc::new(MockCollaborator::default());
        let (d, _) = dispatcher(collaborator.clone());
        let resp = d
            .execute(&request(ops::SEND_NOTIFICATION, vec![json!(1), json!("done")]))
            .await;
        assert!(resp.is_ok());
        assert_eq!(
            collaborator.notifications.lock().unwrap().as_slice(),
            &[(NotificationKind::Success, "done".to_string())]
        );
    }

    #[tokio::test]
    async fn custom_registry_limits_surface() {
        let registry = OperationRegistry::empty().with(OperationSpec::new(
            ops::REQUEST_COMPLEX_LIST,
            &[],
            Some(Codec::Complexes),
        ));
        let (d, _) = dispatcher(Arc::default());
        let d = d.with_registry(Arc::new(registry));
        assert!(d.execute(&request(ops::REQUEST_COMPLEX_LIST, vec![])).await.is_ok());
        let resp = d.execute(&request(ops::GET_PLUGIN_DATA, vec![])).await;
        assert!(matches!(resp, Response::Error { kind: ErrorKind::UnknownOperation, .. }));
    }

    #[tokio::test]
    async fn malformed_envelope_is_dropped_and_loop_continues() {
        let collaborator = Arc::new(MockCollaborator::default());
        let (d, broker) = dispatcher(collaborator.clone());
        let d = Arc::new(d);
        let shutdown = CancellationToken::new();

        let mut replies = broker.subscribe("reply").await.unwrap();
        let task = tokio::spawn({
            let d = Arc::clone(&d);
            let shutdown = shutdown.clone();
            async move { d.run(shutdown).await }
        });
        while broker.subscriber_count("service") == 0 {
            tokio::task::yield_now().await;
        }

        broker.publish("service", "{not json".to_string()).await.unwrap();
        let good =
            serde_json::to_string(&request(ops::CENTER_ON_STRUCTURES, vec![json!([4])])).unwrap();
        broker.publish("service", good).await.unwrap();

        let reply = replies.next_message().await.unwrap();
        let resp: Response = serde_json::from_str(&reply).unwrap();
        assert!(resp.is_ok());
        assert_eq!(
            collaborator.notifications.lock().unwrap().as_slice(),
            &[(NotificationKind::Error, "JSON Decode Failure".to_string())]
        );

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(broker.subscriber_count("service"), 0);
    }

    #[test]
    fn config_from_env_falls_back_to_generated_channel() {
        // MOLRPC_CHANNEL is not set in the test environment.
        if std::env::var(CHANNEL_ENV).is_err() {
            let a = DispatcherConfig::from_env();
            let b = DispatcherConfig::from_env();
            assert_ne!(a.channel, b.channel);
            assert!(uuid::Uuid::parse_str(&a.channel).is_ok());
        }
    }
}
