//! Correlated RPC and structure codec for driving a remote molecular workspace.
//!
//! A [`WorkspaceClient`] publishes requests on a service channel and waits on
//! a fresh response channel per call. A [`Dispatcher`] reads that service
//! channel, decodes arguments through the [`OperationRegistry`], runs them on
//! a [`Collaborator`] and publishes the encoded result back. Both sides share
//! the structural model in [`structure`] and its wire codec in [`schema`].

pub mod bridge;
pub mod client;
pub mod dispatcher;
pub mod logging;
pub mod memory;
pub mod registry;
pub mod schema;
pub mod streams;
pub mod structure;

pub use bridge::local::LocalBroker;
pub use bridge::protocol::{ErrorKind, Request, Response};
pub use bridge::transport::{PubSub, Subscription, TransportError};
pub use client::{CallError, ClientConfig, ConfigError, WorkspaceClient, WritingStream};
pub use dispatcher::{
    Collaborator, DispatchError, Dispatcher, DispatcherConfig, NotificationKind, RemoteError,
};
pub use memory::InMemoryWorkspace;
pub use registry::{Codec, OperationRegistry, OperationSpec, Payload, PluginData};
pub use schema::{Emit, FieldPath, Schema, ValidationError};
pub use streams::{LiveStream, LookupError, StreamInfo, StreamOpening, StreamRegistry, StreamType};
