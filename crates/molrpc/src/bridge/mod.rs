//! Pub/sub bridge between a controller and the service owning the workspace.
//!
//! # Architecture
//!
//! - **protocol**: Request envelope and correlated response payload
//! - **transport**: `PubSub` boundary trait implemented by concrete brokers
//! - **local**: In-process broker for embedding and tests

pub mod local;
pub mod protocol;
pub mod transport;
