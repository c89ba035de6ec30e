//! Writing-stream sessions.
//!
//! A writing stream is a server-owned channel for many small incremental
//! updates. The service keeps every open stream here under a numeric id;
//! callers only ever hold that id (see [`StreamInfo`]). Streams live as long
//! as the service process and are never persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::dispatcher::RemoteError;
use crate::structure::wire_enum;

wire_enum! {
    /// What the values sent through a stream are written to.
    StreamType {
        #[default]
        Position = 0,
        Color = 1,
        Scale = 2,
        Label = 3,
        ComplexPositionRotation = 4,
        ShapePosition = 5,
        ShapeColor = 6,
        SphereShapeRadius = 7,
    }
}

/// Caller-side view of a stream: its id and the collaborator's error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: i64,
    /// `0` or absent means the stream was opened.
    #[serde(default)]
    pub error: Option<i64>,
}

impl StreamInfo {
    /// Id carried when no stream was opened.
    pub const NO_STREAM: i64 = -1;

    pub fn opened(stream_id: i64) -> Self {
        Self {
            stream_id,
            error: Some(0),
        }
    }

    pub fn refused(error: i64) -> Self {
        Self {
            stream_id: Self::NO_STREAM,
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> i64 {
        self.error.unwrap_or(0)
    }

    pub fn is_open(&self) -> bool {
        self.error_code() == 0 && self.stream_id != Self::NO_STREAM
    }
}

/// A stream opened by the collaborator.
#[async_trait]
pub trait LiveStream: Send + Sync {
    /// Writes one flat batch of values, e.g. RGBA per atom for color streams.
    async fn update(&self, data: &[f64]) -> Result<(), RemoteError>;

    async fn destroy(&self) -> Result<(), RemoteError>;
}

/// Outcome of asking the collaborator for a new stream.
pub enum StreamOpening {
    Opened(Arc<dyn LiveStream>),
    /// The collaborator declined with a non-zero error code.
    Refused(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no stream with id {stream_id}")]
pub struct LookupError {
    pub stream_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Open streams keyed by id. Safe for concurrent use.
pub struct StreamRegistry {
    streams: DashMap<i64, Arc<dyn LiveStream>>,
    next_id: AtomicI64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            next_id: AtomicI64::new(0),
        }
    }

    /// Registers the result of an open request and returns the caller's view.
    pub fn register(&self, opening: StreamOpening) -> StreamInfo {
        match opening {
            StreamOpening::Opened(stream) => {
                let stream_id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.streams.insert(stream_id, stream);
                tracing::debug!(stream_id, "Registered writing stream");
                StreamInfo::opened(stream_id)
            }
            StreamOpening::Refused(error) => {
                tracing::warn!(error, "Collaborator refused to open writing stream");
                StreamInfo::refused(error)
            }
        }
    }

    fn lookup(&self, stream_id: i64) -> Result<Arc<dyn LiveStream>, LookupError> {
        self.streams
            .get(&stream_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LookupError { stream_id })
    }

    pub async fn update(&self, stream_id: i64, data: &[f64]) -> Result<(), StreamError> {
        let stream = self.lookup(stream_id)?;
        stream.update(data).await?;
        tracing::trace!(stream_id, values = data.len(), "Stream updated");
        Ok(())
    }

    /// Unregisters the stream, then releases it. The id is gone even if the
    /// collaborator fails to release.
    pub async fn destroy(&self, stream_id: i64) -> Result<(), StreamError> {
        let (_, stream) = self
            .streams
            .remove(&stream_id)
            .ok_or(LookupError { stream_id })?;
        tracing::debug!(stream_id, "Destroying writing stream");
        stream.destroy().await?;
        Ok(())
    }

    pub fn contains(&self, stream_id: i64) -> bool {
        self.streams.contains_key(&stream_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
