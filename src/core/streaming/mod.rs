//! Bounded pool of in-flight streaming sessions
//!
//! Sessions move through `idle → connecting → streaming` and end in
//! `completed`, `error` or `cancelled`. Consumers receive chunks over a
//! bounded channel; the session handle carries the cancellation flag, so no
//! raw callbacks or opaque user-data pointers are involved. The pool rejects
//! new sessions beyond its concurrency cap instead of queuing.

pub mod sse;

pub use sse::{SseEvent, SseParser};

use crate::config::StreamingConfig;
use crate::core::types::{estimate_tokens, Provider};
use crate::utils::error::{GatewayError, PolicyError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Streaming session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Error,
    Cancelled,
}

/// One delivered chunk
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub data: String,
}

/// Final metadata for a finished stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub session_id: Uuid,
    pub provider: Provider,
    pub total_chunks: u64,
    pub total_tokens: u64,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One in-flight streaming session
#[derive(Debug)]
pub struct StreamSession {
    id: Uuid,
    provider: Provider,
    state: Mutex<StreamState>,
    chunks: AtomicU64,
    tokens: AtomicU64,
    started: Instant,
    cancelled: AtomicBool,
    error: Mutex<Option<String>>,
    sender: mpsc::Sender<StreamChunk>,
}

impl StreamSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Mark the outbound provider call as started
    pub fn mark_connecting(&self) {
        let mut state = self.state.lock();
        if *state == StreamState::Idle {
            *state = StreamState::Connecting;
        }
    }

    /// Deliver one chunk to the consumer
    ///
    /// A no-op once cancelled; the chunk is dropped, not delivered.
    pub async fn process_chunk(&self, data: &str) -> Result<()> {
        if self.is_cancelled() {
            debug!(session = %self.id, "dropping chunk for cancelled session");
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            if matches!(*state, StreamState::Idle | StreamState::Connecting) {
                *state = StreamState::Streaming;
            }
        }
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.tokens
            .fetch_add(estimate_tokens(data), Ordering::Relaxed);

        if self
            .sender
            .send(StreamChunk {
                data: data.to_string(),
            })
            .await
            .is_err()
        {
            // Receiver went away; treat as cancellation on the next boundary
            self.cancelled.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Finish the stream successfully and return final metadata
    pub fn complete(&self) -> StreamSummary {
        *self.state.lock() = StreamState::Completed;
        self.summary(true, None)
    }

    /// Finish the stream with an error
    pub fn fail(&self, message: impl Into<String>) -> StreamSummary {
        let message = message.into();
        *self.state.lock() = StreamState::Error;
        *self.error.lock() = Some(message.clone());
        self.summary(false, Some(message))
    }

    /// Request cancellation; honored at the next chunk boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        *self.state.lock() = StreamState::Cancelled;
        debug!(session = %self.id, "stream cancelled");
    }

    fn summary(&self, success: bool, error: Option<String>) -> StreamSummary {
        StreamSummary {
            session_id: self.id,
            provider: self.provider,
            total_chunks: self.chunks.load(Ordering::Relaxed),
            total_tokens: self.tokens.load(Ordering::Relaxed),
            latency_ms: self.started.elapsed().as_millis() as u64,
            success,
            error,
        }
    }
}

/// Adapt a session's chunk receiver into a `Stream` for combinator use
pub fn chunk_stream(receiver: mpsc::Receiver<StreamChunk>) -> ReceiverStream<StreamChunk> {
    ReceiverStream::new(receiver)
}

/// Bounded pool of streaming sessions
pub struct StreamManager {
    sessions: DashMap<Uuid, Arc<StreamSession>>,
    config: StreamingConfig,
}

impl StreamManager {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Allocate a new session in `idle`
    ///
    /// Fails with a policy error when the pool is at its cap.
    pub fn create_stream(
        &self,
        provider: Provider,
    ) -> Result<(Arc<StreamSession>, mpsc::Receiver<StreamChunk>)> {
        if self.sessions.len() >= self.config.max_concurrent_streams {
            warn!(
                limit = self.config.max_concurrent_streams,
                "stream pool at capacity, rejecting session"
            );
            return Err(GatewayError::Policy(PolicyError::TooManyStreams {
                limit: self.config.max_concurrent_streams,
            }));
        }

        let (sender, receiver) = mpsc::channel(self.config.channel_capacity);
        let session = Arc::new(StreamSession {
            id: Uuid::new_v4(),
            provider,
            state: Mutex::new(StreamState::Idle),
            chunks: AtomicU64::new(0),
            tokens: AtomicU64::new(0),
            started: Instant::now(),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
            sender,
        });
        self.sessions.insert(session.id, Arc::clone(&session));
        debug!(session = %session.id, provider = %provider, "stream session created");
        Ok((session, receiver))
    }

    /// Remove a finished session from the pool
    pub fn remove(&self, id: Uuid) {
        self.sessions.remove(&id);
    }

    /// Number of sessions currently tracked
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
