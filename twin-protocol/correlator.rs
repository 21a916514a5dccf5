//! Request/response matching over an unordered message channel.
//!
//! The correlator knows nothing about what a request means. It hands out
//! ids, remembers who is waiting for each one and wakes exactly that caller
//! when a response carrying the id comes back.
//!
//! Two gaps are deliberate and kept as observed behavior:
//!
//! - a channel-level error (one not tied to an id) is logged only; requests
//!   that were in flight stay pending until [`Correlator::shutdown`];
//! - an in-flight request is never superseded. If its caller is still waiting
//!   when the response arrives, the response is delivered even if newer input
//!   has been dispatched since.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{
      AtomicU64,
      Ordering,
    },
  },
  time::Instant,
};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{
  mpsc::UnboundedReceiver,
  oneshot,
};
use tracing::{
  debug,
  error,
  trace,
};

use crate::{
  channel::{
    ChannelError,
    ChannelEvent,
    WorkerChannel,
  },
  wire::{
    RequestBody,
    RequestId,
    WorkerRequest,
    WorkerResponse,
  },
};

type Reply = Result<Value, CorrelatorError>;

struct PendingRequest {
  created_at: Instant,
  method:     &'static str,
  reply:      oneshot::Sender<Reply>,
}

pub struct Correlator {
  channel: Box<dyn WorkerChannel>,
  pending: Mutex<HashMap<RequestId, PendingRequest>>,
  next_id: AtomicU64,
}

impl Correlator {
  pub fn new(channel: impl WorkerChannel + 'static) -> Self {
    Self {
      channel: Box::new(channel),
      pending: Mutex::new(HashMap::new()),
      next_id: AtomicU64::new(0),
    }
  }

  /// Ids are never reused for the lifetime of the correlator.
  fn next_id(&self) -> RequestId {
    RequestId::from_sequence(self.next_id.fetch_add(1, Ordering::Relaxed))
  }

  /// Send `body` to the worker and wait for the response with the same id.
  ///
  /// Resolves with the `success` payload, or fails when the worker answers
  /// with `error`, when the request cannot be posted, or when the correlator
  /// is shut down first.
  pub async fn dispatch(&self, body: RequestBody) -> Reply {
    let id = self.next_id();
    let method = body.method();
    let (reply, rx) = oneshot::channel();

    self.pending.lock().insert(
      id.clone(),
      PendingRequest {
        created_at: Instant::now(),
        method,
        reply,
      },
    );
    trace!(%id, method, "dispatching request");

    if let Err(source) = self.channel.post(WorkerRequest {
      id: id.clone(),
      body,
    }) {
      self.pending.lock().remove(&id);
      return Err(CorrelatorError::Post { id, source });
    }

    match rx.await {
      Ok(reply) => reply,
      Err(_) => Err(CorrelatorError::Closed { id }),
    }
  }

  pub fn on_response(&self, response: WorkerResponse) {
    let Some(pending) = self.pending.lock().remove(response.id()) else {
      debug!(id = %response.id(), "dropping response for unknown request");
      return;
    };
    trace!(
      id = %response.id(),
      method = pending.method,
      elapsed = ?pending.created_at.elapsed(),
      "response received"
    );

    let reply = match response {
      WorkerResponse::Success { result, .. } => Ok(result),
      WorkerResponse::Error { id, message } => Err(CorrelatorError::Rejected { id, message }),
    };
    // The caller may have stopped waiting; that is not an error.
    let _ = pending.reply.send(reply);
  }

  /// Channel-level faults are logged only. Pending requests are left alone.
  pub fn on_channel_error(&self, message: &str) {
    error!(
      pending = self.pending_count(),
      %message,
      "converter channel error"
    );
  }

  pub fn on_event(&self, event: ChannelEvent) {
    match event {
      ChannelEvent::Response(response) => self.on_response(response),
      ChannelEvent::Error(message) => self.on_channel_error(&message),
      ChannelEvent::Closed => self.on_channel_error("worker closed the channel"),
    }
  }

  /// Drain the worker's events until the channel is dropped.
  pub async fn listen(self: Arc<Self>, mut events: UnboundedReceiver<ChannelEvent>) {
    while let Some(event) = events.recv().await {
      self.on_event(event);
    }
    debug!("converter event stream ended");
  }

  /// Close the channel and drop every pending request; their callers fail
  /// with [`CorrelatorError::Closed`].
  pub fn shutdown(&self) {
    self.channel.close();
    let dropped = {
      let mut pending = self.pending.lock();
      let count = pending.len();
      pending.clear();
      count
    };
    if dropped > 0 {
      debug!(dropped, "correlator shut down with requests in flight");
    }
  }

  pub fn pending_count(&self) -> usize {
    self.pending.lock().len()
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelatorError {
  #[error("failed to post request {id}: {source}")]
  Post {
    id:     RequestId,
    #[source]
    source: ChannelError,
  },
  #[error("worker rejected request {id}: {message}")]
  Rejected { id: RequestId, message: String },
  #[error("channel closed before request {id} was answered")]
  Closed { id: RequestId },
}
