use thiserror::Error;

use crate::wire::{
  WorkerRequest,
  WorkerResponse,
};

/// Something the worker side of a channel reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
  Response(WorkerResponse),
  /// A fault that is not tied to any request id.
  Error(String),
  /// The worker went away; nothing else will arrive.
  Closed,
}

/// Outbound half of the message boundary to a converter worker.
///
/// Inbound traffic is delivered separately as a stream of [`ChannelEvent`]s,
/// which the correlator drains.
pub trait WorkerChannel: Send + Sync {
  fn post(&self, request: WorkerRequest) -> Result<(), ChannelError>;

  /// Tear the channel down. Further posts fail with [`ChannelError::Closed`].
  fn close(&self);
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
  #[error("worker channel is closed")]
  Closed,
  #[error("failed to deliver request: {0}")]
  Send(String),
}
