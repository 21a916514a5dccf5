//! The message boundary between the pane orchestrators and a conversion
//! engine.
//!
//! Requests travel over a [`WorkerChannel`], responses come back as
//! [`ChannelEvent`]s and the [`Correlator`] pairs the two up by id. The
//! [`ConverterGateway`] gives that a typed face. A worker is either an
//! in-process thread ([`WorkerThread`]) or a child process speaking framed
//! JSON over stdio ([`StdioWorker`]).

pub mod channel;
pub mod correlator;
pub mod flat;
pub mod gateway;
pub mod transport;
pub mod wire;
pub mod worker;

pub use channel::{
  ChannelError,
  ChannelEvent,
  WorkerChannel,
};
pub use correlator::{
  Correlator,
  CorrelatorError,
};
pub use flat::FlatConverter;
pub use gateway::ConverterGateway;
pub use transport::{
  StdioWorker,
  TransportError,
  serve_stdio,
};
pub use wire::{
  RawOutcome,
  RequestBody,
  RequestId,
  WorkerRequest,
  WorkerResponse,
};
pub use worker::{
  ConverterService,
  InlineWorker,
  WorkerError,
  WorkerThread,
  handle_request,
};
