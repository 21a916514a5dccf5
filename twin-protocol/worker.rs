//! The worker side of the boundary: a [`ConverterService`] answering wire
//! requests, run on its own thread.

use std::{
  panic::{
    AssertUnwindSafe,
    catch_unwind,
  },
  sync::mpsc::{
    Receiver,
    Sender,
    channel,
  },
  thread::{
    self,
    JoinHandle,
  },
};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{
  UnboundedReceiver,
  UnboundedSender,
  unbounded_channel,
};
use tracing::{
  debug,
  warn,
};
use twin_core::{
  ConversionOutcome,
  Direction,
  MapDirection,
  MappedConversion,
  Position,
  SourceMapping,
  map_position,
};

use crate::{
  channel::{
    ChannelError,
    ChannelEvent,
    WorkerChannel,
  },
  wire::{
    RawOutcome,
    RequestBody,
    WorkerRequest,
    WorkerResponse,
  },
};

/// The external conversion engine, treated as a black box.
pub trait ConverterService: Send + 'static {
  fn convert(
    &mut self,
    direction: Direction,
    input: &str,
    width: Option<u32>,
  ) -> ConversionOutcome<String>;

  fn convert_with_mapping(
    &mut self,
    direction: Direction,
    input: &str,
  ) -> ConversionOutcome<MappedConversion>;

  fn lookup_forward(&self, mappings: &[SourceMapping], point: Position) -> Option<Position> {
    map_position(mappings, MapDirection::Forward, point)
  }

  fn lookup_backward(&self, mappings: &[SourceMapping], point: Position) -> Option<Position> {
    map_position(mappings, MapDirection::Backward, point)
  }
}

/// Answer one request. Never fails: serialization faults and panics inside
/// the service become `error` responses for the request's id.
pub fn handle_request<S: ConverterService + ?Sized>(
  service: &mut S,
  request: WorkerRequest,
) -> WorkerResponse {
  let WorkerRequest { id, body } = request;
  let method = body.method();

  let result = catch_unwind(AssertUnwindSafe(|| {
    match body {
      RequestBody::Convert {
        direction,
        input,
        width,
      } => RawOutcome::encode(&service.convert(direction, &input, width)),
      RequestBody::ConvertWithMapping { direction, input } => {
        RawOutcome::encode(&service.convert_with_mapping(direction, &input))
      },
      RequestBody::LookupForward {
        mappings,
        line,
        column,
        offset,
      } => {
        serde_json::to_value(service.lookup_forward(&mappings, Position::new(line, column, offset)))
      },
      RequestBody::LookupBackward {
        mappings,
        line,
        column,
        offset,
      } => {
        serde_json::to_value(service.lookup_backward(&mappings, Position::new(line, column, offset)))
      },
    }
  }));

  match result {
    Ok(Ok(result)) => WorkerResponse::Success { id, result },
    Ok(Err(err)) => {
      WorkerResponse::Error {
        id,
        message: format!("failed to encode {method} result: {err}"),
      }
    },
    Err(panic) => {
      let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "converter panicked".to_string());
      warn!(%id, method, %message, "converter panicked while handling request");
      WorkerResponse::Error { id, message }
    },
  }
}

enum WorkerCommand {
  Request(WorkerRequest),
  Shutdown,
}

/// A converter service running on a dedicated thread, reached through
/// message passing only.
pub struct WorkerThread {
  command_tx: Mutex<Option<Sender<WorkerCommand>>>,
  worker:     Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
  pub fn spawn<S: ConverterService>(
    service: S,
  ) -> Result<(Self, UnboundedReceiver<ChannelEvent>), WorkerError> {
    let (command_tx, command_rx) = channel();
    let (event_tx, event_rx) = unbounded_channel();

    let worker = thread::Builder::new()
      .name("twin-converter".into())
      .spawn(move || run_worker(service, command_rx, event_tx))
      .map_err(WorkerError::Spawn)?;

    Ok((
      Self {
        command_tx: Mutex::new(Some(command_tx)),
        worker:     Mutex::new(Some(worker)),
      },
      event_rx,
    ))
  }

  pub fn shutdown(&self) -> Result<(), WorkerError> {
    if let Some(tx) = self.command_tx.lock().take() {
      let _ = tx.send(WorkerCommand::Shutdown);
    }

    let worker = self.worker.lock().take();
    if let Some(worker) = worker {
      worker.join().map_err(|_| WorkerError::Panicked)?;
    }
    Ok(())
  }
}

impl WorkerChannel for WorkerThread {
  fn post(&self, request: WorkerRequest) -> Result<(), ChannelError> {
    let guard = self.command_tx.lock();
    let Some(tx) = guard.as_ref() else {
      return Err(ChannelError::Closed);
    };
    tx.send(WorkerCommand::Request(request))
      .map_err(|_| ChannelError::Closed)
  }

  fn close(&self) {
    if let Err(err) = self.shutdown() {
      warn!(error = %err, "failed to stop converter worker");
    }
  }
}

impl Drop for WorkerThread {
  fn drop(&mut self) {
    let _ = self.shutdown();
  }
}

/// A converter service answering on the posting thread.
///
/// Responses are queued before `post` returns. Suited to one-shot use and to
/// tests that drive a paused clock, where a reply from a foreign thread would
/// race the clock.
pub struct InlineWorker<S> {
  service:  Mutex<Option<S>>,
  event_tx: UnboundedSender<ChannelEvent>,
}

impl<S: ConverterService> InlineWorker<S> {
  pub fn new(service: S) -> (Self, UnboundedReceiver<ChannelEvent>) {
    let (event_tx, event_rx) = unbounded_channel();
    (
      Self {
        service: Mutex::new(Some(service)),
        event_tx,
      },
      event_rx,
    )
  }
}

impl<S: ConverterService> WorkerChannel for InlineWorker<S> {
  fn post(&self, request: WorkerRequest) -> Result<(), ChannelError> {
    let mut service = self.service.lock();
    let service = service.as_mut().ok_or(ChannelError::Closed)?;
    let response = handle_request(service, request);
    self
      .event_tx
      .send(ChannelEvent::Response(response))
      .map_err(|_| ChannelError::Closed)
  }

  fn close(&self) {
    if self.service.lock().take().is_some() {
      let _ = self.event_tx.send(ChannelEvent::Closed);
    }
  }
}

#[derive(Debug, Error)]
pub enum WorkerError {
  #[error("failed to spawn converter worker thread: {0}")]
  Spawn(std::io::Error),
  #[error("converter worker thread panicked")]
  Panicked,
}

fn run_worker<S: ConverterService>(
  mut service: S,
  command_rx: Receiver<WorkerCommand>,
  event_tx: UnboundedSender<ChannelEvent>,
) {
  debug!("converter worker started");

  while let Ok(command) = command_rx.recv() {
    match command {
      WorkerCommand::Request(request) => {
        let response = handle_request(&mut service, request);
        if event_tx.send(ChannelEvent::Response(response)).is_err() {
          debug!("response receiver dropped, stopping converter worker");
          break;
        }
      },
      WorkerCommand::Shutdown => break,
    }
  }

  debug!("converter worker stopped");
  let _ = event_tx.send(ChannelEvent::Closed);
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use twin_core::{
    ParseError,
    Span,
  };

  use super::*;

  struct Upper;

  impl ConverterService for Upper {
    fn convert(
      &mut self,
      _direction: Direction,
      input: &str,
      _width: Option<u32>,
    ) -> ConversionOutcome<String> {
      if input.contains("panic") {
        panic!("asked to panic");
      }
      if input.is_empty() {
        return Err(ParseError::syntax("empty document", Span::zero()));
      }
      Ok(input.to_uppercase())
    }

    fn convert_with_mapping(
      &mut self,
      direction: Direction,
      input: &str,
    ) -> ConversionOutcome<MappedConversion> {
      Ok(MappedConversion {
        output:   self.convert(direction, input, None)?,
        mappings: Vec::new(),
      })
    }
  }

  fn convert(id: &str, input: &str) -> WorkerRequest {
    WorkerRequest {
      id:   id.into(),
      body: RequestBody::Convert {
        direction: Direction::AToB,
        input:     input.into(),
        width:     None,
      },
    }
  }

  #[test]
  fn handle_request_wraps_outcomes() {
    let response = handle_request(&mut Upper, convert("1", "abc"));
    assert_eq!(
      response,
      WorkerResponse::Success {
        id:     "1".into(),
        result: json!({"tag": "Ok", "val": "ABC"}),
      }
    );

    let WorkerResponse::Success { result, .. } = handle_request(&mut Upper, convert("2", "")) else {
      panic!("converter failures are successful responses");
    };
    assert_eq!(result["tag"], "Err");
  }

  #[test]
  fn panics_become_error_responses() {
    let response = handle_request(&mut Upper, convert("7", "panic"));
    assert_eq!(
      response,
      WorkerResponse::Error {
        id:      "7".into(),
        message: "asked to panic".into(),
      }
    );
  }

  #[test]
  fn lookups_default_to_the_position_mapper() {
    let request = WorkerRequest {
      id:   "3".into(),
      body: RequestBody::lookup_forward(Vec::new(), Position::zero()),
    };
    assert_eq!(
      handle_request(&mut Upper, request),
      WorkerResponse::Success {
        id:     "3".into(),
        result: json!(null),
      }
    );
  }

  #[tokio::test]
  async fn thread_worker_answers_and_reports_closure() {
    let (worker, mut events) = WorkerThread::spawn(Upper).unwrap();
    worker.post(convert("a", "x")).unwrap();

    let Some(ChannelEvent::Response(response)) = events.recv().await else {
      panic!("expected a response");
    };
    assert_eq!(response.id().as_str(), "a");

    worker.close();
    assert_eq!(events.recv().await, Some(ChannelEvent::Closed));
    assert_eq!(worker.post(convert("b", "x")), Err(ChannelError::Closed));
  }

  #[test]
  fn inline_worker_queues_the_response_before_returning() {
    let (worker, mut events) = InlineWorker::new(Upper);
    worker.post(convert("a", "x")).unwrap();

    let Ok(ChannelEvent::Response(response)) = events.try_recv() else {
      panic!("expected a queued response");
    };
    assert_eq!(response.id().as_str(), "a");

    worker.close();
    assert_eq!(events.try_recv(), Ok(ChannelEvent::Closed));
    assert_eq!(worker.post(convert("b", "x")), Err(ChannelError::Closed));
  }
}
