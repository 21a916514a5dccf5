//! Content-Length framed JSON over stdio, for converter workers that live in
//! a separate process.

use std::{
  io::{
    BufRead,
    BufReader,
    BufWriter,
    Read,
    Write,
  },
  process::{
    Child,
    ChildStderr,
    ChildStdin,
    ChildStdout,
    Command,
    Stdio,
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
use serde::{
  Serialize,
  de::DeserializeOwned,
};
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

use crate::{
  channel::{
    ChannelError,
    ChannelEvent,
    WorkerChannel,
  },
  wire::{
    WorkerRequest,
    WorkerResponse,
  },
  worker::{
    ConverterService,
    handle_request,
  },
};

enum Outbound {
  Request(WorkerRequest),
  Shutdown,
}

struct Threads {
  reader: Option<JoinHandle<()>>,
  writer: Option<JoinHandle<()>>,
  stderr: Option<JoinHandle<()>>,
}

/// A converter worker running as a child process.
pub struct StdioWorker {
  child:       Mutex<Child>,
  outbound_tx: Mutex<Option<Sender<Outbound>>>,
  threads:     Mutex<Threads>,
}

impl StdioWorker {
  pub fn spawn(
    command: &str,
    args: &[String],
  ) -> Result<(Self, UnboundedReceiver<ChannelEvent>), TransportError> {
    let mut child = Command::new(command)
      .args(args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(TransportError::Spawn)?;

    let stdin = child
      .stdin
      .take()
      .ok_or(TransportError::MissingPipe("stdin"))?;
    let stdout = child
      .stdout
      .take()
      .ok_or(TransportError::MissingPipe("stdout"))?;
    let stderr = child
      .stderr
      .take()
      .ok_or(TransportError::MissingPipe("stderr"))?;

    let (outbound_tx, outbound_rx) = channel();
    let (event_tx, event_rx) = unbounded_channel();

    let threads = Threads {
      writer: Some(spawn_writer_thread(stdin, outbound_rx, event_tx.clone())?),
      reader: Some(spawn_reader_thread(stdout, event_tx)?),
      stderr: Some(spawn_stderr_thread(stderr)?),
    };
    debug!(command, ?args, "converter process started");

    Ok((
      Self {
        child:       Mutex::new(child),
        outbound_tx: Mutex::new(Some(outbound_tx)),
        threads:     Mutex::new(threads),
      },
      event_rx,
    ))
  }

  pub fn shutdown(&self) -> Result<Option<i32>, TransportError> {
    if let Some(tx) = self.outbound_tx.lock().take() {
      let _ = tx.send(Outbound::Shutdown);
    }

    let exit_code = {
      let mut child = self.child.lock();
      match child.try_wait().map_err(TransportError::Wait)? {
        Some(status) => status.code(),
        None => {
          if let Err(err) = child.kill()
            && err.kind() != std::io::ErrorKind::InvalidInput
          {
            return Err(TransportError::Kill(err));
          }
          child.wait().map_err(TransportError::Wait)?.code()
        },
      }
    };

    let mut threads = self.threads.lock();
    join_thread(&mut threads.writer)?;
    join_thread(&mut threads.reader)?;
    join_thread(&mut threads.stderr)?;

    Ok(exit_code)
  }
}

impl WorkerChannel for StdioWorker {
  fn post(&self, request: WorkerRequest) -> Result<(), ChannelError> {
    let guard = self.outbound_tx.lock();
    let tx = guard.as_ref().ok_or(ChannelError::Closed)?;
    tx.send(Outbound::Request(request))
      .map_err(|_| ChannelError::Closed)
  }

  fn close(&self) {
    match self.shutdown() {
      Ok(exit_code) => debug!(?exit_code, "converter process stopped"),
      Err(err) => warn!(error = %err, "failed to stop converter process"),
    }
  }
}

impl Drop for StdioWorker {
  fn drop(&mut self) {
    let _ = self.shutdown();
  }
}

fn spawn_reader_thread(
  stdout: ChildStdout,
  event_tx: UnboundedSender<ChannelEvent>,
) -> Result<JoinHandle<()>, TransportError> {
  thread::Builder::new()
    .name("twin-worker-stdout".into())
    .spawn(move || {
      let mut reader = BufReader::new(stdout);
      let mut header_buffer = String::new();
      let mut body_buffer = Vec::new();

      loop {
        match read_frame::<_, WorkerResponse>(&mut reader, &mut header_buffer, &mut body_buffer) {
          Ok(Some(response)) => {
            let _ = event_tx.send(ChannelEvent::Response(response));
          },
          Ok(None) => {
            let _ = event_tx.send(ChannelEvent::Closed);
            break;
          },
          Err(err) => {
            let _ = event_tx.send(ChannelEvent::Error(err.to_string()));
            break;
          },
        }
      }
    })
    .map_err(TransportError::SpawnThread)
}

fn spawn_writer_thread(
  stdin: ChildStdin,
  outbound_rx: Receiver<Outbound>,
  event_tx: UnboundedSender<ChannelEvent>,
) -> Result<JoinHandle<()>, TransportError> {
  thread::Builder::new()
    .name("twin-worker-stdin".into())
    .spawn(move || {
      let mut writer = BufWriter::new(stdin);
      while let Ok(outbound) = outbound_rx.recv() {
        match outbound {
          Outbound::Request(request) => {
            if let Err(err) = write_frame(&mut writer, &request) {
              let _ = event_tx.send(ChannelEvent::Error(err.to_string()));
              break;
            }
          },
          Outbound::Shutdown => break,
        }
      }
    })
    .map_err(TransportError::SpawnThread)
}

fn spawn_stderr_thread(stderr: ChildStderr) -> Result<JoinHandle<()>, TransportError> {
  thread::Builder::new()
    .name("twin-worker-stderr".into())
    .spawn(move || {
      let mut reader = BufReader::new(stderr);
      let mut line = String::new();
      loop {
        line.clear();
        match reader.read_line(&mut line) {
          Ok(0) => break,
          Ok(_) => {
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
              debug!(target: "twin_protocol::worker_stderr", "{line}");
            }
          },
          Err(err) => {
            debug!(error = %err, "converter stderr stream closed with error");
            break;
          },
        }
      }
    })
    .map_err(TransportError::SpawnThread)
}

/// Answer framed requests from `reader` on `writer` until end of input.
///
/// This is the loop an external worker process runs on its stdio.
pub fn serve_stdio<S, R, W>(service: &mut S, reader: R, writer: W) -> Result<(), TransportError>
where
  S: ConverterService + ?Sized,
  R: BufRead,
  W: Write,
{
  let mut reader = reader;
  let mut writer = BufWriter::new(writer);
  let mut header_buffer = String::new();
  let mut body_buffer = Vec::new();

  while let Some(request) =
    read_frame::<_, WorkerRequest>(&mut reader, &mut header_buffer, &mut body_buffer)?
  {
    let response = handle_request(service, request);
    write_frame(&mut writer, &response)?;
  }
  Ok(())
}

pub fn read_frame<R: BufRead, T: DeserializeOwned>(
  reader: &mut R,
  header_buffer: &mut String,
  body_buffer: &mut Vec<u8>,
) -> Result<Option<T>, TransportError> {
  let mut content_length: Option<usize> = None;
  loop {
    header_buffer.clear();
    let read = reader
      .read_line(header_buffer)
      .map_err(TransportError::Read)?;
    if read == 0 {
      return Ok(None);
    }

    if header_buffer == "\r\n" {
      if content_length.is_some() {
        break;
      }
      continue;
    }

    let header = header_buffer.trim_end_matches(['\r', '\n']);
    if let Some(rest) = header.strip_prefix("Content-Length:") {
      let value = rest.trim();
      let parsed = value
        .parse::<usize>()
        .map_err(|_| TransportError::InvalidContentLength(value.to_string()))?;
      content_length = Some(parsed);
    }
  }

  let content_length = content_length.ok_or(TransportError::MissingContentLength)?;
  body_buffer.resize(content_length, 0);
  reader
    .read_exact(body_buffer)
    .map_err(TransportError::ReadBody)?;
  let message = serde_json::from_slice(body_buffer).map_err(TransportError::ParseJson)?;
  body_buffer.clear();
  Ok(Some(message))
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), TransportError> {
  let body = serde_json::to_vec(message).map_err(TransportError::SerializeJson)?;
  write!(writer, "Content-Length: {}\r\n\r\n", body.len()).map_err(TransportError::WriteHeader)?;
  writer.write_all(&body).map_err(TransportError::WriteBody)?;
  writer.flush().map_err(TransportError::Flush)?;
  Ok(())
}

fn join_thread(handle: &mut Option<JoinHandle<()>>) -> Result<(), TransportError> {
  if let Some(handle) = handle.take() {
    handle.join().map_err(|_| TransportError::ThreadPanicked)?;
  }
  Ok(())
}

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("failed to spawn converter process: {0}")]
  Spawn(std::io::Error),
  #[error("failed to spawn transport thread: {0}")]
  SpawnThread(std::io::Error),
  #[error("missing child {0} pipe")]
  MissingPipe(&'static str),
  #[error("failed to read frame header: {0}")]
  Read(std::io::Error),
  #[error("invalid content-length header value: {0}")]
  InvalidContentLength(String),
  #[error("missing content-length header")]
  MissingContentLength,
  #[error("failed to read frame body: {0}")]
  ReadBody(std::io::Error),
  #[error("failed to parse worker message: {0}")]
  ParseJson(serde_json::Error),
  #[error("failed to serialize worker message: {0}")]
  SerializeJson(serde_json::Error),
  #[error("failed to write frame header: {0}")]
  WriteHeader(std::io::Error),
  #[error("failed to write frame body: {0}")]
  WriteBody(std::io::Error),
  #[error("failed to flush frame body: {0}")]
  Flush(std::io::Error),
  #[error("failed to kill converter process: {0}")]
  Kill(std::io::Error),
  #[error("failed to wait for converter process: {0}")]
  Wait(std::io::Error),
  #[error("transport thread panicked")]
  ThreadPanicked,
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use twin_core::Direction;

  use super::*;
  use crate::{
    flat::FlatConverter,
    wire::{
      RawOutcome,
      RequestBody,
    },
  };

  fn framed(requests: &[WorkerRequest]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for request in requests {
      write_frame(&mut buffer, request).unwrap();
    }
    buffer
  }

  fn read_all(bytes: Vec<u8>) -> Vec<WorkerResponse> {
    let mut reader = Cursor::new(bytes);
    let mut header = String::new();
    let mut body = Vec::new();
    let mut responses = Vec::new();
    while let Some(response) = read_frame(&mut reader, &mut header, &mut body).unwrap() {
      responses.push(response);
    }
    responses
  }

  #[test]
  fn frame_header_carries_body_length() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &serde_json::json!({"a": 1})).unwrap();
    assert_eq!(
      String::from_utf8(buffer).unwrap(),
      "Content-Length: 7\r\n\r\n{\"a\":1}"
    );
  }

  #[test]
  fn serve_answers_every_request_in_order() {
    let requests = vec![
      WorkerRequest {
        id:   "req-0".into(),
        body: RequestBody::Convert {
          direction: Direction::AToB,
          input:     r#"{"a": 1}"#.into(),
          width:     None,
        },
      },
      WorkerRequest {
        id:   "req-1".into(),
        body: RequestBody::Convert {
          direction: Direction::AToB,
          input:     "{ invalid".into(),
          width:     None,
        },
      },
    ];

    let mut output = Vec::new();
    serve_stdio(
      &mut FlatConverter::default(),
      Cursor::new(framed(&requests)),
      &mut output,
    )
    .unwrap();

    let responses = read_all(output);
    assert_eq!(responses.len(), 2);

    let WorkerResponse::Success { id, result } = &responses[0] else {
      panic!("expected success");
    };
    assert_eq!(id.as_str(), "req-0");
    assert_eq!(RawOutcome::decode::<String>(result.clone()), Ok("a: 1\n".into()));

    let WorkerResponse::Success { result, .. } = &responses[1] else {
      panic!("expected success");
    };
    assert!(RawOutcome::decode::<String>(result.clone()).is_err());
  }

  #[test]
  fn invalid_content_length_is_rejected() {
    let mut reader = Cursor::new(b"Content-Length: nope\r\n\r\n{}".to_vec());
    let result = read_frame::<_, serde_json::Value>(&mut reader, &mut String::new(), &mut Vec::new());
    assert!(matches!(result, Err(TransportError::InvalidContentLength(_))));
  }
}
