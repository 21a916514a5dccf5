use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;
use twin_core::{
  ConversionOutcome,
  Direction,
  MapDirection,
  MappedConversion,
  ParseError,
  Position,
  SourceMapping,
};

use crate::{
  channel::{
    ChannelEvent,
    WorkerChannel,
  },
  correlator::Correlator,
  wire::{
    RawOutcome,
    RequestBody,
  },
};

/// Typed conversion calls over the correlator.
///
/// Every failure comes back as a [`ParseError`]: converter-reported ones
/// unchanged, transport faults as `RuntimeError` with a zero span.
pub struct ConverterGateway {
  correlator: Arc<Correlator>,
}

impl ConverterGateway {
  pub fn new(correlator: Arc<Correlator>) -> Self {
    Self { correlator }
  }

  /// Build a gateway over `channel` and start draining its `events` on the
  /// current tokio runtime.
  pub fn start(
    channel: impl WorkerChannel + 'static,
    events: UnboundedReceiver<ChannelEvent>,
  ) -> Arc<Self> {
    let correlator = Arc::new(Correlator::new(channel));
    tokio::spawn(correlator.clone().listen(events));
    Arc::new(Self::new(correlator))
  }

  pub async fn convert(
    &self,
    direction: Direction,
    text: &str,
    width: Option<u32>,
  ) -> ConversionOutcome<String> {
    self
      .call(RequestBody::Convert {
        direction,
        input: text.to_string(),
        width,
      })
      .await
  }

  pub async fn convert_with_mapping(
    &self,
    direction: Direction,
    text: &str,
  ) -> ConversionOutcome<MappedConversion> {
    self
      .call(RequestBody::ConvertWithMapping {
        direction,
        input: text.to_string(),
      })
      .await
  }

  /// Translate `point` through `mappings` on the worker. Any failure is
  /// logged and treated as no correspondence.
  pub async fn map_position(
    &self,
    mappings: &[SourceMapping],
    direction: MapDirection,
    point: Position,
  ) -> Option<Position> {
    if mappings.is_empty() {
      return None;
    }

    let body = match direction {
      MapDirection::Forward => RequestBody::lookup_forward(mappings.to_vec(), point),
      MapDirection::Backward => RequestBody::lookup_backward(mappings.to_vec(), point),
    };
    let value = match self.correlator.dispatch(body).await {
      Ok(value) => value,
      Err(err) => {
        warn!(error = %err, "position lookup failed");
        return None;
      },
    };
    match serde_json::from_value::<Option<Position>>(value) {
      Ok(position) => position,
      Err(err) => {
        warn!(error = %err, "malformed position lookup result");
        None
      },
    }
  }

  async fn call<T: DeserializeOwned>(&self, body: RequestBody) -> ConversionOutcome<T> {
    match self.correlator.dispatch(body).await {
      Ok(value) => RawOutcome::decode(value),
      Err(err) => Err(ParseError::runtime(err.to_string())),
    }
  }

  pub fn shutdown(&self) {
    self.correlator.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use twin_core::{
    ErrorKind,
    Span,
  };

  use super::*;
  use crate::{
    correlator::tests::Recording,
    flat::FlatConverter,
    worker::WorkerThread,
  };

  #[tokio::test]
  async fn convert_round_trip_through_the_worker() {
    let (worker, events) = WorkerThread::spawn(FlatConverter::default()).unwrap();
    let gateway = ConverterGateway::start(worker, events);

    let yaml = gateway
      .convert(Direction::AToB, r#"{"a":1}"#, None)
      .await
      .unwrap();
    assert_eq!(yaml, "a: 1\n");

    let json = gateway.convert(Direction::BToA, &yaml, None).await.unwrap();
    let before: serde_json::Value = serde_json::from_str(r#"{"a":1}"#).unwrap();
    let after: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(before, after);
  }

  #[tokio::test]
  async fn converter_failures_keep_their_kind_and_span() {
    let (worker, events) = WorkerThread::spawn(FlatConverter::default()).unwrap();
    let gateway = ConverterGateway::start(worker, events);

    let err = gateway
      .convert_with_mapping(Direction::AToB, "{ invalid")
      .await
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert_eq!(err.span.start.column, 2);
  }

  #[tokio::test]
  async fn transport_faults_become_runtime_errors() {
    let channel = Recording::default();
    channel.close();
    let gateway = ConverterGateway::new(Arc::new(Correlator::new(channel)));

    let err = gateway
      .convert(Direction::AToB, "{}", None)
      .await
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.span, Span::zero());
  }

  #[tokio::test]
  async fn map_position_uses_mappings_from_a_conversion() {
    let (worker, events) = WorkerThread::spawn(FlatConverter::default()).unwrap();
    let gateway = ConverterGateway::start(worker, events);

    let input = "{\n  \"name\": \"twin\",\n  \"port\": 8080\n}";
    let converted = gateway
      .convert_with_mapping(Direction::AToB, input)
      .await
      .unwrap();
    assert_eq!(converted.output, "name: \"twin\"\nport: 8080\n");

    // cursor inside the `8080` literal on line 2
    let offset = input.find("8080").unwrap() + 1;
    let cursor = Position::new(2, 11, offset);
    let hit = gateway
      .map_position(&converted.mappings, MapDirection::Forward, cursor)
      .await
      .unwrap();
    assert_eq!(hit, Position::new(1, 6, 19));

    // and back again
    let back = gateway
      .map_position(&converted.mappings, MapDirection::Backward, hit)
      .await
      .unwrap();
    assert_eq!(back.offset, input.find("8080").unwrap());

    assert_eq!(
      gateway
        .map_position(&[], MapDirection::Forward, cursor)
        .await,
      None
    );
  }
}
