//! Messages exchanged between the orchestration side and the converter
//! worker.
//!
//! Every request carries a unique string id and the worker answers each id
//! exactly once, either with `success` or `error`. Responses may arrive in any
//! order.

use std::fmt;

use serde::{
  Deserialize,
  Serialize,
  de::DeserializeOwned,
};
use serde_json::Value;
use twin_core::{
  ConversionOutcome,
  Direction,
  ParseError,
  Position,
  SourceMapping,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
  pub const PREFIX: &'static str = "req-";

  pub fn from_sequence(seq: u64) -> Self {
    Self(format!("{}{seq}", Self::PREFIX))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for RequestId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl fmt::Display for RequestId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
  pub id:   RequestId,
  #[serde(flatten)]
  pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequestBody {
  Convert {
    direction: Direction,
    input:     String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width:     Option<u32>,
  },
  ConvertWithMapping {
    direction: Direction,
    input:     String,
  },
  LookupForward {
    mappings: Vec<SourceMapping>,
    line:     usize,
    column:   usize,
    offset:   usize,
  },
  LookupBackward {
    mappings: Vec<SourceMapping>,
    line:     usize,
    column:   usize,
    offset:   usize,
  },
}

impl RequestBody {
  pub fn method(&self) -> &'static str {
    match self {
      Self::Convert { .. } => "convert",
      Self::ConvertWithMapping { .. } => "convertWithMapping",
      Self::LookupForward { .. } => "lookupForward",
      Self::LookupBackward { .. } => "lookupBackward",
    }
  }

  pub fn lookup_forward(mappings: Vec<SourceMapping>, point: Position) -> Self {
    Self::LookupForward {
      mappings,
      line: point.line,
      column: point.column,
      offset: point.offset,
    }
  }

  pub fn lookup_backward(mappings: Vec<SourceMapping>, point: Position) -> Self {
    Self::LookupBackward {
      mappings,
      line: point.line,
      column: point.column,
      offset: point.offset,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
  Success { id: RequestId, result: Value },
  Error { id: RequestId, message: String },
}

impl WorkerResponse {
  pub fn id(&self) -> &RequestId {
    match self {
      Self::Success { id, .. } | Self::Error { id, .. } => id,
    }
  }
}

/// The converter's own result shape: `{"tag": "Ok" | "Err", "val": ...}`.
///
/// It travels inside a `success` response and is normalized into a
/// [`ConversionOutcome`] by the gateway; nothing past the gateway sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "val")]
pub enum RawOutcome {
  Ok(Value),
  Err(Value),
}

impl RawOutcome {
  pub fn encode<T: Serialize>(outcome: &ConversionOutcome<T>) -> serde_json::Result<Value> {
    let raw = match outcome {
      Ok(value) => Self::Ok(serde_json::to_value(value)?),
      Err(err) => Self::Err(serde_json::to_value(err)?),
    };
    serde_json::to_value(raw)
  }

  /// Decode a raw result value into a typed outcome.
  ///
  /// A payload that does not have the expected shape is reported as a
  /// runtime failure rather than a decoding error.
  pub fn decode<T: DeserializeOwned>(value: Value) -> ConversionOutcome<T> {
    let raw: RawOutcome = serde_json::from_value(value)
      .map_err(|err| ParseError::runtime(format!("malformed converter result: {err}")))?;
    match raw {
      Self::Ok(value) => {
        serde_json::from_value(value)
          .map_err(|err| ParseError::runtime(format!("malformed converter output: {err}")))
      },
      Self::Err(value) => {
        let err: ParseError = serde_json::from_value(value)
          .map_err(|err| ParseError::runtime(format!("malformed converter error: {err}")))?;
        Err(err)
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use twin_core::{
    ErrorKind,
    MappedConversion,
    Span,
  };

  use super::*;

  #[test]
  fn request_wire_shape() {
    let request = WorkerRequest {
      id:   RequestId::from_sequence(3),
      body: RequestBody::Convert {
        direction: Direction::AToB,
        input:     "{}".into(),
        width:     None,
      },
    };
    assert_eq!(
      serde_json::to_value(&request).unwrap(),
      json!({"id": "req-3", "type": "convert", "direction": "aToB", "input": "{}"})
    );

    let parsed: WorkerRequest = serde_json::from_value(json!({
      "id": "x",
      "type": "lookupBackward",
      "mappings": [],
      "line": 1,
      "column": 2,
      "offset": 5,
    }))
    .unwrap();
    assert_eq!(parsed.id.as_str(), "x");
    assert_eq!(
      parsed.body,
      RequestBody::lookup_backward(Vec::new(), Position::new(1, 2, 5))
    );
  }

  #[test]
  fn response_wire_shape() {
    let ok: WorkerResponse =
      serde_json::from_value(json!({"type": "success", "id": "req-1", "result": null})).unwrap();
    assert_eq!(ok.id().as_str(), "req-1");
    assert!(matches!(ok, WorkerResponse::Success { .. }));

    let err: WorkerResponse =
      serde_json::from_value(json!({"type": "error", "id": "req-2", "message": "boom"})).unwrap();
    assert_eq!(
      err,
      WorkerResponse::Error {
        id:      "req-2".into(),
        message: "boom".into(),
      }
    );
  }

  #[test]
  fn raw_outcome_normalizes_success_and_failure() {
    let ok = RawOutcome::encode(&Ok::<_, ParseError>("a: 1\n".to_string())).unwrap();
    assert_eq!(ok, json!({"tag": "Ok", "val": "a: 1\n"}));
    assert_eq!(RawOutcome::decode::<String>(ok), Ok("a: 1\n".to_string()));

    let failure = ParseError::syntax("bad", Span::zero());
    let err = RawOutcome::encode(&Err::<String, _>(failure.clone())).unwrap();
    assert_eq!(RawOutcome::decode::<String>(err), Err(failure));
  }

  #[test]
  fn malformed_raw_outcome_is_a_runtime_error() {
    let err = RawOutcome::decode::<MappedConversion>(json!({"tag": "Ok", "val": 3})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);

    let err = RawOutcome::decode::<String>(json!({"unexpected": true})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
  }
}
