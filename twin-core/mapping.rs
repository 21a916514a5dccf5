//! Source mappings and the pure position lookup over them.
//!
//! A conversion yields an ordered list of [`SourceMapping`]s. Each record says
//! that a range of the source text and a range of the target text denote the
//! same logical element. Ranges nest (an object and its first key can share a
//! start), so lookups pick the innermost match.

use serde::{
  Deserialize,
  Serialize,
};

use crate::{
  error::ParseError,
  position::{
    Position,
    Span,
  },
};

/// Which way a conversion runs between the two formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
  AToB,
  BToA,
}

/// Which side of a mapping table a lookup reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MapDirection {
  /// Point is in source space, answer is in target space.
  Forward,
  /// Point is in target space, answer is in source space.
  Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
  pub source_start: Position,
  pub source_end:   Position,
  pub target_start: Position,
  pub target_end:   Position,
}

impl SourceMapping {
  pub fn new(source: Span, target: Span) -> Self {
    Self {
      source_start: source.start,
      source_end:   source.end,
      target_start: target.start,
      target_end:   target.end,
    }
  }

  pub fn source(&self) -> Span {
    Span::new(self.source_start, self.source_end)
  }

  pub fn target(&self) -> Span {
    Span::new(self.target_start, self.target_end)
  }

  /// The range a lookup in `direction` is matched against.
  fn lookup_side(&self, direction: MapDirection) -> Span {
    match direction {
      MapDirection::Forward => self.source(),
      MapDirection::Backward => self.target(),
    }
  }

  /// The range a lookup in `direction` answers with.
  fn answer_side(&self, direction: MapDirection) -> Span {
    match direction {
      MapDirection::Forward => self.target(),
      MapDirection::Backward => self.source(),
    }
  }
}

/// Output of a conversion that also reports its mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedConversion {
  pub output:   String,
  pub mappings: Vec<SourceMapping>,
}

/// `Success(T)` or `Failure(ParseError)`; conversion failures are values,
/// never panics.
pub type ConversionOutcome<T> = Result<T, ParseError>;

/// Translate `point` across `mappings`.
///
/// A mapping is a candidate when its lookup side contains `point.offset`
/// (`start <= offset < end`). The candidate with the shortest range wins;
/// among equally short ranges the one appearing last wins. The answer is the
/// start of the winner's opposite range. `None` means "no correspondence",
/// which callers treat as "stay put".
pub fn map_position(
  mappings: &[SourceMapping],
  direction: MapDirection,
  point: Position,
) -> Option<Position> {
  let mut best: Option<(&SourceMapping, usize)> = None;
  for mapping in mappings {
    let range = mapping.lookup_side(direction);
    if !range.contains(point.offset) {
      continue;
    }
    let len = range.len();
    match best {
      Some((_, best_len)) if len > best_len => {},
      _ => best = Some((mapping, len)),
    }
  }

  best.map(|(mapping, _)| mapping.answer_side(direction).start)
}
