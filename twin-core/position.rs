use ropey::RopeSlice;
use serde::{
  Deserialize,
  Serialize,
};

/// A single point in one pane's text, zero-based.
///
/// `offset` is authoritative and counted in chars. `line` and `column` are
/// derived from the same text and must agree with its line breaks.
#[derive(
  Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
  pub line:   usize,
  pub column: usize,
  pub offset: usize,
}

impl Position {
  pub const fn new(line: usize, column: usize, offset: usize) -> Self {
    Self {
      line,
      column,
      offset,
    }
  }

  pub const fn zero() -> Self {
    Self::new(0, 0, 0)
  }

  /// Derive a consistent position for a char offset in `text`.
  ///
  /// Offsets past the end are clamped to the end of the text.
  pub fn at_offset(text: RopeSlice, offset: usize) -> Self {
    let offset = offset.min(text.len_chars());
    let line = text.char_to_line(offset);
    let column = offset - text.line_to_char(line);
    Self::new(line, column, offset)
  }

  /// Resolve a `(line, column)` pair to a position in `text`.
  ///
  /// Lines past the end resolve to the last line, columns past the end of
  /// a line resolve to that line's end (before its line break).
  pub fn at_coords(text: RopeSlice, line: usize, column: usize) -> Self {
    let line = line.min(text.len_lines().saturating_sub(1));
    let line_start = text.line_to_char(line);
    let line_slice = text.line(line);
    let mut line_len = line_slice.len_chars();
    while line_len > 0 && matches!(line_slice.char(line_len - 1), '\n' | '\r') {
      line_len -= 1;
    }
    let column = column.min(line_len);
    Self::new(line, column, line_start + column)
  }

  /// Whether line/column agree with the offset for `text`.
  pub fn is_consistent_with(&self, text: RopeSlice) -> bool {
    self.offset <= text.len_chars() && Self::at_offset(text, self.offset) == *self
  }
}

/// Half-open range `[start, end)` between two positions of the same text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
  pub start: Position,
  pub end:   Position,
}

impl Span {
  pub const fn new(start: Position, end: Position) -> Self {
    Self { start, end }
  }

  pub const fn zero() -> Self {
    Self::new(Position::zero(), Position::zero())
  }

  pub fn len(&self) -> usize {
    self.end.offset.saturating_sub(self.start.offset)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, offset: usize) -> bool {
    self.start.offset <= offset && offset < self.end.offset
  }

  /// Build a span from two char offsets of `text`.
  pub fn from_offsets(text: RopeSlice, start: usize, end: usize) -> Self {
    Self::new(Position::at_offset(text, start), Position::at_offset(text, end))
  }
}

#[cfg(test)]
mod tests {
  use ropey::Rope;

  use super::*;

  #[test]
  fn at_offset_tracks_line_breaks() {
    let text = Rope::from("ab\ncd\n\nef");
    let slice = text.slice(..);

    assert_eq!(Position::at_offset(slice, 0), Position::new(0, 0, 0));
    assert_eq!(Position::at_offset(slice, 2), Position::new(0, 2, 2));
    assert_eq!(Position::at_offset(slice, 3), Position::new(1, 0, 3));
    assert_eq!(Position::at_offset(slice, 6), Position::new(2, 0, 6));
    assert_eq!(Position::at_offset(slice, 8), Position::new(3, 1, 8));
  }

  #[test]
  fn at_offset_clamps_past_end() {
    let text = Rope::from("ab");
    assert_eq!(
      Position::at_offset(text.slice(..), 40),
      Position::new(0, 2, 2)
    );
  }

  #[test]
  fn at_coords_clamps_to_line_end() {
    let text = Rope::from("abc\nd\n");
    let slice = text.slice(..);

    assert_eq!(Position::at_coords(slice, 0, 10), Position::new(0, 3, 3));
    assert_eq!(Position::at_coords(slice, 1, 0), Position::new(1, 0, 4));
    assert_eq!(Position::at_coords(slice, 9, 9), Position::new(2, 0, 6));
  }

  #[test]
  fn consistency_check_rejects_mismatched_coordinates() {
    let text = Rope::from("ab\ncd");
    let slice = text.slice(..);

    assert!(Position::new(1, 1, 4).is_consistent_with(slice));
    assert!(!Position::new(0, 4, 4).is_consistent_with(slice));
    assert!(!Position::new(1, 3, 6).is_consistent_with(slice));
  }

  #[test]
  fn span_is_half_open() {
    let span = Span::new(Position::new(0, 1, 1), Position::new(0, 4, 4));
    assert!(!span.contains(0));
    assert!(span.contains(1));
    assert!(span.contains(3));
    assert!(!span.contains(4));
    assert_eq!(span.len(), 3);
    assert!(Span::zero().is_empty());
  }

  quickcheck::quickcheck! {
      fn at_offset_is_always_consistent(text: String, offset: usize) -> bool {
          let rope = Rope::from(text.as_str());
          let slice = rope.slice(..);
          let offset = offset % (slice.len_chars() + 1);
          Position::at_offset(slice, offset).is_consistent_with(slice)
      }
  }
}
