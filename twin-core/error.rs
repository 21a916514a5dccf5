use std::fmt;

use serde::{
  Deserialize,
  Serialize,
};

use crate::position::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
  /// The converter rejected malformed input.
  SyntaxError,
  /// Transport, channel or file fault. Retried implicitly on the next edit.
  RuntimeError,
}

/// A conversion failure as shown in a pane's error badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
  pub message: String,
  pub kind:    ErrorKind,
  pub span:    Span,
}

impl ParseError {
  pub fn syntax(message: impl Into<String>, span: Span) -> Self {
    Self {
      message: message.into(),
      kind: ErrorKind::SyntaxError,
      span,
    }
  }

  /// A fault that did not come from the converter itself. Always carries a
  /// zero span.
  pub fn runtime(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      kind:    ErrorKind::RuntimeError,
      span:    Span::zero(),
    }
  }

  pub fn is_syntax(&self) -> bool {
    self.kind == ErrorKind::SyntaxError
  }

  /// One-based `(line, column)` of the error start, for display.
  pub fn location(&self) -> (usize, usize) {
    (self.span.start.line + 1, self.span.start.column + 1)
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (line, column) = self.location();
    write!(f, "Line {line}, Column {column}: {}", self.message)
  }
}

impl std::error::Error for ParseError {}
