//! Data model shared by every layer of the pane synchronizer.
//!
//! Nothing in here performs IO on its own except [`file`], and nothing is
//! async. The orchestration crates build on these types.

pub mod error;
pub mod file;
pub mod mapping;
pub mod pane;
pub mod position;
pub mod view;

pub use error::{
  ErrorKind,
  ParseError,
};
pub use mapping::{
  ConversionOutcome,
  Direction,
  MapDirection,
  MappedConversion,
  SourceMapping,
  map_position,
};
pub use pane::{
  FeedbackGuard,
  PaneId,
  PaneState,
  Panes,
  SharedPanes,
};
pub use position::{
  Position,
  Span,
};
pub use view::{
  EditorWidget,
  scroll_ratio,
};
