use std::sync::Arc;

use parking_lot::{
  Mutex,
  MutexGuard,
};

use crate::{
  error::ParseError,
  mapping::{
    Direction,
    SourceMapping,
  },
};

/// One of the two synchronized views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneId {
  /// Format A (JSON with comments).
  A,
  /// Format B (YAML).
  B,
}

impl PaneId {
  pub const fn opposite(self) -> Self {
    match self {
      Self::A => Self::B,
      Self::B => Self::A,
    }
  }

  /// Direction of a conversion whose source is this pane.
  pub const fn direction(self) -> Direction {
    match self {
      Self::A => Direction::AToB,
      Self::B => Direction::BToA,
    }
  }

  pub const fn name(self) -> &'static str {
    match self {
      Self::A => "a",
      Self::B => "b",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneState {
  pub content:              String,
  pub error:                Option<ParseError>,
  /// Mappings of the last successful conversion out of this pane, with this
  /// pane's text on the source side.
  pub mappings_to_opposite: Vec<SourceMapping>,
  pub filename:             Option<String>,
  pub converting:           bool,
}

/// Records which pane's conversion last wrote into the other pane, so the
/// echo of that write is not converted back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedbackGuard {
  #[default]
  None,
  FromA,
  FromB,
}

impl FeedbackGuard {
  pub const fn from_pane(pane: PaneId) -> Self {
    match pane {
      PaneId::A => Self::FromA,
      PaneId::B => Self::FromB,
    }
  }

  pub const fn source(&self) -> Option<PaneId> {
    match self {
      Self::None => None,
      Self::FromA => Some(PaneId::A),
      Self::FromB => Some(PaneId::B),
    }
  }

  pub fn arm(&mut self, source: PaneId) {
    *self = Self::from_pane(source);
  }

  /// Clears the guard and returns true when it names `source`. Any other
  /// value is left alone.
  pub fn take_if_from(&mut self, source: PaneId) -> bool {
    if self.source() == Some(source) {
      *self = Self::None;
      true
    } else {
      false
    }
  }
}

/// State of both panes of one editor pair plus their shared feedback guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Panes {
  a:         PaneState,
  b:         PaneState,
  pub guard: FeedbackGuard,
}

impl Panes {
  pub fn new(a: PaneState, b: PaneState) -> Self {
    Self {
      a,
      b,
      guard: FeedbackGuard::None,
    }
  }

  pub fn pane(&self, id: PaneId) -> &PaneState {
    match id {
      PaneId::A => &self.a,
      PaneId::B => &self.b,
    }
  }

  pub fn pane_mut(&mut self, id: PaneId) -> &mut PaneState {
    match id {
      PaneId::A => &mut self.a,
      PaneId::B => &mut self.b,
    }
  }
}

/// Handle to the [`Panes`] of one editor pair, shared by both orchestrators
/// and the host UI.
///
/// Critical sections are short and never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedPanes(Arc<Mutex<Panes>>);

impl SharedPanes {
  pub fn new(panes: Panes) -> Self {
    Self(Arc::new(Mutex::new(panes)))
  }

  pub fn lock(&self) -> MutexGuard<'_, Panes> {
    self.0.lock()
  }

  pub fn snapshot(&self, id: PaneId) -> PaneState {
    self.lock().pane(id).clone()
  }

  pub fn guard(&self) -> FeedbackGuard {
    self.lock().guard
  }
}
