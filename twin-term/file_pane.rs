//! A pane backed by a file on disk.
//!
//! Writes from the opposite pane go straight to the file and are reported
//! back to the pane's orchestrator like an edit, so the feedback guard sees
//! them. The watcher in `main` forwards outside edits.

use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use parking_lot::Mutex;
use tracing::{
  error,
  info,
  trace,
};
use twin_core::{
  EditorWidget,
  PaneId,
  Position,
  file::export,
};
use twin_sync::PaneOrchestrator;

pub struct FilePane {
  pane:   PaneId,
  path:   PathBuf,
  cursor: Mutex<Option<Position>>,
  echo:   OnceLock<PaneOrchestrator>,
}

impl FilePane {
  pub fn new(pane: PaneId, path: PathBuf) -> Self {
    Self {
      pane,
      path,
      cursor: Mutex::new(None),
      echo: OnceLock::new(),
    }
  }

  pub fn pane(&self) -> PaneId {
    self.pane
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn file_name(&self) -> Option<&str> {
    self.path.file_name().and_then(|name| name.to_str())
  }

  /// Route this pane's own writes back to `orchestrator`.
  pub fn attach(&self, orchestrator: PaneOrchestrator) {
    if self.echo.set(orchestrator).is_err() {
      trace!(pane = self.pane.name(), "file pane already attached");
    }
  }

  pub fn is_path(&self, path: &Path) -> bool {
    self.path == path
  }
}

impl EditorWidget for FilePane {
  fn cursor_position(&self) -> Option<Position> {
    *self.cursor.lock()
  }

  fn set_cursor_position(&self, position: Position) {
    *self.cursor.lock() = Some(position);
    info!(
      path = %self.path.display(),
      line = position.line + 1,
      column = position.column + 1,
      "corresponding position"
    );
  }

  fn scroll_to(&self, ratio: f64) {
    trace!(path = %self.path.display(), ratio, "file panes do not scroll");
  }

  fn set_text(&self, text: &str) {
    if let Err(err) = export(text, &self.path) {
      error!(error = %err, "failed to write pane");
      return;
    }
    if let Some(orchestrator) = self.echo.get() {
      orchestrator.on_change(text, None);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn writes_land_in_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.yaml");
    let pane = FilePane::new(PaneId::B, path.clone());

    pane.set_text("a: 1\n");
    assert_eq!(fs::read_to_string(&path).unwrap(), "a: 1\n");
    assert_eq!(pane.file_name(), Some("out.yaml"));
    assert!(pane.is_path(&path));

    assert_eq!(pane.cursor_position(), None);
    pane.set_cursor_position(Position::new(0, 3, 3));
    assert_eq!(pane.cursor_position(), Some(Position::new(0, 3, 3)));
  }
}
