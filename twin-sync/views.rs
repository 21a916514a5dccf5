use std::sync::Arc;

use twin_core::{
  EditorWidget,
  PaneId,
};

/// The widgets of both panes.
#[derive(Clone)]
pub struct Views {
  a: Arc<dyn EditorWidget>,
  b: Arc<dyn EditorWidget>,
}

impl Views {
  pub fn new(a: Arc<dyn EditorWidget>, b: Arc<dyn EditorWidget>) -> Self {
    Self { a, b }
  }

  pub fn get(&self, pane: PaneId) -> &Arc<dyn EditorWidget> {
    match pane {
      PaneId::A => &self.a,
      PaneId::B => &self.b,
    }
  }
}
