//! Orchestration of one editor pair: a debounced conversion pipeline per
//! pane, a shared feedback guard between them and scroll mirroring.

pub mod orchestrator;
pub mod pair;
pub mod scroll;
pub mod views;

pub use orchestrator::{
  PaneEvent,
  PaneOrchestrator,
};
pub use pair::{
  EditorPair,
  SyncConfig,
};
pub use scroll::ScrollSync;
pub use views::Views;
