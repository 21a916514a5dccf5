use std::{
  sync::Arc,
  time::Duration,
};

use tracing::debug;
use twin_core::{
  PaneId,
  PaneState,
  SharedPanes,
};
use twin_event::Debounce;
use twin_protocol::ConverterGateway;

use crate::{
  orchestrator::PaneOrchestrator,
  scroll::ScrollSync,
  views::Views,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
  pub debounce:    Duration,
  /// Width hint for plain conversions.
  pub width:       Option<u32>,
  pub scroll_sync: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      debounce:    Duration::from_millis(Debounce::DEFAULT_MS),
      width:       None,
      scroll_sync: true,
    }
  }
}

/// Two panes kept in sync through one converter gateway.
pub struct EditorPair {
  panes:   SharedPanes,
  a:       PaneOrchestrator,
  b:       PaneOrchestrator,
  scroll:  Arc<ScrollSync>,
  gateway: Arc<ConverterGateway>,
}

impl EditorPair {
  /// Must be called inside a tokio runtime.
  pub fn new(gateway: Arc<ConverterGateway>, views: Views, config: SyncConfig) -> Self {
    let panes = SharedPanes::default();
    let debounce = Debounce::new(config.debounce);
    let orchestrator = |pane| {
      PaneOrchestrator::new(
        pane,
        panes.clone(),
        gateway.clone(),
        views.clone(),
        debounce,
        config.width,
      )
    };
    let a = orchestrator(PaneId::A);
    let b = orchestrator(PaneId::B);
    debug!(?config, "editor pair ready");

    Self {
      scroll: Arc::new(ScrollSync::new(views, config.scroll_sync)),
      panes,
      a,
      b,
      gateway,
    }
  }

  pub fn pane(&self, pane: PaneId) -> &PaneOrchestrator {
    match pane {
      PaneId::A => &self.a,
      PaneId::B => &self.b,
    }
  }

  pub fn panes(&self) -> &SharedPanes {
    &self.panes
  }

  pub fn snapshot(&self, pane: PaneId) -> PaneState {
    self.panes.snapshot(pane)
  }

  pub fn scroll(&self) -> &Arc<ScrollSync> {
    &self.scroll
  }

  /// Stop the converter. Conversions still in flight fail as runtime errors.
  pub fn shutdown(&self) {
    self.gateway.shutdown();
  }
}
