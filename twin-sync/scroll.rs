use std::sync::atomic::{
  AtomicBool,
  Ordering,
};

use tracing::trace;
use twin_core::{
  PaneId,
  scroll_ratio,
};

use crate::views::Views;

/// Mirrors the scroll ratio of one pane onto the other.
///
/// Commanding a view to scroll usually makes it report a scroll of its own.
/// While a sync is in flight further scroll events are ignored, until the
/// host's next rendering tick calls [`ScrollSync::on_frame`].
pub struct ScrollSync {
  views:   Views,
  enabled: AtomicBool,
  syncing: AtomicBool,
}

impl ScrollSync {
  pub fn new(views: Views, enabled: bool) -> Self {
    Self {
      views,
      enabled: AtomicBool::new(enabled),
      syncing: AtomicBool::new(false),
    }
  }

  pub fn on_scroll(&self, source: PaneId, ratio: f64) {
    if !self.is_enabled() {
      return;
    }
    if self.syncing.swap(true, Ordering::AcqRel) {
      trace!(pane = source.name(), "ignoring scroll during sync");
      return;
    }
    let ratio = if ratio.is_finite() {
      ratio.clamp(0.0, 1.0)
    } else {
      0.0
    };
    self.views.get(source.opposite()).scroll_to(ratio);
  }

  /// Convenience for hosts that report raw scroll metrics.
  pub fn on_scroll_metrics(
    &self,
    source: PaneId,
    scroll_top: f64,
    scroll_height: f64,
    client_height: f64,
  ) {
    self.on_scroll(source, scroll_ratio(scroll_top, scroll_height, client_height));
  }

  /// Release the re-entrancy guard. Call once per rendering tick.
  pub fn on_frame(&self) {
    self.syncing.store(false, Ordering::Release);
  }

  pub fn set_enabled(&self, enabled: bool) {
    self.enabled.store(enabled, Ordering::Release);
    if !enabled {
      self.syncing.store(false, Ordering::Release);
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled.load(Ordering::Acquire)
  }
}
