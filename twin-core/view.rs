use crate::position::Position;

/// What the orchestration layer needs from a pane's text widget.
///
/// Inbound widget events (`on_change`, `on_cursor_change`, `on_scroll`) are
/// not part of this trait; the host forwards them to the orchestrator and the
/// scroll synchronizer.
pub trait EditorWidget: Send + Sync {
  fn cursor_position(&self) -> Option<Position>;

  fn set_cursor_position(&self, position: Position);

  /// Scroll so that `ratio` (in `[0, 1]`) of the overflow is above the view.
  fn scroll_to(&self, ratio: f64);

  /// Show content written by the opposite pane's conversion.
  ///
  /// Widgets are free to report this as an ordinary change; the feedback
  /// guard absorbs that echo.
  fn set_text(&self, text: &str);
}

/// Scroll position as a fraction of the scrollable overflow.
///
/// Content that does not overflow always reports `0`.
pub fn scroll_ratio(scroll_top: f64, scroll_height: f64, client_height: f64) -> f64 {
  let overflow = scroll_height - client_height;
  if overflow <= 0.0 || !overflow.is_finite() {
    return 0.0;
  }
  (scroll_top / overflow).clamp(0.0, 1.0)
}
