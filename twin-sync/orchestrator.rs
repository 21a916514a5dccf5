//! Per-pane conversion pipeline.
//!
//! Edits land in the pane's state right away. The text also goes into a
//! pending slot that every later edit overwrites, and the hook task (re)arms
//! its debounce deadline. When the deadline passes the hook checks the
//! shared feedback guard: content that the opposite pane's conversion just
//! wrote is not converted back. Anything else is converted with mappings
//! and written into the opposite pane.
//!
//! Imports skip the debounce. They run a plain conversion first so the
//! opposite pane fills quickly, then a mapped one to refresh the mappings.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{
  debug,
  trace,
  warn,
};
use twin_core::{
  ConversionOutcome,
  MapDirection,
  MappedConversion,
  PaneId,
  ParseError,
  Position,
  SharedPanes,
  SourceMapping,
};
use twin_event::{
  AsyncHook,
  Debounce,
  HookHandle,
};
use twin_protocol::ConverterGateway;

use crate::views::Views;

/// Latest edit that has not been converted yet, with the caret position
/// that came with it.
type PendingEdit = Arc<Mutex<Option<(String, Option<Position>)>>>;

/// Everything a pane's background work touches.
struct PaneContext {
  pane:    PaneId,
  panes:   SharedPanes,
  gateway: Arc<ConverterGateway>,
  views:   Views,
  width:   Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaneEvent {
  /// Content was edited. The text waits in the pane's pending slot.
  Edited,
  /// Content was replaced wholesale, e.g. by loading a file.
  Imported { text: String },
  /// The caret moved without an edit.
  CursorMoved(Position),
}

struct PaneHook {
  context:  Arc<PaneContext>,
  debounce: Debounce,
  pending:  PendingEdit,
}

impl AsyncHook for PaneHook {
  type Event = PaneEvent;

  fn handle_event(&mut self, event: Self::Event, timeout: Option<Instant>) -> Option<Instant> {
    match event {
      PaneEvent::Edited => Some(self.debounce.rearm()),
      PaneEvent::Imported { text } => {
        tokio::spawn(import(self.context.clone(), text));
        None
      },
      PaneEvent::CursorMoved(cursor) => {
        tokio::spawn(follow_cursor(self.context.clone(), cursor));
        timeout
      },
    }
  }

  fn finish_debounce(&mut self) {
    let Some((text, cursor)) = self.pending.lock().take() else {
      return;
    };
    let pane = self.context.pane;

    {
      let mut panes = self.context.panes.lock();
      if panes.guard.take_if_from(pane.opposite()) {
        debug!(
          pane = pane.name(),
          "content came from the opposite pane, not converting back"
        );
        return;
      }
      panes.pane_mut(pane).converting = true;
    }

    tokio::spawn(convert(self.context.clone(), text, cursor));
  }
}

async fn convert(context: Arc<PaneContext>, text: String, cursor: Option<Position>) {
  let pane = context.pane;
  let outcome = context
    .gateway
    .convert_with_mapping(pane.direction(), &text)
    .await;
  context.panes.lock().pane_mut(pane).converting = false;

  if let Some(mappings) = apply_mapped(&context, outcome)
    && let Some(cursor) = cursor
  {
    move_opposite_cursor(&context, &mappings, MapDirection::Forward, cursor).await;
  }
}

async fn import(context: Arc<PaneContext>, text: String) {
  let pane = context.pane;
  context.panes.lock().pane_mut(pane).converting = true;

  let plain = context
    .gateway
    .convert(pane.direction(), &text, context.width)
    .await;
  match plain {
    Ok(output) => apply_output(&context, &output, None),
    Err(err) => apply_error(&context, err),
  }

  let mapped = context
    .gateway
    .convert_with_mapping(pane.direction(), &text)
    .await;
  context.panes.lock().pane_mut(pane).converting = false;
  apply_mapped(&context, mapped);
}

/// Apply a mapped result, returning the new mappings on success.
fn apply_mapped(
  context: &PaneContext,
  outcome: ConversionOutcome<MappedConversion>,
) -> Option<Vec<SourceMapping>> {
  match outcome {
    Ok(MappedConversion { output, mappings }) => {
      apply_output(context, &output, Some(&mappings));
      Some(mappings)
    },
    Err(err) => {
      apply_error(context, err);
      None
    },
  }
}

/// The opposite pane receives `output` and the guard names this pane.
/// Mappings are replaced only when the conversion produced them.
fn apply_output(context: &PaneContext, output: &str, mappings: Option<&[SourceMapping]>) {
  let pane = context.pane;
  let opposite = pane.opposite();
  {
    let mut panes = context.panes.lock();
    panes.guard.arm(pane);
    let state = panes.pane_mut(pane);
    state.error = None;
    if let Some(mappings) = mappings {
      state.mappings_to_opposite = mappings.to_vec();
    }
    // The opposite table describes text that was just replaced.
    let target = panes.pane_mut(opposite);
    target.content = output.to_string();
    target.mappings_to_opposite.clear();
  }
  // Outside the lock: the widget may report this write straight back.
  context.views.get(opposite).set_text(output);
  debug!(
    from = pane.name(),
    to = opposite.name(),
    len = output.len(),
    "applied conversion"
  );
}

/// Only this pane changes: it shows the error and forgets its mappings.
fn apply_error(context: &PaneContext, err: ParseError) {
  let pane = context.pane;
  if err.is_syntax() {
    debug!(pane = pane.name(), error = %err, "converter rejected the input");
  } else {
    warn!(pane = pane.name(), error = %err, "conversion failed");
  }
  let mut panes = context.panes.lock();
  let state = panes.pane_mut(pane);
  state.error = Some(err);
  state.mappings_to_opposite.clear();
}

/// Translate a caret that moved without an edit.
///
/// This pane's own mappings are read forwards. Until it has converted
/// successfully, the opposite pane's mappings are read backwards instead.
async fn follow_cursor(context: Arc<PaneContext>, cursor: Position) {
  let pane = context.pane;
  let (mappings, direction) = {
    let panes = context.panes.lock();
    let own = &panes.pane(pane).mappings_to_opposite;
    if own.is_empty() {
      (
        panes.pane(pane.opposite()).mappings_to_opposite.clone(),
        MapDirection::Backward,
      )
    } else {
      (own.clone(), MapDirection::Forward)
    }
  };
  move_opposite_cursor(&context, &mappings, direction, cursor).await;
}

async fn move_opposite_cursor(
  context: &PaneContext,
  mappings: &[SourceMapping],
  direction: MapDirection,
  cursor: Position,
) {
  match context
    .gateway
    .map_position(mappings, direction, cursor)
    .await
  {
    Some(target) => {
      context
        .views
        .get(context.pane.opposite())
        .set_cursor_position(target)
    },
    None => trace!(pane = context.pane.name(), ?cursor, "no corresponding position"),
  }
}

/// Inbound side of one pane: the host forwards the widget's events here.
#[derive(Clone)]
pub struct PaneOrchestrator {
  pane:    PaneId,
  panes:   SharedPanes,
  pending: PendingEdit,
  hook:    HookHandle<PaneEvent>,
}

impl PaneOrchestrator {
  /// Spawn the pane's hook task. Must be called inside a tokio runtime.
  pub fn new(
    pane: PaneId,
    panes: SharedPanes,
    gateway: Arc<ConverterGateway>,
    views: Views,
    debounce: Debounce,
    width: Option<u32>,
  ) -> Self {
    let context = Arc::new(PaneContext {
      pane,
      panes: panes.clone(),
      gateway,
      views,
      width,
    });
    let pending = PendingEdit::default();
    let hook = PaneHook {
      context,
      debounce,
      pending: pending.clone(),
    }
    .spawn();

    Self {
      pane,
      panes,
      pending,
      hook,
    }
  }

  pub fn pane(&self) -> PaneId {
    self.pane
  }

  pub fn on_change(&self, text: &str, cursor: Option<Position>) {
    self.panes.lock().pane_mut(self.pane).content = text.to_string();
    *self.pending.lock() = Some((text.to_string(), cursor));
    // The slot keeps the latest text even when the notification is dropped.
    if !self.hook.send(PaneEvent::Edited) {
      warn!(pane = self.pane.name(), "edit notification dropped");
    }
  }

  pub fn on_import(&self, filename: Option<&str>, text: &str) {
    {
      let mut panes = self.panes.lock();
      let state = panes.pane_mut(self.pane);
      state.content = text.to_string();
      if let Some(filename) = filename {
        state.filename = Some(filename.to_string());
      }
    }
    if self.pending.lock().take().is_some() {
      trace!(pane = self.pane.name(), "import cancelled a pending edit");
    }
    let event = PaneEvent::Imported {
      text: text.to_string(),
    };
    if !self.hook.send(event) {
      warn!(pane = self.pane.name(), "import notification dropped");
    }
  }

  pub fn on_cursor_change(&self, cursor: Position) {
    self.hook.send(PaneEvent::CursorMoved(cursor));
  }
}
