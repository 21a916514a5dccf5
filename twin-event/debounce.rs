//! Utilities for declaring an async, debounced hook.

use std::time::Duration;

use futures_executor::block_on;
use tokio::{
  sync::mpsc::{
    self,
    Sender,
    error::TrySendError,
  },
  time::Instant,
};

/// Maximum time to block when sending to a full channel before the event is
/// dropped.
const SEND_TIMEOUT_MS: u64 = 2;

const CHANNEL_CAPACITY: usize = 256;

/// A debounced event handler that runs as a background tokio task.
///
/// Events are delivered through a channel. `handle_event` decides whether an
/// event is handled right away or (re)arms the debounce deadline; when the
/// deadline passes without a new event, `finish_debounce` runs.
pub trait AsyncHook: Send + 'static + Sized {
  type Event: Send + 'static;

  /// Called for every event as soon as it arrives. Returns the deadline to
  /// wait for: a new one to restart the quiet window, `timeout` to keep the
  /// current one, or `None` to cancel it.
  fn handle_event(&mut self, event: Self::Event, timeout: Option<Instant>) -> Option<Instant>;

  /// Called once the debounce deadline is reached.
  fn finish_debounce(&mut self);

  fn spawn(self) -> HookHandle<Self::Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    // Only spawn the worker inside a runtime so unrelated unit tests do not
    // need one.
    if tokio::runtime::Handle::try_current().is_ok() {
      tokio::spawn(run(self, rx));
    } else {
      log::warn!("async hook created outside of a tokio runtime; events will be dropped");
    }
    HookHandle { tx }
  }
}

async fn run<Hook: AsyncHook>(mut hook: Hook, mut rx: mpsc::Receiver<Hook::Event>) {
  let mut deadline = None;
  loop {
    let event = match deadline {
      Some(deadline_) => {
        match tokio::time::timeout_at(deadline_, rx.recv()).await {
          Ok(event) => event,
          Err(_) => {
            hook.finish_debounce();
            deadline = None;
            continue;
          },
        }
      },
      None => rx.recv().await,
    };
    let Some(event) = event else {
      break;
    };
    deadline = hook.handle_event(event, deadline);
  }
  log::debug!("async hook channel closed, stopping");
}

/// Sending side of a spawned [`AsyncHook`].
#[derive(Debug)]
pub struct HookHandle<T> {
  tx: Sender<T>,
}

impl<T> Clone for HookHandle<T> {
  fn clone(&self) -> Self {
    Self {
      tx: self.tx.clone(),
    }
  }
}

impl<T> HookHandle<T> {
  /// See [`send_blocking`].
  pub fn send(&self, event: T) -> bool {
    send_blocking(&self.tx, event)
  }
}

/// A fixed quiet window after which a debounced action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debounce {
  window: Duration,
}

impl Debounce {
  pub const DEFAULT_MS: u64 = 300;

  pub const fn new(window: Duration) -> Self {
    Self { window }
  }

  pub const fn from_millis(millis: u64) -> Self {
    Self::new(Duration::from_millis(millis))
  }

  /// Deadline for an event arriving now; every new event supersedes the
  /// previous deadline.
  pub fn rearm(&self) -> Instant {
    Instant::now() + self.window
  }
}

impl Default for Debounce {
  fn default() -> Self {
    Self::from_millis(Self::DEFAULT_MS)
  }
}

/// Send an event to a channel, blocking only briefly if the channel is full.
///
/// Tries a non-blocking send first. If the channel is full it blocks for at
/// most `SEND_TIMEOUT_MS` and then drops the event. Returns whether the event
/// was delivered.
pub fn send_blocking<T>(tx: &Sender<T>, data: T) -> bool {
  match tx.try_send(data) {
    Ok(()) => true,
    Err(TrySendError::Full(data)) => {
      let sent = block_on(tx.send_timeout(data, Duration::from_millis(SEND_TIMEOUT_MS))).is_ok();
      if !sent {
        log::warn!("dropping event, hook channel is full");
      }
      sent
    },
    Err(TrySendError::Closed(_)) => {
      log::warn!("attempted to send to closed hook channel");
      false
    },
  }
}
