//! Event plumbing for the pane orchestrators: a debounced async hook running
//! as a background task, and helpers to feed it from synchronous code.

mod debounce;

pub use debounce::{
  AsyncHook,
  Debounce,
  HookHandle,
  send_blocking,
};
