//! Seams to the host: the item container, the clock, and the evaluation context.
//!
//! All calls into these traits happen synchronously from inside an engine entry point. An
//! implementation must not call back into the engine from within a trait method; deferred work
//! (timeouts, fetch responses) re-enters through the public entry points later.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use serde_json::Value;

use crate::{FetchRequestEvent, TimeoutId};

/// The windowed item container owned by the UI layer.
///
/// Indexes are local to the container (`0..len()`).
pub trait ListWindow {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `items` before `index` (`index == len()` appends).
    fn insert(&mut self, index: usize, items: Vec<Value>) -> bool;

    /// Removes `count` items starting at `index`.
    fn remove(&mut self, index: usize, count: usize) -> bool;

    /// Overwrites `items.len()` slots starting at `index`.
    fn replace(&mut self, index: usize, items: Vec<Value>) -> bool;
}

/// Shared handle to a host container. The engine keeps only a `Weak` of it.
pub type WindowHandle = Rc<RefCell<dyn ListWindow>>;

/// A one-shot callback scheduled on a [`Clock`].
pub type TimeoutCallback = Box<dyn FnOnce()>;

/// One-shot timer service.
pub trait Clock {
    fn set_timeout(&self, delay_ms: u64, callback: TimeoutCallback) -> TimeoutId;

    /// Cancels a pending timeout. A cancelled timeout must never fire; unknown ids are ignored.
    fn clear_timeout(&self, id: TimeoutId);
}

/// The execution/evaluation context a connection lives in.
pub trait ListContext {
    /// Resolves raw payload data into concrete items (data-binding evaluation).
    ///
    /// The default performs no evaluation.
    fn evaluate(&self, data: &Value) -> Value {
        data.clone()
    }

    /// Outbound intent channel: queues a fetch request for the host to perform.
    fn push_fetch_request(&self, event: FetchRequestEvent);

    fn clock(&self) -> &dyn Clock;
}
