use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::RefCell;

use dynlist::{Clock, FetchRequestEvent, ListContext};
use serde_json::Value;

use crate::ManualClock;

type Evaluator = Box<dyn Fn(&Value) -> Value>;

/// A [`ListContext`] that queues fetch intents for the host to drain.
///
/// Time comes from an owned [`ManualClock`]. Payload data is passed through unchanged unless an
/// evaluator is installed with [`QueueContext::with_evaluator`].
#[derive(Default)]
pub struct QueueContext {
    clock: ManualClock,
    outbox: RefCell<VecDeque<FetchRequestEvent>>,
    evaluator: Option<Evaluator>,
}

impl core::fmt::Debug for QueueContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueContext")
            .field("clock", &self.clock)
            .field("queued", &self.outbox.borrow().len())
            .field("evaluator", &self.evaluator.is_some())
            .finish()
    }
}

impl QueueContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves inbound item data through `evaluator` (e.g. data-binding expansion).
    pub fn with_evaluator(mut self, evaluator: impl Fn(&Value) -> Value + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    pub fn manual_clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn queued(&self) -> usize {
        self.outbox.borrow().len()
    }

    pub fn pop_fetch_request(&self) -> Option<FetchRequestEvent> {
        self.outbox.borrow_mut().pop_front()
    }

    /// Takes every queued fetch intent, oldest first.
    pub fn drain_fetch_requests(&self) -> Vec<FetchRequestEvent> {
        self.outbox.borrow_mut().drain(..).collect()
    }
}

impl ListContext for QueueContext {
    fn evaluate(&self, data: &Value) -> Value {
        match &self.evaluator {
            Some(evaluator) => evaluator(data),
            None => data.clone(),
        }
    }

    fn push_fetch_request(&self, event: FetchRequestEvent) {
        self.outbox.borrow_mut().push_back(event);
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}
