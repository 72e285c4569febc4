use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use dynlist::{
    Configuration, Connection, DynamicListProvider, FetchRequest, FetchRequestEvent, ListContext,
    ListError, ListWindow,
};
use serde_json::{Value, json};

use crate::{QueueContext, VecWindow};

struct HostedList {
    connection: Connection,
    items: Rc<RefCell<VecWindow>>,
}

/// A framework-neutral host that owns a provider, its context and every connected container.
///
/// This type does no I/O. Adapters drive it by:
/// - forwarding the intents from `take_fetch_requests` to the remote side
/// - feeding responses and push-updates back through `process_update`
/// - calling `tick(now_ms)` from a frame or timer tick so fetch timeouts can fire
///
/// Errors accumulate in the provider; drain them with `take_errors` (or `take_error_records` for
/// the JSON shape) and report them however the host sees fit.
pub struct Host {
    provider: DynamicListProvider,
    context: Rc<QueueContext>,
    lists: BTreeMap<String, HostedList>,
}

impl core::fmt::Debug for Host {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Host")
            .field("provider", &self.provider)
            .field("context", &self.context)
            .field("lists", &self.lists.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Host {
    pub fn new(configuration: Configuration) -> Self {
        Self::with_context(configuration, QueueContext::new())
    }

    pub fn with_context(configuration: Configuration, context: QueueContext) -> Self {
        Self {
            provider: DynamicListProvider::new(configuration),
            context: Rc::new(context),
            lists: BTreeMap::new(),
        }
    }

    pub fn provider(&self) -> &DynamicListProvider {
        &self.provider
    }

    pub fn context(&self) -> &QueueContext {
        &self.context
    }

    /// Connects a new list described by `source_definition`, seeding its container with
    /// `items` (already positioned at `startIndex`).
    pub fn connect(
        &mut self,
        source_definition: &Value,
        items: Vec<Value>,
    ) -> Result<Connection, ListError> {
        let window = Rc::new(RefCell::new(VecWindow::from_items(items)));
        let context = Rc::downgrade(&self.context) as Weak<dyn ListContext>;
        let items = Rc::downgrade(&window) as Weak<RefCell<dyn ListWindow>>;
        let connection = self.provider.create(source_definition, context, items)?;
        self.lists.insert(
            connection.list_id(),
            HostedList {
                connection: connection.clone(),
                items: window,
            },
        );
        Ok(connection)
    }

    /// Drops the host's handles to `list_id`. Unless the caller still holds a [`Connection`],
    /// this ends the session and cancels its timeouts.
    pub fn disconnect(&mut self, list_id: &str) -> bool {
        self.lists.remove(list_id).is_some()
    }

    pub fn connection(&self, list_id: &str) -> Option<&Connection> {
        self.lists.get(list_id).map(|list| &list.connection)
    }

    /// A snapshot of the materialized window of `list_id`.
    pub fn items(&self, list_id: &str) -> Option<Vec<Value>> {
        self.with_window(list_id, |window| window.items().to_vec())
    }

    pub fn with_window<R>(&self, list_id: &str, f: impl FnOnce(&VecWindow) -> R) -> Option<R> {
        let list = self.lists.get(list_id)?;
        let window = list.items.borrow();
        Some(f(&window))
    }

    /// Tells `list_id` that container index `index` is about to be shown.
    pub fn ensure(&self, list_id: &str, index: usize) -> bool {
        let Some(list) = self.lists.get(list_id) else {
            return false;
        };
        list.connection.ensure(index);
        true
    }

    /// Advances the clock; returns how many timeouts fired.
    pub fn tick(&self, now_ms: u64) -> usize {
        self.context.manual_clock().advance_to(now_ms)
    }

    pub fn take_fetch_requests(&self) -> Vec<FetchRequestEvent> {
        self.context.drain_fetch_requests()
    }

    pub fn process_update(&self, payload: &str) -> bool {
        self.provider.process_update(payload)
    }

    pub fn process_payload(&self, payload: Value) -> bool {
        self.provider.process_payload(payload)
    }

    pub fn take_errors(&self) -> Vec<ListError> {
        self.provider.take_pending_errors()
    }

    /// Drains the errors as JSON records ready to send to the remote side.
    pub fn take_error_records(&self) -> Vec<Value> {
        self.take_errors()
            .iter()
            .filter_map(|error| serde_json::to_value(error).ok())
            .collect()
    }
}

/// Builds the lazy-load response that answers `request` with `items`.
pub fn fetch_response(request: &FetchRequest, items: Vec<Value>) -> Value {
    json!({
        "listId": request.list_id,
        "correlationToken": request.correlation_token,
        "startIndex": request.start_index,
        "items": items,
    })
}
