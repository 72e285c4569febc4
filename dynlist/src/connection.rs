use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use core::cell::RefCell;

use serde_json::Value;

use crate::provider::ProviderShared;
use crate::window::OffsetWindow;
use crate::{
    Bounds, Configuration, FetchRequest, FetchRequestEvent, ListContext, ListError, ListWindow,
    ReasonCode, TimeoutId, UpdateType,
};

pub(crate) type ConnectionCell = RefCell<ConnectionState>;

struct PendingFetchRequest {
    request: FetchRequest,
    retries: u32,
    timeout: Option<TimeoutId>,
}

pub(crate) struct ConnectionState {
    list_id: String,
    configuration: Configuration,
    provider: Weak<ProviderShared>,
    context: Weak<dyn ListContext>,
    items: Weak<RefCell<dyn ListWindow>>,
    window: OffsetWindow,
    list_version: u64,
    pending_fetch_requests: BTreeMap<String, PendingFetchRequest>,
    updates_cache: BTreeMap<u64, Value>,
    failed: bool,
    lazy_loading_only: bool,
}

impl ConnectionState {
    fn error(&self, reason: ReasonCode, operation_index: Option<i64>, message: &str) -> ListError {
        ListError::new(reason, self.list_id.as_str(), message)
            .with_list_version(self.list_version)
            .with_operation_index(operation_index)
    }
}

impl Drop for ConnectionState {
    fn drop(&mut self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        for pending in self.pending_fetch_requests.values_mut() {
            if let Some(id) = pending.timeout.take() {
                context.clock().clear_timeout(id);
            }
        }
    }
}

/// One synchronization session for one remote list.
///
/// A `Connection` is created by [`crate::DynamicListProvider::create`] and owned by the host
/// (typically next to the container it feeds). The provider only indexes it weakly: dropping the
/// last handle ends the session, cancels its outstanding timeouts and lets the provider purge
/// the entry on its next call.
///
/// The connection itself holds only weak references to its provider, context and container.
/// When any of them is gone, operations that need it become no-ops that report failure.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionCell>,
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Connection")
            .field("list_id", &state.list_id)
            .field("window", &state.window)
            .field("list_version", &state.list_version)
            .field("pending_fetch_requests", &state.pending_fetch_requests.len())
            .field("buffered_updates", &state.updates_cache.len())
            .field("failed", &state.failed)
            .field("lazy_loading_only", &state.lazy_loading_only)
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(
        provider: Weak<ProviderShared>,
        configuration: Configuration,
        context: Weak<dyn ListContext>,
        items: Weak<RefCell<dyn ListWindow>>,
        list_id: String,
        window: OffsetWindow,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ConnectionState {
                list_id,
                configuration,
                provider,
                context,
                items,
                window,
                list_version: 0,
                pending_fetch_requests: BTreeMap::new(),
                updates_cache: BTreeMap::new(),
                failed: false,
                lazy_loading_only: false,
            })),
        }
    }

    pub(crate) fn from_cell(inner: Rc<ConnectionCell>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnectionCell> {
        Rc::downgrade(&self.inner)
    }

    pub fn list_id(&self) -> String {
        self.inner.borrow().list_id.clone()
    }

    /// Last applied push-update version (`0` before any).
    pub fn list_version(&self) -> u64 {
        self.inner.borrow().list_version
    }

    pub fn bounds(&self) -> Bounds {
        self.inner.borrow().window.bounds()
    }

    /// Distance between the lower bound and the container's first slot.
    pub fn offset(&self) -> usize {
        self.inner.borrow().window.offset()
    }

    pub fn max_items(&self) -> usize {
        self.inner.borrow().window.max_items()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.borrow().failed
    }

    pub fn is_lazy_loading_only(&self) -> bool {
        self.inner.borrow().lazy_loading_only
    }

    pub fn pending_fetch_count(&self) -> usize {
        self.inner.borrow().pending_fetch_requests.len()
    }

    pub fn buffered_update_count(&self) -> usize {
        self.inner.borrow().updates_cache.len()
    }

    /// Whether a fetch with this correlation token is in flight.
    pub fn can_process(&self, correlation_token: &str) -> bool {
        self.inner
            .borrow()
            .pending_fetch_requests
            .contains_key(correlation_token)
    }

    /// Whether inbound items can still be applied: not failed, container and context alive.
    pub fn changes_allowed(&self) -> bool {
        let state = self.inner.borrow();
        !state.failed && state.items.strong_count() > 0 && state.context.strong_count() > 0
    }

    pub(crate) fn set_failed(&self) {
        ldebug!(list_id = %self.inner.borrow().list_id, "Connection: entering fail state");
        self.inner.borrow_mut().failed = true;
    }

    pub(crate) fn set_lazy_loading_only(&self) {
        self.inner.borrow_mut().lazy_loading_only = true;
    }

    pub(crate) fn advance_list_version(&self) {
        let mut state = self.inner.borrow_mut();
        state.list_version += 1;
        ltrace!(list_id = %state.list_id, version = state.list_version, "Connection: version advanced");
    }

    fn report(&self, reason: ReasonCode, operation_index: Option<i64>, message: &str) {
        let state = self.inner.borrow();
        let Some(provider) = state.provider.upgrade() else {
            lerror!(list_id = %state.list_id, msg = message, "Connection: provider is gone");
            return;
        };
        provider.report(state.error(reason, operation_index, message));
    }

    /// Serves container-local index `index` from the UI layer, requesting a chunk before or
    /// after the window when the index comes within `cache_chunk_size` of either edge.
    pub fn ensure(&self, index: usize) {
        let (backward, forward) = {
            let state = self.inner.borrow();
            let Some(items) = state.items.upgrade() else {
                return;
            };
            let len = items.borrow().len();
            state
                .window
                .demand(index, len, state.configuration.cache_chunk_size)
        };
        if let Some((position, count)) = backward {
            self.request_fetch(position, count);
        }
        if let Some((position, count)) = forward {
            self.request_fetch(position, count);
        }
    }

    /// Emits a fetch intent for `count` items starting at window position `index`.
    ///
    /// A request identical to one already in flight is not re-issued. Each request gets a
    /// fresh correlation token and a timeout that drives retries.
    pub fn request_fetch(&self, index: usize, count: usize) {
        let Some(context) = self.inner.borrow().context.upgrade() else {
            return;
        };

        let mut state = self.inner.borrow_mut();
        let start_index = state.window.absolute_index(index);
        let in_flight = state.pending_fetch_requests.values().any(|pending| {
            pending.request.list_id == state.list_id
                && pending.request.start_index == start_index
                && pending.request.count == count
        });
        if in_flight {
            ltrace!(list_id = %state.list_id, start_index, count, "Connection: fetch already in flight");
            return;
        }

        let Some(provider) = state.provider.upgrade() else {
            lerror!(list_id = %state.list_id, "Connection: provider is gone, dropping fetch request");
            return;
        };

        let correlation_token = provider.next_correlation_token();
        let request = FetchRequest {
            correlation_token: correlation_token.clone(),
            list_id: state.list_id.clone(),
            start_index,
            count,
        };
        let timeout = self.schedule_timeout(
            &*context,
            state.context.clone(),
            correlation_token.clone(),
            state.configuration.fetch_timeout_ms,
        );
        let retries = provider.configuration().fetch_retries;
        state.pending_fetch_requests.insert(
            correlation_token,
            PendingFetchRequest {
                request: request.clone(),
                retries,
                timeout: Some(timeout),
            },
        );
        let type_name = state.configuration.type_name.clone();
        drop(state);

        ldebug!(
            list_id = %request.list_id,
            token = %request.correlation_token,
            start_index,
            count,
            "Connection: fetch request"
        );
        context.push_fetch_request(FetchRequestEvent { type_name, request });
    }

    fn schedule_timeout(
        &self,
        context: &dyn ListContext,
        weak_context: Weak<dyn ListContext>,
        correlation_token: String,
        delay_ms: u64,
    ) -> TimeoutId {
        let weak = Rc::downgrade(&self.inner);
        context.clock().set_timeout(
            delay_ms,
            Box::new(move || {
                let (Some(inner), Some(context)) = (weak.upgrade(), weak_context.upgrade()) else {
                    return;
                };
                Connection::from_cell(inner).retry_fetch(&*context, &correlation_token);
            }),
        )
    }

    /// Handles a fetch timeout (or an empty response) for `correlation_token`.
    ///
    /// Re-sends the request while the container is still short of capacity and retries remain;
    /// the pending entry is dropped once retries are exhausted or the data is no longer needed.
    pub(crate) fn retry_fetch(&self, context: &dyn ListContext, correlation_token: &str) {
        let mut state = self.inner.borrow_mut();
        let needs_data = state
            .items
            .upgrade()
            .is_some_and(|items| items.borrow().len() != state.window.max_items());
        let weak_context = state.context.clone();
        let delay_ms = state.configuration.fetch_timeout_ms;
        let type_name = state.configuration.type_name.clone();

        let Some(pending) = state.pending_fetch_requests.get_mut(correlation_token) else {
            return;
        };
        if let Some(id) = pending.timeout.take() {
            context.clock().clear_timeout(id);
        }

        let mut resend = None;
        if pending.retries > 0 {
            pending.retries -= 1;
            if needs_data {
                resend = Some(pending.request.clone());
            } else {
                pending.retries = 0;
            }
        }

        if pending.retries == 0 {
            ltrace!(token = correlation_token, "Connection: fetch retries exhausted");
            state.pending_fetch_requests.remove(correlation_token);
        } else {
            let timeout = self.schedule_timeout(
                context,
                weak_context,
                String::from(correlation_token),
                delay_ms,
            );
            if let Some(pending) = state.pending_fetch_requests.get_mut(correlation_token) {
                pending.timeout = Some(timeout);
            }
        }
        drop(state);

        if let Some(request) = resend {
            ldebug!(token = correlation_token, "Connection: retrying fetch request");
            context.push_fetch_request(FetchRequestEvent { type_name, request });
        }
    }

    fn resolve_pending(&self, context: &dyn ListContext, correlation_token: &str) {
        let mut state = self.inner.borrow_mut();
        if let Some(mut pending) = state.pending_fetch_requests.remove(correlation_token) {
            if let Some(id) = pending.timeout.take() {
                context.clock().clear_timeout(id);
            }
        }
    }

    /// Applies a lazy-load response: `data` resolves to the items starting at absolute index
    /// `index`.
    ///
    /// An empty resolution is reported and re-drives the retry path of `correlation_token`.
    /// On success the matching pending request is resolved.
    pub fn apply_fetch_response(
        &self,
        index: i64,
        data: &Value,
        correlation_token: Option<&str>,
    ) -> bool {
        if self.inner.borrow().provider.strong_count() == 0 {
            lerror!("Connection: provider is gone while applying a fetch response");
            return false;
        }
        let Some(context) = self.inner.borrow().context.upgrade() else {
            return false;
        };

        let values = match context.evaluate(data) {
            Value::Array(values) if !values.is_empty() => values,
            _ => {
                self.report(
                    ReasonCode::InternalError,
                    Some(index),
                    "No items provided to load.",
                );
                if let Some(token) = correlation_token {
                    self.retry_fetch(&*context, token);
                }
                return false;
            }
        };

        let Some(handle) = self.inner.borrow().items.upgrade() else {
            self.report(ReasonCode::InternalError, Some(index), "DataSource context lost.");
            return false;
        };
        let result = {
            let mut state = self.inner.borrow_mut();
            let position = state.window.position_of(index);
            state.window.write(&mut *handle.borrow_mut(), position, values)
        };

        if !result {
            self.report(
                ReasonCode::ListIndexOutOfRange,
                Some(index),
                "Requested index out of bounds.",
            );
            return false;
        }
        if let Some(token) = correlation_token {
            self.resolve_pending(&*context, token);
        }
        true
    }

    /// Applies one push-update operation at absolute index `index`.
    ///
    /// Inserts below the window start are rejected. A finite upper bound follows inserts and
    /// deletes. Failures are reported; nothing is retried.
    pub fn apply_update(&self, update_type: UpdateType, index: i64, data: &Value, count: usize) -> bool {
        if self.inner.borrow().provider.strong_count() == 0 {
            lerror!("Connection: provider is gone while applying an update");
            return false;
        }
        let Some(context) = self.inner.borrow().context.upgrade() else {
            return false;
        };
        let Some(handle) = self.inner.borrow().items.upgrade() else {
            self.report(ReasonCode::InternalError, Some(index), "DataSource context lost.");
            return false;
        };
        let resolved = context.evaluate(data);

        let result = {
            let mut state = self.inner.borrow_mut();
            let window = &mut state.window;
            let mut guard = handle.borrow_mut();
            let items: &mut dyn ListWindow = &mut *guard;
            let mut position = window.position_of(index);

            match update_type {
                UpdateType::Insert => {
                    let ok = !window.precedes_window(position)
                        && window.insert(items, position, alloc::vec![resolved]);
                    if ok {
                        window.grow(1);
                    }
                    ok
                }
                UpdateType::Replace => window.replace(items, position, resolved),
                UpdateType::Delete => {
                    let ok = window.remove(items, position, 1);
                    if ok {
                        window.shrink(1);
                    }
                    ok
                }
                UpdateType::InsertMultiple => {
                    let Value::Array(values) = resolved else {
                        drop(state);
                        self.report(
                            ReasonCode::InternalError,
                            Some(index),
                            "No array provided for range insert.",
                        );
                        return false;
                    };
                    if window.precedes_window(position) {
                        false
                    } else {
                        // Negative indexes insert relative to position 0.
                        if index < 0 {
                            position += 1;
                        }
                        let count = values.len();
                        let ok = window.insert(items, position, values);
                        if ok {
                            window.grow(count);
                        }
                        ok
                    }
                }
                UpdateType::DeleteMultiple => {
                    let ok = window.remove(items, position, count);
                    if ok {
                        window.shrink(count);
                    }
                    ok
                }
            }
        };

        if !result {
            self.report(
                ReasonCode::ListIndexOutOfRange,
                Some(index),
                "Requested index out of bounds.",
            );
        }
        result
    }

    /// Tightens the bounds, reshaping the container to fit. Returns whether anything changed.
    pub fn update_bounds(&self, minimum_inclusive: i64, maximum_exclusive: i64) -> bool {
        let mut state = self.inner.borrow_mut();
        let ConnectionState { window, items, .. } = &mut *state;
        match items.upgrade() {
            Some(items) => window.update_bounds(
                Some(&mut *items.borrow_mut()),
                minimum_inclusive,
                maximum_exclusive,
            ),
            None => window.update_bounds(None, minimum_inclusive, maximum_exclusive),
        }
    }

    /// Buffers an early push-update under `version` (the version it must follow).
    ///
    /// When the buffer is full the highest buffered version is evicted to make room, unless
    /// the incoming one is not lower than it, in which case the incoming one is dropped.
    pub(crate) fn buffer_update(&self, version: u64, payload: Value) {
        let capacity = self.inner.borrow().configuration.update_buffer_size;
        let len = self.inner.borrow().updates_cache.len();
        if len >= capacity {
            self.report(
                ReasonCode::MissingListVersion,
                None,
                "Too many updates buffered. Discarding highest version.",
            );
            let mut state = self.inner.borrow_mut();
            let highest = state.updates_cache.last_key_value().map(|(&key, _)| key);
            match highest {
                Some(highest) if highest > version => {
                    ldebug!(list_id = %state.list_id, highest, "Connection: evicting buffered update");
                    state.updates_cache.remove(&highest);
                }
                _ => return,
            }
        }

        if self.inner.borrow().updates_cache.contains_key(&version) {
            self.report(
                ReasonCode::DuplicateListVersion,
                None,
                "Trying to cache existing list version.",
            );
            return;
        }
        let mut state = self.inner.borrow_mut();
        ltrace!(list_id = %state.list_id, version, "Connection: buffering update");
        state.updates_cache.insert(version, payload);
    }

    /// Removes and returns the update buffered to follow `version`.
    pub(crate) fn take_buffered_update(&self, version: u64) -> Option<Value> {
        self.inner.borrow_mut().updates_cache.remove(&version)
    }
}
