use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use serde_json::Value;

use crate::connection::{Connection, ConnectionCell};
use crate::payload::{
    Delivery, Inbound, LazyLoad, Operation, OperationError, LIST_ID, MAXIMUM_EXCLUSIVE_INDEX,
    MINIMUM_INCLUSIVE_INDEX, START_INDEX, index_field, str_field,
};
use crate::window::OffsetWindow;
use crate::{
    Bounds, Configuration, ListContext, ListError, ListWindow, ReasonCode, UNBOUNDED_MAX,
    UNBOUNDED_MIN,
};

/// List id used in error records that cannot be attributed to a list.
const UNKNOWN_LIST_ID: &str = "N/A";

/// First correlation token handed out by a provider.
const INITIAL_CORRELATION_TOKEN: u64 = 100;

/// State shared between a provider and the connections it created.
pub(crate) struct ProviderShared {
    configuration: Configuration,
    next_token: Cell<u64>,
    connections: RefCell<BTreeMap<String, Weak<ConnectionCell>>>,
    pending_errors: RefCell<Vec<ListError>>,
}

impl ProviderShared {
    pub(crate) fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub(crate) fn next_correlation_token(&self) -> String {
        let token = self.next_token.get();
        self.next_token.set(token.wrapping_add(1));
        token.to_string()
    }

    pub(crate) fn report(&self, error: ListError) {
        lwarn!(
            list_id = %error.list_id,
            reason = %error.reason,
            "Datasource error: {}",
            error.message
        );
        self.pending_errors.borrow_mut().push(error);
    }
}

/// The registry of dynamic list connections.
///
/// A provider owns the configuration, hands out correlation tokens, indexes its connections by
/// list id (weakly) and routes inbound payloads to them. Every error condition is recorded as a
/// [`ListError`] and can be drained with [`DynamicListProvider::take_pending_errors`]; no entry
/// point panics or returns early on a bad payload without recording why.
///
/// All entry points run to completion; the provider is not `Send` and expects a single thread of
/// control.
pub struct DynamicListProvider {
    shared: Rc<ProviderShared>,
}

impl Default for DynamicListProvider {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

impl core::fmt::Debug for DynamicListProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DynamicListProvider")
            .field("configuration", &self.shared.configuration)
            .field("connections", &self.shared.connections.borrow().len())
            .field("pending_errors", &self.shared.pending_errors.borrow().len())
            .finish()
    }
}

impl DynamicListProvider {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            shared: Rc::new(ProviderShared {
                configuration,
                next_token: Cell::new(INITIAL_CORRELATION_TOKEN),
                connections: RefCell::new(BTreeMap::new()),
                pending_errors: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Creates a provider with default buffering, retry and timeout settings.
    pub fn with_type(type_name: impl Into<String>, cache_chunk_size: usize) -> Self {
        Self::new(Configuration::new(type_name).with_cache_chunk_size(cache_chunk_size))
    }

    pub fn configuration(&self) -> &Configuration {
        &self.shared.configuration
    }

    /// Creates a connection for the list described by `source_definition`.
    ///
    /// The definition must carry a string `listId` and a numeric `startIndex`;
    /// `minimumInclusiveIndex`/`maximumExclusiveIndex` default to unbounded. The container is
    /// trimmed if it already holds more items than fit below the upper bound.
    ///
    /// Fails (and records the error) when a field is missing, when the bounds do not contain
    /// `startIndex`, or when `listId` is already in use by a live connection.
    pub fn create(
        &self,
        source_definition: &Value,
        context: Weak<dyn ListContext>,
        items: Weak<RefCell<dyn ListWindow>>,
    ) -> Result<Connection, ListError> {
        self.clear_stale_connections();

        let (Some(list_id), Some(start_index)) = (
            str_field(source_definition, LIST_ID),
            index_field(source_definition, START_INDEX),
        ) else {
            return Err(self.reject(ListError::new(
                ReasonCode::InternalError,
                UNKNOWN_LIST_ID,
                "Missing required fields.",
            )));
        };

        if self.shared.connections.borrow().contains_key(list_id) {
            return Err(self.reject(ListError::new(
                ReasonCode::InternalError,
                list_id,
                "Trying to reuse existing listId.",
            )));
        }

        let bounds = Bounds::new(
            index_field(source_definition, MINIMUM_INCLUSIVE_INDEX).unwrap_or(UNBOUNDED_MIN),
            index_field(source_definition, MAXIMUM_EXCLUSIVE_INDEX).unwrap_or(UNBOUNDED_MAX),
        );
        let Some(mut window) = OffsetWindow::new(bounds, start_index) else {
            return Err(self.reject(ListError::new(
                ReasonCode::InternalError,
                list_id,
                "DataSource bounds configuration is wrong.",
            )));
        };

        if let Some(items) = items.upgrade() {
            window.fit(&mut *items.borrow_mut());
        }

        let connection = Connection::new(
            Rc::downgrade(&self.shared),
            self.shared.configuration.clone(),
            context,
            items,
            list_id.to_string(),
            window,
        );
        self.shared
            .connections
            .borrow_mut()
            .insert(list_id.to_string(), connection.downgrade());
        ldebug!(
            list_id,
            start_index,
            offset = window.offset(),
            max_items = window.max_items(),
            "DynamicListProvider::create"
        );
        Ok(connection)
    }

    /// Looks up the live connection for `list_id`.
    pub fn connection(&self, list_id: &str) -> Option<Connection> {
        let cell = self.shared.connections.borrow().get(list_id)?.upgrade()?;
        Some(Connection::from_cell(cell))
    }

    /// Current negotiated bounds of `list_id`, or `None` if it has no live connection.
    pub fn bounds(&self, list_id: &str) -> Option<Bounds> {
        self.connection(list_id).map(|c| c.bounds())
    }

    /// Drains the accumulated error records.
    pub fn take_pending_errors(&self) -> Vec<ListError> {
        core::mem::take(&mut *self.shared.pending_errors.borrow_mut())
    }

    pub fn has_pending_errors(&self) -> bool {
        !self.shared.pending_errors.borrow().is_empty()
    }

    /// Top-level entry for every inbound response or push-update, as raw JSON.
    ///
    /// Returns whether the payload itself was applied. Buffered updates unlocked by it are
    /// replayed before returning; their failures are recorded but do not change the result.
    pub fn process_update(&self, payload: &str) -> bool {
        match serde_json::from_str::<Value>(payload) {
            Ok(payload) => self.process_payload(payload),
            Err(_err) => {
                ldebug!(error = %_err, "DynamicListProvider: unparseable payload");
                self.shared.report(ListError::new(
                    ReasonCode::InternalError,
                    UNKNOWN_LIST_ID,
                    "Can't process payload.",
                ));
                false
            }
        }
    }

    /// Same as [`Self::process_update`] for an already parsed payload.
    pub fn process_payload(&self, payload: Value) -> bool {
        self.clear_stale_connections();

        let mut result = None;
        let mut next = Some(payload);
        while let Some(payload) = next.take() {
            let (applied, replay) = self.process_one(payload);
            result.get_or_insert(applied);
            if replay.is_some() {
                ltrace!("DynamicListProvider: replaying buffered update");
            }
            next = replay;
        }
        result.unwrap_or(false)
    }

    /// Processes one payload; returns its result and the buffered update it unlocked, if any.
    fn process_one(&self, payload: Value) -> (bool, Option<Value>) {
        let inbound = Inbound::read(&payload);

        let Some(list_id) = inbound.list_id else {
            self.shared.report(ListError::new(
                ReasonCode::InvalidListId,
                UNKNOWN_LIST_ID,
                "Missing listId.",
            ));
            return (false, None);
        };

        let Some((key, weak, exact)) = self.route(list_id, inbound.correlation_token) else {
            self.shared.report(ListError::new(
                ReasonCode::InvalidListId,
                list_id,
                "Unexpected response.",
            ));
            return (false, None);
        };
        if !exact {
            self.shared.report(ListError::new(
                ReasonCode::InvalidListId,
                list_id,
                "Non-existing listId.",
            ));
        }

        let Some(cell) = weak.upgrade() else {
            self.shared.connections.borrow_mut().remove(&key);
            self.shared.report(ListError::new(
                ReasonCode::InternalError,
                list_id,
                "DataSource context lost.",
            ));
            return (false, None);
        };
        let connection = Connection::from_cell(cell);

        if connection.is_failed() {
            self.shared.report(ListError::new(
                ReasonCode::InternalError,
                list_id,
                "List in fail state.",
            ));
            return (false, None);
        }

        let is_lazy_loading = match inbound.delivery {
            Delivery::LazyLoad(_) => true,
            Delivery::Push(_) => false,
            Delivery::Malformed => {
                self.report_for(
                    &connection,
                    ReasonCode::InternalError,
                    None,
                    "Payload missing required fields.",
                );
                return (false, None);
            }
        };

        let version = inbound.list_version;
        let current = i64::try_from(connection.list_version()).unwrap_or(i64::MAX);
        let expected = current.saturating_add(1);
        let versioned = current > 0 || version > 0;
        if (version < 0 && !is_lazy_loading) || (versioned && version != expected) {
            if version > expected {
                connection.buffer_update(version as u64 - 1, payload);
            } else if version < 0 {
                self.report_for(
                    &connection,
                    ReasonCode::MissingListVersionInSendData,
                    None,
                    "Missing list version.",
                );
                connection.set_failed();
            } else {
                self.report_for(
                    &connection,
                    ReasonCode::DuplicateListVersion,
                    None,
                    "Duplicate list version.",
                );
            }
            return (false, None);
        }

        let result = match &inbound.delivery {
            Delivery::LazyLoad(lazy) => {
                self.process_lazy_load(&connection, lazy, inbound.correlation_token)
            }
            Delivery::Push(operations) => self.process_push(&connection, operations),
            Delivery::Malformed => false,
        };

        if result && version > current {
            connection.advance_list_version();
        } else if result && version <= 0 {
            // Never versioned: from now on push-updates are refused.
            connection.set_lazy_loading_only();
        }

        let replay = connection.take_buffered_update(connection.list_version());
        (result, replay)
    }

    /// Finds the connection for `list_id`, falling back to the one that owns
    /// `correlation_token`. The flag tells whether the list id itself matched.
    fn route(
        &self,
        list_id: &str,
        correlation_token: Option<&str>,
    ) -> Option<(String, Weak<ConnectionCell>, bool)> {
        let connections = self.shared.connections.borrow();
        if let Some(weak) = connections.get(list_id) {
            return Some((list_id.to_string(), weak.clone(), true));
        }

        let token = correlation_token?;
        connections.iter().find_map(|(key, weak)| {
            let cell = weak.upgrade()?;
            Connection::from_cell(cell)
                .can_process(token)
                .then(|| (key.clone(), weak.clone(), false))
        })
    }

    fn process_lazy_load(
        &self,
        connection: &Connection,
        lazy: &LazyLoad<'_>,
        correlation_token: Option<&str>,
    ) -> bool {
        if let Some(token) = correlation_token {
            if !connection.can_process(token) {
                self.report_for(
                    connection,
                    ReasonCode::InternalError,
                    Some(lazy.start_index),
                    "Wrong correlation token.",
                );
                return false;
            }
        }

        if connection.update_bounds(
            lazy.minimum_inclusive.unwrap_or(UNBOUNDED_MIN),
            lazy.maximum_exclusive.unwrap_or(UNBOUNDED_MAX),
        ) {
            self.report_for(
                connection,
                ReasonCode::InternalError,
                Some(lazy.start_index),
                "Bounds were changed in runtime.",
            );
        }

        let Some(items) = lazy.items.filter(|_| connection.changes_allowed()) else {
            self.report_for(
                connection,
                ReasonCode::InternalError,
                None,
                "Payload has unexpected fields.",
            );
            return true;
        };

        connection.apply_fetch_response(lazy.start_index, items, correlation_token)
    }

    fn process_push(&self, connection: &Connection, operations: &[Value]) -> bool {
        if connection.is_lazy_loading_only() {
            self.report_for(
                connection,
                ReasonCode::MissingListVersionInSendData,
                None,
                "List supports only lazy loading.",
            );
            connection.set_failed();
            return false;
        }

        let mut result = true;
        for operation in operations {
            let operation = match Operation::read(operation) {
                Ok(operation) => operation,
                Err(err) => {
                    let message = match err {
                        OperationError::Malformed => "Operation malformed.",
                        OperationError::WrongType => "Wrong update type.",
                    };
                    self.report_for(connection, ReasonCode::InvalidOperation, None, message);
                    result = false;
                    break;
                }
            };
            if !connection.apply_update(
                operation.update_type,
                operation.index,
                operation.data,
                operation.count,
            ) {
                result = false;
                break;
            }
        }

        if !result {
            connection.set_failed();
        }
        result
    }

    fn report_for(
        &self,
        connection: &Connection,
        reason: ReasonCode,
        operation_index: Option<i64>,
        message: &str,
    ) {
        self.shared.report(
            ListError::new(reason, connection.list_id(), message)
                .with_list_version(connection.list_version())
                .with_operation_index(operation_index),
        );
    }

    fn reject(&self, error: ListError) -> ListError {
        self.shared.report(error.clone());
        error
    }

    fn clear_stale_connections(&self) {
        self.shared
            .connections
            .borrow_mut()
            .retain(|_, connection| connection.strong_count() > 0);
    }
}
