use crate::*;

use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::string::ToString;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use proptest::prelude::*;
use serde_json::{Value, json};

#[derive(Default)]
struct TestClock {
    now: Cell<u64>,
    next_id: Cell<TimeoutId>,
    timers: RefCell<BTreeMap<TimeoutId, (u64, TimeoutCallback)>>,
}

impl Clock for TestClock {
    fn set_timeout(&self, delay_ms: u64, callback: TimeoutCallback) -> TimeoutId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.timers
            .borrow_mut()
            .insert(id, (self.now.get() + delay_ms, callback));
        id
    }

    fn clear_timeout(&self, id: TimeoutId) {
        self.timers.borrow_mut().remove(&id);
    }
}

impl TestClock {
    fn advance(&self, ms: u64) {
        let target = self.now.get() + ms;
        loop {
            let due = self
                .timers
                .borrow()
                .iter()
                .filter(|(_, (at, _))| *at <= target)
                .min_by_key(|(id, (at, _))| (*at, **id))
                .map(|(id, (at, _))| (*id, *at));
            let Some((id, at)) = due else {
                break;
            };
            let entry = self.timers.borrow_mut().remove(&id);
            if let Some((_, callback)) = entry {
                self.now.set(at);
                callback();
            }
        }
        self.now.set(target);
    }

    fn scheduled(&self) -> usize {
        self.timers.borrow().len()
    }
}

#[derive(Default)]
struct TestContext {
    clock: Rc<TestClock>,
    events: RefCell<Vec<FetchRequestEvent>>,
}

impl ListContext for TestContext {
    fn push_fetch_request(&self, event: FetchRequestEvent) {
        self.events.borrow_mut().push(event);
    }

    fn clock(&self) -> &dyn Clock {
        &*self.clock
    }
}

impl TestContext {
    fn take_events(&self) -> Vec<FetchRequestEvent> {
        core::mem::take(&mut *self.events.borrow_mut())
    }
}

#[derive(Default)]
struct TestWindow(Vec<Value>);

impl ListWindow for TestWindow {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn insert(&mut self, index: usize, items: Vec<Value>) -> bool {
        if index > self.0.len() {
            return false;
        }
        self.0.splice(index..index, items);
        true
    }

    fn remove(&mut self, index: usize, count: usize) -> bool {
        if index + count > self.0.len() {
            return false;
        }
        self.0.drain(index..index + count);
        true
    }

    fn replace(&mut self, index: usize, items: Vec<Value>) -> bool {
        if index + items.len() > self.0.len() {
            return false;
        }
        for (slot, item) in self.0[index..].iter_mut().zip(items) {
            *slot = item;
        }
        true
    }
}

struct Fixture {
    provider: DynamicListProvider,
    context: Rc<TestContext>,
    items: Rc<RefCell<TestWindow>>,
}

impl Fixture {
    fn new(configuration: Configuration) -> Self {
        Self::with_items(configuration, Vec::new())
    }

    fn with_items(configuration: Configuration, items: Vec<Value>) -> Self {
        Self {
            provider: DynamicListProvider::new(configuration),
            context: Rc::new(TestContext::default()),
            items: Rc::new(RefCell::new(TestWindow(items))),
        }
    }

    fn create(&self, definition: Value) -> Result<Connection, ListError> {
        self.provider.create(
            &definition,
            Rc::downgrade(&self.context) as Weak<dyn ListContext>,
            Rc::downgrade(&self.items) as Weak<RefCell<dyn ListWindow>>,
        )
    }

    fn connect(&self, min: i64, max: i64, start: i64) -> Connection {
        self.create(json!({
            "listId": "L",
            "startIndex": start,
            "minimumInclusiveIndex": min,
            "maximumExclusiveIndex": max,
        }))
        .unwrap()
    }

    fn connect_err(&self) -> ListError {
        self.create(json!({ "listId": "L", "startIndex": 0 }))
            .unwrap_err()
    }

    fn send(&self, payload: Value) -> bool {
        self.provider.process_update(&payload.to_string())
    }

    fn items(&self) -> Vec<Value> {
        self.items.borrow().0.clone()
    }

    fn reasons(&self) -> Vec<ReasonCode> {
        self.provider
            .take_pending_errors()
            .into_iter()
            .map(|e| e.reason)
            .collect()
    }
}

fn item(n: i64) -> Value {
    json!({ "id": n })
}

fn items(range: core::ops::Range<i64>) -> Vec<Value> {
    range.map(item).collect()
}

fn insert_op(version: u64, index: i64, n: i64) -> Value {
    json!({
        "listId": "L",
        "listVersion": version,
        "operations": [{ "updateType": "InsertItem", "index": index, "item": item(n) }],
    })
}

fn window_with(items_in_window: Vec<Value>) -> TestWindow {
    TestWindow(items_in_window)
}

#[test]
fn create_computes_offset_and_capacity() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    assert_eq!(c.offset(), 0);
    assert_eq!(c.max_items(), 100);
    assert_eq!(c.list_version(), 0);
    assert_eq!(f.provider.bounds("L"), Some(Bounds::new(0, 100)));

    let f = Fixture::new(Configuration::default());
    let c = f.connect(5, 25, 10);
    assert_eq!(c.offset(), 5);
    assert_eq!(c.max_items(), 20);
}

#[test]
fn create_defaults_to_unbounded() {
    let f = Fixture::new(Configuration::default());
    let c = f
        .create(json!({ "listId": "L", "startIndex": 7 }))
        .unwrap();
    assert_eq!(c.bounds(), Bounds::UNBOUNDED);
    assert_eq!(c.max_items(), usize::MAX);
}

#[test]
fn create_rejects_bad_definitions() {
    let f = Fixture::new(Configuration::default());

    let err = f.create(json!({ "listId": "L" })).unwrap_err();
    assert_eq!(err.reason, ReasonCode::InternalError);
    assert_eq!(err.list_id, "N/A");

    let err = f
        .create(json!({ "listId": "L", "startIndex": 10, "maximumExclusiveIndex": 10 }))
        .unwrap_err();
    assert_eq!(err.message, "DataSource bounds configuration is wrong.");

    let _c = f.connect(0, 10, 0);
    let err = f.connect_err();
    assert_eq!(err.message, "Trying to reuse existing listId.");

    assert_eq!(
        f.reasons(),
        [ReasonCode::InternalError, ReasonCode::InternalError, ReasonCode::InternalError]
    );
}

#[test]
fn create_trims_initial_items_to_upper_bound() {
    let f = Fixture::with_items(Configuration::default(), items(0..10));
    let _c = f.connect(0, 100, 95);
    assert_eq!(f.items(), items(0..5));
}

#[test]
fn dropped_connection_frees_list_id_and_cancels_timers() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);
    assert_eq!(f.context.clock.scheduled(), 1);

    drop(c);
    assert_eq!(f.context.clock.scheduled(), 0);
    assert_eq!(f.provider.bounds("L"), None);
    assert!(f.provider.connection("L").is_none());

    let _c = f.connect(0, 50, 0);
    assert_eq!(f.provider.bounds("L"), Some(Bounds::new(0, 50)));
}

#[test]
fn fetch_request_uses_absolute_index_and_fresh_tokens() {
    let f = Fixture::new(Configuration::new("myList"));
    let c = f.connect(-50, 50, 0);
    c.request_fetch(50, 10);
    c.request_fetch(60, 10);

    let events = f.context.take_events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].type_name, "myList");
    assert_eq!(
        events[0].request,
        FetchRequest {
            correlation_token: "100".to_string(),
            list_id: "L".to_string(),
            start_index: 0,
            count: 10,
        }
    );
    assert_eq!(events[1].request.correlation_token, "101");
    assert_eq!(events[1].request.start_index, 10);
    assert!(c.can_process("100"));
    assert!(!c.can_process("102"));
}

#[test]
fn identical_fetch_in_flight_is_deduplicated() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);
    c.request_fetch(0, 10);
    assert_eq!(f.context.take_events().len(), 1);
    assert_eq!(c.pending_fetch_count(), 1);

    c.request_fetch(0, 5);
    assert_eq!(f.context.take_events().len(), 1);
}

#[test]
fn unanswered_fetch_is_retried_then_dropped() {
    let f = Fixture::new(
        Configuration::default()
            .with_fetch_retries(2)
            .with_fetch_timeout_ms(1000),
    );
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);

    f.context.clock.advance(999);
    assert_eq!(f.context.take_events().len(), 1);

    f.context.clock.advance(1);
    f.context.clock.advance(1000);
    f.context.clock.advance(10_000);

    let events = f.context.take_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.request.correlation_token == "100"));
    assert_eq!(c.pending_fetch_count(), 0);
    assert_eq!(f.context.clock.scheduled(), 0);
}

#[test]
fn zero_retries_emits_once() {
    let f = Fixture::new(Configuration::default().with_fetch_retries(0));
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);
    f.context.clock.advance(10_000);
    assert_eq!(f.context.take_events().len(), 1);
    assert_eq!(c.pending_fetch_count(), 0);
}

#[test]
fn retry_is_abandoned_once_window_is_full() {
    let f = Fixture::with_items(Configuration::default(), items(0..3));
    let c = f.connect(0, 5, 0);
    c.request_fetch(3, 2);
    f.context.take_events();

    // Bounds shrink to what is already materialized; the request is stale.
    assert!(c.update_bounds(0, 3));
    f.context.clock.advance(1000);
    assert!(f.context.take_events().is_empty());
    assert_eq!(c.pending_fetch_count(), 0);
}

#[test]
fn lazy_load_applies_items_and_resolves_request() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 3);
    f.context.take_events();

    assert!(f.send(json!({
        "listId": "L",
        "correlationToken": "100",
        "startIndex": 0,
        "items": items(0..3),
    })));
    assert_eq!(f.items(), items(0..3));
    assert_eq!(c.pending_fetch_count(), 0);
    assert_eq!(f.context.clock.scheduled(), 0);
    assert!(c.is_lazy_loading_only());
    assert!(!f.provider.has_pending_errors());

    f.context.clock.advance(10_000);
    assert!(f.context.take_events().is_empty());
}

#[test]
fn lazy_load_prepends_into_offset_slack() {
    let f = Fixture::with_items(Configuration::default(), items(10..12));
    let c = f.connect(0, 100, 10);
    assert_eq!(c.offset(), 10);

    assert!(f.send(json!({ "listId": "L", "startIndex": 5, "items": items(5..10) })));
    assert_eq!(c.offset(), 5);
    assert_eq!(f.items(), items(5..12));

    // Overlap replaces in place and extends the tail.
    assert!(f.send(json!({ "listId": "L", "startIndex": 11, "items": [item(-1), item(12)] })));
    assert_eq!(f.items().len(), 8);
    assert_eq!(f.items()[6], item(-1));
    assert_eq!(f.items()[7], item(12));
}

#[test]
fn empty_lazy_load_redrives_retry() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);
    f.context.take_events();

    assert!(!f.send(json!({
        "listId": "L",
        "correlationToken": "100",
        "startIndex": 0,
        "items": [],
    })));
    assert_eq!(f.reasons(), [ReasonCode::InternalError]);
    assert_eq!(f.context.take_events().len(), 1);
    assert_eq!(c.pending_fetch_count(), 1);
}

#[test]
fn lazy_load_rejects_unknown_token_and_gaps() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);

    assert!(!f.send(json!({
        "listId": "L",
        "correlationToken": "999",
        "startIndex": 0,
        "items": items(0..10),
    })));
    assert_eq!(f.reasons(), [ReasonCode::InternalError]);

    assert!(!f.send(json!({ "listId": "L", "startIndex": 50, "items": items(0..10) })));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::ListIndexOutOfRange);
    assert_eq!(errors[0].operation_index, Some(50));
    assert!(f.items().is_empty());
}

#[test]
fn lazy_load_can_tighten_bounds() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 5);

    assert!(f.send(json!({
        "listId": "L",
        "correlationToken": "100",
        "startIndex": 0,
        "maximumExclusiveIndex": 3,
        "items": items(0..5),
    })));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Bounds were changed in runtime.");
    assert_eq!(f.items(), items(0..3));
    assert_eq!(c.bounds(), Bounds::new(0, 3));
    assert_eq!(c.max_items(), 3);
}

#[test]
fn lazy_load_into_dead_container_is_consumed() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    let Fixture { provider, context, items: container } = f;
    drop(container);

    assert!(!c.changes_allowed());
    let payload = json!({ "listId": "L", "startIndex": 0, "items": [item(0)] });
    assert!(provider.process_update(&payload.to_string()));
    let errors = provider.take_pending_errors();
    assert_eq!(errors[0].message, "Payload has unexpected fields.");
    drop(context);
}

#[test]
fn response_is_routed_by_correlation_token() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 2);

    assert!(f.send(json!({
        "listId": "stale-id",
        "correlationToken": "100",
        "startIndex": 0,
        "items": items(0..2),
    })));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::InvalidListId);
    assert_eq!(errors[0].message, "Non-existing listId.");
    assert_eq!(f.items(), items(0..2));
}

#[test]
fn unroutable_and_malformed_payloads_are_reported() {
    let f = Fixture::new(Configuration::default());
    let _c = f.connect(0, 100, 0);

    assert!(!f.provider.process_update("not json"));
    assert!(!f.send(json!({ "startIndex": 0 })));
    assert!(!f.send(json!({ "listId": "other", "startIndex": 0, "items": [] })));
    assert!(!f.send(json!({ "listId": "L", "items": [] })));
    assert_eq!(
        f.reasons(),
        [
            ReasonCode::InternalError,
            ReasonCode::InvalidListId,
            ReasonCode::InvalidListId,
            ReasonCode::InternalError,
        ]
    );
    assert_eq!(f.provider.bounds("other"), None);
}

#[test]
fn versioned_insert_grows_finite_upper_bound() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);

    assert!(f.send(insert_op(1, 0, 0)));
    assert_eq!(c.list_version(), 1);
    assert_eq!(f.items(), [item(0)]);
    assert_eq!(c.bounds().maximum_exclusive, 101);
    assert_eq!(c.max_items(), 101);
    assert!(!f.provider.has_pending_errors());
}

#[test]
fn out_of_order_updates_are_buffered_and_replayed() {
    let f = Fixture::new(Configuration::default().with_update_buffer_size(5));
    let c = f.connect(0, 100, 0);
    assert!(f.send(insert_op(1, 0, 1)));

    assert!(!f.send(insert_op(3, 2, 3)));
    assert!(!f.send(insert_op(4, 3, 4)));
    assert_eq!(c.buffered_update_count(), 2);
    assert_eq!(c.list_version(), 1);

    assert!(f.send(insert_op(2, 1, 2)));
    assert_eq!(c.list_version(), 4);
    assert_eq!(c.buffered_update_count(), 0);
    assert_eq!(f.items(), items(1..5));
    assert!(!f.provider.has_pending_errors());
}

#[test]
fn duplicate_version_is_dropped() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    assert!(f.send(insert_op(1, 0, 1)));
    assert!(!f.send(insert_op(1, 0, 9)));

    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::DuplicateListVersion);
    assert_eq!(errors[0].list_version, Some(1));
    assert_eq!(f.items(), [item(1)]);
    assert!(!c.is_failed());
}

#[test]
fn full_buffer_evicts_highest_version() {
    let f = Fixture::new(Configuration::default().with_update_buffer_size(2));
    let c = f.connect(0, 100, 0);
    assert!(f.send(insert_op(1, 0, 1)));

    f.send(insert_op(4, 3, 4));
    f.send(insert_op(5, 4, 5));
    f.send(insert_op(3, 2, 3));
    assert_eq!(f.reasons(), [ReasonCode::MissingListVersion]);
    assert_eq!(c.buffered_update_count(), 2);

    // v3 and v4 replay; v5 was evicted.
    assert!(f.send(insert_op(2, 1, 2)));
    assert_eq!(c.list_version(), 4);
    assert_eq!(f.items(), items(1..5));
}

#[test]
fn full_buffer_drops_incoming_higher_version() {
    let f = Fixture::new(Configuration::default().with_update_buffer_size(2));
    let c = f.connect(0, 100, 0);
    assert!(f.send(insert_op(1, 0, 1)));

    f.send(insert_op(3, 2, 3));
    f.send(insert_op(4, 3, 4));
    f.send(insert_op(5, 4, 5));
    assert_eq!(f.reasons(), [ReasonCode::MissingListVersion]);
    assert_eq!(c.buffered_update_count(), 2);

    assert!(f.send(insert_op(2, 1, 2)));
    assert_eq!(c.list_version(), 4);
}

#[test]
fn push_without_version_fails_connection() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    assert!(!f.send(json!({
        "listId": "L",
        "operations": [{ "updateType": "InsertItem", "index": 0, "item": item(0) }],
    })));
    assert!(c.is_failed());

    assert!(!f.send(insert_op(1, 0, 0)));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors[0].reason, ReasonCode::MissingListVersionInSendData);
    assert_eq!(errors[1].reason, ReasonCode::InternalError);
    assert_eq!(errors[1].message, "List in fail state.");
    assert!(f.items().is_empty());
}

#[test]
fn push_after_lazy_loading_only_fails_connection() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    assert!(f.send(json!({ "listId": "L", "startIndex": 0, "items": [item(0)] })));
    assert!(c.is_lazy_loading_only());

    assert!(!f.send(insert_op(1, 1, 1)));
    assert!(c.is_failed());
    assert_eq!(f.reasons(), [ReasonCode::MissingListVersionInSendData]);
}

#[test]
fn insert_below_window_start_is_rejected() {
    let f = Fixture::with_items(Configuration::default(), items(10..12));
    let c = f.connect(0, 100, 10);

    assert!(!f.send(insert_op(1, 5, 5)));
    assert_eq!(f.reasons(), [ReasonCode::ListIndexOutOfRange]);
    assert_eq!(f.items(), items(10..12));
    assert!(c.is_failed());

    let f = Fixture::with_items(Configuration::default(), items(10..12));
    let _c = f.connect(0, 100, 10);
    assert!(!f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [{ "updateType": "InsertMultipleItems", "index": 9, "items": items(0..2) }],
    })));
    assert_eq!(f.reasons(), [ReasonCode::ListIndexOutOfRange]);
    assert_eq!(f.items(), items(10..12));
}

#[test]
fn multi_operations_track_upper_bound() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);

    assert!(f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [
            { "updateType": "InsertMultipleItems", "index": 0, "items": items(0..3) },
            { "updateType": "InsertMultipleItems", "index": 0, "items": [item(-2), item(-1)] },
        ],
    })));
    assert_eq!(f.items(), items(-2..3));
    assert_eq!(c.bounds().maximum_exclusive, 105);

    assert!(f.send(json!({
        "listId": "L",
        "listVersion": 2,
        "operations": [
            { "updateType": "SetItem", "index": 0, "item": item(7) },
            { "updateType": "DeleteListItem", "index": 1 },
            { "updateType": "DeleteMultipleItems", "index": 1, "count": 2 },
        ],
    })));
    assert_eq!(f.items(), [item(7), item(2)]);
    assert_eq!(c.bounds().maximum_exclusive, 102);
    assert_eq!(c.max_items(), 102);
    assert_eq!(c.list_version(), 2);
}

#[test]
fn insert_multiple_checks_window_start_before_negative_nudge() {
    let f = Fixture::with_items(Configuration::default(), items(0..2));
    let c = f.connect(-50, 100, 0);
    assert_eq!(c.offset(), 50);

    assert!(!f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [{ "updateType": "InsertMultipleItems", "index": -1, "items": [item(-1)] }],
    })));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::ListIndexOutOfRange);
    assert_eq!(errors[0].operation_index, Some(-1));
    assert_eq!(f.items(), items(0..2));
    assert_eq!(c.bounds(), Bounds::new(-50, 100));
    assert!(c.is_failed());
}

#[test]
fn insert_multiple_negative_index_inside_window_is_nudged() {
    let f = Fixture::with_items(Configuration::default(), items(0..5));
    let c = f.connect(-3, 10, -3);
    assert_eq!(c.offset(), 0);

    // Absolute -1 is window position 2; the nudge inserts after it.
    assert!(f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [{ "updateType": "InsertMultipleItems", "index": -1, "items": [item(9)] }],
    })));
    assert_eq!(f.items(), [item(0), item(1), item(2), item(9), item(3), item(4)]);
    assert_eq!(c.bounds(), Bounds::new(-3, 11));
}

#[test]
fn replace_outside_window_is_out_of_range() {
    let f = Fixture::with_items(Configuration::default(), items(0..2));
    let c = f.connect(0, 100, 0);
    assert!(!f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [{ "updateType": "ReplaceListItem", "index": 2, "item": item(9) }],
    })));
    assert_eq!(f.reasons(), [ReasonCode::ListIndexOutOfRange]);
    assert_eq!(f.items(), items(0..2));
    assert!(c.is_failed());
}

#[test]
fn invalid_operations_fail_connection() {
    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    assert!(!f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [{ "updateType": "InsertItem", "item": item(0) }],
    })));
    assert!(c.is_failed());

    let f = Fixture::new(Configuration::default());
    let c = f.connect(0, 100, 0);
    assert!(!f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [
            { "updateType": "InsertItem", "index": 0, "item": item(0) },
            { "updateType": "Frobnicate", "index": 0 },
        ],
    })));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::InvalidOperation);
    assert_eq!(errors[0].message, "Wrong update type.");
    assert!(c.is_failed());
    assert_eq!(c.list_version(), 0);
}

#[test]
fn insert_multiple_requires_array() {
    let f = Fixture::new(Configuration::default());
    let _c = f.connect(0, 100, 0);
    assert!(!f.send(json!({
        "listId": "L",
        "listVersion": 1,
        "operations": [{ "updateType": "InsertMultipleItems", "index": 0, "item": item(0) }],
    })));
    let errors = f.provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::InternalError);
}

#[test]
fn update_bounds_is_idempotent() {
    let mut w = OffsetWindow::new(Bounds::new(0, 100), 0).unwrap();
    let mut items = window_with(items(0..50));

    assert!(w.update_bounds(Some(&mut items), 0, 40));
    assert_eq!(items.0, self::items(0..40));
    let snapshot = (w, items.0.clone());

    assert!(!w.update_bounds(Some(&mut items), 0, 40));
    assert_eq!((w, items.0.clone()), snapshot);
    assert!(!w.update_bounds(Some(&mut items), -10, 200));
    assert_eq!((w, items.0.clone()), snapshot);
}

#[test]
fn raising_lower_bound_trims_front_or_absorbs_slack() {
    let mut w = OffsetWindow::new(Bounds::new(0, 100), 0).unwrap();
    let mut list = window_with(items(0..10));
    assert!(w.update_bounds(Some(&mut list), 3, 100));
    assert_eq!(w.offset(), 0);
    assert_eq!(w.max_items(), 97);
    assert_eq!(list.0, items(3..10));

    let mut w = OffsetWindow::new(Bounds::new(0, 100), 5).unwrap();
    let mut list = window_with(items(5..15));
    assert!(w.update_bounds(Some(&mut list), 3, 100));
    assert_eq!(w.offset(), 2);
    assert_eq!(list.0, items(5..15));

    // Partly absorbed, partly trimmed.
    assert!(w.update_bounds(Some(&mut list), 8, 100));
    assert_eq!(w.offset(), 0);
    assert_eq!(list.0, items(8..15));
}

#[test]
fn collapsed_bounds_clear_window() {
    let mut w = OffsetWindow::new(Bounds::new(0, 100), 10).unwrap();
    let mut list = window_with(items(10..20));
    assert!(w.update_bounds(Some(&mut list), 50, 40));
    assert_eq!(w.max_items(), 0);
    assert_eq!(w.offset(), 0);
    assert_eq!(w.bounds(), Bounds::new(0, 0));
    assert!(list.0.is_empty());
}

#[test]
fn lowering_upper_bound_trims_tail() {
    let mut w = OffsetWindow::new(Bounds::new(0, 100), 10).unwrap();
    let mut list = window_with(items(10..20));
    assert!(w.update_bounds(Some(&mut list), 0, 15));
    assert_eq!(list.0, items(10..15));
    assert!(w.offset() + list.0.len() <= w.max_items());

    assert!(w.update_bounds(Some(&mut list), 0, 5));
    assert!(list.0.is_empty());
    assert_eq!(w.offset(), 5);
}

#[test]
fn ensure_requests_chunks_around_window() {
    let f = Fixture::new(Configuration::default().with_cache_chunk_size(10));
    let c = f.connect(0, 100, 0);
    c.ensure(0);
    let events = f.context.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!((events[0].request.start_index, events[0].request.count), (0, 10));

    let f = Fixture::with_items(
        Configuration::default().with_cache_chunk_size(10),
        items(20..25),
    );
    let c = f.connect(0, 28, 20);
    c.ensure(2);
    let requested: Vec<_> = f
        .context
        .take_events()
        .into_iter()
        .map(|e| (e.request.start_index, e.request.count))
        .collect();
    assert_eq!(requested, [(10, 10), (25, 3)]);

    // Same demand again: both already in flight.
    c.ensure(2);
    assert!(f.context.take_events().is_empty());
}

#[test]
fn error_record_serializes_to_wire_shape() {
    let error = ListError::new(ReasonCode::ListIndexOutOfRange, "L", "Requested index out of bounds.")
        .with_list_version(3)
        .with_operation_index(Some(5));
    assert_eq!(
        serde_json::to_value(&error).unwrap(),
        json!({
            "type": "ListError",
            "reason": "LIST_INDEX_OUT_OF_RANGE",
            "listId": "L",
            "listVersion": 3,
            "operationIndex": 5,
            "message": "Requested index out of bounds.",
        })
    );
    assert_eq!(
        error.to_string(),
        "list L: LIST_INDEX_OUT_OF_RANGE: Requested index out of bounds."
    );
}

#[test]
fn fetch_event_serializes_to_wire_shape() {
    let event = FetchRequestEvent {
        type_name: "dynamicIndexList".to_string(),
        request: FetchRequest {
            correlation_token: "100".to_string(),
            list_id: "L".to_string(),
            start_index: -3,
            count: 10,
        },
    };
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({
            "type": "dynamicIndexList",
            "value": { "correlationToken": "100", "listId": "L", "startIndex": -3, "count": 10 },
        })
    );
}

proptest! {
    #[test]
    fn versions_apply_in_order_regardless_of_arrival(
        order in (1u64..10).prop_flat_map(|n| Just((1..=n).collect::<Vec<u64>>()).prop_shuffle())
    ) {
        let f = Fixture::new(Configuration::default().with_update_buffer_size(16));
        let c = f.connect(0, 1000, 0);
        for &v in &order {
            f.send(insert_op(v, v as i64 - 1, v as i64));
        }
        let n = order.len() as i64;
        prop_assert_eq!(c.list_version(), n as u64);
        prop_assert_eq!(f.items(), items(1..n + 1));
        prop_assert_eq!(c.buffered_update_count(), 0);
        prop_assert!(f.provider.take_pending_errors().is_empty());
    }
}

#[test]
fn dropped_provider_makes_connection_inert() {
    let f = Fixture::with_items(Configuration::default(), items(0..2));
    let c = f.connect(0, 100, 0);
    let Fixture { provider, context, items: container } = f;
    drop(provider);

    c.request_fetch(2, 10);
    c.ensure(1);
    assert!(context.take_events().is_empty());
    assert_eq!(context.clock.scheduled(), 0);
    assert_eq!(c.pending_fetch_count(), 0);

    assert!(!c.apply_update(UpdateType::Insert, 0, &item(9), 1));
    assert!(!c.apply_fetch_response(2, &json!([item(2)]), None));
    assert_eq!(container.borrow().0, items(0..2));
    assert_eq!(c.list_version(), 0);
}

#[test]
fn timeout_after_context_dropped_is_a_no_op() {
    let f = Fixture::with_items(Configuration::default(), items(0..2));
    let c = f.connect(0, 100, 0);
    c.request_fetch(2, 10);
    let Fixture { provider, context, items: container } = f;
    let clock = context.clock.clone();
    assert_eq!(context.take_events().len(), 1);
    drop(context);

    assert_eq!(clock.scheduled(), 1);
    clock.advance(10_000);
    assert_eq!(clock.scheduled(), 0);
    assert_eq!(c.pending_fetch_count(), 1);

    assert!(!c.apply_update(UpdateType::Insert, 0, &item(9), 1));
    c.request_fetch(12, 10);
    assert_eq!(c.pending_fetch_count(), 1);
    assert!(!c.changes_allowed());
    assert_eq!(container.borrow().0, items(0..2));
    assert!(!provider.has_pending_errors());
    drop(c);
}

#[test]
fn dropped_container_stops_retries_and_rejects_updates() {
    let f = Fixture::new(Configuration::default().with_fetch_retries(2));
    let c = f.connect(0, 100, 0);
    c.request_fetch(0, 10);
    let Fixture { provider, context, items: container } = f;
    assert_eq!(context.take_events().len(), 1);
    drop(container);

    context.clock.advance(1000);
    assert!(context.take_events().is_empty());
    assert_eq!(c.pending_fetch_count(), 0);
    assert_eq!(context.clock.scheduled(), 0);

    assert!(!c.apply_update(UpdateType::Insert, 0, &item(0), 1));
    let errors = provider.take_pending_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, ReasonCode::InternalError);
    assert_eq!(errors[0].message, "DataSource context lost.");

    assert!(!c.apply_fetch_response(0, &json!([item(0)]), None));
    assert_eq!(provider.take_pending_errors()[0].reason, ReasonCode::InternalError);
}
