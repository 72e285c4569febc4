//! Decoding of inbound JSON payloads.
//!
//! Fields are read loosely from a `serde_json::Value` rather than through a derived struct: a
//! payload with a wrong field type must still yield its `listId` and `correlationToken` so the
//! error can be routed and reported against the right connection.

use serde_json::Value;

use crate::UpdateType;

pub(crate) const LIST_ID: &str = "listId";
pub(crate) const LIST_VERSION: &str = "listVersion";
pub(crate) const CORRELATION_TOKEN: &str = "correlationToken";
pub(crate) const START_INDEX: &str = "startIndex";
pub(crate) const MINIMUM_INCLUSIVE_INDEX: &str = "minimumInclusiveIndex";
pub(crate) const MAXIMUM_EXCLUSIVE_INDEX: &str = "maximumExclusiveIndex";
pub(crate) const ITEMS: &str = "items";
pub(crate) const ITEM: &str = "item";
pub(crate) const OPERATIONS: &str = "operations";
pub(crate) const UPDATE_TYPE: &str = "updateType";
pub(crate) const INDEX: &str = "index";
pub(crate) const COUNT: &str = "count";

static NULL: Value = Value::Null;

/// Reads an integral index. Non-integral numbers are truncated.
pub(crate) fn as_index(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    if !f.is_finite() {
        return None;
    }
    Some(f as i64)
}

pub(crate) fn index_field(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(as_index)
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// How a payload delivers its items.
pub(crate) enum Delivery<'a> {
    LazyLoad(LazyLoad<'a>),
    Push(&'a [Value]),
    Malformed,
}

pub(crate) struct LazyLoad<'a> {
    pub start_index: i64,
    pub minimum_inclusive: Option<i64>,
    pub maximum_exclusive: Option<i64>,
    pub items: Option<&'a Value>,
}

/// The routing header and delivery of one inbound payload.
pub(crate) struct Inbound<'a> {
    pub list_id: Option<&'a str>,
    /// Declared version; `-1` when absent.
    pub list_version: i64,
    pub correlation_token: Option<&'a str>,
    pub delivery: Delivery<'a>,
}

impl<'a> Inbound<'a> {
    pub(crate) fn read(payload: &'a Value) -> Self {
        let delivery = if let Some(start_index) = index_field(payload, START_INDEX) {
            Delivery::LazyLoad(LazyLoad {
                start_index,
                minimum_inclusive: index_field(payload, MINIMUM_INCLUSIVE_INDEX),
                maximum_exclusive: index_field(payload, MAXIMUM_EXCLUSIVE_INDEX),
                items: payload.get(ITEMS),
            })
        } else if let Some(operations) = payload.get(OPERATIONS).and_then(Value::as_array) {
            Delivery::Push(operations.as_slice())
        } else {
            Delivery::Malformed
        };

        Self {
            list_id: str_field(payload, LIST_ID),
            list_version: index_field(payload, LIST_VERSION).unwrap_or(-1),
            correlation_token: str_field(payload, CORRELATION_TOKEN),
            delivery,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OperationError {
    Malformed,
    WrongType,
}

/// One decoded push-update operation.
pub(crate) struct Operation<'a> {
    pub update_type: UpdateType,
    pub index: i64,
    /// `item` when present, otherwise `items`.
    pub data: &'a Value,
    pub count: usize,
}

impl<'a> Operation<'a> {
    pub(crate) fn read(operation: &'a Value) -> Result<Self, OperationError> {
        let (Some(type_name), Some(index)) =
            (str_field(operation, UPDATE_TYPE), index_field(operation, INDEX))
        else {
            return Err(OperationError::Malformed);
        };
        let update_type = UpdateType::from_name(type_name).ok_or(OperationError::WrongType)?;

        let data = match operation.get(ITEM) {
            Some(item) if !item.is_null() => item,
            _ => operation.get(ITEMS).unwrap_or(&NULL),
        };
        let count = match index_field(operation, COUNT) {
            Some(count) => usize::try_from(count).unwrap_or(0),
            None => data.as_array().map_or(0, |items| items.len()),
        };

        Ok(Self {
            update_type,
            index,
            data,
            count,
        })
    }
}
