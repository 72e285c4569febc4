use alloc::string::String;
use core::fmt;

use serde::Serialize;

/// Value of the `type` field of every error record.
pub const LIST_ERROR_TYPE: &str = "ListError";

/// Why an error record was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Malformed request/response, dead backing references, failed connection.
    InternalError,
    /// Unknown or mismatched list id.
    InvalidListId,
    /// Malformed or unrecognized update operation.
    InvalidOperation,
    /// A version gap could not be buffered.
    MissingListVersion,
    /// Push-update without a version, or push-update to a lazy-load-only list.
    MissingListVersionInSendData,
    /// Version already applied.
    DuplicateListVersion,
    /// Target index falls outside the current window or bounds.
    ListIndexOutOfRange,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidListId => "INVALID_LIST_ID",
            Self::InvalidOperation => "INVALID_OPERATION",
            Self::MissingListVersion => "MISSING_LIST_VERSION",
            Self::MissingListVersionInSendData => "MISSING_LIST_VERSION_IN_SEND_DATA",
            Self::DuplicateListVersion => "DUPLICATE_LIST_VERSION",
            Self::ListIndexOutOfRange => "LIST_INDEX_OUT_OF_RANGE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error record, accumulated by the provider and drained with
/// [`crate::DynamicListProvider::take_pending_errors`].
///
/// Serializes to the wire shape hosts forward to the remote side:
/// `{"type":"ListError","reason":..,"listId":..,"listVersion"?:..,"operationIndex"?:..,"message":..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("list {list_id}: {reason}: {message}")]
pub struct ListError {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub reason: ReasonCode,
    pub list_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_index: Option<i64>,
    pub message: String,
}

impl ListError {
    pub fn new(reason: ReasonCode, list_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: LIST_ERROR_TYPE,
            reason,
            list_id: list_id.into(),
            list_version: None,
            operation_index: None,
            message: message.into(),
        }
    }

    pub fn with_list_version(mut self, list_version: u64) -> Self {
        self.list_version = Some(list_version);
        self
    }

    pub fn with_operation_index(mut self, operation_index: Option<i64>) -> Self {
        self.operation_index = operation_index;
        self
    }
}
