use alloc::string::String;

use serde::{Deserialize, Serialize};

/// Sentinel for a list with no known lower bound.
pub const UNBOUNDED_MIN: i64 = i64::MIN;
/// Sentinel for a list with no known upper bound.
pub const UNBOUNDED_MAX: i64 = i64::MAX;

/// The `[minimum_inclusive, maximum_exclusive)` extent of a remote list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub minimum_inclusive: i64,
    pub maximum_exclusive: i64,
}

impl Bounds {
    pub const UNBOUNDED: Self = Self {
        minimum_inclusive: UNBOUNDED_MIN,
        maximum_exclusive: UNBOUNDED_MAX,
    };

    pub fn new(minimum_inclusive: i64, maximum_exclusive: i64) -> Self {
        Self {
            minimum_inclusive,
            maximum_exclusive,
        }
    }

    /// Number of slots between the bounds (saturating at `usize::MAX`).
    pub fn span(&self) -> usize {
        if self.maximum_exclusive <= self.minimum_inclusive {
            return 0;
        }
        let span = self.maximum_exclusive.abs_diff(self.minimum_inclusive);
        usize::try_from(span).unwrap_or(usize::MAX)
    }

    pub fn has_finite_max(&self) -> bool {
        self.maximum_exclusive < UNBOUNDED_MAX
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// The payload of an outbound fetch intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub correlation_token: String,
    pub list_id: String,
    /// Absolute index in the remote list.
    pub start_index: i64,
    pub count: usize,
}

/// A fetch intent as pushed onto the host's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequestEvent {
    /// The provider's configured type name.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "value")]
    pub request: FetchRequest,
}

/// Kind of a single push-update operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    Insert,
    Replace,
    Delete,
    InsertMultiple,
    DeleteMultiple,
}

impl UpdateType {
    /// Maps a wire `updateType` name (including legacy aliases) to an update kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "InsertListItem" | "InsertItem" => Some(Self::Insert),
            "ReplaceListItem" | "SetItem" => Some(Self::Replace),
            "DeleteListItem" | "DeleteItem" => Some(Self::Delete),
            "InsertMultipleItems" => Some(Self::InsertMultiple),
            "DeleteMultipleItems" => Some(Self::DeleteMultiple),
            _ => None,
        }
    }
}

/// Handle returned by [`crate::Clock::set_timeout`].
pub type TimeoutId = u64;
