use alloc::string::{String, ToString};

use serde::{Deserialize, Serialize};

/// Event/provider type name used when a host does not supply one.
pub const DEFAULT_TYPE_NAME: &str = "dynamicIndexList";

/// Number of items requested per lazy-loading fetch.
pub const DEFAULT_CACHE_CHUNK_SIZE: usize = 10;

/// Maximum number of out-of-order updates buffered per connection.
pub const DEFAULT_UPDATE_BUFFER_SIZE: usize = 5;

/// Number of re-sends attempted for an unanswered fetch request.
pub const DEFAULT_FETCH_RETRIES: u32 = 2;

/// Time to wait for a fetch response before retrying.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 1000;

/// Immutable, per-provider configuration.
///
/// Missing fields fall back to their defaults, so a host can load a partial JSON
/// object:
///
/// ```
/// let cfg: dynlist::Configuration = serde_json::from_str(r#"{"fetchRetries": 4}"#).unwrap();
/// assert_eq!(cfg.fetch_retries, 4);
/// assert_eq!(cfg.cache_chunk_size, dynlist::DEFAULT_CACHE_CHUNK_SIZE);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Name attached to every outbound fetch event.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Page size hint for `Connection::ensure`.
    pub cache_chunk_size: usize,
    /// Capacity of the out-of-order update buffer.
    pub update_buffer_size: usize,
    pub fetch_retries: u32,
    pub fetch_timeout_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            type_name: DEFAULT_TYPE_NAME.to_string(),
            cache_chunk_size: DEFAULT_CACHE_CHUNK_SIZE,
            update_buffer_size: DEFAULT_UPDATE_BUFFER_SIZE,
            fetch_retries: DEFAULT_FETCH_RETRIES,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
        }
    }
}

impl Configuration {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_cache_chunk_size(mut self, cache_chunk_size: usize) -> Self {
        self.cache_chunk_size = cache_chunk_size;
        self
    }

    pub fn with_update_buffer_size(mut self, update_buffer_size: usize) -> Self {
        self.update_buffer_size = update_buffer_size;
        self
    }

    pub fn with_fetch_retries(mut self, fetch_retries: u32) -> Self {
        self.fetch_retries = fetch_retries;
        self
    }

    pub fn with_fetch_timeout_ms(mut self, fetch_timeout_ms: u64) -> Self {
        self.fetch_timeout_ms = fetch_timeout_ms;
        self
    }
}
