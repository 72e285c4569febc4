//! A headless synchronization engine for windowed dynamic lists.
//!
//! A UI layer materializes a bounded window of a remote, indefinitely large list. This crate
//! keeps that window consistent with the remote side:
//! - lazy loading: fetch intents with correlation tokens, deduplication, timeouts and retries
//! - push updates: versioned insert/replace/delete deltas applied in strict version order, with
//!   out-of-order arrivals buffered and replayed
//! - bounds renegotiation that reshapes an already materialized window
//! - routing of inbound payloads to the right connection, with structured error records
//!
//! It performs no I/O. A host is expected to provide:
//! - the item container ([`ListWindow`])
//! - a one-shot timer ([`Clock`])
//! - a context that evaluates payload data and queues outbound fetch intents ([`ListContext`])
//!
//! and to feed responses back through [`DynamicListProvider::process_update`].
//!
//! For ready-made host pieces (manual clock, `Vec` container, intent queue), see the
//! `dynlist-adapter` crate.
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod config;
mod connection;
mod error;
mod host;
mod payload;
mod provider;
mod types;
mod window;

#[cfg(test)]
mod tests;

pub use config::{
    Configuration, DEFAULT_CACHE_CHUNK_SIZE, DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT_MS,
    DEFAULT_TYPE_NAME, DEFAULT_UPDATE_BUFFER_SIZE,
};
pub use connection::Connection;
pub use error::{LIST_ERROR_TYPE, ListError, ReasonCode};
pub use host::{Clock, ListContext, ListWindow, TimeoutCallback, WindowHandle};
pub use provider::DynamicListProvider;
pub use types::{
    Bounds, FetchRequest, FetchRequestEvent, TimeoutId, UNBOUNDED_MAX, UNBOUNDED_MIN, UpdateType,
};
pub use window::OffsetWindow;
