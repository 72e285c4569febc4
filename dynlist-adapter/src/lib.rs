//! Host-side utilities for the `dynlist` crate.
//!
//! The `dynlist` crate performs no I/O and owns none of the host's objects. This crate provides
//! small, framework-neutral pieces most hosts need:
//!
//! - A manually advanced [`Clock`](dynlist::Clock) for frame- or tick-driven runtimes
//! - A `Vec`-backed item container
//! - A context that queues outbound fetch intents
//! - A [`Host`] that wires them to a provider
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod clock;
mod context;
mod host;
mod window;


pub use clock::ManualClock;
pub use context::QueueContext;
pub use host::{Host, fetch_response};
pub use window::VecWindow;
