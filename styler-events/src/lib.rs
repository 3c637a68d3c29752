//! # Styler Events
//!
//! Decoupled communication between Styler modules using a
//! publish/subscribe bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  EventBus                    │
//! ├──────────────────────────────────────────────┤
//! │  Registry         │  Deferred delivery       │
//! │  - exact names    │  - emit_queued (FIFO,    │
//! │  - `*` wildcards  │    next-tick flush)      │
//! │  - once handlers  │  - emit_debounced        │
//! │                   │    (trailing edge)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! `emit` is synchronous: every matching handler runs on the calling
//! stack before it returns. A handler failure is isolated - it is
//! logged, re-published as [`events::ERROR_OCCURRED`], and never stops
//! delivery to the remaining subscribers.
//!
//! Buses are instance-scoped; create as many as you need and clone
//! freely (clones share the same subscription registry).

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod error;
pub mod events;
mod pattern;

pub use bus::{EventBus, Subscription};
pub use error::{EventBusError, EventBusResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
