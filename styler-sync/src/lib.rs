//! # Styler Sync
//!
//! Durable, ordered persistence of settings documents to the Styler
//! REST endpoint, built for unreliable networks and a rotating auth
//! nonce.
//!
//! ## Request flow
//!
//! ```text
//! save_settings / apply_template / apply_palette / reset_settings
//!        │
//!        ▼
//! ┌─────────────────┐   identical identity key?   ┌──────────────┐
//! │  FIFO queue     │ ──────────────────────────► │ join waiters │
//! │  (one in flight)│                             └──────────────┘
//! └───────┬─────────┘
//!         ▼
//! ┌─────────────────┐  403 + invalid_nonce: refresh once, replay
//! │  transport      │  5xx / 429 / timeout / transport: backoff retry
//! │  (reqwest)      │  other 4xx: terminal
//! └─────────────────┘
//! ```
//!
//! Read operations (`get_settings`, `get_templates`, `get_palettes`)
//! bypass the queue and go straight to the transport. Every request
//! runs the registered interceptor chains and carries the current
//! nonce; the client publishes lifecycle events through
//! [`styler_events::EventBus`] when one is attached.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
mod queue;

pub use client::{RefreshFuture, SyncClient, NONCE_EXPIRED_CODE, NONCE_HEADER};
pub use config::{SyncConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT};
pub use error::{SyncError, SyncResult};
pub use interceptor::{InterceptorHandle, RequestConfig, RequestInterceptor, ResponseInterceptor};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
