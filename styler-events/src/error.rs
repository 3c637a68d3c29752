//! Error types for event bus registration.

use thiserror::Error;

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Errors that can occur when registering subscriptions.
///
/// Delivery itself never errors: handler failures are isolated inside
/// `emit` and republished as `error:occurred`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    /// Event names must be non-empty.
    #[error("event name must be a non-empty string")]
    InvalidEventName,
}
