//! The serialized mutation queue.
//!
//! Only one state-mutating request is in flight at a time. Entries
//! carrying the same identity key while an equal request is queued or
//! in flight coalesce onto one network call, and every attached waiter
//! receives a clone of the settled result.

use std::collections::VecDeque;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::SyncResult;

/// A state-mutating operation accepted by the queue.
#[derive(Debug, Clone)]
pub(crate) enum Operation {
    /// Persist a settings document.
    SaveSettings(Value),
    /// Apply a named template server-side.
    ApplyTemplate(String),
    /// Apply a named palette server-side.
    ApplyPalette(String),
    /// Reset settings to their defaults.
    ResetSettings,
}

impl Operation {
    /// Deterministic fingerprint used for deduplication: operation
    /// kind plus payload.
    pub(crate) fn identity_key(&self) -> String {
        match self {
            Self::SaveSettings(doc) => format!("save:{doc}"),
            Self::ApplyTemplate(id) => format!("template:{id}"),
            Self::ApplyPalette(id) => format!("palette:{id}"),
            Self::ResetSettings => "reset".to_string(),
        }
    }

    /// Short name used in lifecycle events and logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::SaveSettings(_) => "save_settings",
            Self::ApplyTemplate(_) => "apply_template",
            Self::ApplyPalette(_) => "apply_palette",
            Self::ResetSettings => "reset_settings",
        }
    }

    pub(crate) fn path(&self) -> String {
        match self {
            Self::SaveSettings(_) => "/settings".to_string(),
            Self::ApplyTemplate(id) => format!("/templates/{id}/apply"),
            Self::ApplyPalette(id) => format!("/palettes/{id}/apply"),
            Self::ResetSettings => "/settings/reset".to_string(),
        }
    }

    pub(crate) fn body(&self) -> Option<&Value> {
        match self {
            Self::SaveSettings(doc) => Some(doc),
            _ => None,
        }
    }

    /// Pull the operation-specific payload out of a successful
    /// response, falling back to the whole body.
    pub(crate) fn extract(&self, response: Value) -> Value {
        let field = match self {
            Self::ApplyTemplate(_) => Some("settings"),
            Self::ApplyPalette(_) => Some("colors"),
            Self::SaveSettings(_) | Self::ResetSettings => None,
        };
        if let Some(inner) = field.and_then(|f| response.get(f)) {
            return inner.clone();
        }
        response
    }
}

/// Channel half handed back to a queued caller.
pub(crate) type Waiter = oneshot::Sender<SyncResult<Value>>;

/// A queued, not-yet-dispatched request.
pub(crate) struct QueueEntry {
    /// Deduplication key.
    pub key: String,
    /// The operation to execute.
    pub op: Operation,
    /// When the entry was created (logged at dispatch).
    pub created_at: Instant,
    /// Callers awaiting this entry's settlement.
    pub waiters: Vec<Waiter>,
}

/// The request currently on the wire.
pub(crate) struct InFlight {
    /// Deduplication key; late arrivals with an equal key join
    /// `waiters` instead of enqueueing.
    pub key: String,
    /// Callers awaiting settlement.
    pub waiters: Vec<Waiter>,
}

/// Mutable queue state, guarded by one mutex on the client.
#[derive(Default)]
pub(crate) struct QueueState {
    /// FIFO of pending entries.
    pub pending: VecDeque<QueueEntry>,
    /// The dispatched request, if any.
    pub in_flight: Option<InFlight>,
    /// True while a drain task owns dispatching.
    pub draining: bool,
    /// Waiters detached by `clear_queue`; kept alive so their callers
    /// stay pending instead of observing a closed channel.
    pub parked: Vec<Waiter>,
}
