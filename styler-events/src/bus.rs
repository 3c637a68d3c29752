//! The publish/subscribe bus.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{EventBusError, EventBusResult};
use crate::events;
use crate::pattern::pattern_matches;

/// Handler signature for subscriptions.
///
/// Handlers receive the emitted event name (which may differ from the
/// subscription pattern for wildcard subscriptions) and the payload.
/// Returning an error does not stop delivery to other subscribers; the
/// failure is logged and republished as [`events::ERROR_OCCURRED`].
pub type Handler = dyn Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync;

struct SubEntry {
    id: u64,
    pattern: String,
    handler: Arc<Handler>,
    once: bool,
}

#[derive(Default)]
struct Registry {
    subs: Vec<SubEntry>,
    next_id: u64,
}

#[derive(Default)]
struct QueuedState {
    pending: VecDeque<(String, Value)>,
    scheduled: bool,
    /// Bumped by `clear` so an already-spawned flush task discards its work.
    epoch: u64,
}

struct DebounceEntry {
    generation: u64,
    payload: Value,
}

#[derive(Default)]
struct Inner {
    registry: Mutex<Registry>,
    queued: Mutex<QueuedState>,
    debounce: Mutex<HashMap<String, DebounceEntry>>,
}

/// In-process publish/subscribe bus with namespaced event names.
///
/// Cloning is cheap and clones share one subscription registry. See
/// the crate docs for the delivery model.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// Handle returned by [`EventBus::on`] and [`EventBus::once`].
///
/// [`Subscription::unsubscribe`] is idempotent and holds no strong
/// reference to the bus, so a forgotten handle never keeps a bus alive.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove this subscription. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            lock_recovering(&inner.registry).subs.retain(|s| s.id != self.id);
        }
    }
}

/// Lock a mutex, recovering (with a log line) if a handler panicked
/// while holding it.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        tracing::error!("event bus lock poisoned; recovering");
        poisoned.into_inner()
    })
}

impl EventBus {
    /// Create a new bus with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a persistent handler to an event name or wildcard
    /// pattern.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::InvalidEventName`] for an empty name.
    pub fn on<F>(&self, event: &str, handler: F) -> EventBusResult<Subscription>
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(event, handler, false)
    }

    /// Subscribe a handler that is removed after its first delivery.
    ///
    /// Removal never affects delivery to other subscribers within the
    /// same `emit` call.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::InvalidEventName`] for an empty name.
    pub fn once<F>(&self, event: &str, handler: F) -> EventBusResult<Subscription>
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(event, handler, true)
    }

    fn subscribe<F>(&self, event: &str, handler: F, once: bool) -> EventBusResult<Subscription>
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if event.is_empty() {
            return Err(EventBusError::InvalidEventName);
        }

        let mut registry = lock_recovering(&self.inner.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subs.push(SubEntry {
            id,
            pattern: event.to_string(),
            handler: Arc::new(handler),
            once,
        });
        tracing::debug!(%event, once, "subscribed");

        Ok(Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Remove every handler registered under `event` (exact pattern
    /// string, wildcards included).
    pub fn off(&self, event: &str) {
        lock_recovering(&self.inner.registry)
            .subs
            .retain(|s| s.pattern != event);
    }

    /// Remove a single handler by its subscription handle.
    ///
    /// Equivalent to [`Subscription::unsubscribe`]; kept for symmetry
    /// with [`EventBus::off`].
    pub fn off_handler(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Deliver an event synchronously to every matching subscriber, in
    /// subscription order.
    ///
    /// Exact-name subscriptions match first-come-first-served along
    /// with wildcard patterns (`settings:*`, `settings:*:changed`).
    /// Handler failures are isolated: logged, republished as
    /// [`events::ERROR_OCCURRED`] carrying
    /// `{event, listener_event, error}`, and never propagated to the
    /// caller.
    pub fn emit(&self, event: &str, payload: &Value) {
        // Snapshot matching handlers, then drop one-shot entries before
        // dispatch so a reentrant emit cannot deliver them twice. The
        // snapshot keeps delivery intact for every subscriber matched
        // by this call.
        let matched: Vec<(String, Arc<Handler>)> = {
            let mut registry = lock_recovering(&self.inner.registry);
            let matched: Vec<(u64, String, Arc<Handler>)> = registry
                .subs
                .iter()
                .filter(|s| pattern_matches(&s.pattern, event))
                .map(|s| (s.id, s.pattern.clone(), Arc::clone(&s.handler)))
                .collect();
            let matched_once: Vec<u64> = registry
                .subs
                .iter()
                .filter(|s| s.once && matched.iter().any(|(id, _, _)| *id == s.id))
                .map(|s| s.id)
                .collect();
            registry
                .subs
                .retain(|s| !matched_once.contains(&s.id));
            matched
                .into_iter()
                .map(|(_, pattern, handler)| (pattern, handler))
                .collect()
        };

        for (listener_event, handler) in matched {
            if let Err(error) = handler(event, payload) {
                tracing::error!(
                    %event,
                    listener = %listener_event,
                    %error,
                    "event handler failed"
                );
                if event != events::ERROR_OCCURRED {
                    self.emit(
                        events::ERROR_OCCURRED,
                        &json!({
                            "event": event,
                            "listener_event": listener_event,
                            "error": error.to_string(),
                        }),
                    );
                }
            }
        }
    }

    /// Queue an event for delivery on the next tick of the event loop.
    ///
    /// A burst of same-tick emissions shares a single flush task and is
    /// delivered FIFO. Must be called within a tokio runtime.
    pub fn emit_queued(&self, event: &str, payload: Value) {
        let flush_epoch = {
            let mut queued = lock_recovering(&self.inner.queued);
            queued.pending.push_back((event.to_string(), payload));
            if queued.scheduled {
                None
            } else {
                queued.scheduled = true;
                Some(queued.epoch)
            }
        };

        if let Some(epoch) = flush_epoch {
            let bus = self.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                bus.flush_queued(epoch);
            });
        }
    }

    fn flush_queued(&self, epoch: u64) {
        loop {
            let batch: Vec<(String, Value)> = {
                let mut queued = lock_recovering(&self.inner.queued);
                if queued.epoch != epoch {
                    return;
                }
                if queued.pending.is_empty() {
                    queued.scheduled = false;
                    return;
                }
                queued.pending.drain(..).collect()
            };

            for (event, payload) in batch {
                self.emit(&event, &payload);
            }
        }
    }

    /// Collapse a rapid sequence of emissions for `event` into one
    /// delivery carrying the most recent payload, fired `wait` after
    /// the last call in the burst.
    ///
    /// A newer call supersedes the pending one; the superseded payload
    /// is discarded, not delivered. Must be called within a tokio
    /// runtime.
    pub fn emit_debounced(&self, event: &str, payload: Value, wait: Duration) {
        let generation = {
            let mut debounce = lock_recovering(&self.inner.debounce);
            let entry = debounce
                .entry(event.to_string())
                .or_insert_with(|| DebounceEntry {
                    generation: 0,
                    payload: Value::Null,
                });
            entry.generation += 1;
            entry.payload = payload;
            entry.generation
        };

        let bus = self.clone();
        let event = event.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;

            let fire = {
                let mut debounce = lock_recovering(&bus.inner.debounce);
                match debounce.get(&event) {
                    Some(entry) if entry.generation == generation => debounce
                        .remove(&event)
                        .map(|entry| entry.payload),
                    _ => None,
                }
            };

            if let Some(payload) = fire {
                bus.emit(&event, &payload);
            }
        });
    }

    /// Number of active subscriptions registered under `event` (exact
    /// pattern string).
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        lock_recovering(&self.inner.registry)
            .subs
            .iter()
            .filter(|s| s.pattern == event)
            .count()
    }

    /// All distinct registered event names/patterns, in subscription
    /// order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let registry = lock_recovering(&self.inner.registry);
        let mut names: Vec<String> = Vec::new();
        for sub in &registry.subs {
            if !names.contains(&sub.pattern) {
                names.push(sub.pattern.clone());
            }
        }
        names
    }

    /// Remove every subscription and discard pending queued and
    /// debounced deliveries.
    pub fn clear(&self) {
        lock_recovering(&self.inner.registry).subs.clear();
        {
            let mut queued = lock_recovering(&self.inner.queued);
            queued.pending.clear();
            queued.scheduled = false;
            queued.epoch += 1;
        }
        lock_recovering(&self.inner.debounce).clear();
        tracing::debug!("event bus cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counter_handler(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_on_and_emit() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on("settings:changed", counter_handler(&count)).unwrap();

        bus.emit("settings:changed", &json!({"key": "accent"}));
        bus.emit("settings:changed", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_event_name_rejected() {
        let bus = EventBus::new();
        assert_eq!(
            bus.on("", |_, _| Ok(())).unwrap_err(),
            EventBusError::InvalidEventName
        );
        assert_eq!(
            bus.once("", |_, _| Ok(())).unwrap_err(),
            EventBusError::InvalidEventName
        );
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = bus.on("preview:update", counter_handler(&count)).unwrap();

        sub.unsubscribe();
        sub.unsubscribe();
        bus.emit("preview:update", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count("preview:update"), 0);
    }

    #[test]
    fn test_once_fires_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.once("color:selected", counter_handler(&count)).unwrap();

        bus.emit("color:selected", &Value::Null);
        bus.emit("color:selected", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("color:selected"), 0);
    }

    #[test]
    fn test_once_removal_does_not_affect_co_subscribers() {
        // A once() subscriber registered before an on() subscriber must
        // not stop the latter from seeing the same emission.
        let bus = EventBus::new();
        let once_count = Arc::new(AtomicUsize::new(0));
        let on_count = Arc::new(AtomicUsize::new(0));

        bus.once("settings:changed", counter_handler(&once_count))
            .unwrap();
        bus.on("settings:changed", counter_handler(&on_count))
            .unwrap();

        bus.emit("settings:changed", &Value::Null);

        assert_eq!(once_count.load(Ordering::SeqCst), 1);
        assert_eq!(on_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_all_handlers_for_event() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on("tab:switch", counter_handler(&count)).unwrap();
        bus.on("tab:switch", counter_handler(&count)).unwrap();
        bus.on("tab:other", counter_handler(&count)).unwrap();

        bus.off("tab:switch");
        bus.emit("tab:switch", &Value::Null);
        bus.emit("tab:other", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wildcard_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on("settings:*", counter_handler(&count)).unwrap();

        bus.emit("settings:color", &Value::Null);
        bus.emit("settings:typography", &Value::Null);
        bus.emit("preview:update", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wildcard_handler_sees_emitted_name() {
        let bus = EventBus::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.on("settings:*", move |event, _| {
            seen_clone.lock().unwrap().push(event.to_string());
            Ok(())
        })
        .unwrap();

        bus.emit("settings:color", &Value::Null);

        assert_eq!(seen.lock().unwrap().as_slice(), ["settings:color"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on("settings:changed", |_, _| anyhow::bail!("boom"))
            .unwrap();
        bus.on("settings:changed", counter_handler(&count)).unwrap();

        bus.emit("settings:changed", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_publishes_error_event() {
        let bus = EventBus::new();
        let reported: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let reported_clone = Arc::clone(&reported);
        bus.on(events::ERROR_OCCURRED, move |_, payload| {
            reported_clone.lock().unwrap().push(payload.clone());
            Ok(())
        })
        .unwrap();

        bus.on("settings:changed", |_, _| anyhow::bail!("kaput"))
            .unwrap();
        bus.emit("settings:changed", &Value::Null);

        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0]["event"], "settings:changed");
        assert_eq!(reported[0]["listener_event"], "settings:changed");
        assert!(reported[0]["error"]
            .as_str()
            .unwrap()
            .contains("kaput"));
    }

    #[test]
    fn test_failing_error_handler_does_not_recurse() {
        let bus = EventBus::new();
        bus.on(events::ERROR_OCCURRED, |_, _| anyhow::bail!("meta"))
            .unwrap();
        bus.on("settings:changed", |_, _| anyhow::bail!("boom"))
            .unwrap();

        // Must terminate without overflowing the stack.
        bus.emit("settings:changed", &Value::Null);
    }

    #[test]
    fn test_listener_count_tracks_active_subscriptions() {
        let bus = EventBus::new();
        assert_eq!(bus.listener_count("settings:changed"), 0);

        let sub_a = bus.on("settings:changed", |_, _| Ok(())).unwrap();
        bus.once("settings:changed", |_, _| Ok(())).unwrap();
        assert_eq!(bus.listener_count("settings:changed"), 2);

        sub_a.unsubscribe();
        assert_eq!(bus.listener_count("settings:changed"), 1);

        bus.emit("settings:changed", &Value::Null);
        assert_eq!(bus.listener_count("settings:changed"), 0);
    }

    #[test]
    fn test_event_names_in_subscription_order() {
        let bus = EventBus::new();
        bus.on("b:event", |_, _| Ok(())).unwrap();
        bus.on("a:event", |_, _| Ok(())).unwrap();
        bus.on("b:event", |_, _| Ok(())).unwrap();

        assert_eq!(bus.event_names(), ["b:event", "a:event"]);
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = EventBus::new();
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..4_u32 {
            let order = Arc::clone(&order);
            bus.on("settings:changed", move |_, _| {
                order.lock().unwrap().push(tag);
                Ok(())
            })
            .unwrap();
        }

        bus.emit("settings:changed", &Value::Null);

        assert_eq!(order.lock().unwrap().as_slice(), [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_emit_queued_delivers_fifo() {
        let bus = EventBus::new();
        let order: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let order_clone = Arc::clone(&order);
        bus.on("preview:update", move |_, payload| {
            order_clone
                .lock()
                .unwrap()
                .push(payload["seq"].as_i64().unwrap());
            Ok(())
        })
        .unwrap();

        for seq in 0..5_i64 {
            bus.emit_queued("preview:update", json!({"seq": seq}));
        }

        // Nothing is delivered on the emitting stack.
        assert!(order.lock().unwrap().is_empty());

        sleep(Duration::from_millis(20)).await;
        assert_eq!(order.lock().unwrap().as_slice(), [0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_emit_debounced_keeps_latest_payload() {
        let bus = EventBus::new();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.on("settings:changed", move |_, payload| {
            seen_clone.lock().unwrap().push(payload.clone());
            Ok(())
        })
        .unwrap();

        for i in 0..5 {
            bus.emit_debounced(
                "settings:changed",
                json!({"value": i}),
                Duration::from_millis(30),
            );
            sleep(Duration::from_millis(5)).await;
        }

        sleep(Duration::from_millis(60)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["value"], 4);
    }

    #[tokio::test]
    async fn test_clear_discards_pending_debounce() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on("settings:changed", counter_handler(&count)).unwrap();

        bus.emit_debounced(
            "settings:changed",
            Value::Null,
            Duration::from_millis(20),
        );
        bus.clear();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_discards_pending_queued() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on("preview:update", counter_handler(&count)).unwrap();

        bus.emit_queued("preview:update", Value::Null);
        bus.clear();

        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
