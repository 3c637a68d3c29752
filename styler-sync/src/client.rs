//! The sync client: retrying HTTP transport plus the serialized
//! mutation queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use url::Url;

use styler_events::{events, EventBus};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::interceptor::{
    InterceptorChain, InterceptorHandle, RequestConfig, RequestInterceptor, ResponseInterceptor,
};
use crate::queue::{InFlight, Operation, QueueEntry, QueueState, Waiter};

/// Header carrying the auth nonce on every request.
pub const NONCE_HEADER: &str = "X-Styler-Nonce";

/// Machine-readable error code the server uses to signal an expired
/// nonce on a 403 response.
pub const NONCE_EXPIRED_CODE: &str = "invalid_nonce";

/// Minimum length accepted by [`SyncClient::is_valid_nonce`].
const MIN_NONCE_LEN: usize = 10;

/// Backoff ceiling; exponential delays never exceed this.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

const TIMEOUT_MESSAGE: &str = "Request timed out. Please check your connection and try again.";
const NETWORK_MESSAGE: &str =
    "Network error. Please check your internet connection and try again.";
const AUTH_MESSAGE: &str = "Authentication failed. Please refresh the page and try again.";

/// Future returned by a nonce refresh callback.
pub type RefreshFuture = BoxFuture<'static, anyhow::Result<String>>;

type RefreshCallback = dyn Fn() -> RefreshFuture + Send + Sync;

/// HTTP persistence client for settings documents.
///
/// Cloning is cheap; clones share the queue, nonce, and interceptor
/// chains. See the crate docs for the transport and queueing model.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    debug: bool,
    nonce: RwLock<String>,
    refresh: RwLock<Option<Arc<RefreshCallback>>>,
    /// Serializes concurrent refresh attempts so the callback runs
    /// once per expiry burst.
    refresh_gate: tokio::sync::Mutex<()>,
    request_interceptors: Mutex<InterceptorChain<RequestInterceptor>>,
    response_interceptors: Mutex<InterceptorChain<ResponseInterceptor>>,
    queue: Mutex<QueueState>,
    bus: Option<EventBus>,
}

/// A single attempt's failure mode, before retry policy is applied.
enum Failure {
    Timeout,
    Transport(String),
    Server(u16),
}

impl Failure {
    fn into_terminal(self) -> SyncError {
        match self {
            Self::Timeout => SyncError::Timeout(TIMEOUT_MESSAGE.into()),
            Self::Transport(_) => SyncError::Network(NETWORK_MESSAGE.into()),
            Self::Server(status) => SyncError::Server {
                status,
                message: retryable_server_message(status).into(),
            },
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Transport(detail) => write!(f, "transport error: {detail}"),
            Self::Server(status) => write!(f, "server responded {status}"),
        }
    }
}

fn retryable_server_message(status: u16) -> &'static str {
    if status == 429 {
        "Too many requests. Please wait a moment and try again."
    } else {
        "Server error. Please try again later."
    }
}

enum AttemptError {
    /// 403 carrying [`NONCE_EXPIRED_CODE`]; eligible for one
    /// refresh-and-replay.
    NonceExpired,
    Terminal(SyncError),
    Retryable(Failure),
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        tracing::error!("sync client lock poisoned; recovering");
        poisoned.into_inner()
    })
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

impl SyncClient {
    /// Create a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for a missing/unparseable
    /// base URL or a missing nonce.
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        Self::build(config, None)
    }

    /// As [`SyncClient::new`], additionally publishing lifecycle
    /// events (`save:started`, `save:completed`, ...) on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for a missing/unparseable
    /// base URL or a missing nonce.
    pub fn with_event_bus(config: SyncConfig, bus: EventBus) -> SyncResult<Self> {
        Self::build(config, Some(bus))
    }

    fn build(config: SyncConfig, bus: Option<EventBus>) -> SyncResult<Self> {
        let base_url = config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("styler-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                timeout: config.timeout,
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
                debug: config.debug,
                nonce: RwLock::new(config.nonce),
                refresh: RwLock::new(None),
                refresh_gate: tokio::sync::Mutex::new(()),
                request_interceptors: Mutex::default(),
                response_interceptors: Mutex::default(),
                queue: Mutex::default(),
                bus,
            }),
        })
    }

    // =========================================================================
    // Settings, templates, palettes
    // =========================================================================

    /// Fetch the current settings document.
    ///
    /// # Errors
    ///
    /// Transport/server errors per the retry policy;
    /// [`SyncError::UnexpectedResponse`] if the body is not an object.
    pub async fn get_settings(&self) -> SyncResult<Value> {
        let value = self.request_value(Method::GET, "/settings", None).await?;
        if !value.is_object() {
            return Err(SyncError::UnexpectedResponse(
                "settings response must be an object".into(),
            ));
        }
        Ok(value)
    }

    /// Persist a settings document. Serialized through the mutation
    /// queue; equal concurrent saves coalesce onto one request.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidSettings`] (before any I/O) unless
    /// `document` is a JSON object; otherwise transport/server errors
    /// per the retry policy.
    pub async fn save_settings(&self, document: Value) -> SyncResult<Value> {
        if !document.is_object() {
            return Err(SyncError::InvalidSettings);
        }
        self.enqueue(Operation::SaveSettings(document)).await
    }

    /// Reset settings to their server-side defaults. Serialized
    /// through the mutation queue.
    ///
    /// # Errors
    ///
    /// Transport/server errors per the retry policy.
    pub async fn reset_settings(&self) -> SyncResult<Value> {
        self.enqueue(Operation::ResetSettings).await
    }

    /// Fetch the available templates.
    ///
    /// # Errors
    ///
    /// Transport/server errors per the retry policy;
    /// [`SyncError::UnexpectedResponse`] if the body is not an array.
    pub async fn get_templates(&self) -> SyncResult<Value> {
        let value = self.request_value(Method::GET, "/templates", None).await?;
        if !value.is_array() {
            return Err(SyncError::UnexpectedResponse(
                "templates response must be an array".into(),
            ));
        }
        Ok(value)
    }

    /// Apply a template server-side. Serialized through the mutation
    /// queue; concurrent calls for the same id coalesce.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidIdentifier`] (before any I/O) for an empty
    /// id; otherwise transport/server errors per the retry policy.
    pub async fn apply_template(&self, template_id: &str) -> SyncResult<Value> {
        if template_id.is_empty() {
            return Err(SyncError::InvalidIdentifier("template id".into()));
        }
        self.enqueue(Operation::ApplyTemplate(template_id.to_string()))
            .await
    }

    /// Fetch the available color palettes.
    ///
    /// # Errors
    ///
    /// Transport/server errors per the retry policy;
    /// [`SyncError::UnexpectedResponse`] if the body is not an array.
    pub async fn get_palettes(&self) -> SyncResult<Value> {
        let value = self.request_value(Method::GET, "/palettes", None).await?;
        if !value.is_array() {
            return Err(SyncError::UnexpectedResponse(
                "palettes response must be an array".into(),
            ));
        }
        Ok(value)
    }

    /// Apply a palette server-side. Serialized through the mutation
    /// queue; concurrent calls for the same id coalesce.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidIdentifier`] (before any I/O) for an empty
    /// id; otherwise transport/server errors per the retry policy.
    pub async fn apply_palette(&self, palette_id: &str) -> SyncResult<Value> {
        if palette_id.is_empty() {
            return Err(SyncError::InvalidIdentifier("palette id".into()));
        }
        self.enqueue(Operation::ApplyPalette(palette_id.to_string()))
            .await
    }

    // =========================================================================
    // Interceptors
    // =========================================================================

    /// Register a request interceptor, run on every attempt in
    /// registration order.
    #[must_use = "dropping the handle makes the interceptor permanent"]
    pub fn add_request_interceptor<F>(&self, interceptor: F) -> InterceptorHandle
    where
        F: Fn(RequestConfig) -> RequestConfig + Send + Sync + 'static,
    {
        let id = lock_recovering(&self.inner.request_interceptors).add(Arc::new(interceptor));
        let weak = Arc::downgrade(&self.inner);
        InterceptorHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock_recovering(&inner.request_interceptors).remove(id);
            }
        })
    }

    /// Register a response interceptor, run on every successful
    /// response in registration order.
    #[must_use = "dropping the handle makes the interceptor permanent"]
    pub fn add_response_interceptor<F>(&self, interceptor: F) -> InterceptorHandle
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let id = lock_recovering(&self.inner.response_interceptors).add(Arc::new(interceptor));
        let weak = Arc::downgrade(&self.inner);
        InterceptorHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock_recovering(&inner.response_interceptors).remove(id);
            }
        })
    }

    // =========================================================================
    // Nonce management
    // =========================================================================

    /// Register the callback used to obtain a fresh nonce when the
    /// server reports expiry. Replaces any previous callback.
    pub fn set_nonce_refresh_callback<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let wrapped: Arc<RefreshCallback> =
            Arc::new(move || -> RefreshFuture { Box::pin(callback()) });
        match self.inner.refresh.write() {
            Ok(mut guard) => *guard = Some(wrapped),
            Err(poisoned) => {
                tracing::error!("refresh callback lock poisoned; recovering");
                *poisoned.into_inner() = Some(wrapped);
            }
        }
    }

    /// Replace the stored nonce. All subsequent requests use the new
    /// value.
    pub fn update_nonce(&self, nonce: impl Into<String>) {
        let nonce = nonce.into();
        match self.inner.nonce.write() {
            Ok(mut guard) => *guard = nonce,
            Err(poisoned) => {
                tracing::error!("nonce lock poisoned; recovering");
                *poisoned.into_inner() = nonce;
            }
        }
    }

    /// The nonce currently attached to outgoing requests.
    #[must_use]
    pub fn nonce(&self) -> String {
        match self.inner.nonce.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                tracing::error!("nonce lock poisoned; recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    /// Format check for nonce values: at least ten characters, no
    /// whitespace. Usable without an instance.
    #[must_use]
    pub fn is_valid_nonce(value: &str) -> bool {
        value.len() >= MIN_NONCE_LEN && !value.chars().any(char::is_whitespace)
    }

    // =========================================================================
    // Queue introspection
    // =========================================================================

    /// Number of pending (not-yet-dispatched) queue entries. The
    /// in-flight request is not counted.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        lock_recovering(&self.inner.queue).pending.len()
    }

    /// Discard every pending queue entry without settling it.
    ///
    /// Discarded callers remain pending for the client's lifetime;
    /// this is a cleanup escape hatch, not a cancellation mechanism.
    /// The in-flight request, if any, is unaffected.
    pub fn clear_queue(&self) {
        let mut queue = lock_recovering(&self.inner.queue);
        let state = &mut *queue;
        let discarded = state.pending.len();
        for entry in state.pending.drain(..) {
            state.parked.extend(entry.waiters);
        }
        if discarded > 0 {
            tracing::warn!(discarded, "request queue cleared; discarded callers stay pending");
        }
    }

    // =========================================================================
    // Queue internals
    // =========================================================================

    async fn enqueue(&self, op: Operation) -> SyncResult<Value> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let key = op.identity_key();

        let start_drain = {
            let mut queue = lock_recovering(&self.inner.queue);
            let state = &mut *queue;

            match state.in_flight.as_mut() {
                Some(in_flight) if in_flight.key == key => {
                    // Equal request already on the wire: share its result.
                    in_flight.waiters.push(tx);
                }
                _ => {
                    if let Some(entry) = state.pending.iter_mut().find(|e| e.key == key) {
                        entry.waiters.push(tx);
                    } else {
                        state.pending.push_back(QueueEntry {
                            key,
                            op,
                            created_at: Instant::now(),
                            waiters: vec![tx],
                        });
                    }
                }
            }

            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        if start_drain {
            let client = self.clone();
            tokio::spawn(async move {
                client.drain_queue().await;
            });
        }

        match rx.await {
            Ok(result) => result,
            // The drain task died without settling; treat as transport loss.
            Err(_) => Err(SyncError::Network(NETWORK_MESSAGE.into())),
        }
    }

    async fn drain_queue(&self) {
        loop {
            let op = {
                let mut queue = lock_recovering(&self.inner.queue);
                match queue.pending.pop_front() {
                    Some(entry) => {
                        let QueueEntry {
                            key,
                            op,
                            created_at,
                            waiters,
                        } = entry;
                        if self.inner.debug {
                            tracing::debug!(
                                %key,
                                queued_for = ?created_at.elapsed(),
                                "dispatching queued request"
                            );
                        }
                        queue.in_flight = Some(InFlight { key, waiters });
                        op
                    }
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            self.publish(events::SAVE_STARTED, &json!({ "operation": op.kind() }));

            let result = self.execute_operation(&op).await;

            match &result {
                Ok(_) => {
                    self.publish(events::SAVE_COMPLETED, &json!({ "operation": op.kind() }));
                    match &op {
                        Operation::ApplyTemplate(id) => {
                            self.publish(events::TEMPLATE_APPLIED, &json!({ "id": id }));
                        }
                        Operation::ApplyPalette(id) => {
                            self.publish(events::PALETTE_APPLIED, &json!({ "id": id }));
                        }
                        Operation::SaveSettings(_) | Operation::ResetSettings => {
                            self.publish(
                                events::SETTINGS_CHANGED,
                                &json!({ "operation": op.kind() }),
                            );
                        }
                    }
                }
                Err(error) => {
                    let payload = json!({
                        "operation": op.kind(),
                        "error": error.to_string(),
                    });
                    self.publish(events::SAVE_FAILED, &payload);
                    self.publish(events::ERROR_OCCURRED, &payload);
                }
            }

            let waiters: Vec<Waiter> = {
                let mut queue = lock_recovering(&self.inner.queue);
                queue
                    .in_flight
                    .take()
                    .map(|in_flight| in_flight.waiters)
                    .unwrap_or_default()
            };
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }

    async fn execute_operation(&self, op: &Operation) -> SyncResult<Value> {
        let response = self
            .request_value(Method::POST, &op.path(), op.body())
            .await?;

        if response.get("success").and_then(Value::as_bool) != Some(true) {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| format!("{} failed", op.kind()), ToString::to_string);
            return Err(SyncError::UnexpectedResponse(message));
        }

        Ok(op.extract(response))
    }

    fn publish(&self, event: &str, payload: &Value) {
        if let Some(bus) = &self.inner.bus {
            bus.emit(event, payload);
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    async fn request_value(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let mut attempt: u32 = 0;
        let mut nonce_retried = false;

        loop {
            match self.attempt(method.clone(), path, body).await {
                Ok(value) => return Ok(value),

                Err(AttemptError::NonceExpired) => {
                    if nonce_retried || !self.refresh_nonce().await {
                        return Err(SyncError::AuthExpired(AUTH_MESSAGE.into()));
                    }
                    // Replay with the fresh nonce; does not consume a
                    // retry attempt.
                    nonce_retried = true;
                }

                Err(AttemptError::Terminal(error)) => return Err(error),

                Err(AttemptError::Retryable(failure)) => {
                    if attempt >= self.inner.max_retries {
                        return Err(failure.into_terminal());
                    }
                    let delay = backoff_delay(self.inner.retry_delay, attempt);
                    tracing::warn!(
                        path,
                        attempt = attempt + 1,
                        max_retries = self.inner.max_retries,
                        ?delay,
                        %failure,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, AttemptError> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(NONCE_HEADER.to_string(), self.nonce());

        let mut config = RequestConfig {
            method,
            path: path.to_string(),
            headers,
            body: body.cloned(),
        };

        let request_interceptors = lock_recovering(&self.inner.request_interceptors).snapshot();
        for interceptor in request_interceptors {
            config = interceptor(config);
        }

        let url = self.endpoint_url(&config.path)?;
        if self.inner.debug {
            tracing::debug!(method = %config.method, %url, "dispatching request");
        }

        let mut request = self
            .inner
            .http
            .request(config.method.clone(), url)
            .timeout(self.inner.timeout);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &config.body {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                AttemptError::Terminal(SyncError::UnexpectedResponse(format!(
                    "failed to encode request body: {e}"
                )))
            })?;
            request = request.body(bytes);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(AttemptError::Retryable(Failure::Timeout)),
            Err(e) => {
                return Err(AttemptError::Retryable(Failure::Transport(e.to_string())))
            }
        };

        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            let body: Value = response.json().await.unwrap_or_else(|_| json!({}));
            if body.get("code").and_then(Value::as_str) == Some(NONCE_EXPIRED_CODE) {
                return Err(AttemptError::NonceExpired);
            }
            return Err(AttemptError::Terminal(SyncError::AuthExpired(
                AUTH_MESSAGE.into(),
            )));
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Retryable(Failure::Server(status.as_u16())));
        }

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or_else(|_| json!({}));
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| format!("HTTP {status}"), ToString::to_string);
            return Err(AttemptError::Terminal(SyncError::Server {
                status: status.as_u16(),
                message,
            }));
        }

        let mut value: Value = response.json().await.map_err(|e| {
            AttemptError::Terminal(SyncError::UnexpectedResponse(format!(
                "failed to parse response body: {e}"
            )))
        })?;

        let response_interceptors = lock_recovering(&self.inner.response_interceptors).snapshot();
        for interceptor in response_interceptors {
            value = interceptor(value);
        }

        Ok(value)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, AttemptError> {
        let joined = if path.starts_with('/') {
            format!("{}{path}", self.inner.base_url)
        } else {
            format!("{}/{path}", self.inner.base_url)
        };
        Url::parse(&joined).map_err(|e| {
            AttemptError::Terminal(SyncError::Configuration(format!(
                "invalid request URL {joined}: {e}"
            )))
        })
    }

    /// Run the refresh callback, swapping the nonce on success.
    /// Returns false when no callback is registered or the refresh
    /// fails.
    async fn refresh_nonce(&self) -> bool {
        let callback = match self.inner.refresh.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                tracing::error!("refresh callback lock poisoned; recovering");
                poisoned.into_inner().clone()
            }
        };
        let Some(callback) = callback else {
            tracing::warn!("nonce expired but no refresh callback is registered");
            return false;
        };

        let _gate = self.inner.refresh_gate.lock().await;

        match callback().await {
            Ok(new_nonce) if !new_nonce.is_empty() => {
                self.update_nonce(new_nonce);
                tracing::debug!("auth nonce refreshed");
                true
            }
            Ok(_) => {
                tracing::warn!("nonce refresh callback returned an empty value");
                false
            }
            Err(error) => {
                tracing::warn!(%error, "nonce refresh failed");
                false
            }
        }
    }
}
