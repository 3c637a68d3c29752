//! Request and response interceptor chains.
//!
//! Interceptors run on every attempt, in registration order. Request
//! interceptors may rewrite the outgoing [`RequestConfig`]; response
//! interceptors may rewrite the parsed body before it reaches the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

/// The outgoing request as seen by request interceptors.
///
/// Headers already include `Content-Type` and the current auth nonce
/// when interceptors run; the path is joined onto the configured base
/// URL after the chain completes.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// HTTP method.
    pub method: Method,
    /// Endpoint path, e.g. `/settings`.
    pub path: String,
    /// Outgoing headers.
    pub headers: HashMap<String, String>,
    /// JSON body, when present.
    pub body: Option<Value>,
}

/// A request interceptor: transforms the outgoing configuration.
pub type RequestInterceptor = dyn Fn(RequestConfig) -> RequestConfig + Send + Sync;

/// A response interceptor: transforms the parsed response body.
pub type ResponseInterceptor = dyn Fn(Value) -> Value + Send + Sync;

/// An ordered chain of interceptors with stable removal ids.
pub(crate) struct InterceptorChain<T: ?Sized> {
    entries: Vec<(u64, Arc<T>)>,
    next_id: u64,
}

impl<T: ?Sized> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T: ?Sized> InterceptorChain<T> {
    /// Append an interceptor, returning its removal id.
    pub(crate) fn add(&mut self, interceptor: Arc<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, interceptor));
        id
    }

    /// Remove an interceptor by id. Unknown ids are a no-op.
    pub(crate) fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// Snapshot the chain in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by the `add_*_interceptor` methods.
///
/// [`InterceptorHandle::remove`] detaches the interceptor; calling it
/// again is a no-op. The handle holds no strong reference to the
/// client.
pub struct InterceptorHandle {
    remove: Box<dyn Fn() + Send + Sync>,
}

impl InterceptorHandle {
    pub(crate) fn new(remove: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            remove: Box::new(remove),
        }
    }

    /// Remove the interceptor this handle was returned for.
    pub fn remove(&self) {
        (self.remove)();
    }
}
