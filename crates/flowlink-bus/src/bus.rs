//! The event bus and its subscription registry.
//!
//! Registrations live in a single arena keyed by [`SubscriptionId`]. Ids are
//! handed out in increasing order, so iterating the arena (or any id set)
//! yields registration order. Exact-name registrations are additionally
//! indexed by event name; wildcard registrations are kept in their own set.
//!
//! The registry lock is never held while a handler runs. Handlers may
//! subscribe, unsubscribe, or emit from inside their own body.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::error::{BusError, HandlerResult};
use crate::event::{BusEvent, BusStats, HandlerFailure, SubscriptionId};
use crate::pattern::WildcardPattern;
use crate::{DEFAULT_HISTORY_CAPACITY, ERROR_EVENT};

type SyncHandler = Arc<dyn Fn(&BusEvent) -> HandlerResult + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(BusEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Persistent,
    Once,
    Wildcard,
}

struct Entry {
    /// Event name, or the pattern source for wildcard entries.
    key: String,
    kind: Kind,
    pattern: Option<WildcardPattern>,
    handler: Handler,
}

/// A handler selected for one dispatch.
struct Matched {
    id: SubscriptionId,
    pattern: Option<String>,
    handler: Handler,
}

struct Registry {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Entry>,
    exact: BTreeMap<String, BTreeSet<SubscriptionId>>,
    wildcards: BTreeSet<SubscriptionId>,
    history: VecDeque<BusEvent>,
    history_capacity: usize,
    logging: bool,
}

impl Registry {
    fn new(history_capacity: usize) -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            exact: BTreeMap::new(),
            wildcards: BTreeSet::new(),
            history: VecDeque::new(),
            history_capacity,
            logging: true,
        }
    }

    fn insert(&mut self, key: &str, kind: Kind, pattern: Option<WildcardPattern>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        match kind {
            Kind::Wildcard => {
                self.wildcards.insert(id);
            }
            Kind::Persistent | Kind::Once => {
                self.exact.entry(key.to_string()).or_default().insert(id);
            }
        }
        self.entries.insert(
            id,
            Entry {
                key: key.to_string(),
                kind,
                pattern,
                handler,
            },
        );
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        match entry.kind {
            Kind::Wildcard => {
                self.wildcards.remove(&id);
            }
            Kind::Persistent | Kind::Once => {
                if let Some(ids) = self.exact.get_mut(&entry.key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.exact.remove(&entry.key);
                    }
                }
            }
        }
        Some(entry)
    }

    fn record(&mut self, event: &BusEvent) {
        if self.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
    }

    /// Select the handlers for `event`, consuming one-shot registrations.
    fn select(&mut self, event: &str) -> Vec<Matched> {
        let mut persistent = Vec::new();
        let mut once = Vec::new();

        if let Some(ids) = self.exact.get(event) {
            for id in ids {
                if let Some(entry) = self.entries.get(id) {
                    match entry.kind {
                        Kind::Persistent => persistent.push(*id),
                        Kind::Once => once.push(*id),
                        Kind::Wildcard => {}
                    }
                }
            }
        }

        let mut matched: Vec<Matched> = Vec::new();
        for id in persistent {
            if let Some(entry) = self.entries.get(&id) {
                matched.push(Matched {
                    id,
                    pattern: None,
                    handler: entry.handler.clone(),
                });
            }
        }
        // One-shot entries leave the registry before any handler runs.
        for id in once {
            if let Some(entry) = self.remove(id) {
                matched.push(Matched {
                    id,
                    pattern: None,
                    handler: entry.handler,
                });
            }
        }
        for id in &self.wildcards {
            if let Some(entry) = self.entries.get(id) {
                if entry.pattern.as_ref().is_some_and(|p| p.matches(event)) {
                    matched.push(Matched {
                        id: *id,
                        pattern: Some(entry.key.clone()),
                        handler: entry.handler.clone(),
                    });
                }
            }
        }
        matched
    }
}

/// In-process publish/subscribe hub.
///
/// Cheap to clone; clones share the same registrations and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("stats", &self.stats()).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a bus keeping at most `capacity` events in history.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(
        &self,
        key: &str,
        kind: Kind,
        pattern: Option<WildcardPattern>,
        handler: Handler,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.insert(key, kind, pattern, handler);
        if registry.logging {
            tracing::debug!(event = %key, subscription = %id, kind = ?kind, "Subscribed");
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    // ── Subscribing ──

    /// Register a persistent handler for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event, Kind::Persistent, None, Handler::Sync(Arc::new(handler)))
    }

    /// Register a persistent handler whose work completes asynchronously.
    ///
    /// [`emit_async`](Self::emit_async) awaits the returned future. A plain
    /// [`emit`](Self::emit) spawns it on the current tokio runtime.
    pub fn on_async<F, Fut>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |event| handler(event).boxed());
        self.register(event, Kind::Persistent, None, Handler::Async(handler))
    }

    /// Register a handler that runs at most once.
    ///
    /// The registration is removed before the handler body runs, so a handler
    /// that re-emits the same event cannot trigger itself.
    pub fn once<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event, Kind::Once, None, Handler::Sync(Arc::new(handler)))
    }

    /// Register a persistent handler for every event whose name matches `pattern`.
    pub fn on_wildcard<F>(&self, pattern: &str, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let compiled = WildcardPattern::new(pattern)?;
        Ok(self.register(
            pattern,
            Kind::Wildcard,
            Some(compiled),
            Handler::Sync(Arc::new(handler)),
        ))
    }

    // ── Unsubscribing ──

    /// Remove an exact (persistent or one-shot) registration for `event`.
    /// Returns false if no such registration exists.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        self.remove_matching(id, |entry| entry.kind != Kind::Wildcard && entry.key == event)
    }

    /// Remove a wildcard registration for `pattern`.
    /// Returns false if no such registration exists.
    pub fn off_wildcard(&self, pattern: &str, id: SubscriptionId) -> bool {
        self.remove_matching(id, |entry| entry.kind == Kind::Wildcard && entry.key == pattern)
    }

    fn remove_matching(&self, id: SubscriptionId, accept: impl Fn(&Entry) -> bool) -> bool {
        let mut registry = self.lock();
        if !registry.entries.get(&id).is_some_and(accept) {
            return false;
        }
        if let Some(entry) = registry.remove(id) {
            if registry.logging {
                tracing::debug!(event = %entry.key, subscription = %id, "Unsubscribed");
            }
        }
        true
    }

    /// Remove every registration for `event` (exact, one-shot and a wildcard
    /// registered under that exact pattern string), or every registration of
    /// every kind when `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let mut registry = self.lock();
        match event {
            Some(event) => {
                let doomed: Vec<SubscriptionId> = registry
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.key == event)
                    .map(|(id, _)| *id)
                    .collect();
                for id in doomed {
                    registry.remove(id);
                }
            }
            None => {
                registry.entries.clear();
                registry.exact.clear();
                registry.wildcards.clear();
            }
        }
        if registry.logging {
            tracing::debug!(event = ?event, "Removed all listeners");
        }
    }

    // ── Emitting ──

    /// Dispatch `event` synchronously and return the number of handlers invoked.
    ///
    /// Order: exact persistent handlers, then exact one-shot handlers, then
    /// wildcard handlers, each in registration order. A failing or panicking
    /// handler never stops the others and never propagates to the caller;
    /// it is re-emitted as an `error` event carrying a [`HandlerFailure`].
    pub fn emit(&self, event: &str, payload: serde_json::Value) -> usize {
        let (record, matched) = self.prepare(event, payload, "Emitting");

        for m in &matched {
            match &m.handler {
                Handler::Sync(handler) => {
                    if let Err(error) = invoke(handler, &record) {
                        self.report_failure(failure(&record, m, error));
                    }
                }
                Handler::Async(handler) => self.spawn_detached(handler, &record, m),
            }
        }
        matched.len()
    }

    /// Dispatch `event` to every matching handler and wait until all of them
    /// settle. Handlers run concurrently; failures are re-emitted as `error`
    /// events and never reject this call. Returns the number of handlers invoked.
    pub async fn emit_async(&self, event: &str, payload: serde_json::Value) -> usize {
        let (record, matched) = self.prepare(event, payload, "Emitting async");

        let mut pending: Vec<BoxFuture<'static, (usize, Result<(), String>)>> =
            Vec::with_capacity(matched.len());
        for (index, m) in matched.iter().enumerate() {
            match &m.handler {
                Handler::Sync(handler) => {
                    let outcome = invoke(handler, &record);
                    pending.push(futures::future::ready((index, outcome)).boxed());
                }
                Handler::Async(handler) => {
                    let fut = settle(handler(record.clone()));
                    pending.push(fut.map(move |outcome| (index, outcome)).boxed());
                }
            }
        }

        let results = futures::future::join_all(pending).await;
        let failures: Vec<(usize, String)> = results
            .into_iter()
            .filter_map(|(index, outcome)| outcome.err().map(|e| (index, e)))
            .collect();

        if !failures.is_empty() {
            tracing::warn!(event = %event, failed = failures.len(), "Handlers failed");
            for (index, error) in failures {
                self.report_failure(failure(&record, &matched[index], error));
            }
        }
        matched.len()
    }

    fn prepare(&self, event: &str, payload: serde_json::Value, verb: &str) -> (BusEvent, Vec<Matched>) {
        let record = BusEvent::new(event, payload);
        let mut registry = self.lock();
        registry.record(&record);
        if registry.logging {
            tracing::debug!(event = %event, id = %record.id, "{verb}");
        }
        let matched = registry.select(event);
        (record, matched)
    }

    fn spawn_detached(&self, handler: &AsyncHandler, record: &BusEvent, m: &Matched) {
        let fut = settle(handler(record.clone()));
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let bus = self.clone();
                let record = record.clone();
                let id = m.id;
                let pattern = m.pattern.clone();
                runtime.spawn(async move {
                    if let Err(error) = fut.await {
                        bus.report_failure(HandlerFailure {
                            event: record.name,
                            error,
                            subscription_id: id,
                            pattern,
                        });
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    event = %record.name,
                    subscription = %m.id,
                    "No async runtime; async handler dropped"
                );
            }
        }
    }

    fn report_failure(&self, failure: HandlerFailure) {
        tracing::warn!(
            event = %failure.event,
            subscription = %failure.subscription_id,
            error = %failure.error,
            "Event handler failed"
        );
        // A failing `error` handler is only logged, otherwise failures recurse.
        if failure.event == ERROR_EVENT {
            return;
        }
        let payload = serde_json::to_value(&failure).unwrap_or(serde_json::Value::Null);
        self.emit(ERROR_EVENT, payload);
    }

    /// Resolve with the payload of the next `event`, or fail with
    /// [`BusError::Timeout`] once `timeout` elapses. A zero timeout waits forever.
    ///
    /// The one-shot registration is removed on timeout and when the returned
    /// future is dropped, so no handler lingers.
    pub async fn wait_for(&self, event: &str, timeout: Duration) -> Result<serde_json::Value, BusError> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let subscription = self.once(event, move |record| {
            let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(sender) = sender {
                let _ = sender.send(record.payload.clone());
            }
            Ok(())
        });
        let _guard = UnsubscribeOnDrop(Some(subscription));

        let received = if timeout.is_zero() {
            rx.await
        } else {
            match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received,
                Err(_) => {
                    return Err(BusError::Timeout {
                        event: event.to_string(),
                        timeout,
                    })
                }
            }
        };
        received.map_err(|_| BusError::Cancelled {
            event: event.to_string(),
        })
    }

    // ── Introspection ──

    /// Handlers that an emission of `event` would currently reach.
    pub fn listener_count(&self, event: &str) -> usize {
        let registry = self.lock();
        let exact = registry.exact.get(event).map_or(0, BTreeSet::len);
        let wildcard = registry
            .wildcards
            .iter()
            .filter_map(|id| registry.entries.get(id))
            .filter(|entry| entry.pattern.as_ref().is_some_and(|p| p.matches(event)))
            .count();
        exact + wildcard
    }

    /// Names with at least one exact (persistent or one-shot) registration, sorted.
    pub fn event_names(&self) -> Vec<String> {
        self.lock().exact.keys().cloned().collect()
    }

    /// The most recent `limit` emitted events, oldest first.
    pub fn event_history(&self, limit: usize) -> Vec<BusEvent> {
        let registry = self.lock();
        let skip = registry.history.len().saturating_sub(limit);
        registry.history.iter().skip(skip).cloned().collect()
    }

    /// The most recent `limit` emitted events whose name matches `pattern`, oldest first.
    pub fn events_by_pattern(&self, pattern: &str, limit: usize) -> Result<Vec<BusEvent>, BusError> {
        let pattern = WildcardPattern::new(pattern)?;
        let registry = self.lock();
        let matching: Vec<&BusEvent> = registry
            .history
            .iter()
            .filter(|event| pattern.matches(&event.name))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Toggle the per-subscribe and per-emit debug logging.
    pub fn set_logging(&self, enabled: bool) {
        self.lock().logging = enabled;
    }

    pub fn stats(&self) -> BusStats {
        let registry = self.lock();
        let mut regular = BTreeSet::new();
        let mut once = BTreeSet::new();
        let mut patterns = BTreeSet::new();
        for entry in registry.entries.values() {
            match entry.kind {
                Kind::Persistent => regular.insert(entry.key.as_str()),
                Kind::Once => once.insert(entry.key.as_str()),
                Kind::Wildcard => patterns.insert(entry.key.as_str()),
            };
        }
        BusStats {
            regular_events: regular.len(),
            once_events: once.len(),
            wildcard_patterns: patterns.len(),
            history_size: registry.history.len(),
            total_handlers: registry.entries.len(),
        }
    }
}

/// Handle to one registration, returned by every subscribe call.
///
/// Dropping it does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this registration. Returns false if it was already gone
    /// (fired one-shot, removed in bulk, or bus dropped).
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.remove(self.id).is_some()
    }
}

struct UnsubscribeOnDrop(Option<Subscription>);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }
}

fn invoke(handler: &SyncHandler, record: &BusEvent) -> Result<(), String> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(record))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(error.to_string()),
        Err(panic) => Err(panic_message(panic)),
    }
}

async fn settle(fut: BoxFuture<'static, HandlerResult>) -> Result<(), String> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(error.to_string()),
        Err(panic) => Err(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

fn failure(record: &BusEvent, m: &Matched, error: String) -> HandlerFailure {
    HandlerFailure {
        event: record.name.clone(),
        error,
        subscription_id: m.id,
        pattern: m.pattern.clone(),
    }
}
