use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::json;

use crate::layer::LayerMessage;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::LayerMetrics;

/// Callback registered by a container (or any other consumer).
pub type Listener<T> = Arc<dyn Fn(&LayerMessage<T>) + Send + Sync>;

/// Observability knobs for a registry.
#[derive(Clone, Default)]
pub struct ApiConfig {
    /// Optional structured logger for dispatch traffic.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared with containers and reporters.
    pub metrics: Option<Arc<Mutex<LayerMetrics>>>,
}

impl ApiConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(LayerMetrics::new())));
        }
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<LayerMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

struct ListenerTable<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// Message bus for one layer context.
///
/// The registry is stateless beyond its listener set: it never holds the
/// layer list, and a dispatch with zero listeners is dropped rather than
/// buffered. Clones share the same context; `LayerApi::new` makes an
/// isolated one.
pub struct LayerApi<T> {
    listeners: Arc<Mutex<ListenerTable<T>>>,
    config: ApiConfig,
}

impl<T> Clone for LayerApi<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            config: self.config.clone(),
        }
    }
}

impl<T: 'static> Default for LayerApi<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> LayerApi<T> {
    /// Fresh, fully isolated context with silent observability defaults.
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(ListenerTable {
                next_id: 0,
                entries: Vec::new(),
            })),
            config,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Register a listener; it observes every subsequent dispatch, in
    /// subscription order, until the returned guard unsubscribes.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut table = lock_table(&self.listeners);
            let id = table.next_id;
            table.next_id += 1;
            table.entries.push((id, listener));
            id
        };

        let weak = Arc::downgrade(&self.listeners);
        Subscription::new(move || remove_listener(&weak, id))
    }

    /// Publish one message to every currently subscribed listener.
    ///
    /// The listener table is snapshotted before any listener runs, so a
    /// listener may subscribe or unsubscribe (itself included) mid-dispatch
    /// without corrupting the fan-out; such edits take effect from the next
    /// dispatch. With zero listeners the message is dropped outright.
    pub fn dispatch(&self, message: LayerMessage<T>) {
        let snapshot: Vec<Listener<T>> = {
            let table = lock_table(&self.listeners);
            table
                .entries
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        self.record_dispatch(&message, snapshot.len());

        for listener in &snapshot {
            listener(&message);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock_table(&self.listeners).entries.len()
    }

    fn record_dispatch(&self, message: &LayerMessage<T>, listeners: usize) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_dispatch(message.kind());
                if listeners == 0 {
                    guard.record_dropped();
                }
            }
        }

        if let Some(logger) = self.config.logger.as_ref() {
            let (level, name) = if listeners == 0 {
                (LogLevel::Warn, "message_dropped")
            } else {
                (LogLevel::Debug, "message_dispatched")
            };
            let event = event_with_fields(
                level,
                "strata::api",
                name,
                [
                    json_kv("kind", json!(message.kind())),
                    json_kv("key", json!(message.key().get())),
                    json_kv("listeners", json!(listeners)),
                ],
            );
            let _ = logger.log_event(event);
        }
    }
}

// A panicking listener cannot poison the table (it is never locked while
// listeners run); recover instead of propagating.
fn lock_table<T>(listeners: &Arc<Mutex<ListenerTable<T>>>) -> std::sync::MutexGuard<'_, ListenerTable<T>> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_listener<T>(weak: &Weak<Mutex<ListenerTable<T>>>, id: u64) {
    if let Some(listeners) = weak.upgrade() {
        let mut table = lock_table(&listeners);
        table.entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Guard returned by [`LayerApi::subscribe`].
///
/// `unsubscribe` removes exactly the listener this guard was returned for
/// and is idempotent; dropping the guard unsubscribes unconditionally. The
/// guard holds only a weak reference, so keeping it around never keeps a
/// context alive.
pub struct Subscription {
    released: AtomicBool,
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            released: AtomicBool::new(false),
            cancel: Box::new(cancel),
        }
    }

    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.cancel)();
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
