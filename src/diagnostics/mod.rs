//! Observability helpers that ride the registry as ordinary listeners.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::api::{LayerApi, Subscription};
use crate::layer::LayerMessage;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::LayerMetrics;

/// Logs protocol messages for observability/debugging.
///
/// Attach it to a registry and every dispatch it is configured for lands in
/// the logger as a structured event. Updates default to off because owners
/// that re-render often make them the chattiest kind by far.
pub struct LifecycleLogger {
    logger: Logger,
    level: LogLevel,
    log_pushes: bool,
    log_updates: bool,
    log_removes: bool,
}

impl LifecycleLogger {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_pushes: true,
            log_updates: false,
            log_removes: true,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_pushes(mut self, enabled: bool) -> Self {
        self.log_pushes = enabled;
        self
    }

    pub fn log_updates(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    pub fn log_removes(mut self, enabled: bool) -> Self {
        self.log_removes = enabled;
        self
    }

    /// Subscribe to `api`; logging stops when the returned guard drops.
    pub fn attach<T: 'static>(self, api: &LayerApi<T>) -> Subscription {
        api.subscribe(Arc::new(move |message: &LayerMessage<T>| {
            match message {
                LayerMessage::Push { layer } if self.log_pushes => {
                    self.emit(
                        "layer_pushed",
                        [
                            json_kv("key", json!(layer.key.get())),
                            json_kv("state", json!(layer.state.as_str())),
                        ],
                    );
                }
                LayerMessage::Update { layer } if self.log_updates => {
                    self.emit(
                        "layer_updated",
                        [
                            json_kv("key", json!(layer.key.get())),
                            json_kv("state", json!(layer.state.as_str())),
                        ],
                    );
                }
                LayerMessage::Remove { key } if self.log_removes => {
                    self.emit("layer_removed", [json_kv("key", json!(key.get()))]);
                }
                _ => {}
            }
        }))
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, "strata::diagnostics", message, fields);
        let _ = self.logger.log_event(event);
    }
}

/// Emits metric snapshots through the provided logger, at most once per
/// interval. A zero interval disables emission entirely.
pub struct MetricsReporter {
    logger: Logger,
    metrics: Arc<Mutex<LayerMetrics>>,
    target: String,
    interval: Duration,
    last_emit: Option<Instant>,
    started_at: Instant,
}

impl MetricsReporter {
    pub fn new(logger: Logger, metrics: Arc<Mutex<LayerMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "strata::metrics".to_string(),
            interval: Duration::from_secs(5),
            last_emit: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Emit a snapshot if the interval has elapsed since the last one.
    pub fn emit(&mut self) {
        if self.interval == Duration::ZERO {
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return;
            }
        }
        self.last_emit = Some(now);
        self.emit_at(now);
    }

    /// Emit a snapshot unconditionally, e.g. at shutdown.
    pub fn emit_now(&mut self) {
        let now = Instant::now();
        self.last_emit = Some(now);
        self.emit_at(now);
    }

    fn emit_at(&self, now: Instant) {
        let uptime = now.duration_since(self.started_at);
        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}
