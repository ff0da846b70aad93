use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Saturating counters for protocol traffic and render passes.
#[derive(Debug, Default, Clone)]
pub struct LayerMetrics {
    dispatches: u64,
    pushes: u64,
    updates: u64,
    updates_gated: u64,
    removes: u64,
    dropped: u64,
    renders: u64,
    layers_rendered: u64,
}

impl LayerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&mut self, kind: &str) {
        self.dispatches = self.dispatches.saturating_add(1);
        match kind {
            "push" => self.pushes = self.pushes.saturating_add(1),
            "update" => self.updates = self.updates.saturating_add(1),
            "remove" => self.removes = self.removes.saturating_add(1),
            _ => {}
        }
    }

    /// An update that reached a container but changed nothing.
    pub fn record_update_gated(&mut self) {
        self.updates_gated = self.updates_gated.saturating_add(1);
    }

    /// A dispatch that found no listeners.
    pub fn record_dropped(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }

    pub fn record_render(&mut self, layer_count: usize) {
        self.renders = self.renders.saturating_add(1);
        self.layers_rendered = self.layers_rendered.saturating_add(layer_count as u64);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            dispatches: self.dispatches,
            pushes: self.pushes,
            updates: self.updates,
            updates_gated: self.updates_gated,
            removes: self.removes,
            dropped: self.dropped,
            renders: self.renders,
            layers_rendered: self.layers_rendered,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub dispatches: u64,
    pub pushes: u64,
    pub updates: u64,
    pub updates_gated: u64,
    pub removes: u64,
    pub dropped: u64,
    pub renders: u64,
    pub layers_rendered: u64,
}

impl MetricSnapshot {
    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("dispatches".to_string(), json!(self.dispatches));
        map.insert("pushes".to_string(), json!(self.pushes));
        map.insert("updates".to_string(), json!(self.updates));
        map.insert("updates_gated".to_string(), json!(self.updates_gated));
        map.insert("removes".to_string(), json!(self.removes));
        map.insert("dropped".to_string(), json!(self.dropped));
        map.insert("renders".to_string(), json!(self.renders));
        map.insert("layers_rendered".to_string(), json!(self.layers_rendered));
        map
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "layer_metrics", self.as_fields())
    }
}
