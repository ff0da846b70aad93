//! Registry module orchestrator: the per-context message bus.

mod core;

pub use core::{ApiConfig, LayerApi, Listener, Subscription};
