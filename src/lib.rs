//! Message-passing registry for stacked UI layers (tooltips, dialogs,
//! dropdowns, popovers).
//!
//! Owners declare layers anywhere; a single [`LayerContainer`] per context
//! folds the resulting message stream into an ordered list and produces the
//! layers' render artifacts in stacking order. Because the container — not
//! the owner — holds each record, a layer can keep rendering through an exit
//! transition after its owner is gone, until its [`ExitCompleter`] fires.
//!
//! The crate is generic over the opaque artifact type a render function
//! produces; turning artifacts into pixels belongs to the host. Alongside
//! the declarative [`LayerHandle`] surface, [`LayerApi::dispatch`] is public
//! for hosts that prefer to manage layers imperatively.

pub mod api;
pub mod container;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod layer;
pub mod logging;
pub mod metrics;
pub mod owner;

pub use api::{ApiConfig, LayerApi, Listener, Subscription};
pub use container::{ContainerConfig, LayerContainer, LayerList};
pub use context::{ContextRegistry, default_context};
pub use diagnostics::{LifecycleLogger, MetricsReporter};
pub use error::{LayerError, Result};
pub use layer::{
    ExitCompleter, LayerKey, LayerMessage, LayerRecord, LayerState, RenderArgs, RenderFn,
    render_fn,
};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{LayerMetrics, MetricSnapshot};
pub use owner::LayerHandle;
