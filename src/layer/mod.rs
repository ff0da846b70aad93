//! Layer data model: keys, lifecycle states, records, and protocol messages.
//!
//! Implementation details live in the private `core` module; downstream code
//! imports from here.

mod core;

pub use core::{
    ExitCompleter, LayerKey, LayerMessage, LayerRecord, LayerState, RenderArgs, RenderFn,
    render_fn,
};
