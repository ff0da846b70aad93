//! Error module orchestrator; the types live in the private `types` module.

mod types;

pub use types::{LayerError, Result};
