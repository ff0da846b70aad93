use thiserror::Error;

use crate::layer::LayerKey;

/// Unified result type for the crate.
pub type Result<T> = std::result::Result<T, LayerError>;

/// Protocol-misuse errors surfaced by the layer list.
///
/// Orphaned updates and removals are deliberately not represented here: a
/// message referencing an absent key is a silent no-op, because owners and
/// containers may observe transient mismatches during concurrent activity.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LayerError {
    #[error("layer key `{0}` is already present")]
    DuplicateKey(LayerKey),
}
