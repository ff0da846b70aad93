use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::api::LayerApi;

/// Type-keyed map of default contexts.
///
/// Each render-artifact type gets one lazily-created [`LayerApi`] per
/// registry. The process-wide default lives behind [`default_context`];
/// applications needing isolation construct their own `LayerApi` (or their
/// own `ContextRegistry`) and pass it around explicitly — tests should
/// always do so, since the default registry is never reset.
#[derive(Default)]
pub struct ContextRegistry {
    inner: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry's context for artifact type `T`, created on first use.
    pub fn context<T: 'static>(&self) -> LayerApi<T> {
        let type_id = TypeId::of::<LayerApi<T>>();

        {
            let guard = self
                .inner
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = guard.get(&type_id) {
                return expect_api::<T>(existing.as_ref());
            }
        }

        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = guard
            .entry(type_id)
            .or_insert_with(|| Box::new(LayerApi::<T>::new()));
        expect_api::<T>(entry.as_ref())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Entries are only ever inserted under their own `TypeId`, so the downcast
// cannot fail.
fn expect_api<T: 'static>(entry: &(dyn Any + Send + Sync)) -> LayerApi<T> {
    entry
        .downcast_ref::<LayerApi<T>>()
        .expect("context registry entry stored under a foreign type id")
        .clone()
}

static DEFAULT_CONTEXTS: Lazy<ContextRegistry> = Lazy::new(ContextRegistry::new);

/// The process-wide default context for artifact type `T`.
pub fn default_context<T: 'static>() -> LayerApi<T> {
    DEFAULT_CONTEXTS.context::<T>()
}
