use std::sync::Arc;

use crate::api::LayerApi;
use crate::layer::{ExitCompleter, LayerKey, LayerMessage, LayerRecord, RenderFn};

/// Owner-side handle for one layer, bound to one call site's lifecycle.
///
/// Activation is construction, so a handle can never push twice. Dropping a
/// still-active handle deactivates it: owner teardown and deactivation are
/// the same event, which is what lets a layer in exit-transition mode outlive
/// the code that created it — once pushed, the container owns the record and
/// the handle merely retains the right to message that key.
pub struct LayerHandle<T: 'static> {
    api: LayerApi<T>,
    key: LayerKey,
    render: RenderFn<T>,
    transition_exit: bool,
    active: bool,
}

impl<T: 'static> LayerHandle<T> {
    /// Push a layer that is removed immediately on deactivation.
    pub fn activate(api: &LayerApi<T>, render: RenderFn<T>) -> Self {
        Self::with_mode(api, render, false)
    }

    /// Push a layer that moves to `TransitionExit` on deactivation and stays
    /// mounted until its completer fires.
    pub fn activate_with_exit_transition(api: &LayerApi<T>, render: RenderFn<T>) -> Self {
        Self::with_mode(api, render, true)
    }

    fn with_mode(api: &LayerApi<T>, render: RenderFn<T>, transition_exit: bool) -> Self {
        let key = LayerKey::allocate();
        api.dispatch(LayerMessage::Push {
            layer: LayerRecord::new(key, Arc::clone(&render)),
        });
        Self {
            api: api.clone(),
            key,
            render,
            transition_exit,
            active: true,
        }
    }

    pub fn key(&self) -> LayerKey {
        self.key
    }

    pub fn transition_exit_requested(&self) -> bool {
        self.transition_exit
    }

    /// Replace the layer's content.
    ///
    /// Gated on reference identity against the last dispatched render:
    /// re-issuing the same `Arc` sends nothing. Returns whether an update
    /// was dispatched.
    pub fn update_content(&mut self, render: RenderFn<T>) -> bool {
        if Arc::ptr_eq(&self.render, &render) {
            return false;
        }
        self.render = Arc::clone(&render);
        self.api.dispatch(LayerMessage::Update {
            layer: LayerRecord::new(self.key, render),
        });
        true
    }

    /// End this owner's claim on the layer.
    ///
    /// Without an exit transition the layer is removed immediately and
    /// `None` is returned. With one, the layer advances to `TransitionExit`
    /// and the armed completer is returned; the same completer also reaches
    /// the layer's render function through its [`crate::layer::RenderArgs`].
    pub fn deactivate(mut self) -> Option<ExitCompleter> {
        self.finish()
    }

    fn finish(&mut self) -> Option<ExitCompleter> {
        if !self.active {
            return None;
        }
        self.active = false;

        if self.transition_exit {
            let api = self.api.clone();
            let key = self.key;
            let completer = ExitCompleter::armed(move || {
                api.dispatch(LayerMessage::Remove { key });
            });
            self.api.dispatch(LayerMessage::Update {
                layer: LayerRecord::exiting(self.key, Arc::clone(&self.render), completer.clone()),
            });
            Some(completer)
        } else {
            self.api.dispatch(LayerMessage::Remove { key: self.key });
            None
        }
    }
}

impl<T: 'static> Drop for LayerHandle<T> {
    fn drop(&mut self) {
        if self.active {
            self.finish();
        }
    }
}
