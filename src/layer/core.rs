use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// Identity of one layer within a context.
///
/// Keys are allocated from a process-wide counter, so a key is never handed
/// out twice even across isolated contexts. Removal is terminal: a removed
/// key never resurrects, a later `Push` always carries a fresh allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LayerKey(u64);

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

impl LayerKey {
    /// Allocate the next process-unique key.
    pub fn allocate() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a mounted layer.
///
/// A layer moves `Entered -> TransitionExit` at most once; the reverse
/// transition does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerState {
    /// Steady visible state.
    Entered,
    /// The owner has deactivated; the layer keeps rendering until its
    /// completer fires.
    TransitionExit,
}

impl LayerState {
    pub fn is_exiting(self) -> bool {
        matches!(self, LayerState::TransitionExit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayerState::Entered => "entered",
            LayerState::TransitionExit => "transition_exit",
        }
    }
}

/// Arguments handed to a render function by the container.
pub struct RenderArgs {
    pub state: LayerState,
    /// One-shot removal signal. Inert while the layer is `Entered`; armed by
    /// the owner's deactivation when an exit transition was requested.
    pub completer: ExitCompleter,
}

/// Opaque recipe for a layer's content.
///
/// Compared by `Arc::ptr_eq` only, never structurally. Callers that re-issue
/// unchanged content must reuse the same `Arc` so the update gates can drop
/// the redundant traffic.
pub type RenderFn<T> = Arc<dyn Fn(&RenderArgs) -> T + Send + Sync>;

/// Wrap a closure into a [`RenderFn`].
pub fn render_fn<T>(f: impl Fn(&RenderArgs) -> T + Send + Sync + 'static) -> RenderFn<T> {
    Arc::new(f)
}

/// One-shot latch that removes a layer in `TransitionExit`.
///
/// The first `complete` call on an armed completer dispatches the removal;
/// every later call is a no-op. An inert completer (the form carried while a
/// layer is `Entered`) never removes anything.
#[derive(Clone)]
pub struct ExitCompleter {
    fired: Arc<AtomicBool>,
    action: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ExitCompleter {
    /// Completer with no removal to perform.
    pub fn inert() -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            action: None,
        }
    }

    pub(crate) fn armed(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            action: Some(Arc::new(action)),
        }
    }

    pub fn complete(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(action) = self.action.as_ref() {
            action();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.action.is_some()
    }

    pub fn has_completed(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ExitCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitCompleter")
            .field("armed", &self.is_armed())
            .field("completed", &self.has_completed())
            .finish()
    }
}

/// One entry of a container's ordered list.
pub struct LayerRecord<T> {
    pub key: LayerKey,
    pub state: LayerState,
    pub render: RenderFn<T>,
    completer: ExitCompleter,
}

impl<T> LayerRecord<T> {
    /// Fresh `Entered` record, the payload of a `Push`.
    pub fn new(key: LayerKey, render: RenderFn<T>) -> Self {
        Self {
            key,
            state: LayerState::Entered,
            render,
            completer: ExitCompleter::inert(),
        }
    }

    pub(crate) fn exiting(key: LayerKey, render: RenderFn<T>, completer: ExitCompleter) -> Self {
        Self {
            key,
            state: LayerState::TransitionExit,
            render,
            completer,
        }
    }

    pub fn exit_completer(&self) -> &ExitCompleter {
        &self.completer
    }

    pub fn render_args(&self) -> RenderArgs {
        RenderArgs {
            state: self.state,
            completer: self.completer.clone(),
        }
    }

    /// Produce this layer's artifact.
    pub fn produce(&self) -> T {
        (self.render)(&self.render_args())
    }

    /// Whether a replacement carries nothing observable over `self`.
    ///
    /// The render reference is compared by identity; the lifecycle state by
    /// value. Everything else on the record rides along with whichever of
    /// the two changed.
    pub fn same_content(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.render, &other.render) && self.state == other.state
    }
}

impl<T> Clone for LayerRecord<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            state: self.state,
            render: Arc::clone(&self.render),
            completer: self.completer.clone(),
        }
    }
}

impl<T> fmt::Debug for LayerRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerRecord")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Protocol message sent owner -> registry -> container.
pub enum LayerMessage<T> {
    /// Introduce a new layer. The key must not already be present.
    Push { layer: LayerRecord<T> },
    /// Replace an existing layer in place, subject to the content gate.
    Update { layer: LayerRecord<T> },
    /// Drop the entry with this key; no-op when absent.
    Remove { key: LayerKey },
}

impl<T> LayerMessage<T> {
    pub fn key(&self) -> LayerKey {
        match self {
            LayerMessage::Push { layer } | LayerMessage::Update { layer } => layer.key,
            LayerMessage::Remove { key } => *key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LayerMessage::Push { .. } => "push",
            LayerMessage::Update { .. } => "update",
            LayerMessage::Remove { .. } => "remove",
        }
    }
}

impl<T> Clone for LayerMessage<T> {
    fn clone(&self) -> Self {
        match self {
            LayerMessage::Push { layer } => LayerMessage::Push {
                layer: layer.clone(),
            },
            LayerMessage::Update { layer } => LayerMessage::Update {
                layer: layer.clone(),
            },
            LayerMessage::Remove { key } => LayerMessage::Remove { key: *key },
        }
    }
}

impl<T> fmt::Debug for LayerMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerMessage")
            .field("kind", &self.kind())
            .field("key", &self.key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn keys_are_unique_and_monotonic() {
        let a = LayerKey::allocate();
        let b = LayerKey::allocate();
        let c = LayerKey::allocate();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn inert_completer_never_acts() {
        let completer = ExitCompleter::inert();
        assert!(!completer.is_armed());
        completer.complete();
        assert!(completer.has_completed());
    }

    #[test]
    fn armed_completer_fires_exactly_once() {
        let fires = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fires);
        let completer = ExitCompleter::armed(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        completer.complete();
        completer.complete();
        completer.clone().complete();

        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert!(completer.has_completed());
    }

    #[test]
    fn same_content_gates_on_reference_and_state() {
        let render = render_fn(|_| "content".to_string());
        let key = LayerKey::allocate();
        let original = LayerRecord::new(key, Arc::clone(&render));

        let same_reference = LayerRecord::new(key, Arc::clone(&render));
        assert!(original.same_content(&same_reference));

        let fresh_reference = LayerRecord::new(key, render_fn(|_| "content".to_string()));
        assert!(!original.same_content(&fresh_reference));

        let exiting =
            LayerRecord::exiting(key, Arc::clone(&render), ExitCompleter::inert());
        assert!(!original.same_content(&exiting));
    }

    #[test]
    fn record_produces_with_its_own_state() {
        let render = render_fn(|args: &RenderArgs| args.state.as_str().to_string());
        let record = LayerRecord::new(LayerKey::allocate(), Arc::clone(&render));
        assert_eq!(record.produce(), "entered");

        let exiting =
            LayerRecord::exiting(record.key, render, ExitCompleter::inert());
        assert_eq!(exiting.produce(), "transition_exit");
    }

    #[test]
    fn message_reports_kind_and_key() {
        let record = LayerRecord::new(LayerKey::allocate(), render_fn(|_| 1u32));
        let key = record.key;

        let push = LayerMessage::Push { layer: record };
        assert_eq!(push.kind(), "push");
        assert_eq!(push.key(), key);

        let remove: LayerMessage<u32> = LayerMessage::Remove { key };
        assert_eq!(remove.kind(), "remove");
        assert_eq!(remove.key(), key);
    }
}
