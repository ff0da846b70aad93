use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;

use crate::api::{LayerApi, Subscription};
use crate::error::{LayerError, Result};
use crate::layer::{LayerKey, LayerMessage, LayerRecord, LayerState};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::LayerMetrics;

/// Ordered layer list plus the reducer that folds protocol messages into it.
///
/// Order is append order at first `Push`; updates replace in place and
/// removals filter, neither reorders survivors. The generation counter is
/// bumped only when the list observably changes, which is what makes the
/// update no-op law checkable from outside.
pub struct LayerList<T> {
    entries: Vec<LayerRecord<T>>,
    generation: u64,
}

impl<T> Default for LayerList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            generation: 0,
        }
    }
}

impl<T> LayerList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one message into the list.
    ///
    /// Returns whether the list changed. The only error is a duplicate-key
    /// `Push`, which is rejected and leaves the existing entry untouched;
    /// updates and removals for absent keys are silent no-ops.
    pub fn apply(&mut self, message: &LayerMessage<T>) -> Result<bool> {
        match message {
            LayerMessage::Push { layer } => {
                if self.contains(layer.key) {
                    return Err(LayerError::DuplicateKey(layer.key));
                }
                self.entries.push(layer.clone());
                self.generation += 1;
                Ok(true)
            }
            LayerMessage::Update { layer } => {
                let existing = self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.key == layer.key);
                match existing {
                    Some(entry) if !entry.same_content(layer) => {
                        *entry = layer.clone();
                        self.generation += 1;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            LayerMessage::Remove { key } => {
                let before = self.entries.len();
                self.entries.retain(|entry| entry.key != *key);
                if self.entries.len() != before {
                    self.generation += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub fn contains(&self, key: LayerKey) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    pub fn get(&self, key: LayerKey) -> Option<&LayerRecord<T>> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerRecord<T>> {
        self.entries.iter()
    }

    pub fn keys(&self) -> Vec<LayerKey> {
        self.entries.iter().map(|entry| entry.key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Observability knobs for a container.
#[derive(Clone, Default)]
pub struct ContainerConfig {
    pub logger: Option<Logger>,
    pub metrics: Option<Arc<Mutex<LayerMetrics>>>,
}

/// The rendering sink for one context.
///
/// Mounting subscribes to the context's registry; the subscription is
/// released unconditionally when the container drops, however that happens.
/// The container owns its records from the moment they are pushed — owners
/// keep only the capability to send further messages about a key.
pub struct LayerContainer<T> {
    list: Arc<Mutex<LayerList<T>>>,
    config: ContainerConfig,
    _subscription: Subscription,
}

impl<T: 'static> LayerContainer<T> {
    pub fn mount(api: &LayerApi<T>) -> Self {
        Self::mount_with_config(api, ContainerConfig::default())
    }

    pub fn mount_with_config(api: &LayerApi<T>, config: ContainerConfig) -> Self {
        let list = Arc::new(Mutex::new(LayerList::new()));
        let fold_list = Arc::clone(&list);
        let fold_config = config.clone();

        let subscription = api.subscribe(Arc::new(move |message: &LayerMessage<T>| {
            let outcome = lock_list(&fold_list).apply(message);
            match outcome {
                Ok(changed) => {
                    if !changed {
                        if let (LayerMessage::Update { .. }, Some(metrics)) =
                            (message, fold_config.metrics.as_ref())
                        {
                            if let Ok(mut guard) = metrics.lock() {
                                guard.record_update_gated();
                            }
                        }
                    }
                }
                Err(error) => log_rejected(&fold_config, message.key(), &error),
            }
        }));

        Self {
            list,
            config,
            _subscription: subscription,
        }
    }

    /// Produce every surviving layer's artifact in stacking order.
    ///
    /// Renders from a snapshot of the list, so a completion fired from
    /// inside a render function takes effect on the next pass instead of
    /// invalidating this one.
    pub fn render(&self) -> Vec<T> {
        let snapshot: Vec<LayerRecord<T>> = lock_list(&self.list).iter().cloned().collect();
        let artifacts: Vec<T> = snapshot.iter().map(LayerRecord::produce).collect();

        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_render(artifacts.len());
            }
        }
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(
                LogLevel::Debug,
                "strata::container",
                "render_completed",
                [json_kv("layers", json!(artifacts.len()))],
            );
            let _ = logger.log_event(event);
        }

        artifacts
    }

    /// Visit each surviving record and its freshly produced artifact.
    pub fn render_with(&self, mut visit: impl FnMut(&LayerRecord<T>, T)) {
        let snapshot: Vec<LayerRecord<T>> = lock_list(&self.list).iter().cloned().collect();
        for record in &snapshot {
            let artifact = record.produce();
            visit(record, artifact);
        }
    }

    pub fn keys(&self) -> Vec<LayerKey> {
        lock_list(&self.list).keys()
    }

    pub fn state_of(&self, key: LayerKey) -> Option<LayerState> {
        lock_list(&self.list).get(key).map(|record| record.state)
    }

    pub fn len(&self) -> usize {
        lock_list(&self.list).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_list(&self.list).is_empty()
    }

    pub fn generation(&self) -> u64 {
        lock_list(&self.list).generation()
    }
}

fn lock_list<T>(list: &Arc<Mutex<LayerList<T>>>) -> std::sync::MutexGuard<'_, LayerList<T>> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_rejected(config: &ContainerConfig, key: LayerKey, error: &LayerError) {
    if let Some(logger) = config.logger.as_ref() {
        let event = event_with_fields(
            LogLevel::Error,
            "strata::container",
            "message_rejected",
            [
                json_kv("key", json!(key.get())),
                json_kv("error", json!(error.to_string())),
            ],
        );
        let _ = logger.log_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::render_fn;
    use crate::logging::MemorySink;

    fn record(content: &str) -> LayerRecord<String> {
        let content = content.to_string();
        LayerRecord::new(LayerKey::allocate(), render_fn(move |_| content.clone()))
    }

    #[test]
    fn push_order_is_render_order_regardless_of_updates() {
        let mut list: LayerList<String> = LayerList::new();
        let first = record("first");
        let second = record("second");
        let third = record("third");
        let keys = vec![first.key, second.key, third.key];

        for layer in [first, second, third] {
            list.apply(&LayerMessage::Push { layer }).expect("push");
        }

        let replacement = LayerRecord::new(keys[0], render_fn(|_| "first_v2".to_string()));
        list.apply(&LayerMessage::Update { layer: replacement })
            .expect("update");

        assert_eq!(list.keys(), keys);
    }

    #[test]
    fn update_with_identical_reference_is_a_noop() {
        let mut list: LayerList<String> = LayerList::new();
        let layer = record("stable");
        let resend = layer.clone();
        list.apply(&LayerMessage::Push { layer }).expect("push");

        let generation = list.generation();
        let changed = list
            .apply(&LayerMessage::Update { layer: resend })
            .expect("update");

        assert!(!changed);
        assert_eq!(list.generation(), generation);
    }

    #[test]
    fn update_with_fresh_reference_replaces_in_place() {
        let mut list: LayerList<String> = LayerList::new();
        let layer = record("original");
        let key = layer.key;
        list.apply(&LayerMessage::Push { layer }).expect("push");

        let replacement = LayerRecord::new(key, render_fn(|_| "replaced".to_string()));
        let changed = list
            .apply(&LayerMessage::Update { layer: replacement })
            .expect("update");

        assert!(changed);
        assert_eq!(list.len(), 1);
        let rendered: Vec<String> = list.iter().map(LayerRecord::produce).collect();
        assert_eq!(rendered, vec!["replaced".to_string()]);
    }

    #[test]
    fn remove_filters_exactly_the_matching_key() {
        let mut list: LayerList<String> = LayerList::new();
        let layers = [record("a"), record("b"), record("c")];
        let middle = layers[1].key;
        let expected = vec![layers[0].key, layers[2].key];

        for layer in layers {
            list.apply(&LayerMessage::Push { layer }).expect("push");
        }

        list.apply(&LayerMessage::Remove { key: middle })
            .expect("remove");

        assert_eq!(list.keys(), expected);
    }

    #[test]
    fn orphaned_update_and_remove_are_silent_noops() {
        let mut list: LayerList<String> = LayerList::new();
        list.apply(&LayerMessage::Push { layer: record("only") })
            .expect("push");
        let generation = list.generation();

        let absent = record("absent");
        let changed_update = list
            .apply(&LayerMessage::Update { layer: absent })
            .expect("orphan update");
        let changed_remove = list
            .apply(&LayerMessage::Remove {
                key: LayerKey::allocate(),
            })
            .expect("orphan remove");

        assert!(!changed_update);
        assert!(!changed_remove);
        assert_eq!(list.generation(), generation);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn duplicate_push_is_rejected_and_keeps_the_original() {
        let mut list: LayerList<String> = LayerList::new();
        let original = record("original");
        let key = original.key;
        list.apply(&LayerMessage::Push { layer: original })
            .expect("push");

        let imposter = LayerRecord::new(key, render_fn(|_| "imposter".to_string()));
        let error = list
            .apply(&LayerMessage::Push { layer: imposter })
            .expect_err("duplicate push must be rejected");

        assert_eq!(error, LayerError::DuplicateKey(key));
        assert_eq!(list.len(), 1);
        let rendered: Vec<String> = list.iter().map(LayerRecord::produce).collect();
        assert_eq!(rendered, vec!["original".to_string()]);
    }

    #[test]
    fn mounted_container_folds_dispatches() {
        let api: LayerApi<String> = LayerApi::new();
        let container = LayerContainer::mount(&api);

        let first = record("first");
        let second = record("second");
        let first_key = first.key;
        let expected = vec![first.key, second.key];

        api.dispatch(LayerMessage::Push { layer: first });
        api.dispatch(LayerMessage::Push { layer: second });
        assert_eq!(container.keys(), expected);
        assert_eq!(
            container.render(),
            vec!["first".to_string(), "second".to_string()]
        );

        api.dispatch(LayerMessage::Remove { key: first_key });
        assert_eq!(container.render(), vec!["second".to_string()]);
    }

    #[test]
    fn unmounting_releases_the_subscription() {
        let api: LayerApi<String> = LayerApi::new();
        {
            let _container = LayerContainer::mount(&api);
            assert_eq!(api.listener_count(), 1);
        }
        assert_eq!(api.listener_count(), 0);
    }

    #[test]
    fn two_containers_fold_independently() {
        let api: LayerApi<String> = LayerApi::new();
        let first = LayerContainer::mount(&api);
        let second = LayerContainer::mount(&api);

        api.dispatch(LayerMessage::Push {
            layer: record("shared"),
        });

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn duplicate_push_through_a_container_is_logged() {
        let sink = MemorySink::default();
        let api: LayerApi<String> = LayerApi::new();
        let container = LayerContainer::mount_with_config(
            &api,
            ContainerConfig {
                logger: Some(Logger::new(sink.clone())),
                metrics: None,
            },
        );

        let original = record("original");
        let key = original.key;
        api.dispatch(LayerMessage::Push { layer: original });
        api.dispatch(LayerMessage::Push {
            layer: LayerRecord::new(key, render_fn(|_| "imposter".to_string())),
        });

        assert_eq!(container.len(), 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "message_rejected");
    }

    #[test]
    fn gated_updates_are_counted_when_metrics_are_wired() {
        let metrics = Arc::new(Mutex::new(LayerMetrics::new()));
        let api: LayerApi<String> = LayerApi::new();
        let container = LayerContainer::mount_with_config(
            &api,
            ContainerConfig {
                logger: None,
                metrics: Some(Arc::clone(&metrics)),
            },
        );

        let layer = record("stable");
        let resend = layer.clone();
        api.dispatch(LayerMessage::Push { layer });
        api.dispatch(LayerMessage::Update { layer: resend });

        assert_eq!(container.len(), 1);
        let snapshot = metrics
            .lock()
            .expect("metrics lock")
            .snapshot(std::time::Duration::ZERO);
        assert_eq!(snapshot.updates_gated, 1);
    }

    #[test]
    fn full_stack_walkthrough() {
        let api: LayerApi<String> = LayerApi::new();
        let container = LayerContainer::mount(&api);

        let one = record("one");
        let two = record("two");
        let (key_one, key_two) = (one.key, two.key);

        api.dispatch(LayerMessage::Push { layer: one });
        api.dispatch(LayerMessage::Push { layer: two });
        assert_eq!(container.keys(), vec![key_one, key_two]);

        api.dispatch(LayerMessage::Update {
            layer: LayerRecord::new(key_one, render_fn(|_| "one_v2".to_string())),
        });
        assert_eq!(
            container.render(),
            vec!["one_v2".to_string(), "two".to_string()]
        );

        api.dispatch(LayerMessage::Remove { key: key_one });
        assert_eq!(container.render(), vec!["two".to_string()]);

        api.dispatch(LayerMessage::Remove { key: key_two });
        assert!(container.is_empty());
    }
}
