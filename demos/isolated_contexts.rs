//! Two registries in one process: traffic on one never reaches the other.
//! The inspector side is driven imperatively, without owner handles.

use strata::{LayerApi, LayerContainer, LayerHandle, LayerKey, LayerMessage, LayerRecord, render_fn};

fn main() {
    let app: LayerApi<String> = LayerApi::new();
    let inspector: LayerApi<String> = LayerApi::new();

    let app_container = LayerContainer::mount(&app);
    let inspector_container = LayerContainer::mount(&inspector);

    let _banner = LayerHandle::activate(&app, render_fn(|_| "app: welcome".to_string()));

    let key = LayerKey::allocate();
    inspector.dispatch(LayerMessage::Push {
        layer: LayerRecord::new(key, render_fn(|_| "inspector: 3 nodes selected".to_string())),
    });

    println!("app container:");
    for line in app_container.render() {
        println!("  {line}");
    }
    println!("inspector container:");
    for line in inspector_container.render() {
        println!("  {line}");
    }

    inspector.dispatch(LayerMessage::Remove { key });
    println!("inspector after remove: {} layers", inspector_container.len());
}
