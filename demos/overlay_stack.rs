//! Walkthrough of one layer context: a status line, a dialog with an exit
//! transition, and a tooltip, all rendered by a single container in push
//! order.

use strata::{
    LayerApi, LayerContainer, LayerHandle, LifecycleLogger, Logger, MemorySink, RenderArgs,
    render_fn,
};

fn print_pass(label: &str, container: &LayerContainer<String>) {
    println!("-- {label} --");
    let lines = container.render();
    if lines.is_empty() {
        println!("   (no layers)");
    }
    for line in lines {
        println!("   {line}");
    }
}

fn main() {
    let api: LayerApi<String> = LayerApi::new();
    let container = LayerContainer::mount(&api);

    let sink = MemorySink::new();
    let _diagnostics = LifecycleLogger::new(Logger::new(sink.clone()))
        .log_updates(true)
        .attach(&api);

    let _status = LayerHandle::activate(&api, render_fn(|_| "status: ready".to_string()));

    let dialog = LayerHandle::activate_with_exit_transition(
        &api,
        render_fn(|args: &RenderArgs| {
            if args.state.is_exiting() {
                // Pretend the fade-out finishes within this render pass.
                args.completer.complete();
                "dialog: closing...".to_string()
            } else {
                "dialog: save changes?".to_string()
            }
        }),
    );

    let mut tooltip = LayerHandle::activate(&api, render_fn(|_| "tooltip: ctrl+s".to_string()));
    print_pass("initial", &container);

    tooltip.update_content(render_fn(|_| "tooltip: saved!".to_string()));
    print_pass("after tooltip update", &container);

    // The dialog owner goes away; the layer stays mounted for its exit pass
    // and removes itself by completing.
    dialog.deactivate();
    print_pass("dialog exiting", &container);
    print_pass("dialog gone", &container);

    tooltip.deactivate();
    print_pass("tooltip dismissed", &container);

    println!("-- diagnostics --");
    for event in sink.events() {
        println!(
            "   {} {}",
            event.message,
            serde_json::to_string(&event.fields).unwrap_or_default()
        );
    }
}
