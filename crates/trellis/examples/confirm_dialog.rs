//! A headless walk through the confirm-dialog flow: a main window with a
//! button that opens an application-modal dialog, input blocking while the
//! dialog is up, and a continuation-style result on close.
//!
//! Run with: `cargo run --example confirm_dialog`

use trellis::InputEvent;
use trellis::prelude::*;

fn window_kind() -> TypeTag {
    TypeTag::new("Window")
        .with_capabilities(Capabilities::HAS_MODALITY | Capabilities::HAS_TITLE | Capabilities::IS_CONTAINER)
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut rt = Runtime::new();

    let main = rt
        .construct(
            window_kind(),
            None,
            vec![AttrSpec::new("title", ValueType::Str).with_initial(Value::from("Main"))],
        )
        .expect("construct main window");
    rt.add_window(main).expect("register main window");

    let quit_button = rt
        .construct(TypeTag::new("PushButton"), Some(main), vec![])
        .expect("construct button");

    // Clicking the button opens a confirm dialog instead of quitting outright.
    rt.on_input(quit_button, move |rt, _| {
        let dialog = rt
            .construct(
                window_kind(),
                Some(main),
                vec![AttrSpec::new("title", ValueType::Str)
                    .with_initial(Value::from("Really quit?"))],
            )
            .expect("construct dialog");

        rt.on_close(dialog, |rt, result| {
            println!("dialog closed: {result:?}");
            if result.is_accepted() {
                rt.handle().quit();
            }
        })
        .expect("register close handler");

        rt.show(dialog, Modality::ApplicationModal)
            .expect("show dialog");
        // Note: still inside the click handler — show did not block.
        println!("dialog shown, main blocked: {}", rt.is_input_blocked(main));

        // Stand in for the user clicking "Yes".
        rt.post_task(move |rt| {
            rt.close(dialog, CloseResult::Accepted).expect("close dialog");
        });
    })
    .expect("register click handler");

    println!("{}", rt.dump_tree(main));

    // Simulate the backend delivering a click, then drain the loop.
    rt.handle().post_input(InputEvent::activate(quit_button));
    let keep_running = rt.run_until_idle();
    println!("loop idle, keep running: {keep_running}");

    rt.shutdown();
}
