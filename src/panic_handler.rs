use log::error;
use std::panic;

/// Install `better-panic` and make sure every panic also lands in the log
/// file, including ones raised on prefetch threads.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        error!(
            "Panic on thread '{}': {panic_info}",
            thread.name().unwrap_or("<unnamed>")
        );

        default_hook(panic_info);
    }));
}
