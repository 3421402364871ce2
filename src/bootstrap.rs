//! Shared binary bootstrap: tracing init and Ctrl+C wiring, adapted from a
//! per-binary `tracing_subscriber::fmt()` setup and a broadcast-channel
//! shutdown signal. Every `src/bin/*` target calls both functions once
//! before constructing its `Stage`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// `-v` → info, `-V` → debug, neither → warn.
pub fn init_tracing(module_name: &str, verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{module_name}={level},daqflow={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Spawns a background thread that blocks on Ctrl+C and flips `terminate`;
/// the handler only ever sets that flag, it never touches sockets or state
/// directly. The stage's own tick loop stays synchronous.
pub fn install_terminate_on_ctrl_c(terminate: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to start signal-handling runtime");
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, initiating shutdown");
                terminate.store(true, Ordering::SeqCst);
            }
        });
    });
}
