//! capture-relay: periodic screen capture with queued, retried delivery.
//!
//! This is the library crate that wires together:
//! - Screen capture primitives (capture/)
//! - Bounded delivery queue and HTTP upload (delivery/)
//! - Best-effort audit log (log_store/)
//! - Timer-driven capture scheduler (scheduler.rs)
//! - Event bridge for the out-of-process background capturer (bridge/, background.rs)

pub mod app;
pub mod background;
pub mod bridge;
pub mod capture;
pub mod config;
pub mod delivery;
pub mod error;
pub mod log_store;
pub mod scheduler;

use config::Config;

/// Entry point, called by the binary.
///
/// `--background` runs the background capturer and prints capture events to
/// stdout. Without it the foreground app runs until Ctrl-C.
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let background_mode = std::env::args().any(|arg| arg == background::BACKGROUND_FLAG);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("[CONFIG] {}", e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = if background_mode {
        runtime
            .block_on(background::run_standalone(config))
            .map_err(app::AppError::from)
    } else {
        log::info!("capture-relay v{} starting up", env!("CARGO_PKG_VERSION"));
        runtime.block_on(app::run_foreground(config))
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
