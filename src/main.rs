//! shift-switch: background daemon that toggles macOS input sources on a
//! solitary Shift tap
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global keyboard monitoring via CGEventTap
//! - Caps Lock normalization so it only toggles capitals
//! - Switching between the CJK-style and Latin-style input source
//! - IPC server for the status bar shell

#![cfg_attr(not(target_os = "macos"), allow(dead_code))]

mod config;
mod events;
mod hotkey;
mod input_source;
mod ipc;
mod lifecycle;
mod permission;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::lifecycle::ShutdownSignal;

// Single-threaded: the switch worker is polled by this future, keeping
// every input source call on the main thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "shift-switch starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    let shutdown = ShutdownSignal::new()?;

    run(config, shutdown).await
}

#[cfg(target_os = "macos")]
async fn run(config: Config, mut shutdown: ShutdownSignal) -> Result<()> {
    use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};
    use tokio::sync::{broadcast, mpsc};
    use tracing::{error, warn};

    use crate::events::MonitorEvent;
    use crate::hotkey::{CgEventTapBackend, EventTapController, HotkeyListener, KeyRouter, SUPERVISE_INTERVAL};
    use crate::input_source::{InputSourceSwitcher, TisRegistry};
    use crate::ipc::Server;
    use crate::permission::AxPermission;

    // Monitor thread -> switch worker
    let (tap_tx, tap_rx) = mpsc::channel(32);
    // Monitor thread and switch worker -> IPC subscribers
    let (event_tx, _) = broadcast::channel::<MonitorEvent>(64);

    let switcher = InputSourceSwitcher::new(TisRegistry, config.classifier.clone());
    switcher.log_sources();
    let switch_stats = switcher.stats();

    // The tap and its run loop source live on the monitor thread
    let mut listener = HotkeyListener::new();
    let controller_events = event_tx.clone();
    let monitor = listener.start(
        move || {
            let router = KeyRouter::new(tap_tx, controller_events.clone());
            EventTapController::new(AxPermission, CgEventTapBackend, router, controller_events)
        },
        |timeout| {
            // SAFETY: reading an immutable CoreFoundation constant
            let mode = unsafe { kCFRunLoopDefaultMode };
            CFRunLoop::run_in_mode(mode, timeout, true);
        },
        SUPERVISE_INTERVAL,
    )?;
    info!("monitor thread started");

    let server = Server::new(&config.socket_path, monitor, switch_stats, event_tx.clone())?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Polled here, not spawned, so toggles stay on the main thread
        _ = switcher.run(tap_rx, event_tx) => {
            warn!("switch worker exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    listener.stop();
    server.shutdown().await;

    info!("shift-switch stopped");

    Ok(())
}

#[cfg(not(target_os = "macos"))]
async fn run(_config: Config, _shutdown: ShutdownSignal) -> Result<()> {
    anyhow::bail!("shift-switch requires macOS")
}
