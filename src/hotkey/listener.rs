//! Monitor thread driving the event tap
//!
//! The tap callback, the supervisory tick and control commands all run on
//! one dedicated thread, so the controller and key router are never
//! touched concurrently. Other threads talk to it through `MonitorHandle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::permission::PermissionProbe;

use super::controller::{EventTapController, HookBackend, MonitoringHealth};
use super::router::TapStats;

/// How long one run loop pump may block before commands are polled
pub const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Requests served on the monitor thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    Start,
    Stop,
    Reinitialize,
    CheckPermission { prompt: bool },
    Snapshot,
}

/// Reply to a `MonitorCommand`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorReply {
    Health(MonitoringHealth),
    Permission { granted: bool },
    Snapshot { health: MonitoringHealth, stats: TapStats },
}

/// Errors talking to the monitor thread
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor thread is already running")]
    AlreadyRunning,

    #[error("failed to spawn monitor thread: {0}")]
    ThreadSpawn(String),

    #[error("monitor thread is not running")]
    Stopped,
}

type Envelope = (MonitorCommand, oneshot::Sender<MonitorReply>);

/// Cloneable handle to the monitor thread
#[derive(Clone)]
pub struct MonitorHandle {
    command_tx: std_mpsc::Sender<Envelope>,
    running: Arc<AtomicBool>,
}

/// Spawns and owns the monitor thread
pub struct HotkeyListener {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl HotkeyListener {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Start the monitor thread
    ///
    /// `build` runs on the new thread, so the controller and its tap are
    /// created where the run loop lives. `pump` runs that thread's event
    /// loop for at most the given duration.
    pub fn start<P, B, F, R>(
        &mut self,
        build: F,
        mut pump: R,
        supervise_every: Duration,
    ) -> Result<MonitorHandle, MonitorError>
    where
        P: PermissionProbe,
        B: HookBackend,
        F: FnOnce() -> EventTapController<P, B> + Send + 'static,
        R: FnMut(Duration) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning);
        }

        let (command_tx, command_rx) = std_mpsc::channel::<Envelope>();
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("shift-monitor".to_string())
            .spawn(move || {
                info!("monitor thread started");
                let mut controller = build();
                controller.start();
                run_monitor_loop(&mut controller, &command_rx, &running, &mut pump, supervise_every);
                controller.stop();
                running.store(false, Ordering::SeqCst);
                info!("monitor thread stopped");
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(MonitorHandle {
                    command_tx,
                    running: Arc::clone(&self.running),
                })
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(MonitorError::ThreadSpawn(e.to_string()))
            }
        }
    }

    /// Stop the monitor thread and wait for it to remove the tap
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("monitor thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for HotkeyListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MonitorHandle {
    /// Send a command and wait for the monitor thread's reply
    pub async fn request(&self, command: MonitorCommand) -> Result<MonitorReply, MonitorError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(MonitorError::Stopped);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send((command, reply_tx))
            .map_err(|_| MonitorError::Stopped)?;
        reply_rx.await.map_err(|_| MonitorError::Stopped)
    }
}

fn run_monitor_loop<P: PermissionProbe, B: HookBackend>(
    controller: &mut EventTapController<P, B>,
    command_rx: &std_mpsc::Receiver<Envelope>,
    running: &AtomicBool,
    pump: &mut dyn FnMut(Duration),
    supervise_every: Duration,
) {
    let mut last_tick = Instant::now();
    // An explicit stop holds until the next start or reinitialize; only
    // the permission keeps being polled meanwhile
    let mut suspended = false;

    while running.load(Ordering::SeqCst) {
        // Deliver tap callbacks for a short interval
        pump(PUMP_INTERVAL.min(supervise_every));

        while let Ok((command, reply_tx)) = command_rx.try_recv() {
            debug!(?command, "monitor command");
            match command {
                MonitorCommand::Stop => suspended = true,
                MonitorCommand::Start | MonitorCommand::Reinitialize => suspended = false,
                _ => {}
            }
            let reply = execute(controller, command);
            let _ = reply_tx.send(reply);
        }

        if last_tick.elapsed() >= supervise_every {
            if suspended {
                controller.refresh_permission();
            } else {
                controller.supervise();
            }
            last_tick = Instant::now();
        }
    }
}

fn execute<P: PermissionProbe, B: HookBackend>(
    controller: &mut EventTapController<P, B>,
    command: MonitorCommand,
) -> MonitorReply {
    match command {
        MonitorCommand::Start => {
            controller.start();
            MonitorReply::Health(controller.health())
        }
        MonitorCommand::Stop => {
            controller.stop();
            MonitorReply::Health(controller.health())
        }
        MonitorCommand::Reinitialize => {
            controller.reinitialize();
            MonitorReply::Health(controller.health())
        }
        MonitorCommand::CheckPermission { prompt } => MonitorReply::Permission {
            granted: controller.check_permission(prompt),
        },
        MonitorCommand::Snapshot => MonitorReply::Snapshot {
            health: controller.health(),
            stats: controller.router().borrow().stats(),
        },
    }
}
