//! Unix domain socket server for IPC
//!
//! Exposes the monitoring controls to the status bar shell and pushes
//! monitor events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::MonitorEvent;
use crate::hotkey::{MonitorCommand, MonitorHandle, MonitorReply};
use crate::input_source::SwitchStats;
use crate::permission::SETTINGS_URL;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared by every client handler
struct ServerContext {
    monitor: MonitorHandle,
    switch_stats: Arc<SwitchStats>,
    event_tx: broadcast::Sender<MonitorEvent>,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        monitor: MonitorHandle,
        switch_stats: Arc<SwitchStats>,
        event_tx: broadcast::Sender<MonitorEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context: Arc::new(ServerContext {
                monitor,
                switch_stats,
                event_tx,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Responses and notifications share one writer task so a subscribed
    /// client never sees interleaved frames.
    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(32);

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!(?e, "client write failed");
                    break;
                }
            }
        });

        let mut forwarder = None;
        let result = loop {
            let body = match read_frame(&mut reader).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!("client disconnected");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let response = match serde_json::from_slice::<Request>(&body) {
                Ok(request) => {
                    debug!(?request, "received request");
                    let subscribe = request == Request::Subscribe;
                    let response = Self::process_request(request, &context).await;
                    if subscribe && forwarder.is_none() {
                        debug!("client subscribed to notifications");
                        forwarder = Some(tokio::spawn(forward_events(
                            context.event_tx.subscribe(),
                            out_tx.clone(),
                        )));
                    }
                    response
                }
                Err(e) => {
                    warn!(?e, "unparseable request");
                    Response::error("bad_request", e)
                }
            };

            if out_tx.send(encode(&response)?).await.is_err() {
                break Ok(());
            }
        };

        if let Some(forwarder) = forwarder {
            forwarder.abort();
            let _ = forwarder.await;
        }
        drop(out_tx);
        let _ = writer_task.await;

        result
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ServerContext) -> Response {
        let command = match request {
            Request::Ping => return Response::Pong,
            Request::Subscribe => return Response::Subscribed,
            Request::GetStatus => MonitorCommand::Snapshot,
            Request::StartMonitoring => MonitorCommand::Start,
            Request::StopMonitoring => MonitorCommand::Stop,
            Request::ReinitializeMonitoring => MonitorCommand::Reinitialize,
            Request::CheckPermission { prompt } => MonitorCommand::CheckPermission { prompt },
        };

        let reply = match context.monitor.request(command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, ?command, "monitor request failed");
                return Response::error("monitor_unavailable", e);
            }
        };

        match reply {
            MonitorReply::Snapshot { health, stats } => Response::Status(DaemonStatus {
                monitoring: health,
                taps: stats,
                switches: context.switch_stats.snapshot(),
                uptime_secs: context.start_time.elapsed().as_secs(),
                ..DaemonStatus::default()
            }),
            MonitorReply::Health(health) => {
                info!(?command, active = health.is_active, "monitoring changed via IPC");
                Response::Monitoring { health }
            }
            MonitorReply::Permission { granted } => Response::Permission {
                granted,
                settings_url: (!granted).then(|| SETTINGS_URL.to_string()),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Relay monitor events to one subscribed client
async fn forward_events(mut event_rx: broadcast::Receiver<MonitorEvent>, out_tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                let frame = match encode(&Notification::Event { event }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(?e, "failed to encode notification");
                        continue;
                    }
                };
                if out_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read one length-prefixed frame; `None` on a clean disconnect
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Encode a length-prefixed JSON frame
fn encode<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::hotkey::fakes::{FakeBackend, FakePermission};
    use crate::hotkey::{EventTapController, HotkeyListener, KeyRouter};

    fn spawn_monitor(granted: bool) -> (HotkeyListener, MonitorHandle) {
        let mut listener = HotkeyListener::new();
        let handle = listener
            .start(
                move || {
                    let permission = FakePermission::default();
                    permission.granted.set(granted);
                    let (tap_tx, _) = mpsc::channel(4);
                    let (event_tx, _) = broadcast::channel(16);
                    let router = KeyRouter::new(tap_tx, event_tx.clone());
                    EventTapController::new(permission, FakeBackend::default(), router, event_tx)
                },
                |timeout| std::thread::sleep(timeout.min(Duration::from_millis(5))),
                Duration::from_secs(60),
            )
            .unwrap();
        (listener, handle)
    }

    async fn call(stream: &mut UnixStream, request: &Request) -> serde_json::Value {
        stream.write_all(&encode(request).unwrap()).await.unwrap();
        read_value(stream).await
    }

    async fn read_value(stream: &mut UnixStream) -> serde_json::Value {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_client_session() {
        let socket_path = std::env::temp_dir()
            .join(format!("shift-switch-test-{}", std::process::id()))
            .join("daemon.sock");
        let (mut listener, monitor) = spawn_monitor(false);
        let (event_tx, _) = broadcast::channel(16);
        let server = Arc::new(
            Server::new(&socket_path, monitor, Arc::new(SwitchStats::default()), event_tx.clone())
                .unwrap(),
        );
        let running = Arc::clone(&server);
        let server_task = tokio::spawn(async move { running.run().await });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();

        let pong = call(&mut stream, &Request::Ping).await;
        assert_eq!(pong["type"], "pong");

        let status = call(&mut stream, &Request::GetStatus).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["monitoring"]["is_active"], false);
        assert_eq!(status["switches"]["switched"], 0);

        let permission = call(&mut stream, &Request::CheckPermission { prompt: false }).await;
        assert_eq!(permission["granted"], false);
        assert_eq!(permission["settings_url"], SETTINGS_URL);

        let started = call(&mut stream, &Request::StartMonitoring).await;
        assert_eq!(started["type"], "monitoring");
        assert_eq!(started["health"]["is_active"], false);

        let subscribed = call(&mut stream, &Request::Subscribe).await;
        assert_eq!(subscribed["type"], "subscribed");

        // Give the forwarder a moment to attach to the broadcast channel
        tokio::time::sleep(Duration::from_millis(50)).await;
        event_tx.send(MonitorEvent::HookInvalidated).unwrap();
        let note = read_value(&mut stream).await;
        assert_eq!(note["type"], "event");
        assert_eq!(note["event"]["type"], "hook_invalidated");

        stream.write_all(&4u32.to_le_bytes()).await.unwrap();
        stream.write_all(b"nope").await.unwrap();
        let bad = read_value(&mut stream).await;
        assert_eq!(bad["code"], "bad_request");

        server.shutdown().await;
        server_task.abort();
        listener.stop();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_stopped_monitor_reports_error() {
        let (mut listener, monitor) = spawn_monitor(true);
        listener.stop();

        let context = ServerContext {
            monitor,
            switch_stats: Arc::new(SwitchStats::default()),
            event_tx: broadcast::channel(1).0,
            start_time: Instant::now(),
        };
        let response = Server::process_request(Request::StopMonitoring, &context).await;
        assert!(matches!(response, Response::Error { ref code, .. } if code == "monitor_unavailable"));
    }
}
