//! WebSocket event-state feed
//!
//! Subscribes to server-pushed `event_state` frames instead of polling.
//! Reconnects with exponential backoff and answers server pings.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

use crate::core::io_traits::{EventFeed, FeedEvent, FeedStatus};
use crate::core::protocol::FeedMessage;

const FEED_PATH: &str = "/ws/event-state";
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(60);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;
type SharedToken = Arc<Mutex<Option<String>>>;

/// Commands (main thread -> WS thread)
#[derive(Debug)]
enum PushCommand {
    /// Re-send the subscription so the server pushes the current state
    Resubscribe,
    Shutdown,
}

/// Thread-safe push feed
pub struct PushFeed {
    url: String,
    /// Read by the WS thread on every (re)subscribe
    secure_token: SharedToken,
    tx: Option<Sender<PushCommand>>,
    rx: Option<Receiver<FeedEvent>>,
    thread_handle: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    current_status: FeedStatus,
}

impl PushFeed {
    /// `base_url` is the HTTP(S) site URL; the WebSocket URL is derived from it
    pub fn new(base_url: &str, secure_token: Option<String>) -> Self {
        Self {
            url: feed_url(base_url),
            secure_token: Arc::new(Mutex::new(secure_token)),
            tx: None,
            rx: None,
            thread_handle: None,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            current_status: FeedStatus::Idle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> Option<String> {
        self.secure_token.lock().clone()
    }

    pub fn connect(&mut self) {
        if self.thread_handle.is_some() {
            warn!("[WS] Already running");
            return;
        }

        let (command_tx, command_rx) = bounded::<PushCommand>(16);
        let (event_tx, event_rx) = bounded::<FeedEvent>(128);

        self.tx = Some(command_tx);
        self.rx = Some(event_rx);
        self.shutdown_flag.store(false, Ordering::SeqCst);

        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let url = self.url.clone();
        let token = Arc::clone(&self.secure_token);

        let handle = thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                push_thread(&url, &token, command_rx, event_tx.clone(), shutdown_flag);
            }));

            if let Err(panic_info) = result {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    format!("WS thread panic: {}", s)
                } else {
                    "WS thread panic".to_string()
                };
                error!("{}", msg);
                let _ = event_tx.send(FeedEvent::Failed(msg));
                let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Stopped));
            }
        });

        self.thread_handle = Some(handle);
        self.current_status = FeedStatus::Connecting;
    }

    pub fn disconnect(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(tx) = &self.tx {
            let _ = tx.send(PushCommand::Shutdown);
        }
        self.rx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.tx = None;
        self.current_status = FeedStatus::Stopped;
    }
}

impl EventFeed for PushFeed {
    fn poll_event(&mut self) -> Option<FeedEvent> {
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(event) => {
                if let FeedEvent::StatusChanged(status) = &event {
                    self.current_status = *status;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.current_status = FeedStatus::Stopped;
                None
            }
        }
    }

    fn request_refresh(&self) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(PushCommand::Resubscribe) {
                debug!("[WS] Refresh already pending: {}", e);
            }
        }
    }

    fn set_token(&mut self, token: Option<String>) {
        info!(authenticated = token.is_some(), "[WS] Subscription token changed");
        *self.secure_token.lock() = token;
        self.request_refresh();
    }

    fn status(&self) -> FeedStatus {
        self.current_status
    }
}

impl Drop for PushFeed {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// `https://host/` -> `wss://host/ws/event-state`
pub fn feed_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", ws_base, FEED_PATH)
}

/// What the WS thread does with one inbound frame
#[derive(Debug, PartialEq)]
enum FrameAction {
    Forward(FeedEvent),
    Pong,
    Ignore,
}

fn handle_frame(text: &str) -> FrameAction {
    match serde_json::from_str::<FeedMessage>(text) {
        Ok(FeedMessage::EventState(state)) => FrameAction::Forward(FeedEvent::EventState(state)),
        Ok(FeedMessage::Ping) => FrameAction::Pong,
        Ok(FeedMessage::Error { message }) => FrameAction::Forward(FeedEvent::Failed(message)),
        Ok(_) => FrameAction::Ignore,
        Err(e) => {
            debug!(error = %e, "[WS] Unparseable frame");
            FrameAction::Ignore
        }
    }
}

// =============================================================================
// WEBSOCKET THREAD
// =============================================================================

fn push_thread(
    url: &str,
    token: &SharedToken,
    command_rx: Receiver<PushCommand>,
    event_tx: Sender<FeedEvent>,
    shutdown_flag: Arc<AtomicBool>,
) {
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        info!(url = %url, "[WS] Connecting...");
        let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Connecting));

        let subscribe_token = token.lock().clone();
        match connect_and_subscribe(url, subscribe_token) {
            Ok(mut socket) => {
                info!("[WS] Subscribed");
                let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Live));
                reconnect_delay = INITIAL_RECONNECT_DELAY;

                let result = message_loop(
                    &mut socket,
                    token,
                    &command_rx,
                    &event_tx,
                    &shutdown_flag,
                );
                if let Err(e) = &result {
                    info!(error = %e, "[WS] Disconnected");
                }
                let _ = socket.close(None);

                if result.is_err() && !shutdown_flag.load(Ordering::SeqCst) {
                    let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Reconnecting));
                }
            }
            Err(e) => {
                error!(error = %e, "[WS] Connection failed");
                let _ = event_tx.send(FeedEvent::Failed(e));
                let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Reconnecting));
            }
        }

        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        info!(delay = reconnect_delay.as_secs(), "[WS] Reconnecting...");
        // Wait out the backoff, but wake up for shutdown
        if let Ok(PushCommand::Shutdown) = command_rx.recv_timeout(reconnect_delay) {
            break;
        }
        reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
    }

    let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Stopped));
}

fn send_json(socket: &mut Socket, msg: &FeedMessage) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| format!("JSON: {}", e))?;
    socket
        .send(Message::Text(json))
        .map_err(|e| format!("Send: {}", e))
}

fn connect_and_subscribe(url: &str, token: Option<String>) -> Result<Socket, String> {
    let (mut socket, _) = connect(url).map_err(|e| format!("Connect failed: {}", e))?;
    send_json(
        &mut socket,
        &FeedMessage::Subscribe {
            secure_token: token,
        },
    )?;
    Ok(socket)
}

fn message_loop(
    socket: &mut Socket,
    token: &SharedToken,
    command_rx: &Receiver<PushCommand>,
    event_tx: &Sender<FeedEvent>,
    shutdown_flag: &Arc<AtomicBool>,
) -> Result<(), String> {
    let mut last_ping_received = Instant::now();

    match socket.get_ref() {
        MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_nonblocking(true);
        }
        MaybeTlsStream::NativeTls(tls) => {
            let _ = tls.get_ref().set_nonblocking(true);
        }
        _ => {}
    }

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            return Ok(());
        }

        if last_ping_received.elapsed() > PING_TIMEOUT {
            return Err("Server ping timeout (60s)".to_string());
        }

        match command_rx.try_recv() {
            Ok(PushCommand::Resubscribe) => {
                debug!("[WS] Resubscribing for a fresh state");
                let secure_token = token.lock().clone();
                send_json(socket, &FeedMessage::Subscribe { secure_token })?;
            }
            Ok(PushCommand::Shutdown) => return Ok(()),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Err("Channel disconnected".to_string()),
        }

        match socket.read() {
            Ok(Message::Text(text)) => match handle_frame(&text) {
                FrameAction::Forward(event) => {
                    if event_tx.send(event).is_err() {
                        return Ok(());
                    }
                }
                FrameAction::Pong => {
                    last_ping_received = Instant::now();
                    send_json(socket, &FeedMessage::Pong)?;
                }
                FrameAction::Ignore => {}
            },
            Ok(Message::Ping(_)) => last_ping_received = Instant::now(),
            Ok(Message::Close(_)) => return Err("Server closed".to_string()),
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(format!("Read error: {}", e)),
            _ => {}
        }

        thread::sleep(Duration::from_millis(10));
    }
}
