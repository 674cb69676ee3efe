//! Event-state poller
//!
//! A background thread fetches `get-event-state` on a fixed interval and
//! hands the results to the main thread over a channel. Failures are logged
//! and the next cycle simply tries again.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::io_traits::{EventFeed, FeedEvent, FeedStatus, ParticipantApi};

/// Commands (main thread -> poll thread)
#[derive(Debug)]
enum PollCommand {
    PollNow,
    Shutdown,
}

/// Thread-backed polling feed
pub struct EventPoller {
    tx: Option<Sender<PollCommand>>,
    rx: Option<Receiver<FeedEvent>>,
    thread_handle: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    current_status: FeedStatus,
}

impl EventPoller {
    pub fn new() -> Self {
        Self {
            tx: None,
            rx: None,
            thread_handle: None,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            current_status: FeedStatus::Idle,
        }
    }

    /// Start polling with an API built by `make_api` on the poll thread
    pub fn start<A, F>(&mut self, make_api: F, interval: Duration)
    where
        A: ParticipantApi,
        F: FnOnce() -> A + Send + 'static,
    {
        if self.thread_handle.is_some() {
            warn!("[POLL] Already running");
            return;
        }

        let (command_tx, command_rx) = bounded::<PollCommand>(16);
        let (event_tx, event_rx) = bounded::<FeedEvent>(64);

        self.tx = Some(command_tx);
        self.rx = Some(event_rx);
        self.shutdown_flag.store(false, Ordering::SeqCst);

        let shutdown_flag = Arc::clone(&self.shutdown_flag);

        let handle = thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let api = make_api();
                poll_thread(&api, interval, command_rx, event_tx.clone(), shutdown_flag);
            }));

            if let Err(panic_info) = result {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    format!("Poll thread panic: {}", s)
                } else {
                    "Poll thread panic".to_string()
                };
                error!("{}", msg);
                let _ = event_tx.send(FeedEvent::Failed(msg));
                let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Stopped));
            }
        });

        self.thread_handle = Some(handle);
        self.current_status = FeedStatus::Connecting;
    }

    pub fn stop(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(tx) = &self.tx {
            let _ = tx.send(PollCommand::Shutdown);
        }
        // Dropping the receiver unblocks a thread stuck on a full channel
        self.rx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.tx = None;
        self.current_status = FeedStatus::Stopped;
    }
}

impl Default for EventPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFeed for EventPoller {
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
            if let Err(e) = tx.try_send(PollCommand::PollNow) {
                debug!("[POLL] Refresh already pending: {}", e);
            }
        }
    }

    fn status(&self) -> FeedStatus {
        self.current_status
    }
}

impl Drop for EventPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// POLL THREAD
// =============================================================================

fn poll_thread<A: ParticipantApi>(
    api: &A,
    interval: Duration,
    command_rx: Receiver<PollCommand>,
    event_tx: Sender<FeedEvent>,
    shutdown_flag: Arc<AtomicBool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "[POLL] Started");
    let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Live));

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        let event = match api.fetch_event_state() {
            Ok(state) => FeedEvent::EventState(state),
            Err(e) => {
                warn!(error = %e, "[POLL] Fetch failed, retrying next cycle");
                FeedEvent::Failed(e.to_string())
            }
        };
        if event_tx.send(event).is_err() {
            break;
        }

        // Sleep until the next cycle, a refresh request or shutdown
        match command_rx.recv_timeout(interval) {
            Ok(PollCommand::PollNow) => debug!("[POLL] Immediate refresh"),
            Ok(PollCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    info!("[POLL] Stopped");
    let _ = event_tx.send(FeedEvent::StatusChanged(FeedStatus::Stopped));
}
