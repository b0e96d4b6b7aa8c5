//! Supervised persistent event channel with reconnect/backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use pulse_core::config::call::ReconnectConfig;
use pulse_core::events::{ClientEvent, ServerEvent};

use crate::transport::{SignalTransport, TransportSink};

/// Observable state of the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// A connection attempt is in flight.
    Connecting,
    /// The channel is live.
    Online,
    /// Waiting out a backoff delay before reconnecting.
    Backoff {
        /// Consecutive failed attempts so far.
        attempt: u32,
    },
    /// The supervisor was torn down.
    Closed,
}

/// Owns the persistent channel to the dispatcher.
///
/// Runs a connect/pump/backoff loop until closed: server pings are answered
/// inline, every other inbound frame is rebroadcast to subscribers, and an
/// outbound queue is drained into the link. Backoff is capped exponential
/// with jitter and the error counter resets on every successful connect.
#[derive(Debug)]
pub struct ChannelSupervisor {
    transport: Arc<dyn SignalTransport>,
    config: ReconnectConfig,
    events_tx: broadcast::Sender<ServerEvent>,
    status_tx: watch::Sender<ChannelStatus>,
    outbound_tx: mpsc::Sender<ClientEvent>,
    outbound_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
    shutdown: Notify,
    running: AtomicBool,
}

impl ChannelSupervisor {
    /// Creates a supervisor over a transport.
    pub fn new(transport: Arc<dyn SignalTransport>, config: ReconnectConfig) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        let (status_tx, _) = watch::channel(ChannelStatus::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        Arc::new(Self {
            transport,
            config,
            events_tx,
            status_tx,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: Notify::new(),
            running: AtomicBool::new(true),
        })
    }

    /// Queue for frames bound to the dispatcher.
    pub fn sender(&self) -> mpsc::Sender<ClientEvent> {
        self.outbound_tx.clone()
    }

    /// Subscribes to inbound server events.
    pub fn events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Observable channel status.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    /// Tears the channel down, cancelling an in-flight backoff sleep.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// The main supervision loop. Call once, typically from `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        let mut outbound = match self.outbound_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("Supervisor run loop started twice");
                return;
            }
        };

        let mut failures: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            self.status_tx.send_replace(ChannelStatus::Connecting);

            match self.transport.connect().await {
                Ok((mut sink, mut frames)) => {
                    failures = 0;
                    info!("Event channel online");
                    self.status_tx.send_replace(ChannelStatus::Online);
                    self.pump(sink.as_mut(), &mut frames, &mut outbound).await;
                    sink.close().await;
                }
                Err(e) => {
                    warn!(error = %e, "Event channel connect failed");
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let delay = self.config.delay_for_attempt(failures);
            failures = failures.saturating_add(1);
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
            debug!(attempt = failures, delay = ?delay, "Reconnecting after backoff");
            self.status_tx
                .send_replace(ChannelStatus::Backoff { attempt: failures });

            tokio::select! {
                _ = sleep(delay + jitter) => {}
                _ = self.shutdown.notified() => break,
            }
        }

        self.status_tx.send_replace(ChannelStatus::Closed);
        info!("Event channel supervisor stopped");
    }

    /// Pumps one live link until it dies or the supervisor is closed.
    async fn pump(
        &self,
        sink: &mut dyn TransportSink,
        frames: &mut mpsc::Receiver<ServerEvent>,
        outbound: &mut mpsc::Receiver<ClientEvent>,
    ) {
        loop {
            tokio::select! {
                incoming = frames.recv() => match incoming {
                    Some(ServerEvent::Ping) => {
                        if sink.send(ClientEvent::Pong).await.is_err() {
                            return;
                        }
                    }
                    Some(event) => {
                        // Nobody listening is fine; subscribers come and go.
                        let _ = self.events_tx.send(event);
                    }
                    None => {
                        debug!("Event channel link lost");
                        return;
                    }
                },
                queued = outbound.recv() => match queued {
                    Some(event) => {
                        if sink.send(event).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                },
                _ = self.shutdown.notified() => return,
            }
        }
    }
}
