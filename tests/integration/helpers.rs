//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use pulse_core::config::call::{CallConfig, ReconnectConfig};
use pulse_core::config::presence::PresenceConfig;
use pulse_core::config::realtime::RealtimeConfig;
use pulse_core::events::{
    CallMode, IceCandidate, PresenceUpdate, ServerEvent, SessionDescription,
};
use pulse_core::types::UserId;
use pulse_core::AppResult;

use pulse_client::call::media::{LocalMedia, MediaDevices};
use pulse_client::call::peer::{LinkState, PeerConnector, PeerFactory};
use pulse_client::call::state::CallState;
use pulse_client::{CallMachine, CallManager, ChannelStatus, ChannelSupervisor, WsTransport};
use pulse_realtime::directory::{InMemoryDirectory, InMemoryPresenceStore};
use pulse_realtime::server::RealtimeEngine;

/// How long a test waits for an expected event before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// In-process server bound to an ephemeral port.
pub struct TestServer {
    /// `ws://host:port` base for clients.
    pub base_url: String,
    /// The engine under test.
    pub engine: Arc<RealtimeEngine>,
    /// Mutable social graph.
    pub directory: Arc<InMemoryDirectory>,
    /// Durable presence rows.
    pub store: Arc<InMemoryPresenceStore>,
}

/// Boots a server on 127.0.0.1:0.
pub async fn spawn_server() -> TestServer {
    let directory = Arc::new(InMemoryDirectory::new());
    let store = Arc::new(InMemoryPresenceStore::new());
    let engine = Arc::new(RealtimeEngine::new(
        RealtimeConfig::default(),
        PresenceConfig::default(),
        directory.clone(),
        store.clone(),
    ));

    let router = pulse_realtime::socket::router(engine.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    TestServer {
        base_url: format!("ws://{addr}"),
        engine,
        directory,
        store,
    }
}

/// Media collaborator that always grants capture.
#[derive(Debug)]
pub struct GrantingMedia;

#[async_trait]
impl MediaDevices for GrantingMedia {
    async fn acquire(&self, mode: CallMode) -> AppResult<LocalMedia> {
        Ok(LocalMedia {
            stream_id: Uuid::new_v4(),
            mode,
        })
    }

    fn release(&self, _media: &LocalMedia) {}
}

/// Peer connection whose link converges as soon as the remote description
/// lands, standing in for real connectivity negotiation.
#[derive(Debug)]
pub struct AutoConnectPeer {
    connectivity_tx: watch::Sender<LinkState>,
}

#[async_trait]
impl PeerConnector for AutoConnectPeer {
    async fn create_offer(&self) -> AppResult<SessionDescription> {
        Ok(SessionDescription("v=0 offer".to_string()))
    }

    async fn create_answer(&self) -> AppResult<SessionDescription> {
        Ok(SessionDescription("v=0 answer".to_string()))
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> AppResult<()> {
        self.connectivity_tx.send_replace(LinkState::Connected);
        Ok(())
    }

    async fn add_remote_candidate(&self, _candidate: IceCandidate) -> AppResult<()> {
        Ok(())
    }

    fn connectivity(&self) -> watch::Receiver<LinkState> {
        self.connectivity_tx.subscribe()
    }

    fn local_candidates(&self) -> mpsc::Receiver<IceCandidate> {
        mpsc::channel(1).1
    }

    async fn close(&self) {}
}

/// Builds one [`AutoConnectPeer`] per session.
#[derive(Debug)]
pub struct AutoConnectFactory;

impl PeerFactory for AutoConnectFactory {
    fn connector(&self, _mode: CallMode) -> Arc<dyn PeerConnector> {
        let (connectivity_tx, _) = watch::channel(LinkState::New);
        Arc::new(AutoConnectPeer { connectivity_tx })
    }
}

/// One connected client runtime: supervised channel plus call manager.
pub struct TestClient {
    /// The user this runtime belongs to.
    pub user_id: UserId,
    /// The supervised event channel.
    pub supervisor: Arc<ChannelSupervisor>,
    /// The active-call registry wired to the channel.
    pub manager: Arc<CallManager>,
}

impl TestClient {
    /// Connects a client and waits until the channel is online.
    pub async fn connect(server: &TestServer, user_id: UserId) -> Self {
        let transport = Arc::new(WsTransport::new(&server.base_url, user_id));
        let supervisor = ChannelSupervisor::new(transport, ReconnectConfig::default());
        tokio::spawn(supervisor.clone().run());

        let mut status = supervisor.status();
        tokio::time::timeout(WAIT, async {
            loop {
                if *status.borrow() == ChannelStatus::Online {
                    break;
                }
                status.changed().await.expect("status stream");
            }
        })
        .await
        .expect("channel should come online");

        // Short ring window so no-answer tests finish quickly.
        let call_config = CallConfig {
            ring_timeout_seconds: 2,
            cue_interval_ms: 100,
        };
        let manager = Arc::new(CallManager::new(
            user_id,
            call_config,
            Arc::new(GrantingMedia),
            Arc::new(AutoConnectFactory),
            supervisor.sender(),
        ));

        let mut events = supervisor.events();
        let routed = manager.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let ServerEvent::Call { from, signal } = event {
                    routed.handle_signal(from, signal).await;
                }
            }
        });

        Self {
            user_id,
            supervisor,
            manager,
        }
    }

    /// Subscribes to this client's inbound server events.
    pub fn events(&self) -> broadcast::Receiver<ServerEvent> {
        self.supervisor.events()
    }
}

/// Waits until a machine reaches the wanted state.
pub async fn wait_for_state(machine: &Arc<CallMachine>, want: CallState) {
    let mut states = machine.state_changes();
    tokio::time::timeout(WAIT, async {
        loop {
            if *states.borrow_and_update() == want {
                break;
            }
            states.changed().await.expect("state stream");
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "machine never reached {want:?}, stuck at {:?}",
            machine.current_state()
        )
    });
}

/// Waits for the next presence update about a user.
pub async fn next_presence(
    events: &mut broadcast::Receiver<ServerEvent>,
    user_id: UserId,
) -> PresenceUpdate {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ServerEvent::Presence(update) = events.recv().await.expect("event stream") {
                if update.user_id == user_id {
                    return update;
                }
            }
        }
    })
    .await
    .expect("presence update should arrive")
}
