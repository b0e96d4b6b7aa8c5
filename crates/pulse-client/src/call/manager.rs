//! Active-call registry: routes inbound signals and opens sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

use pulse_core::config::call::CallConfig;
use pulse_core::events::{CallMode, CallSignal, ClientEvent};
use pulse_core::types::{CallId, ConversationId, UserId};
use pulse_core::AppResult;

use super::machine::CallMachine;
use super::media::MediaDevices;
use super::peer::PeerFactory;
use super::state::CallState;

/// Owns every live [`CallMachine`] for one local user.
///
/// Inbound offers become new callee-side machines (announced on the
/// incoming-call channel); every other signal is routed to its session's
/// machine or silently dropped when the session is already gone.
#[derive(Debug)]
pub struct CallManager {
    local_user: UserId,
    config: CallConfig,
    media: Arc<dyn MediaDevices>,
    peers: Arc<dyn PeerFactory>,
    outbound: mpsc::Sender<ClientEvent>,
    calls: Mutex<HashMap<CallId, Arc<CallMachine>>>,
    incoming_tx: broadcast::Sender<Arc<CallMachine>>,
}

impl CallManager {
    /// Creates a call manager for the local user.
    pub fn new(
        local_user: UserId,
        config: CallConfig,
        media: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerFactory>,
        outbound: mpsc::Sender<ClientEvent>,
    ) -> Self {
        let (incoming_tx, _) = broadcast::channel(8);
        Self {
            local_user,
            config,
            media,
            peers,
            outbound,
            calls: Mutex::new(HashMap::new()),
            incoming_tx,
        }
    }

    /// Subscribes to callee-side machines created from inbound offers.
    pub fn incoming_calls(&self) -> broadcast::Receiver<Arc<CallMachine>> {
        self.incoming_tx.subscribe()
    }

    /// Opens an outgoing call and drives it to `Dialing`.
    pub async fn start_call(
        &self,
        callee_id: UserId,
        conversation_id: ConversationId,
        mode: CallMode,
    ) -> AppResult<Arc<CallMachine>> {
        let machine = CallMachine::outgoing(
            conversation_id,
            self.local_user,
            callee_id,
            mode,
            self.config.clone(),
            self.media.clone(),
            self.peers.connector(mode),
            self.outbound.clone(),
        );

        machine.initiate().await?;
        self.calls
            .lock()
            .await
            .insert(machine.call_id(), machine.clone());

        info!(call_id = %machine.call_id(), callee_id = %callee_id, "Outgoing call started");
        Ok(machine)
    }

    /// Routes one call signal received on the event channel.
    pub async fn handle_signal(&self, from: UserId, signal: CallSignal) {
        let call_id = signal.call_id();

        if let CallSignal::Offer {
            conversation_id,
            caller_id,
            callee_id,
            mode,
            sdp,
            ..
        } = signal
        {
            self.handle_offer(from, call_id, conversation_id, caller_id, callee_id, mode, sdp)
                .await;
            return;
        }

        let machine = self.calls.lock().await.get(&call_id).cloned();
        match machine {
            Some(machine) => machine.handle_signal(signal).await,
            // Termination races are expected; a signal for a session we no
            // longer hold is dropped, not an error.
            None => debug!(call_id = %call_id, "Signal for unknown session dropped"),
        }

        self.prune().await;
    }

    /// Creates the callee-side machine for an inbound offer.
    #[allow(clippy::too_many_arguments)]
    async fn handle_offer(
        &self,
        from: UserId,
        call_id: CallId,
        conversation_id: ConversationId,
        caller_id: UserId,
        callee_id: UserId,
        mode: CallMode,
        sdp: pulse_core::events::SessionDescription,
    ) {
        if callee_id != self.local_user {
            warn!(call_id = %call_id, "Offer addressed to someone else dropped");
            return;
        }
        if from != caller_id {
            warn!(call_id = %call_id, "Offer caller does not match channel sender, dropped");
            return;
        }

        let mut calls = self.calls.lock().await;
        if calls.contains_key(&call_id) {
            debug!(call_id = %call_id, "Duplicate offer dropped");
            return;
        }

        let machine = CallMachine::incoming(
            call_id,
            conversation_id,
            caller_id,
            callee_id,
            mode,
            sdp,
            self.config.clone(),
            self.media.clone(),
            self.peers.connector(mode),
            self.outbound.clone(),
        );
        calls.insert(call_id, machine.clone());
        drop(calls);

        machine.ring().await;
        // Nobody subscribed yet is fine; the call still rings and times out.
        let _ = self.incoming_tx.send(machine);

        info!(call_id = %call_id, caller_id = %caller_id, "Incoming call ringing");
    }

    /// Ends every live session; the channel to the peers is gone.
    pub async fn on_channel_down(&self) {
        let machines: Vec<Arc<CallMachine>> =
            self.calls.lock().await.values().cloned().collect();
        for machine in machines {
            machine.on_channel_down().await;
        }
        self.prune().await;
    }

    /// Looks up a live session.
    pub async fn get(&self, call_id: CallId) -> Option<Arc<CallMachine>> {
        self.calls.lock().await.get(&call_id).cloned()
    }

    /// Number of sessions still held (ended sessions are pruned lazily).
    pub async fn active_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Drops machines that have reached `Ended`.
    async fn prune(&self) {
        self.calls
            .lock()
            .await
            .retain(|_, machine| machine.current_state() != CallState::Ended);
    }
}
