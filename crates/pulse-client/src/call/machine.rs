//! Call-signaling state machine, one instance per side per session.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use pulse_core::config::call::CallConfig;
use pulse_core::events::{
    CallEndReason, CallMode, CallSignal, ClientEvent, IceCandidate, SessionDescription,
};
use pulse_core::types::{CallId, ConversationId, UserId};
use pulse_core::{AppError, AppResult};

use super::media::MediaDevices;
use super::peer::{LinkState, PeerConnector};
use super::session::CallSession;
use super::state::{CallRole, CallState};

/// Owns the lifecycle of one call session.
///
/// Operations are serialized behind the session mutex, so no two signaling
/// steps for the same session ever interleave. Signals arriving for an
/// `Ended` session are dropped silently; termination races are expected.
#[derive(Debug)]
pub struct CallMachine {
    /// The session ID, fixed at construction.
    call_id: CallId,
    /// Which side this machine is, fixed at construction.
    role: CallRole,
    config: CallConfig,
    media: Arc<dyn MediaDevices>,
    peer: Arc<dyn PeerConnector>,
    outbound: mpsc::Sender<ClientEvent>,
    session: Mutex<CallSession>,
    state_tx: watch::Sender<CallState>,
    /// Self-reference handed to spawned timer/watcher tasks.
    weak: Weak<CallMachine>,
}

impl CallMachine {
    /// Creates the caller-side machine for an outgoing call. The session
    /// stays `Idle` until [`CallMachine::initiate`] runs.
    #[allow(clippy::too_many_arguments)]
    pub fn outgoing(
        conversation_id: ConversationId,
        caller_id: UserId,
        callee_id: UserId,
        mode: CallMode,
        config: CallConfig,
        media: Arc<dyn MediaDevices>,
        peer: Arc<dyn PeerConnector>,
        outbound: mpsc::Sender<ClientEvent>,
    ) -> Arc<Self> {
        let session =
            CallSession::outgoing(CallId::new(), conversation_id, caller_id, callee_id, mode);
        Self::build(session, config, media, peer, outbound)
    }

    /// Creates the callee-side machine from a received offer. The caller of
    /// this constructor must follow up with [`CallMachine::ring`].
    #[allow(clippy::too_many_arguments)]
    pub fn incoming(
        call_id: CallId,
        conversation_id: ConversationId,
        caller_id: UserId,
        callee_id: UserId,
        mode: CallMode,
        offer: SessionDescription,
        config: CallConfig,
        media: Arc<dyn MediaDevices>,
        peer: Arc<dyn PeerConnector>,
        outbound: mpsc::Sender<ClientEvent>,
    ) -> Arc<Self> {
        let session = CallSession::incoming(
            call_id,
            conversation_id,
            caller_id,
            callee_id,
            mode,
            offer,
        );
        Self::build(session, config, media, peer, outbound)
    }

    fn build(
        session: CallSession,
        config: CallConfig,
        media: Arc<dyn MediaDevices>,
        peer: Arc<dyn PeerConnector>,
        outbound: mpsc::Sender<ClientEvent>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(session.state);
        Arc::new_cyclic(|weak| Self {
            call_id: session.call_id,
            role: session.role,
            config,
            media,
            peer,
            outbound,
            session: Mutex::new(session),
            state_tx,
            weak: weak.clone(),
        })
    }

    /// The session this machine owns.
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Which side this machine is.
    pub fn role(&self) -> CallRole {
        self.role
    }

    /// The current lifecycle state.
    pub fn current_state(&self) -> CallState {
        *self.state_tx.borrow()
    }

    /// Observable state transitions, for the ringing controller and UI.
    pub fn state_changes(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    /// Why the session ended, once it has.
    pub async fn end_reason(&self) -> Option<CallEndReason> {
        self.session.lock().await.end_reason
    }

    /// Starts an outgoing call: acquires media, generates and publishes the
    /// offer, and transitions to `Dialing`.
    ///
    /// Media acquisition failure is terminal for this attempt; the session
    /// never leaves `Idle` and no capture is held.
    pub async fn initiate(&self) -> AppResult<()> {
        let mut session = self.session.lock().await;
        if session.role != CallRole::Caller || session.state != CallState::Idle {
            return Err(AppError::signaling(format!(
                "initiate is not valid from {:?}",
                session.state
            )));
        }

        let media = self.media.acquire(session.mode).await?;
        session.local_media = Some(media);

        let offer = match self.peer.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                if let Some(media) = session.local_media.take() {
                    self.media.release(&media);
                }
                return Err(e);
            }
        };
        session.local_description = Some(offer.clone());

        let signal = CallSignal::Offer {
            call_id: session.call_id,
            conversation_id: session.conversation_id,
            caller_id: session.caller_id,
            callee_id: session.callee_id,
            mode: session.mode,
            sdp: offer,
        };
        let to = session.callee_id;
        self.set_state(&mut session, CallState::Dialing);
        drop(session);

        self.publish(to, signal).await;
        self.spawn_ring_timer();
        self.spawn_connectivity_watcher();
        self.spawn_candidate_pump();
        Ok(())
    }

    /// Announces an incoming offer on this device: transitions to
    /// `Ringing` and acknowledges receipt to the caller.
    pub async fn ring(&self) {
        let mut session = self.session.lock().await;
        if session.state != CallState::Idle {
            return;
        }
        let to = session.caller_id;
        let call_id = session.call_id;
        self.set_state(&mut session, CallState::Ringing);
        drop(session);

        self.publish(to, CallSignal::RingAck { call_id }).await;
        self.spawn_ring_timer();
    }

    /// Accepts a ringing incoming call: acquires media, applies the stored
    /// offer, publishes the answer, and transitions to `Negotiating`.
    pub async fn accept(&self) -> AppResult<()> {
        let mut session = self.session.lock().await;
        if session.role != CallRole::Callee || session.state != CallState::Ringing {
            return Err(AppError::signaling(format!(
                "accept is not valid from {:?}",
                session.state
            )));
        }

        let media = match self.media.acquire(session.mode).await {
            Ok(media) => media,
            Err(e) => {
                drop(session);
                self.terminate(CallEndReason::MediaUnavailable).await;
                return Err(e);
            }
        };
        session.local_media = Some(media);

        let offer = match session.remote_description.clone() {
            Some(offer) => offer,
            None => {
                drop(session);
                self.terminate(CallEndReason::Hangup).await;
                return Err(AppError::signaling("incoming session has no offer"));
            }
        };

        if let Err(e) = self.peer.set_remote_description(offer).await {
            drop(session);
            self.terminate(CallEndReason::Hangup).await;
            return Err(e);
        }
        session.remote_applied = true;
        self.drain_pending(&mut session).await;

        let answer = match self.peer.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                drop(session);
                self.terminate(CallEndReason::Hangup).await;
                return Err(e);
            }
        };
        session.local_description = Some(answer.clone());

        let to = session.caller_id;
        let call_id = session.call_id;
        self.set_state(&mut session, CallState::Negotiating);
        drop(session);

        self.publish(to, CallSignal::Answer { call_id, sdp: answer })
            .await;
        self.spawn_connectivity_watcher();
        self.spawn_candidate_pump();
        Ok(())
    }

    /// Declines a ringing incoming call.
    pub async fn reject(&self) {
        if self.current_state() == CallState::Ringing {
            self.end_session(CallEndReason::Rejected, true).await;
        } else {
            debug!(call_id = %self.call_id, "Reject outside Ringing ignored");
        }
    }

    /// Routes one inbound signal for this session.
    pub async fn handle_signal(&self, signal: CallSignal) {
        match signal {
            CallSignal::Offer { .. } => {
                debug!(call_id = %self.call_id, "Duplicate offer for live session dropped");
            }
            CallSignal::RingAck { .. } => {
                let mut session = self.session.lock().await;
                if session.role == CallRole::Caller && session.state == CallState::Dialing {
                    self.set_state(&mut session, CallState::Ringing);
                }
            }
            CallSignal::Answer { sdp, .. } => self.apply_remote_answer(sdp).await,
            CallSignal::Candidate { candidate, .. } => self.add_remote_candidate(candidate).await,
            CallSignal::Terminate { reason, .. } => {
                // The peer is already gone; tear down locally only.
                self.end_session(reason, false).await;
            }
        }
    }

    /// Applies the callee's answer (caller side, `Ringing` only).
    pub async fn apply_remote_answer(&self, sdp: SessionDescription) {
        let mut session = self.session.lock().await;
        if session.state == CallState::Ended {
            debug!(call_id = %self.call_id, "Late answer dropped");
            return;
        }
        if session.role != CallRole::Caller || session.state != CallState::Ringing {
            debug!(
                call_id = %self.call_id,
                state = ?session.state,
                "Answer out of order, dropped"
            );
            return;
        }

        session.remote_description = Some(sdp.clone());
        if let Err(e) = self.peer.set_remote_description(sdp).await {
            warn!(call_id = %self.call_id, error = %e, "Failed to apply remote answer");
            drop(session);
            self.end_session(CallEndReason::Hangup, true).await;
            return;
        }
        session.remote_applied = true;
        self.drain_pending(&mut session).await;
        self.set_state(&mut session, CallState::Negotiating);
    }

    /// Applies or queues one remote candidate.
    ///
    /// Out-of-order arrival relative to the remote description is expected:
    /// early candidates queue in arrival order and are applied the moment
    /// the description lands.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) {
        let mut session = self.session.lock().await;
        if session.state == CallState::Ended {
            debug!(call_id = %self.call_id, "Late candidate dropped");
            return;
        }
        if session.remote_applied {
            if let Err(e) = self.peer.add_remote_candidate(candidate).await {
                warn!(call_id = %self.call_id, error = %e, "Failed to apply remote candidate");
            }
        } else {
            session.pending_candidates.push_back(candidate);
        }
    }

    /// Ends the session and notifies the peer. Safe to call from any state
    /// and idempotent: repeated calls are no-ops.
    pub async fn terminate(&self, reason: CallEndReason) {
        self.end_session(reason, true).await;
    }

    /// Implicit termination when the event channel drops mid-session.
    /// The peer is unreachable, so nothing is published.
    pub async fn on_channel_down(&self) {
        self.end_session(CallEndReason::PeerUnreachable, false).await;
    }

    /// Shared teardown: releases media synchronously, closes the peer
    /// connection, and optionally publishes the termination.
    async fn end_session(&self, reason: CallEndReason, publish: bool) {
        let mut session = self.session.lock().await;
        match session.state {
            CallState::Ended => {
                debug!(call_id = %self.call_id, "Terminate on ended session is a no-op");
                return;
            }
            CallState::Idle => return,
            _ => {}
        }

        if let Some(media) = session.local_media.take() {
            self.media.release(&media);
        }
        session.end_reason = Some(reason);
        let to = session.peer_id();
        let call_id = session.call_id;
        self.set_state(&mut session, CallState::Ended);
        drop(session);

        self.peer.close().await;
        if publish {
            self.publish(to, CallSignal::Terminate { call_id, reason })
                .await;
        }

        info!(call_id = %call_id, reason = reason.as_str(), "Call ended");
    }

    /// Applies all queued candidates in arrival order. The queue is never
    /// refilled after `remote_applied` flips.
    async fn drain_pending(&self, session: &mut CallSession) {
        let pending: Vec<IceCandidate> = session.pending_candidates.drain(..).collect();
        for candidate in pending {
            if let Err(e) = self.peer.add_remote_candidate(candidate).await {
                warn!(call_id = %self.call_id, error = %e, "Failed to apply queued candidate");
            }
        }
    }

    fn set_state(&self, session: &mut CallSession, state: CallState) {
        debug!(
            call_id = %self.call_id,
            from = ?session.state,
            to = ?state,
            "Call state transition"
        );
        session.state = state;
        self.state_tx.send_replace(state);
    }

    async fn publish(&self, to: UserId, signal: CallSignal) {
        if self
            .outbound
            .send(ClientEvent::Call { to, signal })
            .await
            .is_err()
        {
            warn!(call_id = %self.call_id, "Event channel closed, call signal dropped");
        }
    }

    /// Auto-terminates with `NoAnswer` if the session is still ringing when
    /// the window closes.
    fn spawn_ring_timer(&self) {
        let Some(machine) = self.weak.upgrade() else {
            return;
        };
        let window = Duration::from_secs(self.config.ring_timeout_seconds);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if matches!(
                machine.current_state(),
                CallState::Dialing | CallState::Ringing
            ) {
                info!(call_id = %machine.call_id, "Ring window elapsed");
                machine.terminate(CallEndReason::NoAnswer).await;
            }
        });
    }

    /// Observes the transport's connectivity signal: `Negotiating →
    /// Connected` convergence and link failure both come from here.
    fn spawn_connectivity_watcher(&self) {
        let Some(machine) = self.weak.upgrade() else {
            return;
        };
        let mut connectivity = self.peer.connectivity();
        let mut states = self.state_changes();
        tokio::spawn(async move {
            loop {
                let link_state = *connectivity.borrow_and_update();
                match link_state {
                    LinkState::Connected => {
                        let mut session = machine.session.lock().await;
                        if session.state == CallState::Negotiating {
                            machine.set_state(&mut session, CallState::Connected);
                            info!(call_id = %machine.call_id, "Call connected");
                        }
                    }
                    LinkState::Failed => {
                        if machine.current_state().is_active() {
                            machine
                                .end_session(CallEndReason::PeerUnreachable, false)
                                .await;
                        }
                        return;
                    }
                    LinkState::New => {}
                }

                if machine.current_state() == CallState::Ended {
                    return;
                }
                tokio::select! {
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    changed = states.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Forwards locally gathered candidates to the peer's user room.
    fn spawn_candidate_pump(&self) {
        let Some(machine) = self.weak.upgrade() else {
            return;
        };
        let mut candidates = self.peer.local_candidates();
        tokio::spawn(async move {
            while let Some(candidate) = candidates.recv().await {
                let (state, to, call_id) = {
                    let session = machine.session.lock().await;
                    (session.state, session.peer_id(), session.call_id)
                };
                if state == CallState::Ended {
                    return;
                }
                machine
                    .publish(to, CallSignal::Candidate { call_id, candidate })
                    .await;
            }
        });
    }
}
