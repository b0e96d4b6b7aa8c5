//! Connection manager — connect/disconnect side effects and inbound routing.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pulse_core::config::realtime::RealtimeConfig;
use pulse_core::events::{
    CallSignal, ClientEvent, MessagePosted, ReadReceipt, ServerEvent, TypingUpdate,
};
use pulse_core::traits::ContactDirectory;
use pulse_core::types::{ConversationId, UserId};

use crate::presence::registry::PresenceRegistry;
use crate::room::dispatcher::RoomDispatcher;
use crate::room::room::RoomId;

use super::handle::{ConnectionHandle, ConnectionId};
use super::pool::ConnectionPool;

/// Manages all active WebSocket connections.
///
/// Registration and unregistration are the only paths by which a channel
/// gains or loses room membership and presence weight, so a broken
/// transport can never leave zombie membership behind.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Connection pool.
    pool: Arc<ConnectionPool>,
    /// Room dispatcher.
    dispatcher: Arc<RoomDispatcher>,
    /// Presence registry.
    presence: Arc<PresenceRegistry>,
    /// Social graph, used for join/call authorization.
    directory: Arc<dyn ContactDirectory>,
    /// Configuration.
    config: RealtimeConfig,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: RealtimeConfig,
        pool: Arc<ConnectionPool>,
        dispatcher: Arc<RoomDispatcher>,
        presence: Arc<PresenceRegistry>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            presence,
            directory,
            config,
        }
    }

    /// Registers a new connection for a user.
    ///
    /// Returns the connection handle and the receiver the socket task pumps
    /// to the client. The connection is auto-joined to its user room.
    pub async fn register(
        &self,
        user_id: UserId,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(user_id, tx));

        let existing = self.pool.user_connections(&user_id);
        if existing.len() >= self.config.max_connections_per_user {
            warn!(
                user_id = %user_id,
                count = existing.len(),
                max = self.config.max_connections_per_user,
                "User at max connections, oldest will be replaced"
            );
            if let Some(oldest) = existing.first() {
                oldest.mark_dead();
                self.unregister(&oldest.id).await;
            }
        }

        self.pool.add(handle.clone());
        self.dispatcher.join(RoomId::User(user_id), handle.id);
        self.presence.on_connect(user_id).await;

        info!(conn_id = %handle.id, user_id = %user_id, "Connection registered");

        (handle, rx)
    }

    /// Unregisters a connection, dropping it from every room and shedding
    /// its presence weight.
    pub async fn unregister(&self, conn_id: &ConnectionId) {
        if let Some(handle) = self.pool.remove(conn_id) {
            handle.mark_dead();
            self.dispatcher.leave_all(*conn_id);
            self.presence.on_disconnect(handle.user_id).await;

            info!(conn_id = %conn_id, user_id = %handle.user_id, "Connection unregistered");
        }
    }

    /// Processes one inbound frame from a client.
    ///
    /// Malformed or unauthorized frames are answered with
    /// [`ServerEvent::Error`] and dropped; nothing here escalates past the
    /// owning connection.
    pub async fn handle_inbound(&self, conn_id: &ConnectionId, raw_frame: &str) {
        let handle = match self.pool.get(conn_id) {
            Some(h) => h,
            None => {
                warn!(conn_id = %conn_id, "Frame from unknown connection");
                return;
            }
        };

        let event: ClientEvent = match serde_json::from_str(raw_frame) {
            Ok(e) => e,
            Err(e) => {
                handle.send(ServerEvent::Error {
                    code: "INVALID_FRAME".to_string(),
                    message: format!("Failed to parse frame: {e}"),
                });
                return;
            }
        };

        match event {
            ClientEvent::JoinConversation { conversation_id } => {
                self.handle_join(&handle, conversation_id).await;
            }
            ClientEvent::LeaveConversation { conversation_id } => {
                self.dispatcher
                    .leave(RoomId::Conversation(conversation_id), handle.id);
                debug!(conn_id = %conn_id, conversation_id = %conversation_id, "Left conversation room");
            }
            ClientEvent::Typing {
                conversation_id,
                is_typing,
            } => {
                self.handle_typing(&handle, conversation_id, is_typing);
            }
            ClientEvent::MarkRead {
                conversation_id,
                message_id,
            } => {
                let room = RoomId::Conversation(conversation_id);
                if !self.dispatcher.is_member(&room, handle.id) {
                    return;
                }
                // Echo to the reader's other devices so unread badges sync.
                self.dispatcher.publish(
                    &room,
                    &ServerEvent::ReadReceipt(ReadReceipt {
                        conversation_id,
                        user_id: handle.user_id,
                        message_id,
                        read_at: Utc::now(),
                    }),
                    None,
                );
                self.presence.on_activity(handle.user_id);
            }
            ClientEvent::Call { to, signal } => {
                self.handle_call(&handle, to, signal).await;
            }
            ClientEvent::Activity => {
                self.presence.on_activity(handle.user_id);
            }
            ClientEvent::Pong => {
                handle.record_pong().await;
            }
        }
    }

    /// Handles a conversation join with membership authorization.
    async fn handle_join(&self, handle: &Arc<ConnectionHandle>, conversation_id: ConversationId) {
        if self.dispatcher.membership_count(handle.id) >= self.config.max_rooms_per_connection {
            handle.send(ServerEvent::Error {
                code: "MAX_ROOMS".to_string(),
                message: format!(
                    "Maximum room memberships ({}) reached",
                    self.config.max_rooms_per_connection
                ),
            });
            return;
        }

        let members = match self.directory.conversation_members(conversation_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Member lookup failed");
                handle.send(ServerEvent::Error {
                    code: "LOOKUP_FAILED".to_string(),
                    message: "Could not verify conversation membership".to_string(),
                });
                return;
            }
        };

        if !members.contains(&handle.user_id) {
            handle.send(ServerEvent::Error {
                code: "FORBIDDEN".to_string(),
                message: format!("Not a participant of conversation {conversation_id}"),
            });
            return;
        }

        self.dispatcher
            .join(RoomId::Conversation(conversation_id), handle.id);
        handle.send(ServerEvent::Joined { conversation_id });
        self.presence.on_activity(handle.user_id);

        debug!(conn_id = %handle.id, conversation_id = %conversation_id, "Joined conversation room");
    }

    /// Fans a typing indicator out to the rest of the room.
    fn handle_typing(
        &self,
        handle: &Arc<ConnectionHandle>,
        conversation_id: ConversationId,
        is_typing: bool,
    ) {
        let room = RoomId::Conversation(conversation_id);
        if !self.dispatcher.is_member(&room, handle.id) {
            return;
        }
        self.dispatcher.publish(
            &room,
            &ServerEvent::Typing(TypingUpdate {
                conversation_id,
                user_id: handle.user_id,
                is_typing,
            }),
            Some(handle.id),
        );
        if is_typing {
            self.presence.on_activity(handle.user_id);
        }
    }

    /// Relays a call signal to every device in the target's user room.
    async fn handle_call(&self, handle: &Arc<ConnectionHandle>, to: UserId, signal: CallSignal) {
        // Only offers open a session, so only offers need the contact check.
        if let CallSignal::Offer { .. } = signal {
            let allowed = match self.directory.accepted_contacts(handle.user_id).await {
                Ok(contacts) => contacts.contains(&to),
                Err(e) => {
                    warn!(user_id = %handle.user_id, error = %e, "Contact lookup failed for call offer");
                    false
                }
            };
            if !allowed {
                handle.send(ServerEvent::Error {
                    code: "FORBIDDEN".to_string(),
                    message: format!("{to} is not an accepted contact"),
                });
                return;
            }
            self.presence.on_activity(handle.user_id);
        }

        let delivered = self.dispatcher.publish(
            &RoomId::User(to),
            &ServerEvent::Call {
                from: handle.user_id,
                signal,
            },
            None,
        );

        debug!(
            conn_id = %handle.id,
            to = %to,
            delivered,
            "Relayed call signal"
        );
    }

    /// Fans a freshly persisted message out to live viewers of its
    /// conversation. Called by the CRUD layer after the durable write.
    pub fn notify_message_posted(&self, message: MessagePosted) {
        let room = RoomId::Conversation(message.conversation_id);
        self.dispatcher
            .publish(&room, &ServerEvent::Message(message), None);
    }

    /// Closes all connections (engine shutdown path).
    pub async fn close_all(&self) {
        let all = self.pool.all_connections();
        for conn in &all {
            conn.mark_dead();
            self.unregister(&conn.id).await;
        }
        if !all.is_empty() {
            info!(count = all.len(), "All connections closed");
        }
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Checks if a user is currently connected.
    pub fn is_user_connected(&self, user_id: &UserId) -> bool {
        self.pool.is_user_connected(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectory, InMemoryPresenceStore};
    use pulse_core::config::presence::PresenceConfig;
    use pulse_core::events::PresenceStatus;
    use pulse_core::types::MessageId;
    use tokio::sync::mpsc::Receiver;

    struct Fixture {
        manager: ConnectionManager,
        directory: Arc<InMemoryDirectory>,
        presence: Arc<PresenceRegistry>,
    }

    fn fixture() -> Fixture {
        let pool = Arc::new(ConnectionPool::new());
        let dispatcher = Arc::new(RoomDispatcher::new(pool.clone()));
        let directory = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemoryPresenceStore::new());
        let presence = Arc::new(PresenceRegistry::new(
            PresenceConfig::default(),
            dispatcher.clone(),
            directory.clone(),
            store,
        ));
        let manager = ConnectionManager::new(
            RealtimeConfig::default(),
            pool,
            dispatcher,
            presence.clone(),
            directory.clone(),
        );
        Fixture {
            manager,
            directory,
            presence,
        }
    }

    async fn frame(manager: &ConnectionManager, conn_id: &ConnectionId, event: &ClientEvent) {
        let raw = serde_json::to_string(event).expect("serialize");
        manager.handle_inbound(conn_id, &raw).await;
    }

    fn drain(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_register_unregister_drives_presence() {
        let f = fixture();
        let user = UserId::new();

        let (handle, _rx) = f.manager.register(user).await;
        assert_eq!(f.presence.status_of(&user), PresenceStatus::Online);

        f.manager.unregister(&handle.id).await;
        assert_eq!(f.presence.status_of(&user), PresenceStatus::Offline);
        assert!(!f.manager.is_user_connected(&user));
    }

    #[tokio::test]
    async fn test_join_requires_membership() {
        let f = fixture();
        let user = UserId::new();
        let conversation = ConversationId::new();
        f.directory.set_conversation(conversation, &[UserId::new()]);

        let (handle, mut rx) = f.manager.register(user).await;
        frame(
            &f.manager,
            &handle.id,
            &ClientEvent::JoinConversation {
                conversation_id: conversation,
            },
        )
        .await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Error { code, .. } if code == "FORBIDDEN"
        )));
    }

    #[tokio::test]
    async fn test_typing_excludes_publisher_but_reaches_peer() {
        let f = fixture();
        let alice = UserId::new();
        let bob = UserId::new();
        let conversation = ConversationId::new();
        f.directory.set_conversation(conversation, &[alice, bob]);

        let (alice_conn, mut alice_rx) = f.manager.register(alice).await;
        let (bob_conn, mut bob_rx) = f.manager.register(bob).await;

        for conn in [&alice_conn, &bob_conn] {
            frame(
                &f.manager,
                &conn.id,
                &ClientEvent::JoinConversation {
                    conversation_id: conversation,
                },
            )
            .await;
        }
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        frame(
            &f.manager,
            &alice_conn.id,
            &ClientEvent::Typing {
                conversation_id: conversation,
                is_typing: true,
            },
        )
        .await;

        assert!(drain(&mut alice_rx).is_empty());
        let bob_events = drain(&mut bob_rx);
        assert!(bob_events.iter().any(|e| matches!(
            e,
            ServerEvent::Typing(update) if update.user_id == alice && update.is_typing
        )));
    }

    #[tokio::test]
    async fn test_call_offer_to_non_contact_is_rejected() {
        let f = fixture();
        let alice = UserId::new();
        let stranger = UserId::new();

        let (alice_conn, mut alice_rx) = f.manager.register(alice).await;
        let offer = ClientEvent::Call {
            to: stranger,
            signal: CallSignal::Offer {
                call_id: pulse_core::types::CallId::new(),
                conversation_id: ConversationId::new(),
                caller_id: alice,
                callee_id: stranger,
                mode: pulse_core::events::CallMode::Audio,
                sdp: pulse_core::events::SessionDescription("v=0".to_string()),
            },
        };
        frame(&f.manager, &alice_conn.id, &offer).await;

        let events = drain(&mut alice_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Error { code, .. } if code == "FORBIDDEN"
        )));
    }

    #[tokio::test]
    async fn test_call_signal_reaches_all_target_devices() {
        let f = fixture();
        let alice = UserId::new();
        let bob = UserId::new();
        f.directory.add_contact_pair(alice, bob);

        let (alice_conn, _alice_rx) = f.manager.register(alice).await;
        let (_bob_phone, mut phone_rx) = f.manager.register(bob).await;
        let (_bob_web, mut web_rx) = f.manager.register(bob).await;
        drain(&mut phone_rx);
        drain(&mut web_rx);

        let call_id = pulse_core::types::CallId::new();
        frame(
            &f.manager,
            &alice_conn.id,
            &ClientEvent::Call {
                to: bob,
                signal: CallSignal::Offer {
                    call_id,
                    conversation_id: ConversationId::new(),
                    caller_id: alice,
                    callee_id: bob,
                    mode: pulse_core::events::CallMode::Video,
                    sdp: pulse_core::events::SessionDescription("v=0".to_string()),
                },
            },
        )
        .await;

        for rx in [&mut phone_rx, &mut web_rx] {
            let events = drain(rx);
            assert!(events.iter().any(|e| matches!(
                e,
                ServerEvent::Call { from, signal } if *from == alice && signal.call_id() == call_id
            )));
        }
    }

    #[tokio::test]
    async fn test_message_fan_out_echoes_to_sender_devices() {
        let f = fixture();
        let alice = UserId::new();
        let conversation = ConversationId::new();
        f.directory.set_conversation(conversation, &[alice]);

        let (conn, mut rx) = f.manager.register(alice).await;
        frame(
            &f.manager,
            &conn.id,
            &ClientEvent::JoinConversation {
                conversation_id: conversation,
            },
        )
        .await;
        drain(&mut rx);

        f.manager.notify_message_posted(MessagePosted {
            message_id: MessageId::new(),
            conversation_id: conversation,
            sender_id: alice,
            body: "hey".to_string(),
            sent_at: Utc::now(),
        });

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Message(m) if m.body == "hey")));
    }

    #[tokio::test]
    async fn test_malformed_frame_answered_with_error() {
        let f = fixture();
        let (conn, mut rx) = f.manager.register(UserId::new()).await;

        f.manager.handle_inbound(&conn.id, "{not json").await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Error { code, .. } if code == "INVALID_FRAME"
        )));
    }
}
