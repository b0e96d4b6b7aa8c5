//! Presence fan-out over real WebSocket connections.

use pulse_core::events::{ClientEvent, PresenceStatus, ServerEvent};
use pulse_core::types::{ConversationId, UserId};

use crate::helpers::{self, TestClient};

#[tokio::test]
async fn test_contact_observes_online_then_offline() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let bob = UserId::new();
    server.directory.add_contact_pair(alice, bob);

    let bob_client = TestClient::connect(&server, bob).await;
    let mut bob_events = bob_client.events();

    let alice_client = TestClient::connect(&server, alice).await;
    let online = helpers::next_presence(&mut bob_events, alice).await;
    assert_eq!(online.status, PresenceStatus::Online);

    // Offline is immediate on the last disconnect, no decay involved.
    alice_client.supervisor.close();
    let offline = helpers::next_presence(&mut bob_events, alice).await;
    assert_eq!(offline.status, PresenceStatus::Offline);

    // The durable row followed the broadcast.
    let wait = tokio::time::timeout(helpers::WAIT, async {
        loop {
            if let Some((status, _)) = server.store.status_row(&alice) {
                if status == "offline" {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(wait.is_ok(), "presence store row never reached offline");
}

#[tokio::test]
async fn test_non_contact_sees_nothing() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let stranger = UserId::new();

    let stranger_client = TestClient::connect(&server, stranger).await;
    let mut stranger_events = stranger_client.events();

    let _alice_client = TestClient::connect(&server, alice).await;

    let got_presence = tokio::time::timeout(std::time::Duration::from_millis(500), async {
        loop {
            if let ServerEvent::Presence(_) = stranger_events.recv().await.expect("events") {
                return;
            }
        }
    })
    .await;
    assert!(got_presence.is_err(), "stranger saw a presence event");
}

#[tokio::test]
async fn test_typing_reaches_peer_but_not_publisher() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let bob = UserId::new();
    let conversation = ConversationId::new();
    server.directory.set_conversation(conversation, &[alice, bob]);

    let alice_client = TestClient::connect(&server, alice).await;
    let bob_client = TestClient::connect(&server, bob).await;
    let mut alice_events = alice_client.events();
    let mut bob_events = bob_client.events();

    for client in [&alice_client, &bob_client] {
        client
            .supervisor
            .sender()
            .send(ClientEvent::JoinConversation {
                conversation_id: conversation,
            })
            .await
            .expect("queue join");
    }

    // Both sides must be in the room before the indicator fires.
    for events in [&mut alice_events, &mut bob_events] {
        tokio::time::timeout(helpers::WAIT, async {
            loop {
                if let ServerEvent::Joined { .. } = events.recv().await.expect("events") {
                    return;
                }
            }
        })
        .await
        .expect("join ack");
    }

    alice_client
        .supervisor
        .sender()
        .send(ClientEvent::Typing {
            conversation_id: conversation,
            is_typing: true,
        })
        .await
        .expect("queue typing");

    let bob_sees = tokio::time::timeout(helpers::WAIT, async {
        loop {
            if let ServerEvent::Typing(update) = bob_events.recv().await.expect("events") {
                return update;
            }
        }
    })
    .await
    .expect("typing indicator");
    assert_eq!(bob_sees.user_id, alice);
    assert!(bob_sees.is_typing);

    let alice_sees_own = tokio::time::timeout(std::time::Duration::from_millis(300), async {
        loop {
            if let ServerEvent::Typing(_) = alice_events.recv().await.expect("events") {
                return;
            }
        }
    })
    .await;
    assert!(
        alice_sees_own.is_err(),
        "publisher received its own typing indicator"
    );

    assert_eq!(server.engine.connections.connection_count(), 2);
}
