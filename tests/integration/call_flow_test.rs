//! End-to-end call signaling between two client runtimes.

use pulse_client::call::state::CallState;
use pulse_core::events::{CallEndReason, CallMode};
use pulse_core::types::{ConversationId, UserId};

use crate::helpers::{self, TestClient};

#[tokio::test]
async fn test_video_call_converges_on_both_sides() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let bob = UserId::new();
    server.directory.add_contact_pair(alice, bob);

    let alice_client = TestClient::connect(&server, alice).await;
    let bob_client = TestClient::connect(&server, bob).await;
    let mut bob_incoming = bob_client.manager.incoming_calls();

    let caller_machine = alice_client
        .manager
        .start_call(bob, ConversationId::new(), CallMode::Video)
        .await
        .expect("start call");

    // The callee's runtime acknowledges receipt before anyone accepts.
    helpers::wait_for_state(&caller_machine, CallState::Ringing).await;

    let callee_machine = tokio::time::timeout(helpers::WAIT, bob_incoming.recv())
        .await
        .expect("offer should arrive")
        .expect("incoming call");
    assert_eq!(callee_machine.call_id(), caller_machine.call_id());
    assert_eq!(callee_machine.current_state(), CallState::Ringing);

    callee_machine.accept().await.expect("accept");
    helpers::wait_for_state(&callee_machine, CallState::Connected).await;
    helpers::wait_for_state(&caller_machine, CallState::Connected).await;

    // Hanging up on one side resolves the other within the wait window.
    caller_machine.terminate(CallEndReason::Hangup).await;
    helpers::wait_for_state(&callee_machine, CallState::Ended).await;
    assert_eq!(
        callee_machine.end_reason().await,
        Some(CallEndReason::Hangup)
    );
}

#[tokio::test]
async fn test_unanswered_call_times_out_on_both_sides() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let bob = UserId::new();
    server.directory.add_contact_pair(alice, bob);

    let alice_client = TestClient::connect(&server, alice).await;
    let bob_client = TestClient::connect(&server, bob).await;
    let mut bob_incoming = bob_client.manager.incoming_calls();

    let caller_machine = alice_client
        .manager
        .start_call(bob, ConversationId::new(), CallMode::Audio)
        .await
        .expect("start call");

    let callee_machine = tokio::time::timeout(helpers::WAIT, bob_incoming.recv())
        .await
        .expect("offer should arrive")
        .expect("incoming call");

    // Nobody accepts; the two-second test ring window elapses.
    helpers::wait_for_state(&caller_machine, CallState::Ended).await;
    assert_eq!(
        caller_machine.end_reason().await,
        Some(CallEndReason::NoAnswer)
    );

    // The caller's termination event reaches the still-connected callee.
    helpers::wait_for_state(&callee_machine, CallState::Ended).await;
    assert_eq!(
        callee_machine.end_reason().await,
        Some(CallEndReason::NoAnswer)
    );
}

#[tokio::test]
async fn test_rejected_call_resolves_caller() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let bob = UserId::new();
    server.directory.add_contact_pair(alice, bob);

    let alice_client = TestClient::connect(&server, alice).await;
    let bob_client = TestClient::connect(&server, bob).await;
    let mut bob_incoming = bob_client.manager.incoming_calls();

    let caller_machine = alice_client
        .manager
        .start_call(bob, ConversationId::new(), CallMode::Audio)
        .await
        .expect("start call");

    let callee_machine = tokio::time::timeout(helpers::WAIT, bob_incoming.recv())
        .await
        .expect("offer should arrive")
        .expect("incoming call");

    callee_machine.reject().await;
    helpers::wait_for_state(&caller_machine, CallState::Ended).await;
    assert_eq!(
        caller_machine.end_reason().await,
        Some(CallEndReason::Rejected)
    );
}

#[tokio::test]
async fn test_callee_channel_loss_ends_connected_call() {
    let server = helpers::spawn_server().await;
    let alice = UserId::new();
    let bob = UserId::new();
    server.directory.add_contact_pair(alice, bob);

    let alice_client = TestClient::connect(&server, alice).await;
    let bob_client = TestClient::connect(&server, bob).await;
    let mut bob_incoming = bob_client.manager.incoming_calls();

    let caller_machine = alice_client
        .manager
        .start_call(bob, ConversationId::new(), CallMode::Video)
        .await
        .expect("start call");
    let callee_machine = tokio::time::timeout(helpers::WAIT, bob_incoming.recv())
        .await
        .expect("offer should arrive")
        .expect("incoming call");
    callee_machine.accept().await.expect("accept");
    helpers::wait_for_state(&caller_machine, CallState::Connected).await;

    // Bob's channel drops; his runtime treats every live session as
    // implicitly terminated with PeerUnreachable.
    bob_client.supervisor.close();
    bob_client.manager.on_channel_down().await;

    helpers::wait_for_state(&callee_machine, CallState::Ended).await;
    assert_eq!(
        callee_machine.end_reason().await,
        Some(CallEndReason::PeerUnreachable)
    );
}
