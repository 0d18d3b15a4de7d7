//! Session flow tests
//!
//! A [`ChatClient`] wired to the in-process server, exercising the full path
//! from raw server frames to turns, conversation bindings and title reveals.
//!
//! # Running
//!
//! ```bash
//! cargo test -p realtime-core --test session_tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use realtime_core::transport::{in_process_pair, InProcessServer, ServerLink};
use realtime_core::{
    ChatClient, ClientConfig, ClientUpdate, ConnectionState, ConversationId, ConversationSummary,
    Identity, Role, TurnId,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

async fn connected_client(reveal_interval: Duration) -> (ChatClient, InProcessServer, ServerLink) {
    let (connector, mut server) = in_process_pair();
    let mut config = ClientConfig::default();
    config.title_reveal_interval = reveal_interval;

    let mut client = ChatClient::with_connector(config, Arc::new(connector));
    client.open(Identity::new("alice"));
    let link = server.accept().await.expect("client never connected");

    let mut state = client.connection().watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Open)
        .await
        .expect("driver stopped");

    (client, server, link)
}

async fn next(client: &mut ChatClient) -> ClientUpdate {
    tokio::time::timeout(Duration::from_secs(10), client.next_update())
        .await
        .expect("no update arrived")
        .expect("client channels closed")
}

fn token(link: &ServerLink, id: &str, content: &str) {
    let frame = serde_json::json!({ "type": "token", "message_id": id, "content": content });
    assert!(link.push_frame(frame.to_string()));
}

fn done(link: &ServerLink, id: &str) {
    let frame = serde_json::json!({ "type": "done", "message_id": id });
    assert!(link.push_frame(frame.to_string()));
}

fn meta(link: &ServerLink, id: &str, title: Option<&str>) {
    let frame = serde_json::json!({ "type": "meta", "conversation_id": id, "title": title });
    assert!(link.push_frame(frame.to_string()));
}

fn content_of(client: &ChatClient, id: &str) -> String {
    client
        .turns()
        .iter()
        .find(|t| t.id == TurnId::from(id))
        .map(|t| t.content.clone())
        .unwrap_or_default()
}

// =============================================================================
// Turn assembly
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_streamed_tokens_assemble_one_turn() {
    let (mut client, _server, link) = connected_client(Duration::ZERO).await;

    token(&link, "m1", "Hel");
    token(&link, "m1", "lo");
    done(&link, "m1");

    assert_eq!(
        next(&mut client).await,
        ClientUpdate::TurnStarted {
            turn_id: TurnId::from("m1")
        }
    );
    assert_eq!(
        next(&mut client).await,
        ClientUpdate::TurnAppended {
            turn_id: TurnId::from("m1")
        }
    );
    assert_eq!(
        next(&mut client).await,
        ClientUpdate::TurnCompleted {
            turn_id: TurnId::from("m1")
        }
    );

    assert_eq!(content_of(&client, "m1"), "Hello");
    assert!(!client.is_streaming());
    assert_eq!(client.turns()[0].role, Role::Assistant);
}

#[tokio::test(start_paused = true)]
async fn test_interleaved_turns_stay_separate() {
    let (mut client, _server, link) = connected_client(Duration::ZERO).await;

    token(&link, "a", "1");
    token(&link, "b", "2");
    token(&link, "a", "3");
    for _ in 0..3 {
        next(&mut client).await;
    }

    assert_eq!(content_of(&client, "a"), "13");
    assert_eq!(content_of(&client, "b"), "2");
    assert!(client.is_streaming());

    done(&link, "a");
    done(&link, "b");
    next(&mut client).await;
    next(&mut client).await;
    assert!(!client.is_streaming());
}

#[tokio::test(start_paused = true)]
async fn test_done_for_unknown_turn_is_ignored() {
    let (mut client, _server, link) = connected_client(Duration::ZERO).await;

    done(&link, "ghost");
    assert_eq!(next(&mut client).await, ClientUpdate::Ignored);
    assert!(client.turns().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_surfaces_as_raw_text() {
    let (mut client, _server, link) = connected_client(Duration::ZERO).await;

    assert!(link.push_frame("Internal Server Error"));
    assert_eq!(
        next(&mut client).await,
        ClientUpdate::RawText {
            content: "Internal Server Error".to_string()
        }
    );
    assert!(client.turns().is_empty());
    assert!(client.drain_updates().is_empty());
}

// =============================================================================
// Submit and conversation binding
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_request_carries_bound_conversation() {
    let (mut client, _server, mut link) = connected_client(Duration::ZERO).await;

    client.submit("first").unwrap();
    let raw = link.recv_frame().await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["user_input"], "first");
    assert!(json["conversation_id"].is_null());
    assert_eq!(json["response_mode"], "text_stream");

    meta(&link, "c1", None);
    next(&mut client).await;

    client.submit("second").unwrap();
    let request = link.recv_request().await.unwrap();
    assert_eq!(request.conversation_id, Some(ConversationId::from("c1")));

    let users: Vec<&str> = client
        .turns()
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(users, vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_new_conversation_is_prepended_and_revealed() {
    let (mut client, _server, link) = connected_client(Duration::from_millis(50)).await;
    client.hydrate_conversations(vec![ConversationSummary {
        id: ConversationId::from("old"),
        title: Some("Old".to_string()),
        created_at: None,
    }]);

    meta(&link, "c1", Some("Trip"));

    let mut titles = Vec::new();
    loop {
        match next(&mut client).await {
            ClientUpdate::ConversationCorrelated {
                conversation_id,
                added,
                bound,
            } => {
                assert_eq!(conversation_id, ConversationId::from("c1"));
                assert!(added);
                assert!(bound);
                assert_eq!(client.conversations()[0].id, ConversationId::from("c1"));
                assert_eq!(client.conversations()[0].title, "");
            }
            ClientUpdate::TitleChanged {
                conversation_id,
                title,
                finished,
            } if conversation_id == ConversationId::from("c1") => {
                titles.push(title);
                if finished {
                    break;
                }
            }
            _ => {}
        }
    }

    assert_eq!(titles, vec!["T", "Tr", "Tri", "Trip"]);
    assert_eq!(client.conversations()[0].title, "Trip");
    assert_eq!(client.active_conversation(), Some(&ConversationId::from("c1")));
}

#[tokio::test(start_paused = true)]
async fn test_known_conversation_with_same_title_is_not_revealed() {
    let (mut client, _server, link) = connected_client(Duration::ZERO).await;

    meta(&link, "c1", Some("Trip"));
    next(&mut client).await;
    assert!(matches!(
        next(&mut client).await,
        ClientUpdate::TitleChanged { finished: true, .. }
    ));

    meta(&link, "c1", Some("Trip"));
    assert_eq!(
        next(&mut client).await,
        ClientUpdate::ConversationCorrelated {
            conversation_id: ConversationId::from("c1"),
            added: false,
            bound: false,
        }
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.drain_updates().is_empty());
    assert_eq!(client.conversations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_untitled_conversation_reveals_placeholder() {
    let (mut client, _server, link) = connected_client(Duration::ZERO).await;

    meta(&link, "c9", None);
    next(&mut client).await;
    assert_eq!(
        next(&mut client).await,
        ClientUpdate::TitleChanged {
            conversation_id: ConversationId::from("c9"),
            title: realtime_core::UNTITLED.to_string(),
            finished: true,
        }
    );
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_keeps_session_view() {
    let (mut client, mut server, link) = connected_client(Duration::ZERO).await;

    token(&link, "m1", "partial");
    next(&mut client).await;
    link.disconnect();

    let link = server.accept().await.unwrap();
    assert_eq!(link.identity().token(), "alice");
    token(&link, "m1", " answer");
    done(&link, "m1");
    next(&mut client).await;
    next(&mut client).await;

    assert_eq!(content_of(&client, "m1"), "partial answer");
}

#[tokio::test(start_paused = true)]
async fn test_switching_identity_resets_view() {
    let (mut client, mut server, link) = connected_client(Duration::ZERO).await;

    client.submit("hello").unwrap();
    meta(&link, "c1", Some("Mine"));
    next(&mut client).await;

    client.open(Identity::new("bob"));
    let bob = server.accept().await.unwrap();
    assert_eq!(bob.identity().token(), "bob");

    assert!(client.turns().is_empty());
    assert!(client.conversations().is_empty());
    assert_eq!(client.active_conversation(), None);
    assert!(client.drain_updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reopen_with_same_identity_keeps_view() {
    let (mut client, mut server, link) = connected_client(Duration::ZERO).await;

    token(&link, "m1", "partial");
    meta(&link, "c1", None);
    next(&mut client).await;
    next(&mut client).await;
    assert!(matches!(
        next(&mut client).await,
        ClientUpdate::TitleChanged { finished: true, .. }
    ));

    client.open(Identity::new("alice"));
    assert_eq!(client.connection().stats().await.connections, 1);
    assert!(server.try_accept().is_none());

    assert_eq!(content_of(&client, "m1"), "partial");
    assert_eq!(client.active_conversation(), Some(&ConversationId::from("c1")));
    assert_eq!(client.conversations().len(), 1);

    token(&link, "m1", " answer");
    assert_eq!(
        next(&mut client).await,
        ClientUpdate::TurnAppended {
            turn_id: TurnId::from("m1")
        }
    );
    assert_eq!(content_of(&client, "m1"), "partial answer");
}

#[tokio::test(start_paused = true)]
async fn test_new_identity_after_close_starts_empty() {
    let (mut client, mut server, mut link) = connected_client(Duration::ZERO).await;

    client.submit("alice secret").unwrap();
    link.recv_request().await.unwrap();
    meta(&link, "alice-c1", Some("Private"));
    next(&mut client).await;
    assert_eq!(
        client.active_conversation(),
        Some(&ConversationId::from("alice-c1"))
    );

    client.close();
    client.open(Identity::new("bob"));
    let mut bob = server.accept().await.unwrap();
    assert_eq!(bob.identity().token(), "bob");

    client.submit("bob hello").unwrap();
    let request = bob.recv_request().await.unwrap();
    assert_eq!(request.conversation_id, None);

    let contents: Vec<&str> = client.turns().iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["bob hello"]);
    assert!(client.conversations().is_empty());
    assert!(!client.is_known(&ConversationId::from("alice-c1")));
}

#[tokio::test(start_paused = true)]
async fn test_same_identity_after_close_keeps_view() {
    let (mut client, mut server, link) = connected_client(Duration::ZERO).await;

    token(&link, "m1", "kept");
    next(&mut client).await;

    client.close();
    client.open(Identity::new("alice"));
    server.accept().await.unwrap();

    assert_eq!(content_of(&client, "m1"), "kept");
}

#[tokio::test(start_paused = true)]
async fn test_close_then_submit_is_rejected() {
    let (mut client, _server, _link) = connected_client(Duration::ZERO).await;

    client.close();
    assert!(client.submit("anyone there?").is_err());
}
