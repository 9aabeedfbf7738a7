/// Adapter tests
/// Reader loop, request correlation, and action sends over the in-memory transport

extern crate onebridge_core;

use onebridge_core::onebot::{memory_pair, MemoryPeer, OneBotClient, ReaderState};
use onebridge_core::types::{ChatType, Message};
use onebridge_core::BridgeError;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn start(request_timeout: Duration) -> (OneBotClient, mpsc::UnboundedReceiver<Message>, MemoryPeer) {
    let (sink, source, peer) = memory_pair();
    let (client, events) = OneBotClient::attach(sink, source, request_timeout);
    (client, events, peer)
}

fn group_event(group_id: i64, user_id: i64, text: &str) -> Value {
    json!({
        "post_type": "message",
        "message_type": "group",
        "group_id": group_id,
        "user_id": user_id,
        "raw_message": text,
        "sender": { "nickname": "Alice" }
    })
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Message>) -> Option<Message> {
    timeout(WAIT, events.recv()).await.expect("event stream stalled")
}

#[tokio::test]
async fn test_malformed_frame_does_not_stop_reader() {
    let (client, mut events, peer) = start(Duration::from_secs(1));

    peer.push_raw(b"{not json at all".to_vec());
    peer.push_raw(b"[1,2,3]".to_vec());
    peer.push_json(&group_event(456, 123, "still alive"));

    let msg = next_event(&mut events).await.unwrap();
    assert_eq!(msg.content, "still alive");
    assert_eq!(client.reader_state(), ReaderState::Running);
}

#[tokio::test]
async fn test_group_event_normalized() {
    let (_client, mut events, peer) = start(Duration::from_secs(1));

    peer.push_json(&group_event(456, 123, "hi"));

    let msg = next_event(&mut events).await.unwrap();
    assert_eq!(msg.chat_id, "456");
    assert_eq!(msg.chat_type, ChatType::Group);
    assert_eq!(msg.sender_id, "123");
    assert_eq!(msg.sender_name, "Alice");
    assert_eq!(msg.content, "hi");
}

#[tokio::test]
async fn test_private_event_keyed_by_sender() {
    let (_client, mut events, peer) = start(Duration::from_secs(1));

    peer.push_json(&json!({
        "post_type": "message",
        "message_type": "private",
        "user_id": 10001,
        "raw_message": "yo",
        "sender": { "nickname": "Bob" }
    }));

    let msg = next_event(&mut events).await.unwrap();
    assert_eq!(msg.chat_id, "10001");
    assert_eq!(msg.chat_type, ChatType::Private);
    assert_eq!(msg.sender_name, "Bob");
}

#[tokio::test]
async fn test_non_message_events_are_ignored() {
    let (_client, mut events, peer) = start(Duration::from_secs(1));

    peer.push_json(&json!({ "post_type": "meta_event", "meta_event_type": "heartbeat" }));
    peer.push_json(&json!({ "post_type": "notice", "notice_type": "group_increase" }));
    peer.push_json(&json!({ "status": "ok", "retcode": 0 }));
    // message event without a group id cannot be routed
    peer.push_json(&json!({
        "post_type": "message",
        "message_type": "group",
        "user_id": 1,
        "raw_message": "lost"
    }));
    peer.push_json(&group_event(456, 123, "kept"));

    let msg = next_event(&mut events).await.unwrap();
    assert_eq!(msg.content, "kept");
}

#[tokio::test]
async fn test_events_keep_wire_order_and_strictly_increasing_time() {
    let (_client, mut events, peer) = start(Duration::from_secs(1));

    for i in 0..20 {
        peer.push_json(&group_event(456, 123, &format!("m{}", i)));
    }

    let mut last = None;
    for i in 0..20 {
        let msg = next_event(&mut events).await.unwrap();
        assert_eq!(msg.content, format!("m{}", i));
        if let Some(prev) = last {
            assert!(msg.timestamp > prev);
        }
        last = Some(msg.timestamp);
    }
}

#[tokio::test]
async fn test_responses_interleaved_with_events() {
    let (client, mut events, mut peer) = start(Duration::from_secs(2));

    let requester = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request("get_status", Value::Null, Duration::from_secs(2))
                .await
        })
    };

    let frame = timeout(WAIT, peer.next_written()).await.unwrap().unwrap();
    assert_eq!(frame["action"], "get_status");
    assert_eq!(frame["params"], json!({}));
    let token = frame["echo"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    peer.push_json(&group_event(456, 1, "before"));
    peer.push_json(&json!({ "status": "ok", "retcode": 0, "data": { "online": true }, "echo": token }));
    peer.push_json(&group_event(456, 1, "after"));

    let resp = requester.await.unwrap().unwrap();
    assert_eq!(resp["data"]["online"], true);
    assert_eq!(next_event(&mut events).await.unwrap().content, "before");
    assert_eq!(next_event(&mut events).await.unwrap().content, "after");
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_undrained_events_do_not_hold_back_responses() {
    let (client, mut events, mut peer) = start(Duration::from_secs(2));

    // nobody reads the event stream while these arrive
    for i in 0..500 {
        peer.push_json(&group_event(456, 1, &format!("backlog {}", i)));
    }

    let requester = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request("get_status", Value::Null, Duration::from_secs(2))
                .await
        })
    };
    let frame = timeout(WAIT, peer.next_written()).await.unwrap().unwrap();
    peer.push_json(&json!({ "status": "ok", "data": { "good": true }, "echo": frame["echo"] }));

    let resp = requester.await.unwrap().unwrap();
    assert_eq!(resp["data"]["good"], true);

    // the backlog is still intact and in order
    assert_eq!(next_event(&mut events).await.unwrap().content, "backlog 0");
    assert_eq!(next_event(&mut events).await.unwrap().content, "backlog 1");
}

#[tokio::test]
async fn test_late_response_after_timeout_is_dropped() {
    let (client, mut events, mut peer) = start(Duration::from_secs(1));

    let err = client
        .send_request("get_friend_list", Value::Null, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::RequestTimeout { ref action } if action == "get_friend_list"));
    assert_eq!(client.in_flight(), 0);

    let frame = peer.next_written().await.unwrap();
    let token = frame["echo"].as_str().unwrap().to_string();

    // late answer, then an event to prove the reader processed it
    peer.push_json(&json!({ "status": "ok", "data": [], "echo": token }));
    peer.push_json(&group_event(456, 1, "after late response"));

    let msg = next_event(&mut events).await.unwrap();
    assert_eq!(msg.content, "after late response");
    assert_eq!(client.reader_state(), ReaderState::Running);
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_send_group_message_writes_one_frame() {
    let (client, _events, mut peer) = start(Duration::from_secs(1));

    client.send_message("789", "group", "hello").await.unwrap();

    let frame = timeout(WAIT, peer.next_written()).await.unwrap().unwrap();
    assert_eq!(frame["action"], "send_group_msg");
    assert_eq!(frame["params"], json!({ "group_id": 789, "message": "hello" }));
    assert_eq!(frame["echo"], "");
    assert!(peer.try_next_written().is_none());
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_send_private_message() {
    let (client, _events, mut peer) = start(Duration::from_secs(1));

    client.send_message("10001", "private", "psst").await.unwrap();

    let frame = peer.next_written().await.unwrap();
    assert_eq!(frame["action"], "send_private_msg");
    assert_eq!(frame["params"], json!({ "user_id": 10001, "message": "psst" }));
}

#[tokio::test]
async fn test_list_chats_answered_out_of_order() {
    let (client, _events, mut peer) = start(Duration::from_secs(2));

    let lister = {
        let client = client.clone();
        tokio::spawn(async move { client.list_chats().await })
    };

    let first = timeout(WAIT, peer.next_written()).await.unwrap().unwrap();
    let second = timeout(WAIT, peer.next_written()).await.unwrap().unwrap();
    assert_ne!(first["echo"], second["echo"]);

    // answer in reverse order of writing
    for frame in [&second, &first] {
        let response = match frame["action"].as_str().unwrap() {
            "get_friend_list" => json!({
                "status": "ok",
                "data": [{ "user_id": 10001, "nickname": "Bob" }],
                "echo": frame["echo"]
            }),
            "get_group_list" => json!({
                "status": "ok",
                "data": [
                    { "group_id": 456, "group_name": "Rustaceans" },
                    { "group_id": 789, "group_name": "Dev" }
                ],
                "echo": frame["echo"]
            }),
            other => panic!("unexpected action {}", other),
        };
        peer.push_json(&response);
    }

    let (friends, groups) = lister.await.unwrap().unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].name, "Bob");
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.chat_type == ChatType::Group));
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_never_cross_deliver() {
    let (client, _events, mut peer) = start(Duration::from_secs(2));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let resp = client
                .send_request("get_status", json!({ "n": i }), Duration::from_secs(2))
                .await
                .unwrap();
            (i, resp)
        }));
    }

    let mut written = Vec::new();
    for _ in 0..8 {
        written.push(timeout(WAIT, peer.next_written()).await.unwrap().unwrap());
    }
    for frame in written.iter().rev() {
        peer.push_json(&json!({
            "status": "ok",
            "data": { "n": frame["params"]["n"] },
            "echo": frame["echo"]
        }));
    }

    for task in tasks {
        let (i, resp) = task.await.unwrap();
        assert_eq!(resp["data"]["n"], i);
    }
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_read_error_stops_reader_and_ends_stream() {
    let (client, mut events, peer) = start(Duration::from_secs(1));

    peer.push_json(&group_event(456, 1, "last"));
    peer.push_error("connection reset");

    assert_eq!(next_event(&mut events).await.unwrap().content, "last");
    assert!(next_event(&mut events).await.is_none());
    timeout(WAIT, client.wait_stopped()).await.unwrap();
    assert_eq!(client.reader_state(), ReaderState::Stopped);
}

#[tokio::test]
async fn test_peer_close_stops_reader() {
    let (client, mut events, peer) = start(Duration::from_secs(1));

    drop(peer);

    assert!(next_event(&mut events).await.is_none());
    timeout(WAIT, client.wait_stopped()).await.unwrap();
    assert!(client.send_message("789", "group", "x").await.is_err());
}

#[tokio::test]
async fn test_pending_request_times_out_after_connection_loss() {
    let (client, _events, peer) = start(Duration::from_secs(1));

    let requester = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request("get_status", Value::Null, Duration::from_millis(100))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    peer.push_error("gone");

    let err = requester.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::RequestTimeout { .. }));
    assert_eq!(client.in_flight(), 0);
}
