use serde_json::json;

use crate::fixtures::test_app::TestApp;
use crate::fixtures::ws_client::WsClient;

async fn join(app: &TestApp, user_id: i64, name: &str, room_id: &str) -> WsClient {
    let mut client = WsClient::connect(&app.ws_url(&app.token_for(user_id, name))).await;
    let ack = client
        .request("room:join", json!({ "roomId": room_id }))
        .await;
    assert_eq!(ack["ok"], true, "join failed: {ack}");
    client
}

#[tokio::test]
async fn chat_reaches_the_whole_room_including_sender() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    let ack = ann
        .request(
            "chat:message",
            json!({ "roomId": room, "content": "hello there" }),
        )
        .await;
    assert_eq!(ack["ok"], true);
    assert!(ack["data"]["id"].is_string());

    for client in [&mut ann, &mut bob] {
        let event = client.expect_event("chat:message").await;
        assert_eq!(event["userId"], 1);
        assert_eq!(event["userName"], "ann");
        assert_eq!(event["content"], "hello there");
        assert_eq!(event["type"], "text");
        assert!(event["ts"].as_i64().is_some());
    }
}

#[tokio::test]
async fn chat_supports_typed_messages() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;

    let ack = ann
        .request(
            "chat:message",
            json!({ "roomId": room, "content": "🎉", "type": "emoji" }),
        )
        .await;
    assert_eq!(ack["ok"], true);
    let event = ann.expect_event("chat:message").await;
    assert_eq!(event["type"], "emoji");
}

#[tokio::test]
async fn content_length_is_enforced() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;

    let ack = ann
        .request("chat:message", json!({ "roomId": room, "content": "" }))
        .await;
    assert_eq!(ack["err"], "INVALID_PAYLOAD");

    let ack = ann
        .request(
            "chat:message",
            json!({ "roomId": room, "content": "x".repeat(501) }),
        )
        .await;
    assert_eq!(ack["err"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn chat_rate_limit_trips_after_capacity() {
    let app = TestApp::spawn_with_settings(|s| {
        s.rate_limits.chat = voxroom_config::RateLimitRule {
            capacity: 3,
            window_secs: 30,
        };
    })
    .await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;

    for i in 0..3 {
        let ack = ann
            .request(
                "chat:message",
                json!({ "roomId": room, "content": format!("msg {i}") }),
            )
            .await;
        assert_eq!(ack["ok"], true, "message {i} unexpectedly limited");
    }

    let ack = ann
        .request("chat:message", json!({ "roomId": room, "content": "one too many" }))
        .await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["err"], "RATE_LIMITED");
}
