use serde_json::json;
use std::time::Duration;

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
async fn health_endpoint_reports_ok() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn metrics_endpoint_exposes_registry() {
    let app = TestApp::spawn().await;
    let body = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("voxroom_ws_connections"));
}

#[tokio::test]
async fn ping_answers_pong_and_refreshes_heartbeat() {
    let app = TestApp::spawn().await;
    let mut ann = WsClient::connect(&app.ws_url(&app.token_for(1, "ann"))).await;

    ann.emit("ping", json!({})).await;
    ann.expect_event("pong").await;

    let mut conn = app.redis().await;
    let ttl: i64 = redis::cmd("TTL")
        .arg("user:1:sockets")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(ttl > 0, "socket set should carry a TTL, got {ttl}");
}

#[tokio::test]
async fn connection_is_limited_to_one_transport_per_kind() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;

    let ack = ann
        .request(
            "transport:create",
            json!({ "roomId": room, "kind": "producer" }),
        )
        .await;
    assert_eq!(ack["ok"], true);
    let data = &ack["data"];
    assert!(data["id"].is_string());
    assert!(data["iceParameters"].is_object());
    assert!(data["iceCandidates"].is_array());
    assert!(data["dtlsParameters"].is_object());

    // Second producer-side transport breaches the quota.
    let ack = ann
        .request(
            "transport:create",
            json!({ "roomId": room, "kind": "producer" }),
        )
        .await;
    assert_eq!(ack["err"], "TRANSPORT_LIMIT");

    // The consumer-side slot is separate.
    let ack = ann
        .request(
            "transport:create",
            json!({ "roomId": room, "kind": "consumer" }),
        )
        .await;
    assert_eq!(ack["ok"], true);

    let ack = ann
        .request(
            "transport:create",
            json!({ "roomId": room, "kind": "consumer" }),
        )
        .await;
    assert_eq!(ack["err"], "TRANSPORT_LIMIT");
}

#[tokio::test]
async fn malformed_media_payloads_are_rejected() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;

    let ack = ann
        .request(
            "transport:connect",
            json!({ "roomId": room, "transportId": "t", "dtlsParameters": "garbage" }),
        )
        .await;
    assert_eq!(ack["err"], "INVALID_PAYLOAD");

    let ack = ann
        .request(
            "audio:produce",
            json!({
                "roomId": room,
                "transportId": "t",
                "kind": "video",
                "rtpParameters": {},
            }),
        )
        .await;
    assert_eq!(ack["err"], "INVALID_PAYLOAD");

    let ack = ann
        .request(
            "consumer:resume",
            json!({ "roomId": room, "consumerId": "not-a-consumer" }),
        )
        .await;
    assert_eq!(ack["err"], "CONSUMER_NOT_FOUND");
}

#[tokio::test]
async fn unknown_events_are_acknowledged_as_invalid() {
    let app = TestApp::spawn().await;
    let mut ann = WsClient::connect(&app.ws_url(&app.token_for(1, "ann"))).await;

    let ack = ann.request("bogus:event", json!({})).await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["err"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn idle_empty_room_is_auto_closed() {
    let app = TestApp::spawn_with_settings(|s| {
        s.rooms.inactivity_ttl_secs = 1;
        s.rooms.autoclose_poll_secs = 1;
    })
    .await;
    let room = app.unique_room();

    let mut ann = join(&app, 1, "ann", &room).await;
    ann.emit("room:leave", json!({ "roomId": room })).await;

    // Activity TTL (1 s) expires, then the next poll closes the room and
    // deletes its shared state.
    let mut conn = app.redis().await;
    let key = format!("room:state:{room}");
    let mut deleted = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let exists: i64 = redis::cmd("EXISTS")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap();
        if exists == 0 {
            deleted = true;
            break;
        }
    }
    assert!(deleted, "room state should be reaped by the auto-close loop");

    let seats_exists: i64 = redis::cmd("EXISTS")
        .arg(format!("room:{room}:seats"))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(seats_exists, 0);
}
