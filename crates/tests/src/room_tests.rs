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
async fn join_returns_full_snapshot() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let mut client = WsClient::connect(&app.ws_url(&app.token_for(1, "ann"))).await;
    let ack = client
        .request("room:join", json!({ "roomId": room, "seatCount": 8 }))
        .await;

    assert_eq!(ack["ok"], true);
    let data = &ack["data"];
    assert_eq!(data["roomId"], room);
    assert_eq!(data["seatCount"], 8);
    assert_eq!(data["ownerId"], 1);
    assert_eq!(data["participantCount"], 1);
    assert!(data["rtpCapabilities"].is_object());
    assert_eq!(data["participants"].as_array().unwrap().len(), 1);
    assert_eq!(data["participants"][0]["userId"], 1);
    assert!(data["seats"].as_array().unwrap().is_empty());
    assert!(data["lockedSeats"].as_array().unwrap().is_empty());
    assert!(data["activeProducers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn join_broadcasts_user_joined_with_identity() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let mut ann = join(&app, 1, "ann", &room).await;
    let _bob = join(&app, 2, "bob", &room).await;

    let event = ann.expect_event("room:userJoined").await;
    assert_eq!(event["userId"], 2);
    assert_eq!(event["user"]["displayName"], "bob");
}

#[tokio::test]
async fn second_joiner_sees_existing_participants() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let _ann = join(&app, 1, "ann", &room).await;
    let mut bob = WsClient::connect(&app.ws_url(&app.token_for(2, "bob"))).await;
    let ack = bob.request("room:join", json!({ "roomId": room })).await;

    let participants = ack["data"]["participants"].as_array().unwrap();
    let ids: Vec<i64> = participants
        .iter()
        .map(|p| p["userId"].as_i64().unwrap())
        .collect();
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    assert_eq!(ack["data"]["participantCount"], 2);
}

#[tokio::test]
async fn explicit_leave_broadcasts_user_left() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;
    ann.expect_event("room:userJoined").await;

    bob.emit("room:leave", json!({ "roomId": room })).await;

    let event = ann.expect_event("room:userLeft").await;
    assert_eq!(event["userId"], 2);
}

#[tokio::test]
async fn disconnect_behaves_like_leave() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let mut ann = join(&app, 1, "ann", &room).await;
    let bob = join(&app, 2, "bob", &room).await;
    ann.expect_event("room:userJoined").await;

    drop(bob);

    let event = ann.expect_event("room:userLeft").await;
    assert_eq!(event["userId"], 2);
}

#[tokio::test]
async fn get_room_resolves_via_shared_index() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let _ann = join(&app, 1, "ann", &room).await;
    let mut bob = WsClient::connect(&app.ws_url(&app.token_for(2, "bob"))).await;

    let ack = bob.request("user:getRoom", json!({ "userId": 1 })).await;
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["data"]["roomId"], room);

    let ack = bob.request("user:getRoom", json!({ "userId": 99 })).await;
    assert_eq!(ack["ok"], true);
    assert!(ack["data"]["roomId"].is_null());
}

#[tokio::test]
async fn room_scoped_ops_require_membership() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let _ann = join(&app, 1, "ann", &room).await;
    let mut out = WsClient::connect(&app.ws_url(&app.token_for(5, "out"))).await;

    let ack = out
        .request("chat:message", json!({ "roomId": room, "content": "hi" }))
        .await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["err"], "NOT_IN_ROOM");

    let ack = out
        .request("seat:take", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["err"], "NOT_IN_ROOM");
}
