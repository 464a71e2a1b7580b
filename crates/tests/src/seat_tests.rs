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
async fn take_seat_broadcasts_update() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    let ack = bob
        .request("seat:take", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["data"]["seatIndex"], 0);

    let event = ann.expect_event("seat:updated").await;
    assert_eq!(event["seatIndex"], 0);
    assert_eq!(event["userId"], 2);
    assert_eq!(event["muted"], false);
}

#[tokio::test]
async fn occupied_seat_rejects_take() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    let ack = bob
        .request("seat:take", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["ok"], true);

    let ack = ann
        .request("seat:take", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["err"], "SEAT_TAKEN");
}

#[tokio::test]
async fn concurrent_takes_grant_exactly_one_seat() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let _ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;
    let mut cleo = join(&app, 3, "cleo", &room).await;

    let (bob_ack, cleo_ack) = tokio::join!(
        bob.request("seat:take", json!({ "roomId": room, "seatIndex": 0 })),
        cleo.request("seat:take", json!({ "roomId": room, "seatIndex": 0 })),
    );

    let oks = [&bob_ack, &cleo_ack]
        .iter()
        .filter(|a| a["ok"] == true)
        .count();
    assert_eq!(oks, 1, "bob={bob_ack} cleo={cleo_ack}");
    let loser = if bob_ack["ok"] == true { &cleo_ack } else { &bob_ack };
    assert_eq!(loser["err"], "SEAT_TAKEN");
}

#[tokio::test]
async fn seat_index_outside_room_size_is_invalid() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();

    let mut ann = WsClient::connect(&app.ws_url(&app.token_for(1, "ann"))).await;
    let ack = ann
        .request("room:join", json!({ "roomId": room, "seatCount": 4 }))
        .await;
    assert_eq!(ack["ok"], true);

    let ack = ann
        .request("seat:take", json!({ "roomId": room, "seatIndex": 7 }))
        .await;
    assert_eq!(ack["err"], "SEAT_INVALID");
}

#[tokio::test]
async fn switching_seats_clears_the_previous_one() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    bob.request("seat:take", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    ann.expect_event("seat:updated").await;

    let ack = bob
        .request("seat:take", json!({ "roomId": room, "seatIndex": 3 }))
        .await;
    assert_eq!(ack["ok"], true);

    let cleared = ann.expect_event("seat:cleared").await;
    assert_eq!(cleared["seatIndex"], 0);
    let updated = ann.expect_event("seat:updated").await;
    assert_eq!(updated["seatIndex"], 3);
    assert_eq!(updated["userId"], 2);
}

#[tokio::test]
async fn leave_when_not_seated() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;

    let ack = ann.request("seat:leave", json!({ "roomId": room })).await;
    assert_eq!(ack["err"], "NOT_SEATED");
}

#[tokio::test]
async fn owner_gates_assign_and_remove() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    // Non-owner may not assign.
    let ack = bob
        .request(
            "seat:assign",
            json!({ "roomId": room, "seatIndex": 2, "userId": 1 }),
        )
        .await;
    assert_eq!(ack["err"], "NOT_AUTHORIZED");

    // Owner assigns bob.
    let ack = ann
        .request(
            "seat:assign",
            json!({ "roomId": room, "seatIndex": 2, "userId": 2 }),
        )
        .await;
    assert_eq!(ack["ok"], true);
    let event = bob.expect_event("seat:updated").await;
    assert_eq!(event["userId"], 2);

    // Removing someone unseated is its own error.
    let ack = ann
        .request("seat:remove", json!({ "roomId": room, "userId": 3 }))
        .await;
    assert_eq!(ack["err"], "USER_NOT_SEATED");

    let ack = ann
        .request("seat:remove", json!({ "roomId": room, "userId": 2 }))
        .await;
    assert_eq!(ack["ok"], true);
    let event = bob.expect_event("seat:cleared").await;
    assert_eq!(event["seatIndex"], 2);
}

#[tokio::test]
async fn lock_kicks_occupant_then_reports_locked() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    bob.request("seat:take", json!({ "roomId": room, "seatIndex": 1 }))
        .await;

    let ack = ann
        .request("seat:lock", json!({ "roomId": room, "seatIndex": 1 }))
        .await;
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["data"]["kickedUserId"], 2);

    // Broadcast order: cleared first, then locked.
    let cleared = bob.expect_event("seat:cleared").await;
    assert_eq!(cleared["seatIndex"], 1);
    let locked = bob.expect_event("seat:locked").await;
    assert_eq!(locked["locked"], true);

    // Locked seats may not be taken.
    let ack = bob
        .request("seat:take", json!({ "roomId": room, "seatIndex": 1 }))
        .await;
    assert_eq!(ack["err"], "SEAT_LOCKED");

    // Idempotence errors.
    let ack = ann
        .request("seat:lock", json!({ "roomId": room, "seatIndex": 1 }))
        .await;
    assert_eq!(ack["err"], "SEAT_ALREADY_LOCKED");

    let ack = ann
        .request("seat:unlock", json!({ "roomId": room, "seatIndex": 1 }))
        .await;
    assert_eq!(ack["ok"], true);

    let ack = ann
        .request("seat:unlock", json!({ "roomId": room, "seatIndex": 1 }))
        .await;
    assert_eq!(ack["err"], "SEAT_NOT_LOCKED");
}

#[tokio::test]
async fn privileged_mute_reaches_the_room() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;

    bob.request("seat:take", json!({ "roomId": room, "seatIndex": 0 }))
        .await;

    // A plain member may not mute.
    let ack = bob
        .request("seat:mute", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["err"], "NOT_AUTHORIZED");

    let ack = ann
        .request("seat:mute", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["ok"], true);

    let event = bob.expect_event("seat:userMuted").await;
    assert_eq!(event["userId"], 2);
    assert_eq!(event["muted"], true);
    assert_eq!(event["selfMuted"], false);

    let ack = ann
        .request("seat:unmute", json!({ "roomId": room, "seatIndex": 0 }))
        .await;
    assert_eq!(ack["ok"], true);
    let event = bob.expect_event("seat:userMuted").await;
    assert_eq!(event["muted"], false);
}

#[tokio::test]
async fn invite_with_locked_seat_auto_unlocks_on_accept() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;
    let mut cleo = join(&app, 3, "cleo", &room).await;

    ann.request("seat:lock", json!({ "roomId": room, "seatIndex": 3 }))
        .await;
    // Drain the lock broadcast so the later assertions see the unlock.
    let locked = bob.expect_event("seat:locked").await;
    assert_eq!(locked["locked"], true);
    cleo.expect_event("seat:locked").await;

    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 3, "userId": 3 }),
        )
        .await;
    assert_eq!(ack["ok"], true);

    let received = cleo.expect_event("seat:invite:received").await;
    assert_eq!(received["seatIndex"], 3);
    assert_eq!(received["invitedById"], 1);
    assert_eq!(received["targetUserId"], 3);
    assert!(received["expiresAt"].as_i64().unwrap() > chrono::Utc::now().timestamp_millis());

    let pending = bob.expect_event("seat:invite:pending").await;
    assert_eq!(pending["pending"], true);
    assert_eq!(pending["invitedUserId"], 3);

    let ack = cleo
        .request("seat:invite:accept", json!({ "roomId": room }))
        .await;
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["data"]["seatIndex"], 3);

    let pending = bob.expect_event("seat:invite:pending").await;
    assert_eq!(pending["pending"], false);
    let locked = bob.expect_event("seat:locked").await;
    assert_eq!(locked["locked"], false);
    let updated = bob.expect_event("seat:updated").await;
    assert_eq!(updated["seatIndex"], 3);
    assert_eq!(updated["userId"], 3);
}

#[tokio::test]
async fn invite_uniqueness_and_gates() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut bob = join(&app, 2, "bob", &room).await;
    let _cleo = join(&app, 3, "cleo", &room).await;

    // Non-privileged members cannot invite.
    let ack = bob
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 4, "userId": 3 }),
        )
        .await;
    assert_eq!(ack["err"], "NOT_AUTHORIZED");

    // Self-invite is rejected.
    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 4, "userId": 1 }),
        )
        .await;
    assert_eq!(ack["err"], "CANNOT_INVITE_SELF");

    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 4, "userId": 3 }),
        )
        .await;
    assert_eq!(ack["ok"], true);

    // One invite per seat, and one per target.
    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 4, "userId": 2 }),
        )
        .await;
    assert_eq!(ack["err"], "INVITE_PENDING");
    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 5, "userId": 3 }),
        )
        .await;
    assert_eq!(ack["err"], "INVITE_PENDING");

    // Occupied seats cannot be offered.
    bob.request("seat:take", json!({ "roomId": room, "seatIndex": 6 }))
        .await;
    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 6, "userId": 2 }),
        )
        .await;
    assert_eq!(ack["err"], "SEAT_OCCUPIED");
}

#[tokio::test]
async fn invites_expire_from_the_store_without_timers() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let repo = app.seat_repo().await;

    repo.create_invite(&room, 2, 42, 1, 1)
        .await
        .expect("invite should be created");
    let invite = repo.get_invite_by_user(&room, 42).await.unwrap();
    assert_eq!(invite.map(|i| i.seat_index), Some(2));

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    assert!(repo.get_invite_by_user(&room, 42).await.unwrap().is_none());
    // The seat is offerable again once the invite lapsed.
    repo.create_invite(&room, 2, 43, 1, 30)
        .await
        .expect("seat should accept a fresh invite");

    // Deleting by seat removes both the invite and its reverse index.
    assert!(repo.delete_invite(&room, 2).await.unwrap());
    assert!(repo.get_invite_by_user(&room, 43).await.unwrap().is_none());
    assert!(!repo.delete_invite(&room, 2).await.unwrap());
}

#[tokio::test]
async fn declined_invite_cannot_be_accepted() {
    let app = TestApp::spawn().await;
    let room = app.unique_room();
    let mut ann = join(&app, 1, "ann", &room).await;
    let mut cleo = join(&app, 3, "cleo", &room).await;

    let ack = ann
        .request(
            "seat:invite",
            json!({ "roomId": room, "seatIndex": 2, "userId": 3 }),
        )
        .await;
    assert_eq!(ack["ok"], true);
    cleo.expect_event("seat:invite:received").await;

    let ack = cleo
        .request("seat:invite:decline", json!({ "roomId": room }))
        .await;
    assert_eq!(ack["ok"], true);

    let pending = ann.expect_event("seat:invite:pending").await;
    assert_eq!(pending["pending"], false);

    let ack = cleo
        .request("seat:invite:accept", json!({ "roomId": room }))
        .await;
    assert_eq!(ack["err"], "NO_INVITE");
}
