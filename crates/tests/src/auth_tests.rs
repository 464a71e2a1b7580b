use crate::fixtures::test_app::TestApp;
use crate::fixtures::ws_client::WsClient;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite};

/// Attempts a raw WS connect and returns the rejection status, if any.
async fn connect_status(request: tungstenite::handshake::client::Request) -> Option<u16> {
    match connect_async(request).await {
        Ok(_) => None,
        Err(tungstenite::Error::Http(response)) => Some(response.status().as_u16()),
        Err(e) => panic!("unexpected connect error: {e}"),
    }
}

#[tokio::test]
async fn missing_token_is_rejected() {
    let app = TestApp::spawn().await;
    let request = format!("ws://{}/ws", app.addr)
        .into_client_request()
        .unwrap();
    assert_eq!(connect_status(request).await, Some(401));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.expired_token_for(1, "ann");
    let request = app.ws_url(&token).into_client_request().unwrap();
    assert_eq!(connect_status(request).await, Some(401));
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = TestApp::spawn().await;
    let request = app.ws_url("not-a-jwt").into_client_request().unwrap();
    assert_eq!(connect_status(request).await, Some(401));
}

#[tokio::test]
async fn valid_token_connects() {
    let app = TestApp::spawn().await;
    let token = app.token_for(7, "ann");
    let client = WsClient::connect(&app.ws_url(&token)).await;
    assert_eq!(client.user_id, 7);
    assert!(!client.conn_id.is_empty());
}

#[tokio::test]
async fn revoked_token_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.token_for(9, "rev");

    let mut conn = app.redis().await;
    let hash = voxroom_store::revocation::credential_hash(&token);
    redis::cmd("SET")
        .arg(format!("auth:revoked:{hash}"))
        .arg(1)
        .arg("EX")
        .arg(60)
        .query_async::<()>(&mut conn)
        .await
        .unwrap();

    let request = app.ws_url(&token).into_client_request().unwrap();
    assert_eq!(connect_status(request).await, Some(401));
}

#[tokio::test]
async fn disallowed_origin_is_rejected() {
    let app = TestApp::spawn_with_settings(|s| {
        s.app.allowed_origins = vec!["https://app.example.com".to_string()];
    })
    .await;
    let token = app.token_for(1, "ann");

    let mut request = app.ws_url(&token).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example.com".parse().unwrap());
    assert_eq!(connect_status(request).await, Some(403));

    // A matching origin passes.
    let mut request = app.ws_url(&token).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://app.example.com".parse().unwrap());
    assert_eq!(connect_status(request).await, None);
}
