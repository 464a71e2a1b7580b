use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Test-side WebSocket client speaking the `{event, data, ack}` protocol.
/// Out-of-band events arriving while waiting for an ack are buffered.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<Value>,
    next_ack: u64,
    pub conn_id: String,
    pub user_id: i64,
}

impl WsClient {
    /// Connects and consumes the `connected` hello frame.
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url).await.expect("WS connect failed");
        let mut client = Self {
            stream,
            pending: VecDeque::new(),
            next_ack: 0,
            conn_id: String::new(),
            user_id: 0,
        };
        let hello = client.expect_event("connected").await;
        client.conn_id = hello["connId"].as_str().unwrap_or_default().to_string();
        client.user_id = hello["userId"].as_i64().unwrap_or_default();
        client
    }

    /// Sends an event without requesting an acknowledgement.
    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data });
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("WS send failed");
    }

    /// Sends an event and waits for its acknowledgement frame.
    pub async fn request(&mut self, event: &str, data: Value) -> Value {
        self.next_ack += 1;
        let ack_id = self.next_ack;
        let frame = json!({ "event": event, "data": data, "ack": ack_id });
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("WS send failed");

        loop {
            let frame = self.next_frame(event).await;
            if frame.get("ack").and_then(Value::as_u64) == Some(ack_id) {
                return frame;
            }
            if frame.get("event").is_some() {
                self.pending.push_back(frame);
            }
        }
    }

    /// Waits for a server push event and returns its `data`.
    pub async fn expect_event(&mut self, name: &str) -> Value {
        if let Some(pos) = self.pending.iter().position(|f| f["event"] == name) {
            let frame = self.pending.remove(pos).unwrap();
            return frame.get("data").cloned().unwrap_or(Value::Null);
        }
        loop {
            let frame = self.next_frame(name).await;
            if frame["event"] == name {
                return frame.get("data").cloned().unwrap_or(Value::Null);
            }
            if frame.get("event").is_some() {
                self.pending.push_back(frame);
            }
        }
    }

    /// Asserts that no event of the given name arrives within `within`.
    pub async fn expect_silence(&mut self, name: &str, within: Duration) {
        assert!(
            !self.pending.iter().any(|f| f["event"] == name),
            "unexpected buffered {name}"
        );
        let deadline = tokio::time::sleep(within);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return,
                msg = self.stream.next() => {
                    let Some(Ok(Message::Text(text))) = msg else { return };
                    let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    assert_ne!(frame["event"], name, "unexpected event {name}");
                    if frame.get("event").is_some() {
                        self.pending.push_back(frame);
                    }
                }
            }
        }
    }

    async fn next_frame(&mut self, waiting_for: &str) -> Value {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {waiting_for}"))
                .unwrap_or_else(|| panic!("connection closed waiting for {waiting_for}"))
                .expect("WS read failed");
            match msg {
                Message::Text(text) => {
                    return serde_json::from_str(&text).expect("non-JSON frame");
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => panic!("connection closed waiting for {waiting_for}"),
                _ => continue,
            }
        }
    }
}
