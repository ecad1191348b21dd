#![cfg(feature = "tungstenite")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use classroom_ws::error::Kind;
use classroom_ws::ws::{
    Config, ConnectionManager, Hooks, Message, ReconnectConfig, ReconnectDelay,
};
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast text frames to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Close every open connection with the given code
    kick_tx: broadcast::Sender<u16>,
    /// Text frames received from clients
    received_rx: mpsc::UnboundedReceiver<String>,
    /// `Sec-WebSocket-Protocol` offered by each accepted connection
    accepted_rx: mpsc::UnboundedReceiver<Option<String>>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (kick_tx, _) = broadcast::channel::<u16>(4);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel::<Option<String>>();

        let broadcast_tx = message_tx.clone();
        let kick = kick_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let accepted = accepted_tx.clone();
                let callback = move |request: &Request, mut response: Response| {
                    let offered = request
                        .headers()
                        .get(SEC_WEBSOCKET_PROTOCOL)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_owned);
                    // Select the first offered protocol, as a real server would
                    if let Some(first) = offered.as_deref().and_then(|o| o.split(',').next()) {
                        response.headers_mut().insert(
                            SEC_WEBSOCKET_PROTOCOL,
                            HeaderValue::from_str(first.trim()).unwrap(),
                        );
                    }
                    drop(accepted.send(offered));
                    Ok::<_, ErrorResponse>(response)
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let received = received_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();
                let mut kick_rx = kick.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(WsMessage::Text(text))) => {
                                        drop(received.send(text.to_string()));
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(WsMessage::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            code = kick_rx.recv() => {
                                if let Ok(code) = code {
                                    let frame = CloseFrame {
                                        code: CloseCode::from(code),
                                        reason: "kicked".into(),
                                    };
                                    drop(write.send(WsMessage::Close(Some(frame))).await);
                                }
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            kick_tx,
            received_rx,
            accepted_rx,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a text frame to all connected clients.
    fn send(&self, frame: &str) {
        drop(self.message_tx.send(frame.to_owned()));
    }

    /// Close every connection with `code`.
    fn kick(&self, code: u16) {
        drop(self.kick_tx.send(code));
    }

    /// Receive the next envelope sent by a client.
    async fn recv(&mut self) -> Option<Message> {
        let text = timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()?;
        Some(Message::from_frame(&text).unwrap())
    }

    /// Receive the next envelope of type `msg_type`, skipping others (heartbeats).
    async fn recv_of(&mut self, msg_type: &str) -> Option<Message> {
        loop {
            let message = self.recv().await?;
            if message.msg_type == msg_type {
                return Some(message);
            }
        }
    }

    /// Wait for the next accepted connection and return the protocols it offered.
    async fn accepted(&mut self) -> Option<Option<String>> {
        timeout(Duration::from_secs(2), self.accepted_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Round-trip a marker so the server side of the connection is fully set up.
async fn sync(connection: &ConnectionManager, server: &mut MockWsServer) {
    connection.send("sync", &json!({})).unwrap();
    server.recv_of("sync").await.unwrap();
}

fn fast_retry() -> Config {
    Config::builder()
        .reconnect(
            ReconnectConfig::builder()
                .max_attempts(5)
                .delay(ReconnectDelay::Fixed(Duration::from_millis(50)))
                .build(),
        )
        .build()
}

#[tokio::test]
async fn sends_envelopes_as_text_frames() {
    let mut server = MockWsServer::start().await;
    let connection =
        ConnectionManager::websocket(&server.ws_url("/ws"), Config::default(), Hooks::default())
            .unwrap();

    connection.connect().await.unwrap();
    connection.send("join_room", &json!({ "roomId": "r1" })).unwrap();

    let message = server.recv_of("join_room").await.unwrap();
    assert_eq!(message.data, json!({ "roomId": "r1" }));
    assert!(message.id.is_some());
}

#[tokio::test]
async fn dispatches_server_messages_to_subscribers() {
    let mut server = MockWsServer::start().await;
    let connection =
        ConnectionManager::websocket(&server.ws_url("/ws"), Config::default(), Hooks::default())
            .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let _subscription = connection.on("user_joined", move |data| {
        drop(tx.send(data.clone()));
    });

    connection.connect().await.unwrap();
    sync(&connection, &mut server).await;
    server.send(r#"{"type":"user_joined","data":{"roomId":"r1","userId":"u9"},"timestamp":1}"#);

    let data = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(data, json!({ "roomId": "r1", "userId": "u9" }));
}

#[tokio::test]
async fn offers_configured_sub_protocols() {
    let mut server = MockWsServer::start().await;
    let config = Config::builder()
        .protocols(vec!["classroom.v1".to_owned()])
        .build();
    let connection =
        ConnectionManager::websocket(&server.ws_url("/ws"), config, Hooks::default()).unwrap();

    connection.connect().await.unwrap();

    assert_eq!(
        server.accepted().await.unwrap().as_deref(),
        Some("classroom.v1")
    );
}

#[tokio::test]
async fn reconnects_after_server_close_and_flushes_queue() {
    let mut server = MockWsServer::start().await;
    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    let hooks = Hooks::default().on_close(move |event| sink.lock().unwrap().push(event.code));
    let connection = ConnectionManager::websocket(&server.ws_url("/ws"), fast_retry(), hooks).unwrap();

    connection.connect().await.unwrap();
    server.accepted().await.unwrap();
    sync(&connection, &mut server).await;

    server.kick(4001);
    server.accepted().await.expect("client should reconnect");
    connection.send("chat_message", &json!({ "roomId": "r1", "message": "back" })).unwrap();

    let message = server.recv_of("chat_message").await.unwrap();
    assert_eq!(message.data["message"], "back");
    assert_eq!(codes.lock().unwrap().first().copied().flatten(), Some(4001));
}

#[tokio::test]
async fn unreachable_server_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = Config::builder()
        .reconnect(ReconnectConfig::builder().max_attempts(0).build())
        .build();
    let connection =
        ConnectionManager::websocket(&format!("ws://{addr}/ws"), config, Hooks::default()).unwrap();

    let error = connection.connect().await.unwrap_err();

    assert_eq!(error.kind(), Kind::WebSocket);
    assert!(!connection.is_ready());
}
