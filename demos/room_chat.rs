//! Joins a classroom chat room and prints what happens in it.
//!
//! Run against a classroom server with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example room_chat --features tracing -- ws://localhost:8080/ws algebra ada
//! ```

use std::time::Duration;

use classroom_ws::classroom::types::ChatMessage;
use classroom_ws::classroom::{Client, Event, MessageType};
use classroom_ws::ws::{Config, Hooks, ReconnectConfig, ReconnectDelay};
use tokio::time::sleep;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> classroom_ws::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "ws://localhost:8080/ws".to_owned());
    let room_id = args.next().unwrap_or_else(|| "lobby".to_owned());
    let user_id = args.next().unwrap_or_else(|| "guest".to_owned());

    let config = Config::builder()
        .heartbeat_interval(Duration::from_secs(15))
        .reconnect(
            ReconnectConfig::builder()
                .max_attempts(10)
                .delay(ReconnectDelay::Exponential {
                    initial: Duration::from_millis(500),
                    max: Duration::from_secs(10),
                    multiplier: 2.0,
                })
                .build(),
        )
        .build();
    let hooks = Hooks::default()
        .on_open(|| info!("connected"))
        .on_close(|event| info!(code = ?event.code, reason = %event.reason, "closed"))
        .on_reconnect_failed(|attempts| warn!(attempts, "giving up on the server"));

    let client = Client::websocket(&endpoint, config, hooks)?;

    let _joined = client.on_event(MessageType::UserJoined, |event| {
        if let Event::UserJoined(presence) = event {
            info!(room = %presence.room_id, user = %presence.user_id, "joined");
        }
    });
    let _chat = client.on(MessageType::ChatMessage, |message: ChatMessage| {
        info!(
            room = %message.room_id,
            user = ?message.user_id,
            text = %message.message,
            "chat"
        );
    });

    client.connect().await?;
    let room = client.room_chat(&room_id, &user_id)?;
    room.send("hello from room_chat")?;

    sleep(Duration::from_secs(30)).await;

    info!(
        online = ?room.online_users(),
        messages = room.messages().len(),
        "leaving"
    );
    room.leave()?;
    client.disconnect();

    Ok(())
}
