//! Transport-agnostic real-time connection management.
//!
//! This module owns one logical connection to a message server and everything that keeps it
//! usable: reconnection, heartbeats, offline queueing and per-type dispatch.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Connection lifecycle, send queue, heartbeat and reconnection
//! - [`Transport`]: Trait for the message-oriented transport being driven
//! - [`Message`]: The `{ type, data, timestamp, id? }` envelope carried in every frame
//! - [`Hooks`]: Lifecycle callbacks (`on_open`, `on_close`, `on_error`, ...)
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let connection = ConnectionManager::new("memory://classroom", Config::default(), Hooks::default(), transport.clone())?;
//!
//! let subscription = connection.on("user_joined", |data| println!("{data}"));
//! connection.connect().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod message;
pub(crate) mod queue;
pub mod registry;
pub mod traits;
#[cfg(feature = "tungstenite")]
pub mod tungstenite;

pub use config::{Config, ReconnectConfig, ReconnectDelay};
pub use connection::{ConnectionManager, ConnectionState, HEARTBEAT_TYPE};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use hooks::{CloseEvent, Hooks};
pub use memory::MemoryTransport;
pub use message::{Message, Timestamp};
pub use registry::{Handler, Subscription, handler};
pub use traits::*;
#[cfg(feature = "tungstenite")]
pub use tungstenite::TungsteniteTransport;
