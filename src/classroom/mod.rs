//! Classroom vocabulary on top of [`ConnectionManager`](crate::ws::ConnectionManager).
//!
//! - [`Client`]: one method per well-known message type, plus a live [`Status`]
//! - [`RoomChat`]: chat log and online users for a single room
//! - [`ClientSlot`]: owned home for the application's current client
//! - [`types`]: payload structs and the decoded [`Event`] union

mod client;
mod room;
pub mod types;

pub use client::{Client, ClientSlot, Status};
pub use room::{MESSAGE_HISTORY, RoomChat};
pub use types::{Event, MessageType};
