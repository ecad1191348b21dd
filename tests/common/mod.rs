#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Each test crate only uses some of the shared helpers"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use classroom_ws::classroom::Client;
use classroom_ws::ws::{Config, ConnectionManager, Hooks, MemoryTransport};

pub const ENDPOINT: &str = "memory://classroom";

pub fn manager() -> (ConnectionManager, MemoryTransport) {
    manager_with(Config::default(), Hooks::default())
}

pub fn manager_with(config: Config, hooks: Hooks) -> (ConnectionManager, MemoryTransport) {
    let transport = MemoryTransport::new();
    let connection = ConnectionManager::new(ENDPOINT, config, hooks, transport.clone()).unwrap();
    (connection, transport)
}

pub fn client() -> (Client, MemoryTransport) {
    client_with(Config::default(), Hooks::default())
}

pub fn client_with(config: Config, hooks: Hooks) -> (Client, MemoryTransport) {
    let transport = MemoryTransport::new();
    let client = Client::new(ENDPOINT, config, hooks, transport.clone()).unwrap();
    (client, transport)
}

/// A shared call counter and a callback that bumps it.
pub fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let bump = Arc::clone(&calls);
    (calls, move || {
        bump.fetch_add(1, Ordering::SeqCst);
    })
}

/// Let spawned connection tasks run until they have nothing left to do.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
