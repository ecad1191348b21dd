//! Core traits for pluggable message transports.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::Result;
use crate::error::Error;

/// A frame received from the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One text frame, carrying exactly one serialized message
    Text(String),
    /// The peer started a close handshake
    Close {
        /// Close code, if the peer sent one
        code: Option<u16>,
        /// Close reason, empty if none was given
        reason: String,
    },
}

/// Outbound half of an open transport. Each item is one text frame.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of an open transport. The stream ending means the transport is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// An open, full-duplex connection produced by a [`Transport`].
pub struct Link {
    /// Frames written here are transmitted in order
    pub sink: FrameSink,
    /// Frames received from the peer, in arrival order
    pub stream: FrameStream,
}

impl Link {
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Message-oriented transport that the connection manager drives.
///
/// Any full-duplex transport that can open, send text frames, receive frames and close
/// satisfies the contract:
/// - [`WebSocket`](super::tungstenite::TungsteniteTransport) (feature `tungstenite`)
/// - [`in-memory`](super::memory::MemoryTransport) for tests and offline use
///
/// # Example
///
/// ```ignore
/// struct MyTransport;
///
/// #[async_trait]
/// impl Transport for MyTransport {
///     async fn open(&self, endpoint: &str, protocols: &[String]) -> Result<Link> {
///         let (sink, stream) = my_connect(endpoint, protocols).await?;
///         Ok(Link::new(Box::pin(sink), Box::pin(stream)))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`, offering `protocols` unchanged.
    ///
    /// A returned error means the connection never opened.
    async fn open(&self, endpoint: &str, protocols: &[String]) -> Result<Link>;
}
