use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

use super::error::WsError;
use super::traits::{Frame, Link, Transport};
use crate::Result;
use crate::error::Error;

/// WebSocket [`Transport`] backed by `tokio-tungstenite`.
///
/// Sub-protocols are offered through the `Sec-WebSocket-Protocol` header. Only text
/// frames carry messages; binary frames are ignored and ping/pong is answered by the
/// underlying library.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, endpoint: &str, protocols: &[String]) -> Result<Link> {
        let mut request = endpoint
            .into_client_request()
            .map_err(WsError::Connection)?;

        if !protocols.is_empty() {
            let offered = HeaderValue::from_str(&protocols.join(", ")).map_err(|e| {
                Error::validation(format!("invalid sub-protocol list {protocols:?}: {e}"))
            })?;
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(WsError::Connection)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%endpoint, "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink = write.with(|text: String| future::ok::<_, Error>(WsMessage::Text(text.into())));

        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(WsMessage::Close(frame)) => Some(Ok(match frame {
                    Some(frame) => Frame::Close {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.as_str().to_owned(),
                    },
                    None => Frame::Close {
                        code: None,
                        reason: String::new(),
                    },
                })),
                Ok(WsMessage::Binary(bytes)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(len = bytes.len(), "Ignoring binary frame");
                    #[cfg(not(feature = "tracing"))]
                    let _ = bytes;
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(WsError::Connection(e)))),
            })
        });

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }
}
