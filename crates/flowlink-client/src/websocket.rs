//! WebSocket implementation of [`SocketConnector`] on top of tokio-tungstenite.

use std::future::Future;
use std::pin::Pin;

use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::socket::{CloseFrame, Frame, SocketConnector, SocketPair};
use crate::ClientError;

/// Connects to `ws://` / `wss://` addresses.
///
/// A credential, when given, is sent as `Authorization: Bearer <credential>`
/// on the upgrade request.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl SocketConnector for WebSocketConnector {
    fn connect<'a>(
        &'a self,
        address: &'a str,
        credential: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SocketPair, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let mut request = address
                .into_client_request()
                .map_err(|e| ClientError::Socket(format!("invalid address '{address}': {e}")))?;
            if let Some(credential) = credential {
                let value = HeaderValue::from_str(&format!("Bearer {credential}"))
                    .map_err(|e| ClientError::Socket(format!("invalid credential: {e}")))?;
                request.headers_mut().insert(AUTHORIZATION, value);
            }

            let (ws_stream, response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| ClientError::Socket(e.to_string()))?;
            tracing::debug!(address, status = %response.status(), "WebSocket handshake complete");

            let (ws_sink, ws_stream) = ws_stream.split();
            let sink = ws_sink
                .sink_map_err(|e| ClientError::Socket(e.to_string()))
                .with(|frame: Frame| future::ready(Ok::<_, ClientError>(into_ws(frame))));
            let stream = ws_stream.filter_map(|item| {
                future::ready(match item {
                    Ok(message) => from_ws(message).map(Ok),
                    Err(e) => Some(Err(ClientError::Socket(e.to_string()))),
                })
            });

            Ok(SocketPair {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

fn into_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
        Frame::Close(close) => WsMessage::Close(close.map(|c| WsCloseFrame {
            code: CloseCode::from(c.code),
            reason: c.reason.into(),
        })),
    }
}

/// Control frames are answered by tungstenite itself and never surface.
fn from_ws(message: WsMessage) -> Option<Frame> {
    match message {
        WsMessage::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        WsMessage::Binary(bytes) => Some(Frame::Binary(bytes.to_vec())),
        WsMessage::Close(close) => Some(Frame::Close(close.map(|c| CloseFrame {
            code: u16::from(c.code),
            reason: c.reason.as_str().to_owned(),
        }))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}
