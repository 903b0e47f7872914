//! Production live transport over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use pursuit_env::{ChannelEvent, CloseInfo, EnvError, LiveChannel, LiveTransport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport for the live channel.
///
/// `ws://` and `wss://` URLs are both supported; the scheme is chosen by
/// the endpoint, mirroring the REST scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn LiveChannel>, EnvError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| EnvError::handshake(e.to_string()))?;
        debug!(%url, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WsStream,
}

#[async_trait]
impl LiveChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), EnvError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| EnvError::transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(ChannelEvent::Text(text.as_str().to_owned()));
                }
                Ok(Message::Binary(data)) => {
                    // The backend speaks JSON text; tolerate UTF-8 binary
                    // frames, drop the rest.
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Some(ChannelEvent::Text(text)),
                        Err(_) => {
                            debug!("dropping non-UTF-8 binary frame");
                            continue;
                        }
                    }
                }
                Ok(Message::Ping(payload)) => {
                    let _ = self.stream.send(Message::Pong(payload)).await;
                    continue;
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    let info = match frame {
                        Some(frame) => CloseInfo::new(
                            u16::from(frame.code),
                            frame.reason.as_str().to_owned(),
                        ),
                        None => CloseInfo::new(1005, ""),
                    };
                    return Some(ChannelEvent::Closed(info));
                }
                Err(e) => {
                    return Some(ChannelEvent::Error(EnvError::transport(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), EnvError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| EnvError::transport(e.to_string()))
    }
}
