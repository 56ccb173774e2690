use super::StreamError;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// One live streaming connection delivering text frames
#[async_trait]
pub trait StreamConnection: Send {
    /// Next text payload. `None` means the peer closed the stream.
    async fn next_text(&mut self) -> Option<Result<String, StreamError>>;
}

/// Factory for streaming connections
///
/// The seam lets tests drive the connection manager with scripted
/// connections and failures instead of a live websocket.
#[async_trait]
pub trait Transport: Send {
    type Conn: StreamConnection;

    async fn connect(&mut self) -> Result<Self::Conn, StreamError>;
}

/// Websocket transport over tokio-tungstenite
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Conn = WsConnection;

    async fn connect(&mut self) -> Result<Self::Conn, StreamError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(WsConnection { stream })
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn next_text(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => continue,
                },
                // Control frames are handled by tungstenite; nothing to do.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(err) => return Some(Err(StreamError::Transport(err.to_string()))),
            }
        }
    }
}
