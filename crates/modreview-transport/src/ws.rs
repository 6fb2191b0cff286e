//! WebSocket channel backed by tokio-tungstenite.
//!
//! The credential travels as the `token` query parameter of the reviewer
//! socket URL, which is how the moderation backend authenticates sockets.
//! A reader task pumps inbound frames into a bounded queue so the owner of
//! the channel sees them strictly in arrival order.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, warn};

use crate::channel_traits::{Channel, ChannelEvent, Connector};
use crate::error::TransportError;
use crate::TransportResult;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default capacity of the inbound event queue.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Append the bearer credential to a socket endpoint as `token=<credential>`,
/// form-urlencoded.
pub fn endpoint_with_credential(endpoint: &str, credential: &str) -> String {
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    let token: String = url::form_urlencoded::byte_serialize(credential.as_bytes()).collect();
    format!("{endpoint}{sep}token={token}")
}

fn map_connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) => TransportError::Rejected {
            status: response.status().as_u16(),
        },
        WsError::Url(e) => TransportError::InvalidEndpoint(e.to_string()),
        other => TransportError::Connection(other.to_string()),
    }
}

/// Opens [`WsChannel`]s.
#[derive(Debug, Clone)]
pub struct WsConnector {
    event_buffer: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inbound queue capacity (minimum 1).
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self, credential), fields(endpoint = %endpoint))]
    async fn open(&self, endpoint: &str, credential: &str) -> TransportResult<Box<dyn Channel>> {
        let url = endpoint_with_credential(endpoint, credential);
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let (stream, response) = connect_async(request).await.map_err(map_connect_error)?;
        debug!(status = %response.status(), "websocket handshake complete");

        Ok(Box::new(WsChannel::from_stream(stream, self.event_buffer)))
    }
}

/// An open reviewer socket.
pub struct WsChannel {
    sink: SplitSink<WsStream, Message>,
    events: mpsc::Receiver<ChannelEvent>,
    reader: JoinHandle<()>,
    open: bool,
}

impl WsChannel {
    fn from_stream(stream: WsStream, buffer: usize) -> Self {
        let (sink, source) = stream.split();
        let (tx, rx) = mpsc::channel(buffer);
        let reader = tokio::spawn(pump_frames(source, tx));
        Self {
            sink,
            events: rx,
            reader,
            open: true,
        }
    }
}

/// Forward inbound frames as events until the socket ends.
async fn pump_frames(mut source: SplitStream<WsStream>, tx: mpsc::Sender<ChannelEvent>) {
    while let Some(frame) = source.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => ChannelEvent::Message(text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => ChannelEvent::Message(text),
                Err(_) => {
                    debug!("dropping non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                let _ = tx.send(ChannelEvent::Closed { reason }).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = tx.send(ChannelEvent::Error(e.to_string())).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
    let _ = tx.send(ChannelEvent::Closed { reason: None }).await;
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, message: &serde_json::Value) -> TransportResult<()> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let text = serde_json::to_string(message)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        if let Err(e) = self.sink.close().await {
            // The peer may already be gone; the socket is released either way.
            warn!(error = %e, "websocket close handshake failed");
        }
        self.reader.abort();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
