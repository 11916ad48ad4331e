//! WebSocket client connector.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error, Message};
use tracing::{debug, trace};

use lunar_core::{TransportError, TransportResult};

use crate::connector::{Connector, Frame, Link};

/// Connects to a OneBot forward WebSocket endpoint.
///
/// When an access token is configured it is sent as the `access_token`
/// query parameter.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    access_token: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
        }
    }

    /// Sets the access token. Empty tokens are ignored.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    fn request_url(&self) -> String {
        match &self.access_token {
            Some(token) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{sep}access_token={token}", self.url)
            }
            None => self.url.clone(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> TransportResult<Link> {
        debug!(url = %self.url, "Connecting to WebSocket server");

        let (stream, _response) =
            connect_async(self.request_url())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;
        let (sink, stream) = stream.split();

        let sink = sink
            .sink_map_err(|e: Error| TransportError::SendFailed(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(into_message(frame))));
        let stream = stream.map(|msg| match msg {
            Ok(msg) => Ok(from_message(msg)),
            Err(e) => Err(TransportError::ConnectionClosed {
                reason: e.to_string(),
            }),
        });

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }

    /// tungstenite queues a pong for every ping it reads.
    fn answers_pings(&self) -> bool {
        true
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.to_string()),
        Message::Binary(data) => {
            trace!(len = data.len(), "Binary frame, decoding as UTF-8");
            Frame::Text(String::from_utf8_lossy(&data).into_owned())
        }
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(_) | Message::Frame(_) => Frame::Close,
    }
}
