//! The link abstraction the session is built on.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use lunar_core::{TransportError, TransportResult};

/// A transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload (binary payloads are converted lossily).
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// The peer announced it is closing.
    Close,
}

/// Write half of a link.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Read half of a link. Ends when the link is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = TransportResult<Frame>> + Send>>;

/// One established link.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens links to the protocol endpoint.
///
/// The session calls [`connect`](Connector::connect) once per attempt and
/// owns retry and backoff itself.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Makes one connection attempt.
    async fn connect(&self) -> TransportResult<Link>;

    /// Endpoint description used in logs and errors.
    fn endpoint(&self) -> &str;

    /// Whether the transport answers pings itself. The session only sends
    /// a pong for transports that do not.
    fn answers_pings(&self) -> bool {
        false
    }
}
