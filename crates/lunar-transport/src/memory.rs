//! In-process connector.
//!
//! Every successful [`connect`](Connector::connect) hands a [`MemoryPeer`] to
//! the paired [`MemoryAcceptor`], which plays the protocol end. Useful for
//! driving a session without a network.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use lunar_core::{TransportError, TransportResult};

use crate::connector::{Connector, Frame, Link};

/// Connector side of an in-process link.
#[derive(Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

/// Receives the peer end of every link the connector opens.
pub struct MemoryAcceptor {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// The protocol-end half of one link.
pub struct MemoryPeer {
    /// Frames written by the session.
    pub incoming: mpsc::UnboundedReceiver<Frame>,
    /// Frames delivered to the session.
    pub outgoing: mpsc::UnboundedSender<TransportResult<Frame>>,
}

impl MemoryConnector {
    /// Creates a connector and its acceptor.
    pub fn pair() -> (Self, MemoryAcceptor) {
        let (tx, rx) = mpsc::unbounded();
        (
            Self {
                peers: tx,
                refuse: Arc::new(AtomicU32::new(0)),
                attempts: Arc::new(AtomicU32::new(0)),
            },
            MemoryAcceptor { peers: rx },
        )
    }

    /// Makes the next `count` attempts fail.
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Total number of connection attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> TransportResult<Link> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::ConnectionFailed {
                url: self.endpoint().to_string(),
                reason: "refused".into(),
            });
        }

        let (to_peer, incoming) = mpsc::unbounded();
        let (outgoing, from_peer) = mpsc::unbounded();
        self.peers
            .unbounded_send(MemoryPeer { incoming, outgoing })
            .map_err(|_| TransportError::ConnectionFailed {
                url: self.endpoint().to_string(),
                reason: "acceptor dropped".into(),
            })?;

        let sink = to_peer.sink_map_err(|e| TransportError::SendFailed(e.to_string()));
        Ok(Link::new(Box::pin(sink), Box::pin(from_peer)))
    }

    fn endpoint(&self) -> &str {
        "memory://"
    }
}

impl MemoryAcceptor {
    /// Waits for the next link. `None` once the connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.next().await
    }
}

impl MemoryPeer {
    /// Delivers a text frame to the session.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outgoing.unbounded_send(Ok(Frame::Text(text.into()))).is_ok()
    }

    /// Next text frame written by the session, skipping control frames.
    pub async fn next_text(&mut self) -> Option<String> {
        while let Some(frame) = self.incoming.next().await {
            if let Frame::Text(text) = frame {
                return Some(text);
            }
        }
        None
    }

    /// Drops the link as a peer disconnect would.
    pub fn disconnect(self) {}
}
